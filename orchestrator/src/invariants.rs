// Per-request invariants
//
// Everything that stays fixed for the lifetime of one orchestration request
// is bundled here and shared by Rc: the collaborators, the configuration,
// the time budget and the resource counters. Counters are Cells because the
// whole request runs single-threaded and cooperative.

use crate::builtins::BuiltinRegistry;
use crate::implementation::{ImplementationSelector, PreferBuiltinSelector};
use crate::remote::RemoteEvaluator;
use crate::resolver::ReferenceResolver;
use crate::scope;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};
use zobject::error::{ErrorKind, RuntimeResult, ZError};

/// Knobs that shape one request's behaviour.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Run structural validation on the input and on resolved values.
    pub validate: bool,
    /// Upper bound on rewrite steps for a single node; exceeding it means
    /// the object rewrites into itself.
    pub max_rewrite_steps: u32,
    /// Cap on waiting for a sibling task's in-flight slot evaluation.
    pub slot_wait_cap: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            validate: true,
            max_rewrite_steps: 1000,
            slot_wait_cap: scope::default_slot_wait(),
        }
    }
}

pub struct Invariants {
    pub resolver: Rc<dyn ReferenceResolver>,
    pub evaluators: Vec<Rc<dyn RemoteEvaluator>>,
    pub registry: BuiltinRegistry,
    pub selector: Rc<dyn ImplementationSelector>,
    pub config: OrchestratorConfig,
    deadline: Option<Instant>,
    resolver_batches: Cell<u64>,
    builtin_calls: Cell<u64>,
    remote_calls: Cell<u64>,
    // (identifier, kind) of the first implementation selected for this
    // request. Later selections do not overwrite it.
    selected: RefCell<Option<(String, String)>>,
}

impl Invariants {
    pub fn new(resolver: Rc<dyn ReferenceResolver>) -> Self {
        Invariants {
            resolver,
            evaluators: Vec::new(),
            registry: BuiltinRegistry::standard(),
            selector: Rc::new(PreferBuiltinSelector),
            config: OrchestratorConfig::default(),
            deadline: None,
            resolver_batches: Cell::new(0),
            builtin_calls: Cell::new(0),
            remote_calls: Cell::new(0),
            selected: RefCell::new(None),
        }
    }

    pub fn with_evaluators(mut self, evaluators: Vec<Rc<dyn RemoteEvaluator>>) -> Self {
        self.evaluators = evaluators;
        self
    }

    pub fn with_registry(mut self, registry: BuiltinRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_selector(mut self, selector: Rc<dyn ImplementationSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the request's time budget counting from now.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.deadline = budget.map(|b| Instant::now() + b);
        self
    }

    /// Time left in the budget, when one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Consulted at suspension points; once the budget is gone the request
    /// fails instead of starting more external work.
    pub fn check_budget(&self) -> RuntimeResult<()> {
        match self.remaining() {
            Some(left) if left.is_zero() => Err(ZError::new(
                ErrorKind::TimeBudgetExceeded,
                "orchestration time budget exceeded",
            )),
            _ => Ok(()),
        }
    }

    pub fn count_resolver_batch(&self) {
        self.resolver_batches.set(self.resolver_batches.get() + 1);
    }

    pub fn count_builtin_call(&self) {
        self.builtin_calls.set(self.builtin_calls.get() + 1);
    }

    pub fn count_remote_call(&self) {
        self.remote_calls.set(self.remote_calls.get() + 1);
    }

    pub fn resolver_batches(&self) -> u64 {
        self.resolver_batches.get()
    }

    pub fn builtin_calls(&self) -> u64 {
        self.builtin_calls.get()
    }

    pub fn remote_calls(&self) -> u64 {
        self.remote_calls.get()
    }

    /// Records the selected implementation; first selection wins, so the
    /// request-level metadata describes the outermost call.
    pub fn record_selection(&self, id: &str, kind: &str) {
        let mut slot = self.selected.borrow_mut();
        if slot.is_none() {
            *slot = Some((id.to_string(), kind.to_string()));
        }
    }

    pub fn selection(&self) -> Option<(String, String)> {
        self.selected.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticReferenceResolver;

    fn invariants() -> Invariants {
        Invariants::new(Rc::new(StaticReferenceResolver::new()))
    }

    #[test]
    fn no_budget_never_trips() {
        let inv = invariants();
        assert!(inv.remaining().is_none());
        assert!(inv.check_budget().is_ok());
    }

    #[test]
    fn exhausted_budget_trips() {
        let inv = invariants().with_budget(Some(Duration::ZERO));
        let err = inv.check_budget().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TimeBudgetExceeded);
    }

    #[test]
    fn first_selection_wins() {
        let inv = invariants();
        assert_eq!(inv.selection(), None);
        inv.record_selection("Z901", "builtin");
        inv.record_selection("composition", "composition");
        assert_eq!(
            inv.selection(),
            Some(("Z901".to_string(), "builtin".to_string()))
        );
    }
}
