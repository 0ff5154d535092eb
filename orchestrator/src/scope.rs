// Frame chain for lexical argument scoping
//
// One frame is created per function-call execution, parented at the call
// site's enclosing scope. Lookups walk the chain innermost to outermost; a
// frame never mutates its parent. Slots transition one-way
// (Unevaluated -> Evaluated | Failed) and are evaluated at most once; the
// Evaluating state is installed synchronously before any asynchronous work
// begins, so concurrent demands of the same slot await a gate instead of
// dispatching the evaluation twice.

use crate::resolve::Engine;
use crate::wrapper::WrapperChild;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::value::ZObject;

pub type ScopeRef = Rc<Frame>;

/// State of one argument binding.
#[derive(Debug, Clone)]
pub enum ArgumentSlot {
    Unevaluated {
        payload: WrapperChild,
        declared_type: Option<ZObject>,
    },
    Evaluating {
        payload: WrapperChild,
        declared_type: Option<ZObject>,
        gate: Rc<Notify>,
    },
    Evaluated(WrapperChild),
    Failed(ZError),
}

impl ArgumentSlot {
    // Copies used by merged_copy: an in-flight evaluation reverts to
    // Unevaluated in the copy, since the copy must not share the gate.
    fn detached_clone(&self) -> ArgumentSlot {
        match self {
            ArgumentSlot::Evaluating {
                payload,
                declared_type,
                ..
            } => ArgumentSlot::Unevaluated {
                payload: payload.clone(),
                declared_type: declared_type.clone(),
            },
            other => other.clone(),
        }
    }
}

/// One link in the lexical scope chain.
#[derive(Debug)]
pub struct Frame {
    parent: Option<ScopeRef>,
    slots: RefCell<IndexMap<String, ArgumentSlot>>,
}

enum Step {
    Parent,
    Wait(Rc<Notify>),
    Evaluate {
        payload: WrapperChild,
        declared_type: Option<ZObject>,
        gate: Rc<Notify>,
    },
}

impl Frame {
    /// The empty terminal frame: answers every lookup with "not found".
    pub fn root() -> ScopeRef {
        Rc::new(Frame {
            parent: None,
            slots: RefCell::new(IndexMap::new()),
        })
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(Frame {
            parent: Some(parent.clone()),
            slots: RefCell::new(IndexMap::new()),
        })
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    /// Installs an Unevaluated slot. Last write wins during the frame's
    /// construction phase; a frame is conceptually built once before reads.
    pub fn bind(&self, name: &str, payload: WrapperChild, declared_type: Option<ZObject>) {
        self.slots.borrow_mut().insert(
            name.to_string(),
            ArgumentSlot::Unevaluated {
                payload,
                declared_type,
            },
        );
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    /// Looks up `name` along the chain. Non-lazy retrieval forces the slot's
    /// one-time evaluation through the engine; lazy retrieval returns the
    /// deferred payload without forcing. All observers of a slot see the
    /// same memoized outcome.
    pub async fn retrieve(
        &self,
        name: &str,
        lazily: bool,
        engine: &Engine,
    ) -> RuntimeResult<WrapperChild> {
        let mut frame: &Frame = self;
        loop {
            // Inspect, then transition, without suspending in between: the
            // check-then-set is atomic under cooperative scheduling.
            let step = {
                let slots = frame.slots.borrow();
                match slots.get(name) {
                    None => Step::Parent,
                    Some(ArgumentSlot::Evaluated(value)) => return Ok(value.clone()),
                    Some(ArgumentSlot::Failed(error)) => return Err(error.clone()),
                    Some(ArgumentSlot::Unevaluated {
                        payload,
                        declared_type,
                    }) => {
                        if lazily {
                            return Ok(payload.clone());
                        }
                        Step::Evaluate {
                            payload: payload.clone(),
                            declared_type: declared_type.clone(),
                            gate: Rc::new(Notify::new()),
                        }
                    }
                    Some(ArgumentSlot::Evaluating { payload, gate, .. }) => {
                        if lazily {
                            return Ok(payload.clone());
                        }
                        Step::Wait(gate.clone())
                    }
                }
            };
            if let Step::Evaluate {
                payload,
                declared_type,
                gate,
            } = &step
            {
                frame.slots.borrow_mut().insert(
                    name.to_string(),
                    ArgumentSlot::Evaluating {
                        payload: payload.clone(),
                        declared_type: declared_type.clone(),
                        gate: gate.clone(),
                    },
                );
            }
            match step {
                Step::Parent => match &frame.parent {
                    Some(parent) => frame = parent.as_ref(),
                    None => {
                        return Err(ZError::new(
                            ErrorKind::ArgumentNotFound,
                            format!("no argument {} in scope", name),
                        ))
                    }
                },
                Step::Wait(gate) => {
                    // A sibling task owns the evaluation; wait for its gate.
                    // The wait is capped so a cyclic self-demand surfaces as
                    // an error instead of suspending forever.
                    let cap = engine.slot_wait_cap();
                    if tokio::time::timeout(cap, gate.notified()).await.is_err() {
                        return Err(ZError::new(
                            ErrorKind::EvaluationCycle,
                            format!("evaluation of argument {} did not complete", name),
                        ));
                    }
                }
                Step::Evaluate {
                    payload,
                    declared_type,
                    gate,
                } => {
                    let outcome = engine.evaluate_argument(payload, declared_type).await;
                    let mut slots = frame.slots.borrow_mut();
                    match &outcome {
                        Ok(value) => {
                            slots.insert(name.to_string(), ArgumentSlot::Evaluated(value.clone()));
                        }
                        Err(error) => {
                            slots.insert(name.to_string(), ArgumentSlot::Failed(error.clone()));
                        }
                    }
                    drop(slots);
                    gate.notify_waiters();
                    return outcome;
                }
            }
        }
    }

    /// Splices the `caller` chain on top of the `closure` chain without
    /// mutating either: the result resolves caller bindings first, then the
    /// closure's captured bindings.
    pub fn merged_copy(closure: &ScopeRef, caller: &ScopeRef) -> ScopeRef {
        if Rc::ptr_eq(closure, caller) {
            return caller.clone();
        }
        let mut caller_chain = Vec::new();
        let mut cursor = Some(caller.clone());
        while let Some(frame) = cursor {
            cursor = frame.parent.clone();
            caller_chain.push(frame);
        }
        let mut merged = closure.clone();
        for frame in caller_chain.into_iter().rev() {
            let slots = frame
                .slots
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.detached_clone()))
                .collect();
            merged = Rc::new(Frame {
                parent: Some(merged),
                slots: RefCell::new(slots),
            });
        }
        merged
    }

    /// Names bound locally in this frame, declaration order.
    pub fn local_names(&self) -> Vec<String> {
        self.slots.borrow().keys().cloned().collect()
    }
}

pub(crate) fn default_slot_wait() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::Invariants;
    use crate::resolver::StaticReferenceResolver;
    use crate::wrapper::ZWrapper;
    use std::rc::Rc;

    fn engine_with(resolver: StaticReferenceResolver) -> Engine {
        Engine::new(Rc::new(Invariants::new(Rc::new(resolver))))
    }

    fn payload(value: &ZObject, scope: &ScopeRef) -> WrapperChild {
        ZWrapper::wrap(value, scope)
    }

    #[tokio::test]
    async fn inner_frame_shadows_outer() {
        let engine = engine_with(StaticReferenceResolver::new());
        let outer = Frame::child(&Frame::root());
        let inner = Frame::child(&outer);
        outer.bind("Z900K1", payload(&ZObject::string_box("outer"), &outer), None);
        inner.bind("Z900K1", payload(&ZObject::string_box("inner"), &inner), None);

        let got = inner.retrieve("Z900K1", false, &engine).await.unwrap();
        assert_eq!(got.flatten(), ZObject::string_box("inner"));
        let got = outer.retrieve("Z900K1", false, &engine).await.unwrap();
        assert_eq!(got.flatten(), ZObject::string_box("outer"));
    }

    #[tokio::test]
    async fn lazy_retrieval_does_not_force() {
        // The payload references a ZID the resolver does not know; lazy
        // retrieval must hand it back untouched.
        let engine = engine_with(StaticReferenceResolver::new());
        let frame = Frame::child(&Frame::root());
        frame.bind(
            "Z900K1",
            payload(&ZObject::reference("Z9999"), &frame),
            None,
        );
        let got = frame.retrieve("Z900K1", true, &engine).await.unwrap();
        assert_eq!(got.flatten(), ZObject::reference("Z9999"));
    }

    #[tokio::test]
    async fn failures_are_memoized() {
        let resolver = Rc::new(StaticReferenceResolver::new());
        let engine = Engine::new(Rc::new(Invariants::new(resolver.clone())));
        let frame = Frame::child(&Frame::root());
        frame.bind(
            "Z900K1",
            payload(&ZObject::reference("Z9999"), &frame),
            None,
        );
        let first = frame.retrieve("Z900K1", false, &engine).await.unwrap_err();
        let second = frame.retrieve("Z900K1", false, &engine).await.unwrap_err();
        assert_eq!(first, second);
        // The second demand answered from the slot, not the resolver.
        assert_eq!(resolver.batches(), 1);
    }

    #[tokio::test]
    async fn missing_name_walks_to_the_root() {
        let engine = engine_with(StaticReferenceResolver::new());
        let frame = Frame::child(&Frame::root());
        let err = frame.retrieve("Z900K1", false, &engine).await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ArgumentNotFound);
    }

    #[tokio::test]
    async fn merged_copy_keeps_caller_precedence() {
        let engine = engine_with(StaticReferenceResolver::new());
        let closure = Frame::child(&Frame::root());
        closure.bind(
            "Z900K1",
            WrapperChild::Leaf("closure".to_string()),
            None,
        );
        closure.bind(
            "Z900K2",
            WrapperChild::Leaf("captured".to_string()),
            None,
        );
        let caller = Frame::child(&Frame::root());
        caller.bind("Z900K1", WrapperChild::Leaf("caller".to_string()), None);

        let merged = Frame::merged_copy(&closure, &caller);
        let got = merged.retrieve("Z900K1", false, &engine).await.unwrap();
        assert_eq!(got.flatten(), ZObject::String("caller".to_string()));
        // Captured bindings stay reachable behind the caller's chain.
        let got = merged.retrieve("Z900K2", false, &engine).await.unwrap();
        assert_eq!(got.flatten(), ZObject::String("captured".to_string()));
        // The inputs themselves are untouched.
        let got = closure.retrieve("Z900K1", false, &engine).await.unwrap();
        assert_eq!(got.flatten(), ZObject::String("closure".to_string()));
    }
}
