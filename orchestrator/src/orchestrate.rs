// Request entry point
//
// `orchestrate` is the only surface callers need: request in, envelope out.
// It never returns Err and never panics; every failure is folded into an
// error envelope with the request metadata attached.

use crate::implementation::ImplementationSelector;
use crate::invariants::{Invariants, OrchestratorConfig};
use crate::remote::RemoteEvaluator;
use crate::resolve::Engine;
use crate::resolver::{CachingResolver, ReferenceResolver};
use crate::scope::Frame;
use crate::wrapper::ZWrapper;
use std::rc::Rc;
use std::time::Duration;
use zobject::envelope::Envelope;
use zobject::error::RuntimeResult;
use zobject::value::ZObject;

pub const META_REQUEST_ID: &str = "orchestrationRequestId";
pub const META_START_TIME: &str = "orchestrationStartTime";
pub const META_END_TIME: &str = "orchestrationEndTime";
pub const META_DURATION_MS: &str = "orchestrationDurationMs";
pub const META_IMPLEMENTATION_ID: &str = "implementationId";
pub const META_IMPLEMENTATION_TYPE: &str = "implementationType";
pub const META_RESOLVER_BATCHES: &str = "resolverBatches";
pub const META_BUILTIN_CALLS: &str = "builtinCalls";
pub const META_REMOTE_CALLS: &str = "remoteCalls";

/// One orchestration request: the call expression plus the collaborators
/// and knobs it runs with.
pub struct OrchestrationRequest {
    pub call: serde_json::Value,
    pub resolver: Rc<dyn ReferenceResolver>,
    pub evaluators: Vec<Rc<dyn RemoteEvaluator>>,
    pub validate: bool,
    pub selector: Option<Rc<dyn ImplementationSelector>>,
    pub timeout: Option<Duration>,
}

impl OrchestrationRequest {
    pub fn new(call: serde_json::Value, resolver: Rc<dyn ReferenceResolver>) -> Self {
        OrchestrationRequest {
            call,
            resolver,
            evaluators: Vec::new(),
            validate: true,
            selector: None,
            timeout: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Rc<dyn RemoteEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn with_selector(mut self, selector: Rc<dyn ImplementationSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

async fn run(engine: &Engine, call: &serde_json::Value) -> RuntimeResult<ZObject> {
    let parsed = ZObject::from_json(call)?;
    parsed.check_wellformed()?;
    let root = Frame::root();
    if engine.invariants().config.validate {
        engine.validator().validate_tree(&parsed)?;
        engine.validate_semantics(&parsed, &root).await?;
    }
    let wrapped = ZWrapper::wrap(&parsed, &root);
    let resolved = engine.resolve(wrapped).await?;
    Ok(resolved.flatten())
}

/// Runs one request to completion. The answer is always an envelope; errors
/// raised anywhere inside resolution land in its error slot.
pub async fn orchestrate(request: OrchestrationRequest) -> Envelope {
    let request_id = uuid::Uuid::new_v4().to_string();
    let started = chrono::Utc::now();
    log::debug!("orchestration {} started", request_id);

    let mut invariants = Invariants::new(Rc::new(CachingResolver::new(request.resolver)))
        .with_evaluators(request.evaluators)
        .with_config(OrchestratorConfig {
            validate: request.validate,
            ..OrchestratorConfig::default()
        })
        .with_budget(request.timeout);
    if let Some(selector) = request.selector {
        invariants = invariants.with_selector(selector);
    }
    let invariants = Rc::new(invariants);
    let engine = Engine::new(invariants.clone());

    let mut envelope = match run(&engine, &request.call).await {
        Ok(value) => Envelope::value(value),
        Err(error) => {
            log::debug!("orchestration {} failed: {}", request_id, error);
            Envelope::error(error)
        }
    };

    let ended = chrono::Utc::now();
    envelope.set_metadata(META_REQUEST_ID, request_id);
    envelope.set_metadata(META_START_TIME, started.to_rfc3339());
    envelope.set_metadata(META_END_TIME, ended.to_rfc3339());
    envelope.set_metadata(
        META_DURATION_MS,
        (ended - started).num_milliseconds().to_string(),
    );
    envelope.set_metadata(
        META_RESOLVER_BATCHES,
        invariants.resolver_batches().to_string(),
    );
    envelope.set_metadata(META_BUILTIN_CALLS, invariants.builtin_calls().to_string());
    envelope.set_metadata(META_REMOTE_CALLS, invariants.remote_calls().to_string());
    if let Some((id, kind)) = invariants.selection() {
        envelope.set_metadata(META_IMPLEMENTATION_ID, id);
        envelope.set_metadata(META_IMPLEMENTATION_TYPE, kind);
    }
    envelope
}
