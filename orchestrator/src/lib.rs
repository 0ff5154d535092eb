//! Function-call orchestration over the ZObject model.
//!
//! The engine resolves self-describing structured values to normal form:
//! references are fetched from a definition store, argument references are
//! substituted from lexical frames, function calls are dispatched across
//! builtin, composed and remotely evaluated implementations, and generic
//! type instantiations are expanded on demand. Everything runs
//! single-threaded and cooperative per request; all futures are `!Send`.

pub mod builtins;
pub mod execute;
pub mod implementation;
pub mod invariants;
pub mod orchestrate;
pub mod remote;
pub mod resolve;
pub mod resolver;
pub mod scope;
pub mod validation;
pub mod wrapper;

pub use crate::builtins::BuiltinRegistry;
pub use crate::implementation::{
    FirstSelector, Implementation, ImplementationSelector, NthSelector, PreferBuiltinSelector,
};
pub use crate::invariants::{Invariants, OrchestratorConfig};
pub use crate::orchestrate::{orchestrate, OrchestrationRequest};
pub use crate::remote::{HttpRemoteEvaluator, RemoteEvaluator};
pub use crate::resolve::Engine;
pub use crate::resolver::{
    CachingResolver, HttpReferenceResolver, ReferenceResolver, StaticReferenceResolver,
};
pub use crate::scope::{Frame, ScopeRef};
pub use crate::wrapper::{WrapperChild, ZWrapper};
