// Lexical scoping: compositions read their own frame, argument payloads
// evaluate against the caller's bindings, and function values travel with
// the scope they were resolved in.

mod common;

use common::*;
use orchestrator::{orchestrate, OrchestrationRequest};
use serde_json::json;
use std::rc::Rc;
use zobject::{ErrorKind, ZObject};

#[tokio::test]
async fn composition_reads_its_own_argument() {
    let identity = function_def(
        vec![arg_decl("Z40", "Z805K1")],
        zref("Z40"),
        vec![composition_impl(arg_ref("Z805K1"))],
    );
    let resolver = standard_resolver().with("Z805", def(&identity));
    let call = json!({
        "Z1K1": "Z7",
        "Z7K1": zref("Z805"),
        "Z805K1": zboolean(true)
    });
    let envelope = orchestrate(OrchestrationRequest::new(call, Rc::new(resolver))).await;
    assert_eq!(
        envelope.value_ref().and_then(ZObject::unbox_boolean),
        Some(true)
    );
}

#[tokio::test]
async fn inner_bindings_shadow_outer_ones() {
    // Z805 forwards into Z807, rebinding the same payload under Z807's own
    // name; the inner composition sees the inner frame first.
    let outer = function_def(
        vec![arg_decl("Z40", "Z805K1")],
        zref("Z40"),
        vec![composition_impl(json!({
            "Z1K1": "Z7",
            "Z7K1": zref("Z807"),
            "Z807K1": arg_ref("Z805K1")
        }))],
    );
    let inner = function_def(
        vec![arg_decl("Z40", "Z807K1")],
        zref("Z40"),
        vec![composition_impl(arg_ref("Z807K1"))],
    );
    let resolver = standard_resolver()
        .with("Z805", def(&outer))
        .with("Z807", def(&inner));
    let call = json!({
        "Z1K1": "Z7",
        "Z7K1": zref("Z805"),
        "Z805K1": zboolean(false)
    });
    let envelope = orchestrate(OrchestrationRequest::new(call, Rc::new(resolver))).await;
    assert_eq!(
        envelope.value_ref().and_then(ZObject::unbox_boolean),
        Some(false)
    );
}

#[tokio::test]
async fn function_passed_as_argument_is_callable() {
    // apply(f, x) = f(x), with the function travelling through an argument
    // slot and the inner call binding positionally.
    let apply = function_def(
        vec![arg_decl("Z1", "Z806K1"), arg_decl("Z40", "Z806K2")],
        zref("Z40"),
        vec![composition_impl(json!({
            "Z1K1": "Z7",
            "Z7K1": arg_ref("Z806K1"),
            "K1": arg_ref("Z806K2")
        }))],
    );
    let resolver = standard_resolver().with("Z806", def(&apply));
    let call = json!({
        "Z1K1": "Z7",
        "Z7K1": zref("Z806"),
        "Z806K1": zref("Z801"),
        "Z806K2": zboolean(true)
    });
    let envelope = orchestrate(OrchestrationRequest::new(call, Rc::new(resolver))).await;
    assert!(!envelope.is_error(), "{:?}", envelope.error_ref());
    assert_eq!(
        envelope.value_ref().and_then(ZObject::unbox_boolean),
        Some(true)
    );
}

#[tokio::test]
async fn unbound_argument_reference_errors() {
    let loose = function_def(
        vec![arg_decl("Z40", "Z808K1")],
        zref("Z40"),
        vec![composition_impl(arg_ref("Z809K1"))],
    );
    let resolver = standard_resolver().with("Z808", def(&loose));
    let call = json!({
        "Z1K1": "Z7",
        "Z7K1": zref("Z808"),
        "Z808K1": zboolean(true)
    });
    let envelope = orchestrate(OrchestrationRequest::new(call, Rc::new(resolver))).await;
    assert_eq!(
        envelope.error_ref().map(|e| e.kind()),
        Some(&ErrorKind::ArgumentNotFound)
    );
}

#[tokio::test]
async fn missing_argument_surfaces_on_demand() {
    // Z805 declares one argument and its body demands it, but the call
    // never supplies it.
    let identity = function_def(
        vec![arg_decl("Z40", "Z805K1")],
        zref("Z40"),
        vec![composition_impl(arg_ref("Z805K1"))],
    );
    let resolver = standard_resolver().with("Z805", def(&identity));
    let call = json!({
        "Z1K1": "Z7",
        "Z7K1": zref("Z805")
    });
    let envelope = orchestrate(OrchestrationRequest::new(call, Rc::new(resolver))).await;
    assert_eq!(
        envelope.error_ref().map(|e| e.kind()),
        Some(&ErrorKind::ArgumentNotFound)
    );
}
