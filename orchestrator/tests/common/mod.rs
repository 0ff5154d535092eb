// Shared fixtures: JSON builders for stored definitions and a resolver
// preloaded with the standard function library the scenarios call into.

#![allow(dead_code)]

use orchestrator::StaticReferenceResolver;
use serde_json::{json, Value};
use zobject::ZObject;

pub fn zref(zid: &str) -> Value {
    json!({"Z1K1": "Z9", "Z9K1": zid})
}

pub fn zstring(s: &str) -> Value {
    json!({"Z1K1": "Z6", "Z6K1": s})
}

pub fn zboolean(b: bool) -> Value {
    json!({"Z1K1": "Z40", "Z40K1": zref(if b { "Z41" } else { "Z42" })})
}

pub fn zunit() -> Value {
    zref("Z24")
}

pub fn arg_ref(name: &str) -> Value {
    json!({"Z1K1": "Z18", "Z18K1": name})
}

/// The `Z881(T)` type expression.
pub fn list_type(element_zid: &str) -> Value {
    json!({"Z1K1": "Z7", "Z7K1": zref("Z881"), "Z881K1": zref(element_zid)})
}

/// A cons-chain typed list; the empty list carries only its type key.
pub fn typed_list(items: Vec<Value>, element_zid: &str) -> Value {
    let t = list_type(element_zid);
    let mut out = json!({"Z1K1": t.clone()});
    for item in items.into_iter().rev() {
        out = json!({"Z1K1": t.clone(), "K1": item, "K2": out});
    }
    out
}

pub fn arg_decl(type_zid: &str, name: &str) -> Value {
    json!({
        "Z1K1": "Z17",
        "Z17K1": zref(type_zid),
        "Z17K2": zstring(name),
    })
}

pub fn builtin_impl(id: &str) -> Value {
    json!({"Z1K1": "Z14", "Z14K4": zstring(id)})
}

pub fn composition_impl(body: Value) -> Value {
    json!({"Z1K1": "Z14", "Z14K2": body})
}

pub fn function_def(args: Vec<Value>, return_type: Value, impls: Vec<Value>) -> Value {
    json!({
        "Z1K1": "Z8",
        "Z8K1": typed_list(args, "Z17"),
        "Z8K2": return_type,
        "Z8K4": typed_list(impls, "Z14"),
    })
}

/// A minimal stored type descriptor for a ZID-named type.
pub fn type_def(zid: &str) -> Value {
    json!({
        "Z1K1": "Z4",
        "Z4K1": zref(zid),
        "Z4K2": typed_list(vec![], "Z3"),
        "Z4K3": zunit(),
    })
}

pub fn def(json: &Value) -> ZObject {
    ZObject::from_json(json).expect("fixture must be a structured value")
}

/// The standard library the scenarios dereference: echo, if, equality, the
/// list functions, the typed-list generic and its validator, plus the type
/// definitions that appear in payload position.
pub fn standard_resolver() -> StaticReferenceResolver {
    let echo = function_def(
        vec![arg_decl("Z1", "Z801K1")],
        zref("Z1"),
        vec![builtin_impl("Z901")],
    );
    let zif = function_def(
        vec![
            arg_decl("Z40", "Z802K1"),
            arg_decl("Z1", "Z802K2"),
            arg_decl("Z1", "Z802K3"),
        ],
        zref("Z1"),
        vec![builtin_impl("Z902")],
    );
    let equals = function_def(
        vec![arg_decl("Z1", "Z866K1"), arg_decl("Z1", "Z866K2")],
        zref("Z40"),
        vec![builtin_impl("Z966")],
    );
    let cons = function_def(
        vec![arg_decl("Z1", "Z810K1"), arg_decl("Z1", "Z810K2")],
        list_type("Z1"),
        vec![builtin_impl("Z910")],
    );
    let head = function_def(
        vec![arg_decl("Z1", "Z811K1")],
        zref("Z1"),
        vec![builtin_impl("Z911")],
    );
    let tail = function_def(
        vec![arg_decl("Z1", "Z812K1")],
        list_type("Z1"),
        vec![builtin_impl("Z912")],
    );
    let empty = function_def(
        vec![arg_decl("Z1", "Z813K1")],
        zref("Z40"),
        vec![builtin_impl("Z913")],
    );
    let list_generic = function_def(
        vec![arg_decl("Z4", "Z881K1")],
        zref("Z4"),
        vec![builtin_impl("Z981")],
    );
    let list_validator = function_def(
        vec![arg_decl("Z99", "Z831K1"), arg_decl("Z99", "Z831K2")],
        zref("Z40"),
        vec![builtin_impl("Z931")],
    );

    StaticReferenceResolver::new()
        .with("Z801", def(&echo))
        .with("Z802", def(&zif))
        .with("Z866", def(&equals))
        .with("Z810", def(&cons))
        .with("Z811", def(&head))
        .with("Z812", def(&tail))
        .with("Z813", def(&empty))
        .with("Z881", def(&list_generic))
        .with("Z831", def(&list_validator))
        .with("Z6", def(&type_def("Z6")))
        .with("Z40", def(&type_def("Z40")))
}
