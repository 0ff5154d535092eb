// Structural validation
//
// Shape checks are expressed as JSON Schemas compiled once per type and
// cached. The engine only consumes pass/fail plus a structured error; the
// semantic layer (running a type's own validator function) lives with the
// execution engine because it needs to issue calls.

use jsonschema::JSONSchema;
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::keys;
use zobject::list;
use zobject::value::ZObject;

const ZID_PATTERN: &str = "^Z[1-9][0-9]*$";

/// Compiled-schema cache keyed by type ZID.
pub struct SchemaValidator {
    cache: RefCell<HashMap<String, Option<Rc<JSONSchema>>>>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator {
            cache: RefCell::new(HashMap::new()),
        }
    }

    // Shape schemas for the engine-known ZIDs. Unknown ZIDs get no schema
    // and pass structural validation; their semantics are the validator
    // function's business.
    fn schema_source(zid: &str) -> Option<serde_json::Value> {
        let required = |keys: Vec<&str>| {
            json!({
                "type": "object",
                "required": keys,
            })
        };
        let schema = match zid {
            keys::Z_STRING => json!({
                "oneOf": [
                    {"type": "string"},
                    {
                        "type": "object",
                        "required": [keys::TYPE_KEY, keys::KEY_STRING_VALUE],
                        "properties": {keys::KEY_STRING_VALUE: {"type": "string"}}
                    }
                ]
            }),
            keys::Z_REFERENCE => json!({
                "type": "object",
                "required": [keys::TYPE_KEY, keys::KEY_REFERENCE_ID],
                "properties": {keys::KEY_REFERENCE_ID: {"type": "string", "pattern": ZID_PATTERN}}
            }),
            keys::Z_BOOLEAN => required(vec![keys::TYPE_KEY, keys::KEY_BOOLEAN_IDENTITY]),
            keys::Z_FUNCTION_CALL => required(vec![keys::TYPE_KEY, keys::KEY_CALL_FUNCTION]),
            keys::Z_FUNCTION => required(vec![
                keys::TYPE_KEY,
                keys::KEY_FUNCTION_ARGUMENTS,
                keys::KEY_FUNCTION_RETURN_TYPE,
                keys::KEY_FUNCTION_IMPLEMENTATIONS,
            ]),
            keys::Z_IMPLEMENTATION => required(vec![keys::TYPE_KEY]),
            keys::Z_CODE => required(vec![
                keys::TYPE_KEY,
                keys::KEY_CODE_LANGUAGE,
                keys::KEY_CODE_SOURCE,
            ]),
            keys::Z_ARGUMENT_DECL => required(vec![
                keys::TYPE_KEY,
                keys::KEY_ARGUMENT_TYPE,
                keys::KEY_ARGUMENT_NAME,
            ]),
            keys::Z_ARGUMENT_REF => required(vec![keys::TYPE_KEY, keys::KEY_ARGUMENT_REF_NAME]),
            keys::Z_ENVELOPE => required(vec![
                keys::TYPE_KEY,
                keys::KEY_ENVELOPE_VALUE,
                keys::KEY_ENVELOPE_METADATA,
            ]),
            keys::Z_TYPE => required(vec![keys::TYPE_KEY, keys::KEY_TYPE_IDENTITY]),
            keys::Z_ERROR => required(vec![keys::TYPE_KEY, keys::KEY_ERROR_TYPE]),
            keys::Z_QUOTE => required(vec![keys::TYPE_KEY, keys::KEY_QUOTE_VALUE]),
            keys::Z_LANGUAGE => required(vec![keys::TYPE_KEY, keys::KEY_LANGUAGE_NAME]),
            _ => return None,
        };
        Some(schema)
    }

    fn compiled(&self, zid: &str) -> Option<Rc<JSONSchema>> {
        if let Some(hit) = self.cache.borrow().get(zid) {
            return hit.clone();
        }
        let compiled = Self::schema_source(zid)
            .and_then(|source| JSONSchema::compile(&source).ok())
            .map(Rc::new);
        self.cache
            .borrow_mut()
            .insert(zid.to_string(), compiled.clone());
        compiled
    }

    /// Checks `value` against the shape schema for `zid`. ZIDs without a
    /// schema (including `Z1`) pass.
    pub fn check_by_zid(&self, value: &ZObject, zid: &str, kind: ErrorKind) -> RuntimeResult<()> {
        if zid == keys::Z_OBJECT {
            return Ok(());
        }
        let Some(schema) = self.compiled(zid) else {
            return Ok(());
        };
        let instance = value.to_json();
        if schema.is_valid(&instance) {
            return Ok(());
        }
        let detail = schema
            .validate(&instance)
            .err()
            .and_then(|mut errors| errors.next())
            .map(|e| e.to_string())
            .unwrap_or_default();
        Err(ZError::new(kind, format!("value is not a valid {}: {}", zid, detail))
            .with_payload(value.clone()))
    }

    /// Checks a value against its own type key, catching representation
    /// mismatches like a `Z6` box without a string inside.
    pub fn check_apparent(&self, value: &ZObject, kind: ErrorKind) -> RuntimeResult<()> {
        match value.type_zid() {
            Some(zid) => self.check_by_zid(value, zid, kind),
            None => Ok(()),
        }
    }

    /// Checks a value against a declared type expression. Unresolvable
    /// declarations (argument references, arbitrary calls) pass; the
    /// semantic validator covers them at runtime.
    pub fn check_declared(
        &self,
        value: &ZObject,
        declared: &ZObject,
        kind: ErrorKind,
    ) -> RuntimeResult<()> {
        if let Some(zid) = declared_zid(declared) {
            return self.check_by_zid(value, zid, kind);
        }
        if let Some(element) = typed_list_element(declared) {
            return self.check_list(value, element, kind);
        }
        if declared.type_zid() == Some(keys::Z_TYPE) {
            // Inline descriptor: check against its identity when that is a
            // list instantiation, otherwise defer to the validator function.
            if let Some(identity) = declared.get(keys::KEY_TYPE_IDENTITY) {
                if let Some(element) = typed_list_element(identity) {
                    return self.check_list(value, element, kind);
                }
            }
        }
        Ok(())
    }

    /// List-shape plus per-element check against the declared element type.
    pub fn check_list(
        &self,
        value: &ZObject,
        element: &ZObject,
        kind: ErrorKind,
    ) -> RuntimeResult<()> {
        let items = list::list_items(value).ok_or_else(|| {
            ZError::new(kind.clone(), "value is not a typed list").with_payload(value.clone())
        })?;
        let Some(element_zid) = declared_zid(element) else {
            return Ok(());
        };
        let mut errors = Vec::new();
        for item in items {
            if let Err(e) = self.check_by_zid(item, element_zid, kind.clone()) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ZError::multiple(errors))
        }
    }

    /// Whole-tree structural validation. Function-call nodes are checked for
    /// call shape only: their inputs are pre-execution expressions and get
    /// validated when (and if) they are evaluated. Quoted payloads are
    /// opaque. Errors aggregate flat.
    pub fn validate_tree(&self, value: &ZObject) -> RuntimeResult<()> {
        let mut errors = Vec::new();
        self.walk(value, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ZError::multiple(
                errors.into_iter().flat_map(ZError::flatten).collect(),
            ))
        }
    }

    fn walk(&self, value: &ZObject, errors: &mut Vec<ZError>) {
        let map = match value {
            ZObject::String(_) => return,
            ZObject::Object(map) => map,
        };
        if !map.contains_key(keys::TYPE_KEY) {
            errors.push(
                ZError::new(
                    ErrorKind::NotWellformed,
                    format!("missing type key {}", keys::TYPE_KEY),
                )
                .with_payload(value.clone()),
            );
            return;
        }
        if let Err(e) = self.check_apparent(value, ErrorKind::NotWellformed) {
            errors.push(e);
        }
        match value.type_zid() {
            Some(keys::Z_QUOTE) => {}
            Some(keys::Z_FUNCTION_CALL) => {
                if let Some(function) = map.get(keys::KEY_CALL_FUNCTION) {
                    self.walk(function, errors);
                }
            }
            _ => {
                for (key, child) in map {
                    if key == keys::TYPE_KEY {
                        continue;
                    }
                    self.walk(child, errors);
                }
            }
        }
    }
}

/// The ZID a type expression names directly, when it is a bare ZID leaf or a
/// reference.
pub fn declared_zid(declared: &ZObject) -> Option<&str> {
    match declared {
        ZObject::String(s) if keys::is_zid(s) => Some(s.as_str()),
        _ => declared.reference_id(),
    }
}

/// The element type of a `Z881` instantiation expression, if `declared` is
/// one.
pub fn typed_list_element(declared: &ZObject) -> Option<&ZObject> {
    let called = declared
        .get(keys::KEY_CALL_FUNCTION)
        .and_then(|f| f.reference_id().or_else(|| f.as_str()))?;
    if called != keys::Z_TYPED_LIST {
        return None;
    }
    declared.get(keys::KEY_LIST_ELEMENT_TYPE)
}

/// True when return-type validation is skipped entirely: the declared type
/// is the universal `Z1` or the untyped-list escape `Z881(Z1)`.
pub fn is_unvalidated_return(declared: &ZObject) -> bool {
    if declared_zid(declared) == Some(keys::Z_OBJECT) {
        return true;
    }
    matches!(
        typed_list_element(declared).and_then(declared_zid),
        Some(keys::Z_OBJECT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn z(json: serde_json::Value) -> ZObject {
        ZObject::from_json(&json).unwrap()
    }

    #[test]
    fn string_schema_accepts_bare_and_boxed() {
        let v = SchemaValidator::new();
        assert!(v
            .check_by_zid(&z(json!("hello")), "Z6", ErrorKind::ArgumentTypeMismatch)
            .is_ok());
        assert!(v
            .check_by_zid(
                &ZObject::string_box("hello"),
                "Z6",
                ErrorKind::ArgumentTypeMismatch
            )
            .is_ok());
        assert!(v
            .check_by_zid(
                &ZObject::boolean(true),
                "Z6",
                ErrorKind::ArgumentTypeMismatch
            )
            .is_err());
    }

    #[test]
    fn unknown_zids_pass() {
        let v = SchemaValidator::new();
        assert!(v
            .check_by_zid(
                &ZObject::string_box("x"),
                "Z12345",
                ErrorKind::ArgumentTypeMismatch
            )
            .is_ok());
    }

    #[test]
    fn apparent_type_catches_hollow_boxes() {
        let v = SchemaValidator::new();
        let hollow = z(json!({"Z1K1": "Z9"}));
        assert!(v.check_apparent(&hollow, ErrorKind::NotWellformed).is_err());
    }

    #[test]
    fn declared_list_checks_elements() {
        let v = SchemaValidator::new();
        let declared = zobject::list::typed_list_type(ZObject::reference(keys::Z_STRING));
        let good = zobject::list::to_typed_list(
            vec![ZObject::string_box("a")],
            ZObject::reference(keys::Z_STRING),
        );
        let bad = zobject::list::to_typed_list(
            vec![ZObject::boolean(true)],
            ZObject::reference(keys::Z_STRING),
        );
        assert!(v
            .check_declared(&good, &declared, ErrorKind::ReturnTypeMismatch)
            .is_ok());
        assert!(v
            .check_declared(&bad, &declared, ErrorKind::ReturnTypeMismatch)
            .is_err());
    }

    #[test]
    fn untyped_escapes() {
        assert!(is_unvalidated_return(&ZObject::reference(keys::Z_OBJECT)));
        assert!(is_unvalidated_return(&zobject::list::typed_list_type(
            ZObject::reference(keys::Z_OBJECT)
        )));
        assert!(!is_unvalidated_return(&ZObject::reference(keys::Z_STRING)));
    }

    #[test]
    fn tree_validation_skips_call_inputs_and_quotes() {
        let v = SchemaValidator::new();
        // The call input is missing its Z9K1 but sits in argument position.
        let call = z(json!({
            "Z1K1": "Z7",
            "Z7K1": {"Z1K1": "Z9", "Z9K1": "Z802"},
            "Z802K1": {"Z1K1": "Z9"}
        }));
        assert!(v.validate_tree(&call).is_ok());

        let quoted = ZObject::quote(z(json!({"Z1K1": "Z9"})));
        assert!(v.validate_tree(&quoted).is_ok());

        let naked = z(json!({"Z1K1": "Z9"}));
        assert!(v.validate_tree(&naked).is_err());
    }

    #[test]
    fn tree_validation_aggregates_flat() {
        let v = SchemaValidator::new();
        let two_bad = z(json!({
            "Z1K1": "Z40",
            "Z40K1": {"Z1K1": "Z9"}
        }));
        // Outer Z40 is fine, inner Z9 is hollow; a second hollow node nests
        // below a list to exercise flattening.
        let err = v.validate_tree(&two_bad).unwrap_err();
        assert!(!err.flatten().is_empty());
    }
}
