// Function-call execution
//
// Executing a call: resolve the call target to a function, pick one of its
// implementations, open a child frame, bind the arguments unevaluated, then
// dispatch. Eager arguments fan out concurrently; the first error wins but
// siblings run to completion. The result is validated against the declared
// return type before it leaves the call.

use crate::implementation::Implementation;
use crate::resolve::Engine;
use crate::scope::{Frame, ScopeRef};
use crate::validation;
use crate::wrapper::{WrapperChild, ZWrapper};
use async_recursion::async_recursion;
use futures::future::join_all;
use std::rc::Rc;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::keys;
use zobject::list;
use zobject::value::{ZMap, ZObject};

/// One argument declaration read out of a function's `Z8K1` list.
#[derive(Debug, Clone)]
struct ArgumentDecl {
    name: String,
    declared_type: Option<ZObject>,
}

fn read_declarations(function: &ZObject) -> RuntimeResult<Vec<ArgumentDecl>> {
    let list = function
        .get(keys::KEY_FUNCTION_ARGUMENTS)
        .and_then(list::list_items)
        .ok_or_else(|| {
            ZError::new(
                ErrorKind::MalformedInput,
                "function carries no argument declaration list",
            )
        })?;
    let mut decls = Vec::with_capacity(list.len());
    for item in list {
        let name = item
            .get(keys::KEY_ARGUMENT_NAME)
            .and_then(ZObject::unbox_string)
            .ok_or_else(|| {
                ZError::new(
                    ErrorKind::MalformedInput,
                    "argument declaration without a key name",
                )
            })?;
        decls.push(ArgumentDecl {
            name: name.to_string(),
            declared_type: item.get(keys::KEY_ARGUMENT_TYPE).cloned(),
        });
    }
    Ok(decls)
}

// Numeric position of a key name ("Z802K2" and "K2" both order as 2).
fn key_position(name: &str) -> u64 {
    name.rfind('K')
        .and_then(|idx| name[idx + 1..].parse().ok())
        .unwrap_or(u64::MAX)
}

impl Engine {
    /// Eagerly resolves one argument slot's payload, then checks the value
    /// against the declared type and against its own apparent type.
    pub(crate) async fn evaluate_argument(
        &self,
        payload: WrapperChild,
        declared_type: Option<ZObject>,
    ) -> RuntimeResult<WrapperChild> {
        let resolved = self.resolve_child(payload, false, true).await?;
        if self.invariants().config.validate {
            let flat = resolved.flatten();
            self.validator()
                .check_apparent(&flat, ErrorKind::ArgumentTypeMismatch)?;
            if let Some(declared) = &declared_type {
                self.validator()
                    .check_declared(&flat, declared, ErrorKind::ArgumentTypeMismatch)?;
                let scope = resolved.scope().cloned().unwrap_or_else(Frame::root);
                self.run_type_validator(&flat, declared, &scope, ErrorKind::ArgumentTypeMismatch)
                    .await?;
            }
        }
        Ok(resolved)
    }

    /// Executes one function-call node to a (not yet re-resolved) result.
    #[async_recursion(?Send)]
    pub(crate) async fn execute_call(&self, call: WrapperChild) -> RuntimeResult<WrapperChild> {
        self.invariants().check_budget()?;
        let mut call = call;
        let WrapperChild::Node(node) = &mut call else {
            return Err(ZError::new(
                ErrorKind::Internal,
                "call target must be a structured node",
            ));
        };
        let caller_scope = node.scope().clone();

        let function_child = self
            .resolve_key(node, keys::KEY_CALL_FUNCTION, false)
            .await?;
        let function = function_child.flatten();
        if function.type_zid() != Some(keys::Z_FUNCTION) {
            return Err(ZError::new(
                ErrorKind::MalformedInput,
                "call target did not resolve to a function",
            )
            .with_payload(function));
        }

        let chosen = self.select_implementation(&function).await?;
        self.invariants()
            .record_selection(&chosen.id(), chosen.kind());
        log::debug!("dispatching {} implementation", chosen.kind());

        // A function that travelled through an argument slot keeps its
        // defining scope; splice the caller's chain on top of it so both
        // sets of bindings stay reachable.
        let base_scope = match function_child.scope() {
            Some(closure) if !Rc::ptr_eq(closure, &caller_scope) => {
                Frame::merged_copy(closure, &caller_scope)
            }
            _ => caller_scope.clone(),
        };
        let frame = Frame::child(&base_scope);

        let decls = read_declarations(&function)?;
        for (position, decl) in decls.iter().enumerate() {
            let local = format!("K{}", position + 1);
            let payload = node
                .current(&decl.name)
                .or_else(|| node.current(&local))
                .cloned();
            if let Some(payload) = payload {
                frame.bind(&decl.name, payload, decl.declared_type.clone());
            }
        }

        let result = self.dispatch(&chosen, &decls, &function, &frame).await?;
        let result = if chosen.returns_lazy(&self.invariants().registry) {
            self.resolve_child(result, false, true).await?
        } else {
            result
        };

        let return_type = function
            .get(keys::KEY_FUNCTION_RETURN_TYPE)
            .cloned()
            .unwrap_or_else(|| ZObject::reference(keys::Z_OBJECT));
        if self.invariants().config.validate && !validation::is_unvalidated_return(&return_type) {
            let flat = result.flatten();
            self.validator()
                .check_declared(&flat, &return_type, ErrorKind::ReturnTypeMismatch)?;
            self.run_type_validator(&flat, &return_type, &frame, ErrorKind::ReturnTypeMismatch)
                .await?;
        }
        Ok(result)
    }

    async fn select_implementation(&self, function: &ZObject) -> RuntimeResult<Implementation> {
        let declared = function
            .get(keys::KEY_FUNCTION_IMPLEMENTATIONS)
            .and_then(list::list_items)
            .unwrap_or_default();
        let mut candidates = Vec::with_capacity(declared.len());
        for item in declared {
            // Implementations may be stored out-of-line, as may the code
            // slots inside them.
            let item = match item.reference_id() {
                Some(zid) => self.dereference(zid).await?,
                None => item.clone(),
            };
            let item = self.inline_code_slots(&item).await?;
            candidates.push(Implementation::from_zobject(&item)?);
        }
        if candidates.is_empty() {
            return Err(ZError::new(
                ErrorKind::NoImplementations,
                "function declares no implementations",
            ));
        }
        let idx = self
            .invariants()
            .selector
            .select(&candidates)
            .min(candidates.len() - 1);
        Ok(candidates.swap_remove(idx))
    }

    // The code slot and the language/source keys inside it may each be a
    // reference to a stored object; variant parsing needs them inline.
    async fn inline_code_slots(&self, implementation: &ZObject) -> RuntimeResult<ZObject> {
        let Some(code) = implementation.get(keys::KEY_IMPL_CODE) else {
            return Ok(implementation.clone());
        };
        let mut code = match code.reference_id() {
            Some(zid) => {
                let zid = zid.to_string();
                self.dereference(&zid).await?
            }
            None => code.clone(),
        };
        if let ZObject::Object(map) = &mut code {
            for key in [keys::KEY_CODE_LANGUAGE, keys::KEY_CODE_SOURCE] {
                let target = map
                    .get(key)
                    .and_then(ZObject::reference_id)
                    .map(str::to_string);
                if let Some(zid) = target {
                    map.insert(key.to_string(), self.dereference(&zid).await?);
                }
            }
        }
        let mut out = implementation.clone();
        if let ZObject::Object(map) = &mut out {
            map.insert(keys::KEY_IMPL_CODE.to_string(), code);
        }
        Ok(out)
    }

    async fn dispatch(
        &self,
        chosen: &Implementation,
        decls: &[ArgumentDecl],
        function: &ZObject,
        frame: &ScopeRef,
    ) -> RuntimeResult<WrapperChild> {
        match chosen {
            Implementation::Builtin { id } => {
                let entry = self.invariants().registry.get(id).cloned().ok_or_else(|| {
                    ZError::new(
                        ErrorKind::BuiltinNotFound,
                        format!("no builtin registered under {}", id),
                    )
                })?;
                let mut names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
                names.sort_by_key(|n| key_position(n));
                let demands = names.iter().map(|name| {
                    let lazily = entry.lazy_args.iter().any(|l| l == name);
                    frame.retrieve(name, lazily, self)
                });
                let mut args = Vec::with_capacity(names.len());
                for outcome in join_all(demands).await {
                    args.push(outcome?.flatten());
                }
                self.invariants().count_builtin_call();
                let result = (entry.func)(&args)?;
                Ok(ZWrapper::wrap(&result, frame))
            }
            Implementation::Composition { body } => {
                let wrapped = ZWrapper::wrap(body, frame);
                self.resolve_child(wrapped, false, true).await
            }
            Implementation::Evaluated { language, .. } => {
                let evaluator = self
                    .invariants()
                    .evaluators
                    .iter()
                    .find(|e| e.supports_language(language))
                    .cloned()
                    .ok_or_else(|| {
                        ZError::new(
                            ErrorKind::EvaluatorFailure,
                            format!("no evaluator registered for {}", language),
                        )
                    })?;
                let demands = decls
                    .iter()
                    .map(|decl| frame.retrieve(&decl.name, false, self));
                let mut wire = ZMap::new();
                wire.insert(
                    keys::TYPE_KEY.to_string(),
                    ZObject::String(keys::Z_FUNCTION_CALL.to_string()),
                );
                wire.insert(keys::KEY_CALL_FUNCTION.to_string(), function.clone());
                for (decl, outcome) in decls.iter().zip(join_all(demands).await) {
                    wire.insert(decl.name.clone(), outcome?.flatten());
                }
                self.invariants().check_budget()?;
                self.invariants().count_remote_call();
                let envelope = evaluator
                    .evaluate(&ZObject::Object(wire), self.invariants().remaining())
                    .await?;
                let value = envelope.into_result()?;
                if self.invariants().config.validate {
                    self.validator()
                        .check_apparent(&value, ErrorKind::MalformedResult)?;
                }
                Ok(ZWrapper::wrap(&value, frame))
            }
        }
    }

    /// Runs a type's own validator function over a freshly produced value.
    /// Only inline descriptors carrying a validator slot are consulted;
    /// value and type travel quoted so the validator sees them unevaluated.
    /// Failures surface under `kind`, which names the position the value
    /// sits in (argument, return, input tree).
    async fn run_type_validator(
        &self,
        value: &ZObject,
        declared: &ZObject,
        scope: &ScopeRef,
        kind: ErrorKind,
    ) -> RuntimeResult<()> {
        if declared.type_zid() != Some(keys::Z_TYPE) {
            return Ok(());
        }
        let Some(validator) = declared.get(keys::KEY_TYPE_VALIDATOR) else {
            return Ok(());
        };
        if validator.is_unit() {
            return Ok(());
        }
        let mut map = ZMap::new();
        map.insert(
            keys::TYPE_KEY.to_string(),
            ZObject::String(keys::Z_FUNCTION_CALL.to_string()),
        );
        map.insert(keys::KEY_CALL_FUNCTION.to_string(), validator.clone());
        map.insert("K1".to_string(), ZObject::quote(value.clone()));
        map.insert("K2".to_string(), ZObject::quote(declared.clone()));
        let call = ZWrapper::wrap(&ZObject::Object(map), scope);
        let verdict = self
            .resolve_child(call, false, true)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::BuiltinNotFound => e,
                _ => ZError::new(
                    kind.clone(),
                    format!("type validator rejected the value: {}", e),
                )
                .with_payload(value.clone()),
            })?;
        match verdict.flatten().unbox_boolean() {
            Some(true) => Ok(()),
            _ => Err(
                ZError::new(kind, "type validator did not answer true")
                    .with_payload(value.clone()),
            ),
        }
    }

    /// Semantic pass over an input tree: a node whose type key is an inline
    /// descriptor runs that descriptor's validator function. ZID-named
    /// types stay the shape schemas' concern. The walk mirrors structural
    /// tree validation: quoted payloads are opaque, call inputs wait for
    /// execution, and errors aggregate flat.
    pub(crate) async fn validate_semantics(
        &self,
        value: &ZObject,
        scope: &ScopeRef,
    ) -> RuntimeResult<()> {
        let mut errors = Vec::new();
        self.semantic_walk(value, scope, &mut errors).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ZError::multiple(
                errors.into_iter().flat_map(ZError::flatten).collect(),
            ))
        }
    }

    #[async_recursion(?Send)]
    async fn semantic_walk(&self, value: &ZObject, scope: &ScopeRef, errors: &mut Vec<ZError>) {
        let map = match value {
            ZObject::String(_) => return,
            ZObject::Object(map) => map,
        };
        if let Some(descriptor) = value.type_key() {
            if descriptor.type_zid() == Some(keys::Z_TYPE) {
                if let Err(e) = self
                    .run_type_validator(value, descriptor, scope, ErrorKind::NotWellformed)
                    .await
                {
                    errors.push(e);
                }
            }
        }
        match value.type_zid() {
            Some(keys::Z_QUOTE) => {}
            Some(keys::Z_FUNCTION_CALL) => {
                if let Some(function) = map.get(keys::KEY_CALL_FUNCTION) {
                    self.semantic_walk(function, scope, errors).await;
                }
            }
            _ => {
                for (key, child) in map {
                    if key == keys::TYPE_KEY {
                        continue;
                    }
                    self.semantic_walk(child, scope, errors).await;
                }
            }
        }
    }
}
