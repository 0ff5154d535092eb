// The resolution engine
//
// Resolution is a rewrite loop over one wrapper node. Each pass applies the
// first matching rule (argument substitution, dereferencing, call execution,
// generic-type instantiation) and loops on the rewritten node; a node no rule
// matches is in normal form. The loop is step-bounded so an object that
// rewrites into itself surfaces as an error instead of spinning.

use crate::invariants::Invariants;
use crate::validation::SchemaValidator;
use crate::wrapper::{WrapperChild, ZWrapper};
use async_recursion::async_recursion;
use std::rc::Rc;
use std::time::Duration;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::keys;
use zobject::value::ZObject;

// Terminal builtin values are left as symbolic references unless a caller
// explicitly forces dereferencing.
const EXEMPT_ZIDS: [&str; 4] = [keys::Z_TRUE, keys::Z_FALSE, keys::Z_NOTHING, keys::Z_UNIT];

/// One engine per orchestration request. Holds the request invariants and
/// the compiled-schema cache; all state interior, all futures `!Send`.
pub struct Engine {
    invariants: Rc<Invariants>,
    validator: SchemaValidator,
}

impl Engine {
    pub fn new(invariants: Rc<Invariants>) -> Self {
        Engine {
            invariants,
            validator: SchemaValidator::new(),
        }
    }

    pub fn invariants(&self) -> &Invariants {
        &self.invariants
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// How long a task may wait on a sibling's in-flight slot evaluation.
    /// Never longer than the remaining request budget.
    pub fn slot_wait_cap(&self) -> Duration {
        let cap = self.invariants.config.slot_wait_cap;
        match self.invariants.remaining() {
            Some(left) => cap.min(left),
            None => cap,
        }
    }

    /// Fetches one stored definition through the resolver, counting the
    /// batch and honouring the time budget.
    pub async fn dereference(&self, zid: &str) -> RuntimeResult<ZObject> {
        self.invariants.check_budget()?;
        self.invariants.count_resolver_batch();
        log::debug!("dereferencing {}", zid);
        let mut batch = self.invariants.resolver.dereference(&[zid.to_string()]).await?;
        let envelope = batch.remove(zid).ok_or_else(|| {
            ZError::new(
                ErrorKind::ReferenceNotFound,
                format!("resolver answered without {}", zid),
            )
        })?;
        envelope.into_result()
    }

    /// Fully resolves a node to normal form, executing calls on the way.
    pub async fn resolve(&self, child: WrapperChild) -> RuntimeResult<WrapperChild> {
        self.resolve_child(child, false, true).await
    }

    /// The rewrite loop. `force_deref` also dereferences the terminal
    /// builtin constants; `evaluate` false stops in front of function calls.
    #[async_recursion(?Send)]
    pub async fn resolve_child(
        &self,
        child: WrapperChild,
        force_deref: bool,
        evaluate: bool,
    ) -> RuntimeResult<WrapperChild> {
        let mut current = child;
        let mut steps = 0u32;
        loop {
            steps += 1;
            if steps > self.invariants.config.max_rewrite_steps {
                return Err(ZError::new(
                    ErrorKind::EvaluationCycle,
                    format!(
                        "no normal form after {} rewrite steps",
                        self.invariants.config.max_rewrite_steps
                    ),
                )
                .with_payload(current.flatten()));
            }

            let Some(node) = current.as_node() else {
                return Ok(current);
            };

            if node.is_argument_reference() {
                let name = node.argument_ref_name().ok_or_else(|| {
                    ZError::new(
                        ErrorKind::MalformedInput,
                        "argument reference without a key name",
                    )
                })?;
                let scope = node.scope().clone();
                current = scope.retrieve(&name, false, self).await?;
                continue;
            }

            if let Some(zid) = node.own_reference_id() {
                if !force_deref && EXEMPT_ZIDS.contains(&zid) {
                    return Ok(current);
                }
                let zid = zid.to_string();
                let scope = node.scope().clone();
                let definition = self.dereference(&zid).await?;
                if self.invariants.config.validate {
                    definition.check_wellformed()?;
                }
                current = ZWrapper::wrap(&definition, &scope);
                continue;
            }

            if node.is_function_call() {
                if !evaluate {
                    return Ok(current);
                }
                current = self.execute_call(current).await?;
                continue;
            }

            if node.is_generic_instance() {
                let type_child = node.current(keys::TYPE_KEY).cloned().ok_or_else(|| {
                    ZError::new(ErrorKind::Internal, "generic instance lost its type key")
                })?;
                let resolved = self.resolve_child(type_child, true, true).await?;
                let is_type = resolved
                    .as_node()
                    .map(|n| n.type_zid() == Some(keys::Z_TYPE))
                    .unwrap_or(false);
                if !is_type {
                    return Err(ZError::new(
                        ErrorKind::GenericTypeFailure,
                        "type expression did not resolve to a type",
                    )
                    .with_payload(resolved.flatten()));
                }
                // The instantiated descriptor memoizes ephemerally: the
                // flattened result keeps the symbolic type expression.
                if let Some(node) = current.as_node_mut() {
                    node.set_ephemeral(keys::TYPE_KEY, resolved)?;
                }
                return Ok(current);
            }

            return Ok(current);
        }
    }

    /// Resolves one member of a node, storing the result as an overlay:
    /// durable overlays survive flattening, ephemeral ones only memoize.
    pub async fn resolve_key(
        &self,
        node: &mut ZWrapper,
        key: &str,
        durable: bool,
    ) -> RuntimeResult<WrapperChild> {
        let child = node.current(key).cloned().ok_or_else(|| {
            ZError::new(ErrorKind::InvalidKey, format!("no member {}", key))
        })?;
        let resolved = self.resolve_child(child, false, true).await?;
        if durable {
            node.set_durable(key, resolved.clone())?;
        } else {
            node.set_ephemeral(key, resolved.clone())?;
        }
        Ok(resolved)
    }

    /// Resolves a member path, one key per level, memoizing every level as
    /// an overlay on its enclosing node. The empty path answers the node
    /// itself; an error at any depth stops the descent there. With
    /// `resolve_internals` each freshly resolved member is checked against
    /// the shape schemas: the member on its own, and the enclosing node as
    /// seen with the new overlay in place.
    #[async_recursion(?Send)]
    pub async fn resolve_key_path(
        &self,
        node: &mut ZWrapper,
        path: &[&str],
        durable: bool,
        resolve_internals: bool,
    ) -> RuntimeResult<WrapperChild> {
        let Some((key, rest)) = path.split_first() else {
            return Ok(WrapperChild::Node(Box::new(node.clone())));
        };
        let resolved = self.resolve_key(node, key, durable).await?;
        if resolve_internals {
            self.validator
                .check_apparent(&resolved.flatten(), ErrorKind::NotWellformed)?;
            self.validator
                .check_apparent(&node.flatten_ephemeral(), ErrorKind::NotWellformed)?;
        }
        if rest.is_empty() {
            return Ok(resolved);
        }
        let overlay = if durable {
            node.get_durable_mut(key)
        } else {
            node.get_ephemeral_mut(key)
        };
        match overlay {
            Some(WrapperChild::Node(inner)) => {
                self.resolve_key_path(inner, rest, durable, resolve_internals)
                    .await
            }
            Some(WrapperChild::Leaf(_)) | None => Err(ZError::new(
                ErrorKind::InvalidKey,
                format!("cannot descend below {}", key),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticReferenceResolver;
    use crate::scope::Frame;
    use serde_json::json;

    fn engine_with(resolver: StaticReferenceResolver) -> Engine {
        Engine::new(Rc::new(Invariants::new(Rc::new(resolver))))
    }

    fn wrap(json: serde_json::Value) -> WrapperChild {
        let z = ZObject::from_json(&json).unwrap();
        ZWrapper::wrap(&z, &Frame::root())
    }

    #[tokio::test]
    async fn normal_forms_are_fixed_points() {
        let engine = engine_with(StaticReferenceResolver::new());
        let value = wrap(json!({"Z1K1": "Z6", "Z6K1": "hello"}));
        let resolved = engine.resolve(value.clone()).await.unwrap();
        assert_eq!(resolved.flatten(), value.flatten());
        let again = engine.resolve(resolved.clone()).await.unwrap();
        assert_eq!(again.flatten(), resolved.flatten());
    }

    #[tokio::test]
    async fn references_dereference_transitively() {
        let resolver = StaticReferenceResolver::new()
            .with("Z1001", ZObject::reference("Z1002"))
            .with("Z1002", ZObject::string_box("deep"));
        let engine = engine_with(resolver);
        let resolved = engine
            .resolve(wrap(json!({"Z1K1": "Z9", "Z9K1": "Z1001"})))
            .await
            .unwrap();
        assert_eq!(resolved.flatten(), ZObject::string_box("deep"));
    }

    #[tokio::test]
    async fn terminal_constants_stay_symbolic() {
        let engine = engine_with(StaticReferenceResolver::new());
        let resolved = engine
            .resolve(wrap(json!({"Z1K1": "Z9", "Z9K1": "Z41"})))
            .await
            .unwrap();
        assert_eq!(resolved.flatten(), ZObject::reference("Z41"));
    }

    #[tokio::test]
    async fn missing_reference_is_an_error() {
        let engine = engine_with(StaticReferenceResolver::new());
        let err = engine
            .resolve(wrap(json!({"Z1K1": "Z9", "Z9K1": "Z9999"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ReferenceNotFound);
    }

    #[tokio::test]
    async fn self_reference_trips_the_step_bound() {
        let resolver = StaticReferenceResolver::new().with("Z1003", ZObject::reference("Z1003"));
        let engine = engine_with(resolver);
        let err = engine
            .resolve(wrap(json!({"Z1K1": "Z9", "Z9K1": "Z1003"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EvaluationCycle);
    }

    #[tokio::test]
    async fn resolve_key_overlays() {
        let resolver = StaticReferenceResolver::new().with("Z1004", ZObject::string_box("v"));
        let engine = engine_with(resolver);
        let child = wrap(json!({
            "Z1K1": "Z99",
            "Z99K1": {"Z1K1": "Z9", "Z9K1": "Z1004"}
        }));
        let mut node = match child {
            WrapperChild::Node(n) => *n,
            WrapperChild::Leaf(_) => unreachable!(),
        };
        engine
            .resolve_key(&mut node, keys::KEY_QUOTE_VALUE, false)
            .await
            .unwrap();
        // Ephemeral resolution stays invisible in the durable flatten.
        assert_eq!(
            node.flatten().get(keys::KEY_QUOTE_VALUE),
            Some(&ZObject::reference("Z1004"))
        );
        assert_eq!(
            node.flatten_ephemeral().get(keys::KEY_QUOTE_VALUE),
            Some(&ZObject::string_box("v"))
        );

        engine
            .resolve_key(&mut node, keys::KEY_QUOTE_VALUE, true)
            .await
            .unwrap();
        assert_eq!(
            node.flatten().get(keys::KEY_QUOTE_VALUE),
            Some(&ZObject::string_box("v"))
        );
    }

    #[tokio::test]
    async fn key_paths_descend_through_members() {
        let resolver = StaticReferenceResolver::new().with("Z1004", ZObject::string_box("v"));
        let engine = engine_with(resolver);
        let child = wrap(json!({
            "Z1K1": "Z99",
            "Z99K1": {
                "Z1K1": "Z99",
                "Z99K1": {"Z1K1": "Z9", "Z9K1": "Z1004"}
            }
        }));
        let original = child.flatten();
        let mut node = match child {
            WrapperChild::Node(n) => *n,
            WrapperChild::Leaf(_) => unreachable!(),
        };

        let whole = engine
            .resolve_key_path(&mut node, &[], false, false)
            .await
            .unwrap();
        assert_eq!(whole.flatten(), original);

        let deep = engine
            .resolve_key_path(
                &mut node,
                &[keys::KEY_QUOTE_VALUE, keys::KEY_QUOTE_VALUE],
                false,
                false,
            )
            .await
            .unwrap();
        assert_eq!(deep.flatten(), ZObject::string_box("v"));
        // Ephemeral resolution stays invisible at every depth.
        assert_eq!(node.flatten(), original);
    }

    #[tokio::test]
    async fn key_paths_stop_at_the_failing_depth() {
        let engine = engine_with(StaticReferenceResolver::new());
        let child = wrap(json!({
            "Z1K1": "Z99",
            "Z99K1": {"Z1K1": "Z9", "Z9K1": "Z9999"}
        }));
        let mut node = match child {
            WrapperChild::Node(n) => *n,
            WrapperChild::Leaf(_) => unreachable!(),
        };
        let err = engine
            .resolve_key_path(
                &mut node,
                &[keys::KEY_QUOTE_VALUE, keys::KEY_REFERENCE_ID],
                false,
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ReferenceNotFound);

        let err = engine
            .resolve_key_path(&mut node, &["Z99K2"], false, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidKey);
    }

    #[tokio::test]
    async fn internals_mode_checks_the_parent_shape() {
        // Z6K1 resolves to a boolean; the string box around it is no longer
        // shaped like a string box.
        let ill_typed = json!({
            "Z1K1": "Z6",
            "Z6K1": {"Z1K1": "Z9", "Z9K1": "Z1005"}
        });
        let resolver = StaticReferenceResolver::new().with("Z1005", ZObject::boolean(true));
        let engine = engine_with(resolver);
        let mut node = match wrap(ill_typed.clone()) {
            WrapperChild::Node(n) => *n,
            WrapperChild::Leaf(_) => unreachable!(),
        };
        let err = engine
            .resolve_key_path(&mut node, &[keys::KEY_STRING_VALUE], false, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotWellformed);

        // Without the internals check the member resolves freely.
        let mut node = match wrap(ill_typed) {
            WrapperChild::Node(n) => *n,
            WrapperChild::Leaf(_) => unreachable!(),
        };
        assert!(engine
            .resolve_key_path(&mut node, &[keys::KEY_STRING_VALUE], false, false)
            .await
            .is_ok());
    }
}
