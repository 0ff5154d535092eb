// Scoped wrapper nodes
//
// A ZWrapper shadows a plain structured value with two resolution overlays:
// the durable overlay is visible when the node is flattened back to a plain
// value, the ephemeral overlay only memoizes resolution work for internal
// reuse. Overlay entries may only exist for keys present in the original
// mapping. Every node carries a non-owning reference to the lexical scope it
// is evaluable in.

use crate::scope::ScopeRef;
use indexmap::IndexMap;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::keys;
use zobject::value::{ZMap, ZObject};

/// A wrapped child: primitive strings pass through unwrapped.
#[derive(Debug, Clone)]
pub enum WrapperChild {
    Leaf(String),
    Node(Box<ZWrapper>),
}

impl WrapperChild {
    pub fn as_node(&self) -> Option<&ZWrapper> {
        match self {
            WrapperChild::Leaf(_) => None,
            WrapperChild::Node(node) => Some(node),
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut ZWrapper> {
        match self {
            WrapperChild::Leaf(_) => None,
            WrapperChild::Node(node) => Some(node),
        }
    }

    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            WrapperChild::Leaf(s) => Some(s.as_str()),
            WrapperChild::Node(_) => None,
        }
    }

    /// Plain-value view honouring durable overlays only.
    pub fn flatten(&self) -> ZObject {
        match self {
            WrapperChild::Leaf(s) => ZObject::String(s.clone()),
            WrapperChild::Node(node) => node.flatten(),
        }
    }

    /// Debug view reading ephemeral overlays first.
    pub fn flatten_ephemeral(&self) -> ZObject {
        match self {
            WrapperChild::Leaf(s) => ZObject::String(s.clone()),
            WrapperChild::Node(node) => node.flatten_ephemeral(),
        }
    }

    pub fn scope(&self) -> Option<&ScopeRef> {
        self.as_node().map(ZWrapper::scope)
    }
}

/// A structured value decorated with resolution overlays and a lexical scope.
#[derive(Debug, Clone)]
pub struct ZWrapper {
    original: IndexMap<String, WrapperChild>,
    durable: IndexMap<String, WrapperChild>,
    ephemeral: IndexMap<String, WrapperChild>,
    scope: ScopeRef,
}

impl ZWrapper {
    /// Recursively wraps a plain value together with a scope. Strings are
    /// never wrapped; the scope is mandatory because every non-leaf must be
    /// evaluable in a lexical context.
    pub fn wrap(value: &ZObject, scope: &ScopeRef) -> WrapperChild {
        match value {
            ZObject::String(s) => WrapperChild::Leaf(s.clone()),
            ZObject::Object(map) => {
                let mut original = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    original.insert(key.clone(), Self::wrap(child, scope));
                }
                WrapperChild::Node(Box::new(ZWrapper {
                    original,
                    durable: IndexMap::new(),
                    ephemeral: IndexMap::new(),
                    scope: scope.clone(),
                }))
            }
        }
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    /// Redirects this node (and only this node) to a different scope. Used
    /// after `deep_copy` when a clone must diverge from the original's
    /// lexical context.
    pub fn set_scope(&mut self, scope: ScopeRef) {
        self.scope = scope;
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.original.keys().map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.original.contains_key(key)
    }

    pub fn original(&self, key: &str) -> Option<&WrapperChild> {
        self.original.get(key)
    }

    pub fn get_durable(&self, key: &str) -> Option<&WrapperChild> {
        self.durable.get(key)
    }

    pub fn get_ephemeral(&self, key: &str) -> Option<&WrapperChild> {
        self.ephemeral.get(key)
    }

    pub fn get_durable_mut(&mut self, key: &str) -> Option<&mut WrapperChild> {
        self.durable.get_mut(key)
    }

    pub fn get_ephemeral_mut(&mut self, key: &str) -> Option<&mut WrapperChild> {
        self.ephemeral.get_mut(key)
    }

    pub fn set_durable(&mut self, key: &str, value: WrapperChild) -> RuntimeResult<()> {
        if !self.original.contains_key(key) {
            return Err(ZError::new(
                ErrorKind::InvalidKey,
                format!("cannot set durable overlay for unknown key {}", key),
            ));
        }
        self.durable.insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_ephemeral(&mut self, key: &str, value: WrapperChild) -> RuntimeResult<()> {
        if !self.original.contains_key(key) {
            return Err(ZError::new(
                ErrorKind::InvalidKey,
                format!("cannot set ephemeral overlay for unknown key {}", key),
            ));
        }
        self.ephemeral.insert(key.to_string(), value);
        Ok(())
    }

    /// The working view of a key: ephemeral overlay, then durable, then the
    /// original child. Pattern predicates and the engine read through this.
    pub fn current(&self, key: &str) -> Option<&WrapperChild> {
        self.ephemeral
            .get(key)
            .or_else(|| self.durable.get(key))
            .or_else(|| self.original.get(key))
    }

    /// Flattens to a plain value: durable overlay wins over the original,
    /// ephemeral overlays stay invisible.
    pub fn flatten(&self) -> ZObject {
        let mut out = ZMap::with_capacity(self.original.len());
        for key in self.original.keys() {
            let child = self.durable.get(key).unwrap_or(&self.original[key]);
            out.insert(key.clone(), child.flatten());
        }
        ZObject::Object(out)
    }

    /// Debug/trace view: ephemeral wins over durable wins over original.
    pub fn flatten_ephemeral(&self) -> ZObject {
        let mut out = ZMap::with_capacity(self.original.len());
        for key in self.original.keys() {
            let child = self
                .ephemeral
                .get(key)
                .or_else(|| self.durable.get(key))
                .unwrap_or(&self.original[key]);
            out.insert(key.clone(), child.flatten_ephemeral());
        }
        ZObject::Object(out)
    }

    /// Deep-clones the node and all children, preserving overlays. The clone
    /// shares the scope reference until `set_scope` diverges it; two branches
    /// of evaluation must never resolve keys on the same logical node.
    pub fn deep_copy(&self) -> ZWrapper {
        self.clone()
    }

    // --- pattern predicates, evaluated on the current view ---

    /// The ZID this node's type key points at, reading through overlays.
    pub fn type_zid(&self) -> Option<&str> {
        match self.current(keys::TYPE_KEY)? {
            WrapperChild::Leaf(s) if keys::is_zid(s) => Some(s.as_str()),
            WrapperChild::Node(node) => node.own_reference_id(),
            WrapperChild::Leaf(_) => None,
        }
    }

    /// The target ZID when this node is a reference.
    pub fn own_reference_id(&self) -> Option<&str> {
        let is_ref = matches!(
            self.current(keys::TYPE_KEY)?,
            WrapperChild::Leaf(s) if s.as_str() == keys::Z_REFERENCE
        );
        if !is_ref {
            return None;
        }
        self.current(keys::KEY_REFERENCE_ID)?
            .as_leaf()
            .filter(|s| keys::is_zid(s))
    }

    pub fn is_reference(&self) -> bool {
        self.own_reference_id().is_some()
    }

    pub fn is_argument_reference(&self) -> bool {
        self.type_zid() == Some(keys::Z_ARGUMENT_REF)
            && self.current(keys::KEY_ARGUMENT_REF_NAME).is_some()
    }

    pub fn is_function_call(&self) -> bool {
        self.type_zid() == Some(keys::Z_FUNCTION_CALL)
            && self.current(keys::KEY_CALL_FUNCTION).is_some()
    }

    /// A function call in type position: the type key is itself a non-leaf
    /// (a call, or something resolvable to one) and every other key is
    /// locally namespaced.
    pub fn is_generic_instance(&self) -> bool {
        let type_is_call = match self.current(keys::TYPE_KEY) {
            Some(WrapperChild::Node(node)) => {
                node.is_function_call() || node.is_argument_reference()
            }
            _ => false,
        };
        if !type_is_call {
            return false;
        }
        self.original
            .keys()
            .all(|k| k == keys::TYPE_KEY || keys::is_local_key(k))
    }

    /// The argument name this node refers to, when it is an argument
    /// reference. Accepts a bare key leaf or a boxed string.
    pub fn argument_ref_name(&self) -> Option<String> {
        if self.type_zid() != Some(keys::Z_ARGUMENT_REF) {
            return None;
        }
        match self.current(keys::KEY_ARGUMENT_REF_NAME)? {
            WrapperChild::Leaf(s) => Some(s.clone()),
            WrapperChild::Node(node) => node
                .current(keys::KEY_STRING_VALUE)
                .and_then(WrapperChild::as_leaf)
                .map(str::to_string),
        }
    }
}
