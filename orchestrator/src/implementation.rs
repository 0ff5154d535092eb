// Implementation variants and selection
//
// A function's candidate implementations form a closed sum: an in-process
// builtin, a composition of further calls, or delegation to an external
// evaluator. Exhaustive matches keep dispatch total; there is no open
// registry of implementation kinds.

use crate::builtins::BuiltinRegistry;
use rand::Rng;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::keys;
use zobject::value::ZObject;

/// One candidate implementation, extracted from a resolved `Z14`.
#[derive(Debug, Clone, PartialEq)]
pub enum Implementation {
    /// Native in-process function, keyed by identifier in the registry.
    Builtin { id: String },
    /// The body is itself a function-call expression; execution re-enters
    /// the resolution engine on it.
    Composition { body: ZObject },
    /// Delegation to an external evaluator, keyed by programming language.
    Evaluated { language: String, code: String },
}

impl Implementation {
    /// Reads a resolved `Z14` into a variant. Exactly one of the builtin /
    /// composition / code keys must be present and usable.
    pub fn from_zobject(z: &ZObject) -> RuntimeResult<Implementation> {
        if let Some(id) = z.get(keys::KEY_IMPL_BUILTIN).and_then(ZObject::unbox_string) {
            return Ok(Implementation::Builtin { id: id.to_string() });
        }
        if let Some(body) = z.get(keys::KEY_IMPL_COMPOSITION) {
            return Ok(Implementation::Composition { body: body.clone() });
        }
        if let Some(code) = z.get(keys::KEY_IMPL_CODE) {
            let language = code
                .get(keys::KEY_CODE_LANGUAGE)
                .and_then(|l| {
                    l.unbox_string()
                        .or_else(|| l.get(keys::KEY_LANGUAGE_NAME).and_then(ZObject::unbox_string))
                })
                .ok_or_else(|| {
                    ZError::new(
                        ErrorKind::MalformedInput,
                        "code implementation has no programming language",
                    )
                })?;
            let source = code
                .get(keys::KEY_CODE_SOURCE)
                .and_then(ZObject::unbox_string)
                .ok_or_else(|| {
                    ZError::new(ErrorKind::MalformedInput, "code implementation has no source")
                })?;
            return Ok(Implementation::Evaluated {
                language: language.to_string(),
                code: source.to_string(),
            });
        }
        Err(ZError::new(
            ErrorKind::MalformedInput,
            "implementation is neither builtin, composition nor code",
        ))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Implementation::Builtin { .. } => "builtin",
            Implementation::Composition { .. } => "composition",
            Implementation::Evaluated { .. } => "evaluated",
        }
    }

    /// A stable identifier for metadata: the builtin id, the language, or
    /// the kind name for compositions.
    pub fn id(&self) -> String {
        match self {
            Implementation::Builtin { id } => id.clone(),
            Implementation::Composition { .. } => "composition".to_string(),
            Implementation::Evaluated { language, .. } => language.clone(),
        }
    }

    /// Argument names this implementation wants left unevaluated. Only
    /// builtins declare laziness, via the registry.
    pub fn lazy_args<'a>(&self, registry: &'a BuiltinRegistry) -> &'a [String] {
        match self {
            Implementation::Builtin { id } => registry.lazy_args(id),
            Implementation::Composition { .. } | Implementation::Evaluated { .. } => &[],
        }
    }

    /// Whether the dispatch result is a lazily-wrapped value the engine must
    /// resolve in the current frame.
    pub fn returns_lazy(&self, registry: &BuiltinRegistry) -> bool {
        match self {
            Implementation::Builtin { id } => registry.returns_lazy(id),
            Implementation::Composition { .. } | Implementation::Evaluated { .. } => false,
        }
    }
}

/// Selection policy over a non-empty candidate list.
pub trait ImplementationSelector {
    /// Answers an index into `candidates`. Callers guarantee the slice is
    /// non-empty; out-of-range answers are clamped.
    fn select(&self, candidates: &[Implementation]) -> usize;
}

/// Default policy: any builtin wins; otherwise choose uniformly at random.
/// The randomness is a placeholder heuristic, kept behind the selector trait.
#[derive(Debug, Default)]
pub struct PreferBuiltinSelector;

impl ImplementationSelector for PreferBuiltinSelector {
    fn select(&self, candidates: &[Implementation]) -> usize {
        if let Some(idx) = candidates
            .iter()
            .position(|c| matches!(c, Implementation::Builtin { .. }))
        {
            return idx;
        }
        rand::thread_rng().gen_range(0..candidates.len())
    }
}

/// Deterministic policy for reproducible runs: always the first candidate.
#[derive(Debug, Default)]
pub struct FirstSelector;

impl ImplementationSelector for FirstSelector {
    fn select(&self, _candidates: &[Implementation]) -> usize {
        0
    }
}

/// Deterministic policy used by multi-implementation tests: always the n-th
/// candidate, clamped to the list.
#[derive(Debug)]
pub struct NthSelector(pub usize);

impl ImplementationSelector for NthSelector {
    fn select(&self, candidates: &[Implementation]) -> usize {
        self.0.min(candidates.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builtin_impl() -> Implementation {
        Implementation::Builtin {
            id: "Z901".to_string(),
        }
    }

    fn composition_impl() -> Implementation {
        Implementation::Composition {
            body: ZObject::unit(),
        }
    }

    #[test]
    fn parses_builtin() {
        let z = ZObject::from_json(&json!({
            "Z1K1": "Z14",
            "Z14K4": {"Z1K1": "Z6", "Z6K1": "Z902"}
        }))
        .unwrap();
        assert_eq!(
            Implementation::from_zobject(&z).unwrap(),
            Implementation::Builtin {
                id: "Z902".to_string()
            }
        );
    }

    #[test]
    fn parses_code() {
        let z = ZObject::from_json(&json!({
            "Z1K1": "Z14",
            "Z14K3": {
                "Z1K1": "Z16",
                "Z16K1": {"Z1K1": "Z61", "Z61K1": "javascript"},
                "Z16K2": {"Z1K1": "Z6", "Z6K1": "function main() {}"}
            }
        }))
        .unwrap();
        let parsed = Implementation::from_zobject(&z).unwrap();
        assert_eq!(parsed.kind(), "evaluated");
        assert_eq!(parsed.id(), "javascript");
    }

    #[test]
    fn empty_implementation_is_malformed() {
        let z = ZObject::from_json(&json!({"Z1K1": "Z14"})).unwrap();
        assert!(Implementation::from_zobject(&z).is_err());
    }

    #[test]
    fn prefer_builtin_wins_over_position() {
        let candidates = vec![composition_impl(), builtin_impl()];
        assert_eq!(PreferBuiltinSelector.select(&candidates), 1);
    }

    #[test]
    fn nth_selector_clamps() {
        let candidates = vec![composition_impl()];
        assert_eq!(NthSelector(5).select(&candidates), 0);
    }
}
