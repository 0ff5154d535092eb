// Error handling for the orchestrator runtime

use crate::keys;
use crate::value::{ZMap, ZObject};
use std::fmt;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, ZError>;

/// Error taxonomy. Every kind maps to a stable error-type ZID so errors stay
/// pattern-matchable after serialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("malformed input")]
    MalformedInput,

    #[error("invalid key")]
    InvalidKey,

    #[error("value is not well-formed")]
    NotWellformed,

    #[error("no argument in scope")]
    ArgumentNotFound,

    #[error("argument type mismatch")]
    ArgumentTypeMismatch,

    #[error("return type mismatch")]
    ReturnTypeMismatch,

    #[error("reference not found")]
    ReferenceNotFound,

    #[error("builtin not found")]
    BuiltinNotFound,

    #[error("malformed result")]
    MalformedResult,

    #[error("external evaluator failure")]
    EvaluatorFailure,

    #[error("time budget exceeded")]
    TimeBudgetExceeded,

    #[error("no implementations available")]
    NoImplementations,

    #[error("generic type resolution failure")]
    GenericTypeFailure,

    #[error("evaluation cycle")]
    EvaluationCycle,

    #[error("multiple errors")]
    MultipleErrors,

    #[error("internal error")]
    Internal,
}

impl ErrorKind {
    /// Stable error-type ZID for serialized errors.
    pub fn error_type_zid(&self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "Z500",
            ErrorKind::InvalidKey => "Z501",
            ErrorKind::NotWellformed => "Z502",
            ErrorKind::ArgumentNotFound => "Z503",
            ErrorKind::ReferenceNotFound => "Z504",
            ErrorKind::ArgumentTypeMismatch => "Z506",
            ErrorKind::EvaluatorFailure => "Z507",
            ErrorKind::BuiltinNotFound => "Z508",
            ErrorKind::MultipleErrors => "Z509",
            ErrorKind::MalformedResult => "Z510",
            ErrorKind::NoImplementations => "Z511",
            ErrorKind::GenericTypeFailure => "Z512",
            ErrorKind::TimeBudgetExceeded => "Z513",
            ErrorKind::EvaluationCycle => "Z514",
            ErrorKind::ReturnTypeMismatch => "Z518",
            ErrorKind::Internal => "Z599",
        }
    }

    /// The inverse mapping, for serialized errors coming back over the wire.
    pub fn from_error_type_zid(zid: &str) -> Option<ErrorKind> {
        let kind = match zid {
            "Z500" => ErrorKind::MalformedInput,
            "Z501" => ErrorKind::InvalidKey,
            "Z502" => ErrorKind::NotWellformed,
            "Z503" => ErrorKind::ArgumentNotFound,
            "Z504" => ErrorKind::ReferenceNotFound,
            "Z506" => ErrorKind::ArgumentTypeMismatch,
            "Z507" => ErrorKind::EvaluatorFailure,
            "Z508" => ErrorKind::BuiltinNotFound,
            "Z509" => ErrorKind::MultipleErrors,
            "Z510" => ErrorKind::MalformedResult,
            "Z511" => ErrorKind::NoImplementations,
            "Z512" => ErrorKind::GenericTypeFailure,
            "Z513" => ErrorKind::TimeBudgetExceeded,
            "Z514" => ErrorKind::EvaluationCycle,
            "Z518" => ErrorKind::ReturnTypeMismatch,
            "Z599" => ErrorKind::Internal,
            _ => return None,
        };
        Some(kind)
    }
}

/// A structured runtime error: a kind, a human-readable message, an optional
/// structured payload, and, for `MultipleErrors`, the collected causes.
#[derive(Debug, Clone, PartialEq)]
pub struct ZError {
    kind: ErrorKind,
    message: String,
    payload: Option<ZObject>,
    causes: Vec<ZError>,
}

impl ZError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ZError {
            kind,
            message: message.into(),
            payload: None,
            causes: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: ZObject) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Wraps a non-empty list of errors; a single error passes through
    /// unchanged instead of nesting.
    pub fn multiple(mut errors: Vec<ZError>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        ZError {
            kind: ErrorKind::MultipleErrors,
            message: format!("{} errors", errors.len()),
            payload: None,
            causes: errors,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> Option<&ZObject> {
        self.payload.as_ref()
    }

    pub fn causes(&self) -> &[ZError] {
        &self.causes
    }

    /// Flattens `MultipleErrors` containers into their constituent errors.
    pub fn flatten(self) -> Vec<ZError> {
        if self.kind == ErrorKind::MultipleErrors {
            self.causes.into_iter().flat_map(ZError::flatten).collect()
        } else {
            vec![self]
        }
    }

    /// Renders the error as a `Z5` structured value.
    pub fn to_zobject(&self) -> ZObject {
        let mut map = ZMap::new();
        map.insert(
            keys::TYPE_KEY.to_string(),
            ZObject::String(keys::Z_ERROR.to_string()),
        );
        map.insert(
            keys::KEY_ERROR_TYPE.to_string(),
            ZObject::reference(self.kind.error_type_zid()),
        );
        let value = match &self.payload {
            Some(payload) => payload.clone(),
            None if !self.causes.is_empty() => {
                let items = self.causes.iter().map(ZError::to_zobject).collect();
                crate::list::to_typed_list(items, ZObject::reference(keys::Z_ERROR))
            }
            None => ZObject::string_box(&self.message),
        };
        map.insert(keys::KEY_ERROR_VALUE.to_string(), value);
        ZObject::Object(map)
    }
}

impl fmt::Display for ZError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ZError {}

impl From<serde_json::Error> for ZError {
    fn from(e: serde_json::Error) -> Self {
        ZError::new(ErrorKind::MalformedInput, format!("JSON error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_does_not_nest() {
        let e = ZError::new(ErrorKind::InvalidKey, "bad");
        let wrapped = ZError::multiple(vec![e.clone()]);
        assert_eq!(wrapped, e);
    }

    #[test]
    fn flatten_is_recursive() {
        let a = ZError::new(ErrorKind::InvalidKey, "a");
        let b = ZError::new(ErrorKind::ReferenceNotFound, "b");
        let c = ZError::new(ErrorKind::Internal, "c");
        let nested = ZError::multiple(vec![ZError::multiple(vec![a.clone(), b.clone()]), c.clone()]);
        assert_eq!(nested.flatten(), vec![a, b, c]);
    }

    #[test]
    fn error_type_zids_map_both_ways() {
        assert_eq!(
            ErrorKind::from_error_type_zid("Z504"),
            Some(ErrorKind::ReferenceNotFound)
        );
        assert_eq!(
            ErrorKind::from_error_type_zid(ErrorKind::MalformedResult.error_type_zid()),
            Some(ErrorKind::MalformedResult)
        );
        assert_eq!(ErrorKind::from_error_type_zid("Z1"), None);
    }

    #[test]
    fn serialized_error_is_a_z5() {
        let e = ZError::new(ErrorKind::ReferenceNotFound, "Z999 not found");
        let z = e.to_zobject();
        assert_eq!(z.type_zid(), Some(keys::Z_ERROR));
        assert_eq!(
            z.get(keys::KEY_ERROR_TYPE).and_then(|t| t.reference_id()),
            Some("Z504")
        );
    }
}
