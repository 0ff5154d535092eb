// Result envelopes
//
// Every resolution or execution step answers with an envelope: a value or a
// structured error, plus a side-channel metadata map that never affects the
// value itself.

use crate::error::{ErrorKind, ZError};
use crate::keys;
use crate::value::{ZMap, ZObject};
use serde_json::json;
use std::collections::BTreeMap;

/// Value-or-error plus diagnostic metadata. A final envelope never carries
/// both a value and an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    value: Option<ZObject>,
    error: Option<ZError>,
    metadata: BTreeMap<String, String>,
}

impl Envelope {
    pub fn value(value: ZObject) -> Self {
        Envelope {
            value: Some(value),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn error(error: ZError) -> Self {
        Envelope {
            value: None,
            error: Some(error),
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn value_ref(&self) -> Option<&ZObject> {
        self.value.as_ref()
    }

    pub fn error_ref(&self) -> Option<&ZError> {
        self.error.as_ref()
    }

    pub fn into_value(self) -> Option<ZObject> {
        self.value
    }

    pub fn into_error(self) -> Option<ZError> {
        self.error
    }

    /// Splits the envelope into its value-or-error result, dropping metadata.
    /// An envelope filling both slots, or neither, is classified as a
    /// malformed result rather than surfaced as a success or a plain error.
    pub fn into_result(self) -> Result<ZObject, ZError> {
        match (self.value, self.error) {
            (Some(v), None) => Ok(v),
            (None, Some(e)) => Err(e),
            (Some(_), Some(_)) => Err(ZError::new(
                ErrorKind::MalformedResult,
                "result envelope carries both a value and an error",
            )),
            (None, None) => Err(ZError::new(
                ErrorKind::MalformedResult,
                "result envelope carries neither a value nor an error",
            )),
        }
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Best effort: recording metadata never fails the request.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn merge_metadata(&mut self, other: &BTreeMap<String, String>) {
        for (k, v) in other {
            self.metadata.insert(k.clone(), v.clone());
        }
    }

    /// Renders the result pair as a `Z22`. Absent slots render as the unit
    /// sentinel; metadata stays out-of-band (see `to_json_full`).
    pub fn to_zobject(&self) -> ZObject {
        let mut map = ZMap::new();
        map.insert(
            keys::TYPE_KEY.to_string(),
            ZObject::String(keys::Z_ENVELOPE.to_string()),
        );
        map.insert(
            keys::KEY_ENVELOPE_VALUE.to_string(),
            self.value.clone().unwrap_or_else(ZObject::unit),
        );
        map.insert(
            keys::KEY_ENVELOPE_METADATA.to_string(),
            match &self.error {
                Some(e) => e.to_zobject(),
                None => ZObject::unit(),
            },
        );
        ZObject::Object(map)
    }

    /// The full wire representation: the `Z22` plus the metadata map.
    pub fn to_json_full(&self) -> serde_json::Value {
        json!({
            "envelope": self.to_zobject().to_json(),
            "metadata": self.metadata,
        })
    }

    /// Reads a `Z22` back into an envelope. Unit slots read as absent; a `Z5`
    /// in the error slot maps back onto the kind taxonomy through its
    /// error-type ZID, so errors stay pattern-matchable after a wire round
    /// trip.
    pub fn from_zobject(z: &ZObject) -> Option<Self> {
        if z.type_zid() != Some(keys::Z_ENVELOPE) {
            return None;
        }
        let value = z
            .get(keys::KEY_ENVELOPE_VALUE)
            .filter(|v| !v.is_unit())
            .cloned();
        let error = z
            .get(keys::KEY_ENVELOPE_METADATA)
            .filter(|v| !v.is_unit())
            .map(|e| {
                let kind = e
                    .get(keys::KEY_ERROR_TYPE)
                    .and_then(|t| t.reference_id().or_else(|| t.as_str()))
                    .and_then(ErrorKind::from_error_type_zid)
                    .unwrap_or(ErrorKind::EvaluatorFailure);
                let message = e
                    .get(keys::KEY_ERROR_VALUE)
                    .and_then(ZObject::unbox_string)
                    .unwrap_or("remote error")
                    .to_string();
                ZError::new(kind, message).with_payload(e.clone())
            });
        Some(Envelope {
            value,
            error,
            metadata: BTreeMap::new(),
        })
    }
}
