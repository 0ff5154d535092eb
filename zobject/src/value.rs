// The ZObject value type
// A structured value is a string leaf or an ordered map from keys to values.

use crate::error::{ErrorKind, ZError};
use crate::keys;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;

/// Ordered key-to-value mapping backing a structured value.
pub type ZMap = IndexMap<String, ZObject>;

/// A self-describing structured value. Leaves are plain strings; every
/// non-leaf carries a `Z1K1` type key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZObject {
    String(String),
    Object(ZMap),
}

impl ZObject {
    /// A reference to a stored definition: `{Z1K1: Z9, Z9K1: zid}`.
    pub fn reference(zid: &str) -> Self {
        let mut map = ZMap::new();
        map.insert(keys::TYPE_KEY.to_string(), ZObject::String(keys::Z_REFERENCE.to_string()));
        map.insert(keys::KEY_REFERENCE_ID.to_string(), ZObject::String(zid.to_string()));
        ZObject::Object(map)
    }

    /// A boxed string: `{Z1K1: Z6, Z6K1: s}`.
    pub fn string_box(s: &str) -> Self {
        let mut map = ZMap::new();
        map.insert(keys::TYPE_KEY.to_string(), ZObject::String(keys::Z_STRING.to_string()));
        map.insert(keys::KEY_STRING_VALUE.to_string(), ZObject::String(s.to_string()));
        ZObject::Object(map)
    }

    /// A boolean value: `{Z1K1: Z40, Z40K1: Z41|Z42}`.
    pub fn boolean(b: bool) -> Self {
        let id = if b { keys::Z_TRUE } else { keys::Z_FALSE };
        let mut map = ZMap::new();
        map.insert(keys::TYPE_KEY.to_string(), ZObject::String(keys::Z_BOOLEAN.to_string()));
        map.insert(keys::KEY_BOOLEAN_IDENTITY.to_string(), ZObject::reference(id));
        ZObject::Object(map)
    }

    /// The canonical "absent" sentinel, a reference to the unit object.
    pub fn unit() -> Self {
        ZObject::reference(keys::Z_UNIT)
    }

    /// A quoted payload, opaque to evaluation: `{Z1K1: Z99, Z99K1: inner}`.
    pub fn quote(inner: ZObject) -> Self {
        let mut map = ZMap::new();
        map.insert(keys::TYPE_KEY.to_string(), ZObject::String(keys::Z_QUOTE.to_string()));
        map.insert(keys::KEY_QUOTE_VALUE.to_string(), inner);
        ZObject::Object(map)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ZObject::String(s) => Some(s.as_str()),
            ZObject::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ZMap> {
        match self {
            ZObject::String(_) => None,
            ZObject::Object(map) => Some(map),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ZObject> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// The raw `Z1K1` entry, if this is a non-leaf.
    pub fn type_key(&self) -> Option<&ZObject> {
        self.get(keys::TYPE_KEY)
    }

    /// The ZID this value's type key points at, when the type key is a bare
    /// ZID string or an explicit reference. Inline `Z4`s and generic
    /// instantiations answer `None`.
    pub fn type_zid(&self) -> Option<&str> {
        match self.type_key()? {
            ZObject::String(s) if keys::is_zid(s) => Some(s.as_str()),
            other => other.reference_id(),
        }
    }

    /// The target ZID when this value is a reference.
    pub fn reference_id(&self) -> Option<&str> {
        if self.type_zid_shallow() != Some(keys::Z_REFERENCE) {
            return None;
        }
        self.get(keys::KEY_REFERENCE_ID)?.as_str().filter(|s| keys::is_zid(s))
    }

    // type_zid without recursing through reference_id; Z9's own Z1K1 is
    // always a bare string so this terminates.
    fn type_zid_shallow(&self) -> Option<&str> {
        match self.type_key()? {
            ZObject::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Unboxes `{Z1K1: Z6, Z6K1: s}`; plain string leaves unbox to themselves.
    pub fn unbox_string(&self) -> Option<&str> {
        match self {
            ZObject::String(s) => Some(s),
            ZObject::Object(_) => {
                if self.type_zid() == Some(keys::Z_STRING) {
                    self.get(keys::KEY_STRING_VALUE)?.as_str()
                } else {
                    None
                }
            }
        }
    }

    /// Reads a `Z40` back into a Rust bool.
    pub fn unbox_boolean(&self) -> Option<bool> {
        if self.type_zid() != Some(keys::Z_BOOLEAN) {
            return None;
        }
        let identity = self.get(keys::KEY_BOOLEAN_IDENTITY)?;
        match identity.reference_id().or_else(|| identity.as_str()) {
            Some(keys::Z_TRUE) => Some(true),
            Some(keys::Z_FALSE) => Some(false),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        match self {
            ZObject::String(s) => s == keys::Z_UNIT,
            ZObject::Object(_) => self.reference_id() == Some(keys::Z_UNIT),
        }
    }

    /// Checks the well-formedness invariant: every non-leaf has a type key
    /// and all other keys follow the global/local key syntax.
    pub fn check_wellformed(&self) -> Result<(), ZError> {
        match self {
            ZObject::String(_) => Ok(()),
            ZObject::Object(map) => {
                if !map.contains_key(keys::TYPE_KEY) {
                    return Err(ZError::new(
                        ErrorKind::NotWellformed,
                        format!("missing type key {}", keys::TYPE_KEY),
                    ));
                }
                for (key, child) in map {
                    if key != keys::TYPE_KEY && !keys::is_key(key) {
                        return Err(ZError::new(
                            ErrorKind::InvalidKey,
                            format!("invalid key name: {}", key),
                        ));
                    }
                    child.check_wellformed()?;
                }
                Ok(())
            }
        }
    }

    /// Converts parsed JSON into a structured value. Arrays and non-string
    /// scalars are malformed input: the object model has no other leaves.
    pub fn from_json(json: &JsonValue) -> Result<Self, ZError> {
        match json {
            JsonValue::String(s) => Ok(ZObject::String(s.clone())),
            JsonValue::Object(map) => {
                let mut out = ZMap::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), ZObject::from_json(value)?);
                }
                Ok(ZObject::Object(out))
            }
            other => Err(ZError::new(
                ErrorKind::MalformedInput,
                format!("expected string or object, got: {}", other),
            )),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            ZObject::String(s) => JsonValue::String(s.clone()),
            ZObject::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json());
                }
                JsonValue::Object(out)
            }
        }
    }
}

impl serde::Serialize for ZObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ZObject::String(s) => serializer.serialize_str(s),
            ZObject::Object(map) => {
                use serde::ser::SerializeMap;
                let mut state = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    state.serialize_entry(key, value)?;
                }
                state.end()
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for ZObject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        ZObject::from_json(&json).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ZObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for ZObject {
    fn from(s: &str) -> Self {
        ZObject::String(s.to_string())
    }
}
