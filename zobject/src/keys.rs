// ZID and key syntax for the ZObject model

use lazy_static::lazy_static;
use regex::Regex;

/// The distinguished type key carried by every structured value.
pub const TYPE_KEY: &str = "Z1K1";

// Engine-known ZIDs. The engine never hardcodes key strings outside this
// module and the builtin registry.
pub const Z_OBJECT: &str = "Z1";
pub const Z_KEY_DECL: &str = "Z3";
pub const Z_TYPE: &str = "Z4";
pub const Z_ERROR: &str = "Z5";
pub const Z_STRING: &str = "Z6";
pub const Z_FUNCTION_CALL: &str = "Z7";
pub const Z_FUNCTION: &str = "Z8";
pub const Z_REFERENCE: &str = "Z9";
pub const Z_IMPLEMENTATION: &str = "Z14";
pub const Z_CODE: &str = "Z16";
pub const Z_ARGUMENT_DECL: &str = "Z17";
pub const Z_ARGUMENT_REF: &str = "Z18";
pub const Z_ENVELOPE: &str = "Z22";
pub const Z_NOTHING: &str = "Z23";
pub const Z_UNIT: &str = "Z24";
pub const Z_KEY_REF: &str = "Z39";
pub const Z_BOOLEAN: &str = "Z40";
pub const Z_TRUE: &str = "Z41";
pub const Z_FALSE: &str = "Z42";
pub const Z_LANGUAGE: &str = "Z61";
pub const Z_QUOTE: &str = "Z99";
pub const Z_TYPED_LIST: &str = "Z881";

pub const KEY_KEY_TYPE: &str = "Z3K1";
pub const KEY_KEY_ID: &str = "Z3K2";
pub const KEY_TYPE_IDENTITY: &str = "Z4K1";
pub const KEY_TYPE_KEYS: &str = "Z4K2";
pub const KEY_TYPE_VALIDATOR: &str = "Z4K3";
pub const KEY_ERROR_TYPE: &str = "Z5K1";
pub const KEY_ERROR_VALUE: &str = "Z5K2";
pub const KEY_STRING_VALUE: &str = "Z6K1";
pub const KEY_CALL_FUNCTION: &str = "Z7K1";
pub const KEY_FUNCTION_ARGUMENTS: &str = "Z8K1";
pub const KEY_FUNCTION_RETURN_TYPE: &str = "Z8K2";
pub const KEY_FUNCTION_IMPLEMENTATIONS: &str = "Z8K4";
pub const KEY_REFERENCE_ID: &str = "Z9K1";
pub const KEY_IMPL_COMPOSITION: &str = "Z14K2";
pub const KEY_IMPL_CODE: &str = "Z14K3";
pub const KEY_IMPL_BUILTIN: &str = "Z14K4";
pub const KEY_CODE_LANGUAGE: &str = "Z16K1";
pub const KEY_CODE_SOURCE: &str = "Z16K2";
pub const KEY_ARGUMENT_TYPE: &str = "Z17K1";
pub const KEY_ARGUMENT_NAME: &str = "Z17K2";
pub const KEY_ARGUMENT_REF_NAME: &str = "Z18K1";
pub const KEY_ENVELOPE_VALUE: &str = "Z22K1";
pub const KEY_ENVELOPE_METADATA: &str = "Z22K2";
pub const KEY_BOOLEAN_IDENTITY: &str = "Z40K1";
pub const KEY_LANGUAGE_NAME: &str = "Z61K1";
pub const KEY_QUOTE_VALUE: &str = "Z99K1";
pub const KEY_LIST_ELEMENT_TYPE: &str = "Z881K1";

pub const KEY_LIST_HEAD: &str = "K1";
pub const KEY_LIST_TAIL: &str = "K2";

lazy_static! {
    static ref ZID_RE: Regex = Regex::new(r"^Z[1-9]\d*$").unwrap();
    static ref GLOBAL_KEY_RE: Regex = Regex::new(r"^Z[1-9]\d*K[1-9]\d*$").unwrap();
    static ref LOCAL_KEY_RE: Regex = Regex::new(r"^K[1-9]\d*$").unwrap();
}

/// True if `s` names a stored object (e.g. "Z802").
pub fn is_zid(s: &str) -> bool {
    ZID_RE.is_match(s)
}

/// True if `s` is a globally namespaced key (e.g. "Z802K1").
pub fn is_global_key(s: &str) -> bool {
    GLOBAL_KEY_RE.is_match(s)
}

/// True if `s` is a locally namespaced key (e.g. "K1").
pub fn is_local_key(s: &str) -> bool {
    LOCAL_KEY_RE.is_match(s)
}

/// True if `s` is acceptable as a member key on a structured value.
pub fn is_key(s: &str) -> bool {
    is_global_key(s) || is_local_key(s)
}

/// The ZID a global key belongs to ("Z802K1" -> "Z802").
pub fn key_owner(key: &str) -> Option<&str> {
    if !is_global_key(key) {
        return None;
    }
    key.rfind('K').map(|idx| &key[..idx])
}
