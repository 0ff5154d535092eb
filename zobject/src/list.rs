// Typed-list helpers
//
// Lists are cons chains: the type key is the generic instantiation
// `Z881(T)`, `K1` is the head and `K2` the tail. The empty list carries
// only its type key.

use crate::keys;
use crate::value::{ZMap, ZObject};

/// The generic-instantiation type `{Z1K1: Z7, Z7K1: Z881, Z881K1: element}`.
pub fn typed_list_type(element_type: ZObject) -> ZObject {
    let mut map = ZMap::new();
    map.insert(
        keys::TYPE_KEY.to_string(),
        ZObject::String(keys::Z_FUNCTION_CALL.to_string()),
    );
    map.insert(
        keys::KEY_CALL_FUNCTION.to_string(),
        ZObject::reference(keys::Z_TYPED_LIST),
    );
    map.insert(keys::KEY_LIST_ELEMENT_TYPE.to_string(), element_type);
    ZObject::Object(map)
}

/// Builds a cons chain out of `items`.
pub fn to_typed_list(items: Vec<ZObject>, element_type: ZObject) -> ZObject {
    let list_type = typed_list_type(element_type);
    let mut out = {
        let mut map = ZMap::new();
        map.insert(keys::TYPE_KEY.to_string(), list_type.clone());
        ZObject::Object(map)
    };
    for item in items.into_iter().rev() {
        let mut map = ZMap::new();
        map.insert(keys::TYPE_KEY.to_string(), list_type.clone());
        map.insert(keys::KEY_LIST_HEAD.to_string(), item);
        map.insert(keys::KEY_LIST_TAIL.to_string(), out);
        out = ZObject::Object(map);
    }
    out
}

/// True if the value's type key looks like a `Z881` instantiation.
pub fn is_typed_list(value: &ZObject) -> bool {
    match value.type_key() {
        Some(type_key) => {
            let called = type_key
                .get(keys::KEY_CALL_FUNCTION)
                .and_then(|f| f.reference_id().or_else(|| f.as_str()));
            called == Some(keys::Z_TYPED_LIST)
        }
        None => false,
    }
}

/// The declared element type of a typed list, if any.
pub fn element_type(value: &ZObject) -> Option<&ZObject> {
    value.type_key()?.get(keys::KEY_LIST_ELEMENT_TYPE)
}

/// Walks a cons chain into a vector of item references. `None` when the
/// value is not list-shaped; a missing head ends the chain.
pub fn list_items(value: &ZObject) -> Option<Vec<&ZObject>> {
    if !is_typed_list(value) {
        return None;
    }
    let mut items = Vec::new();
    let mut current = value;
    loop {
        match current.get(keys::KEY_LIST_HEAD) {
            Some(head) => items.push(head),
            None => break,
        }
        match current.get(keys::KEY_LIST_TAIL) {
            Some(tail) => current = tail,
            None => break,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let items = vec![ZObject::string_box("a"), ZObject::string_box("b")];
        let list = to_typed_list(items.clone(), ZObject::reference(keys::Z_STRING));
        assert!(is_typed_list(&list));
        let back: Vec<ZObject> = list_items(&list).unwrap().into_iter().cloned().collect();
        assert_eq!(back, items);
    }

    #[test]
    fn empty_list() {
        let list = to_typed_list(Vec::new(), ZObject::reference(keys::Z_OBJECT));
        assert!(is_typed_list(&list));
        assert_eq!(list_items(&list).unwrap().len(), 0);
        assert_eq!(
            element_type(&list).and_then(|t| t.reference_id()),
            Some(keys::Z_OBJECT)
        );
    }

    #[test]
    fn non_lists_answer_none() {
        assert_eq!(list_items(&ZObject::string_box("x")), None);
        assert_eq!(list_items(&ZObject::String("x".into())), None);
    }
}
