//! Document Model.
//!
//! The store's document is a `serde_json::Value` built with the
//! `preserve_order` feature, which already gives us the tagged
//! null/bool/number/string/array/ordered-map sum type spec.md §9 asks for,
//! plus `Clone` (deep clone) and structural `PartialEq` (deep equality) for
//! free. This module only adds the handful of helpers the rest of the
//! engine needs on top of that.

use serde_json::Value;

/// A freshly opened store always starts from an empty object root.
pub fn empty_root() -> Value {
    Value::Object(serde_json::Map::new())
}

/// The root of a document must be an object (spec.md §3).
pub fn is_valid_root(value: &Value) -> bool {
    value.is_object()
}

/// Deep structural equality. `serde_json::Value`'s `PartialEq` already walks
/// the full tree; this function exists so call sites read like the spec
/// ("deep_equal(x, y)") rather than a bare `==`.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    a == b
}

/// Iterate the elements of a collection that lives at an array or an
/// object, yielding `(locator, element)` pairs where the locator is either
/// the array index (as a string) or the object key.
pub fn iter_collection(collection: &Value) -> Box<dyn Iterator<Item = (String, &Value)> + '_> {
    match collection {
        Value::Array(items) => Box::new(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v)),
        ),
        Value::Object(map) => Box::new(map.iter().map(|(k, v)| (k.clone(), v))),
        _ => Box::new(std::iter::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_root_is_object() {
        assert!(is_valid_root(&empty_root()));
    }

    #[test]
    fn deep_equal_ignores_key_insertion_order_identity_but_not_value() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"x": 1, "y": 2});
        let c = json!({"x": 1, "y": 3});
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &c));
    }

    #[test]
    fn iter_collection_array_locators_are_indices() {
        let arr = json!(["a", "b", "c"]);
        let locators: Vec<_> = iter_collection(&arr).map(|(l, _)| l).collect();
        assert_eq!(locators, vec!["0", "1", "2"]);
    }

    #[test]
    fn iter_collection_object_locators_are_keys_in_insertion_order() {
        let obj = json!({"b": 1, "a": 2});
        let locators: Vec<_> = iter_collection(&obj).map(|(l, _)| l).collect();
        assert_eq!(locators, vec!["b", "a"]);
    }
}
