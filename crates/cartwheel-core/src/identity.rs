//! # Identity Module
//!
//! Content-addressed identity for cart entities.
//!
//! ## How a Hash Is Built
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  identity-relevant attributes (JSON)                                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  canonicalize()   - object keys recursively sorted                      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  SHA-256 over the compact JSON encoding                                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  "<kind>_<hex digest>"   e.g. item_3f1c...                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The kind prefix keeps an item and an action with coincidentally equal
//! identity attributes from sharing a hash.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::container::EntityKind;

/// Returns a copy of `value` with every object's keys in sorted order.
///
/// Two maps that differ only in insertion order canonicalize to the same
/// value and therefore to the same encoding.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Computes the content hash of an entity from its identity attributes.
///
/// ## Example
/// ```rust
/// use cartwheel_core::container::EntityKind;
/// use cartwheel_core::identity::content_hash;
/// use serde_json::json;
///
/// let a = content_hash(EntityKind::Tax, &json!({"id": "VAT"}));
/// let b = content_hash(EntityKind::Tax, &json!({"id": "VAT"}));
/// assert_eq!(a, b);
/// assert!(a.starts_with("tax_"));
/// ```
pub fn content_hash(kind: EntityKind, identity: &Value) -> String {
    let canonical = canonicalize(identity);

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{}_{:x}", kind.prefix(), hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_hash() {
        let mut first = Map::new();
        first.insert("size".to_string(), json!("L"));
        first.insert("color".to_string(), json!({"name": "red", "code": "#f00"}));

        let mut second = Map::new();
        second.insert("color".to_string(), json!({"code": "#f00", "name": "red"}));
        second.insert("size".to_string(), json!("L"));

        assert_eq!(
            content_hash(EntityKind::Item, &Value::Object(first)),
            content_hash(EntityKind::Item, &Value::Object(second))
        );
    }

    #[test]
    fn test_kind_prefix_separates_entities() {
        let identity = json!({"id": "X"});
        let as_action = content_hash(EntityKind::Action, &identity);
        let as_tax = content_hash(EntityKind::Tax, &identity);

        assert!(as_action.starts_with("action_"));
        assert!(as_tax.starts_with("tax_"));
        assert_ne!(as_action, as_tax);
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = content_hash(EntityKind::Item, &json!({"tags": ["a", "b"]}));
        let b = content_hash(EntityKind::Item, &json!({"tags": ["b", "a"]}));
        assert_ne!(a, b);
    }
}
