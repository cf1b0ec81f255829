//! # Model Resolver
//!
//! Lookup of the externally-owned objects items stand for
//! (products, services, ...), keyed by class and id.

use std::collections::HashMap;

use serde_json::Value;

/// Resolves `(class, id)` to an external object.
pub trait ModelResolver: Send + Sync {
    /// Returns the object, or `None` if it does not exist.
    fn resolve(&self, class: &str, id: &str) -> Option<Value>;
}

/// Resolver backed by an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    models: HashMap<(String, String), Value>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: impl Into<String>, id: impl Into<String>, model: Value) {
        self.models.insert((class.into(), id.into()), model);
    }
}

impl ModelResolver for MemoryResolver {
    fn resolve(&self, class: &str, id: &str) -> Option<Value> {
        self.models
            .get(&(class.to_string(), id.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_by_class_and_id() {
        let mut resolver = MemoryResolver::new();
        resolver.insert("product", "42", json!({"name": "Mug"}));

        assert_eq!(resolver.resolve("product", "42"), Some(json!({"name": "Mug"})));
        assert_eq!(resolver.resolve("service", "42"), None);
        assert_eq!(resolver.resolve("product", "43"), None);
    }
}
