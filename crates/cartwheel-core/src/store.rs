//! # Store
//!
//! Key-value persistence contract for carts.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cartwheel.<cart>.items        Container<Item>  (with item actions)     │
//! │  cartwheel.<cart>.actions      Container<Action> (cart-scoped)          │
//! │  cartwheel.<cart>.taxes        Container<Tax>                           │
//! │  cartwheel.<cart>.config       CartConfig                               │
//! │  cartwheel.<cart>.meta         { sequence, created_at, updated_at }     │
//! │  cartwheel.<cart>.extra_info   free-form JSON object                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The storage medium is up to the implementation. [`MemoryStore`] keeps
//! everything in process and is what tests use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde_json::Value;

/// Root segment of every cart path.
pub const ROOT: &str = "cartwheel";

/// Persistence backend keyed by dotted paths.
pub trait Store: Send + Sync {
    /// Reads the value stored at `path`.
    fn get(&self, path: &str) -> Option<Value>;

    /// Writes `value` at `path`, replacing what was there.
    fn put(&self, path: &str, value: Value);

    /// Deletes the value at `path`. Missing paths are ignored.
    fn forget(&self, path: &str);

    /// Checks if a value exists at `path`.
    fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }
}

/// A section of a cart's stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Items,
    Actions,
    Taxes,
    Config,
    Meta,
    ExtraInfo,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Items,
        Section::Actions,
        Section::Taxes,
        Section::Config,
        Section::Meta,
        Section::ExtraInfo,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Section::Items => "items",
            Section::Actions => "actions",
            Section::Taxes => "taxes",
            Section::Config => "config",
            Section::Meta => "meta",
            Section::ExtraInfo => "extra_info",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store path of one section of a cart.
pub fn section_path(cart: &str, section: Section) -> String {
    format!("{}.{}.{}", ROOT, cart, section)
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored paths.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A panic while holding the lock cannot leave a half-written value.
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn get(&self, path: &str) -> Option<Value> {
        self.lock().get(path).cloned()
    }

    fn put(&self, path: &str, value: Value) {
        self.lock().insert(path.to_string(), value);
    }

    fn forget(&self, path: &str) {
        self.lock().remove(path);
    }

    fn has(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_paths() {
        assert_eq!(section_path("shop", Section::Items), "cartwheel.shop.items");
        assert_eq!(
            section_path("shop.main", Section::ExtraInfo),
            "cartwheel.shop.main.extra_info"
        );
    }

    #[test]
    fn test_memory_store_operations() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("a.b", json!({"x": 1}));
        assert!(store.has("a.b"));
        assert_eq!(store.get("a.b"), Some(json!({"x": 1})));

        store.put("a.b", json!(2));
        assert_eq!(store.get("a.b"), Some(json!(2)));
        assert_eq!(store.len(), 1);

        store.forget("a.b");
        store.forget("a.b");
        assert!(!store.has("a.b"));
        assert_eq!(store.get("a.b"), None);
    }
}
