//! # Container Module
//!
//! Ordered, hash-keyed entity containers.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart ──owns──► Container<Item> ──owns──► Item                          │
//! │   │                                        └──owns──► Container<Action> │
//! │   ├──owns──► Container<Action>  (cart-scoped actions)                   │
//! │   └──owns──► Container<Tax>                                             │
//! │                                                                         │
//! │  Entities point back at their owner with a plain `Creator` handle       │
//! │  (cart name + scope), never with a reference.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Hashes are unique within a container.
//! - Adding an entity whose hash already exists merges it into the existing
//!   entry ([`Entity::absorb`]) instead of duplicating it.
//! - Arrival order is preserved; only action containers are resorted (by
//!   their order key) after a mutation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CartError, CartResult, ValidationError};
use crate::query::Filter;

// =============================================================================
// Entity Kind
// =============================================================================

/// The three entity kinds a cart holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Action,
    Tax,
}

impl EntityKind {
    /// Prefix embedded in every content hash of this kind.
    pub const fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Action => "action",
            EntityKind::Tax => "tax",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// =============================================================================
// Creator
// =============================================================================

/// Back-reference from an entity to the container that owns it.
///
/// `item` is set for actions owned by an item; it is `None` for entities
/// owned directly by the cart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Creator {
    pub cart: String,
    #[serde(default)]
    pub item: Option<String>,
}

impl Creator {
    /// Handle for an entity owned directly by `cart`.
    pub fn cart(cart: impl Into<String>) -> Self {
        Creator {
            cart: cart.into(),
            item: None,
        }
    }

    /// Handle for an action owned by item `item` of `cart`.
    pub fn item(cart: impl Into<String>, item: impl Into<String>) -> Self {
        Creator {
            cart: cart.into(),
            item: Some(item.into()),
        }
    }
}

// =============================================================================
// Entity Trait
// =============================================================================

/// Capability set shared by items, actions and taxes.
pub trait Entity: Clone {
    /// Entity kind, used in hashes and error messages.
    const KIND: EntityKind;

    /// Content hash; doubles as the container key.
    fn hash(&self) -> &str;

    /// Merges an incoming entity with an equal hash into `self`.
    ///
    /// Must not change `self.hash()`, and must leave `self` untouched
    /// when it fails.
    fn absorb(&mut self, incoming: Self) -> Result<(), ValidationError>;
}

// =============================================================================
// Container
// =============================================================================

/// An insertion-ordered map from content hash to entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container<E> {
    entries: Vec<E>,
}

impl<E> Default for Container<E> {
    fn default() -> Self {
        Container {
            entries: Vec::new(),
        }
    }
}

impl<E: Entity> Container<E> {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the container is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entities in container order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entries.iter()
    }

    /// Hashes in container order.
    pub fn hashes(&self) -> Vec<&str> {
        self.entries.iter().map(Entity::hash).collect()
    }

    /// Checks if an entity with this hash exists.
    pub fn contains(&self, hash: &str) -> bool {
        self.position(hash).is_some()
    }

    /// Looks up an entity by hash.
    pub fn get(&self, hash: &str) -> Option<&E> {
        self.entries.iter().find(|e| e.hash() == hash)
    }

    /// Looks up an entity by hash, failing with `NotFound`.
    pub fn find(&self, hash: &str) -> CartResult<&E> {
        self.get(hash).ok_or_else(|| not_found::<E>(hash))
    }

    /// Returns the entities accepted by `filter`, in container order.
    ///
    /// `view` builds the filter view of an entity; it is only called for
    /// attribute filters.
    pub fn query<'a>(
        &'a self,
        filter: &Filter<'_, E>,
        match_all: bool,
        view: impl Fn(&E) -> Value,
    ) -> Vec<&'a E> {
        self.entries
            .iter()
            .filter(|&e| filter.accepts(e, e.hash(), match_all, || view(e)))
            .collect()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, E> {
        self.entries.iter_mut()
    }

    pub(crate) fn get_mut(&mut self, hash: &str) -> Option<&mut E> {
        self.entries.iter_mut().find(|e| e.hash() == hash)
    }

    pub(crate) fn find_mut(&mut self, hash: &str) -> CartResult<&mut E> {
        self.get_mut(hash).ok_or_else(|| not_found::<E>(hash))
    }

    fn position(&self, hash: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.hash() == hash)
    }

    /// Inserts `entity`, or merges it into the entry with the same hash.
    ///
    /// Returns the entity's hash and whether a merge happened.
    pub(crate) fn upsert(&mut self, entity: E) -> CartResult<(String, bool)> {
        let hash = entity.hash().to_string();

        match self.position(&hash) {
            Some(idx) => {
                self.entries[idx].absorb(entity)?;
                debug_assert_eq!(self.entries[idx].hash(), hash);
                Ok((hash, true))
            }
            None => {
                self.entries.push(entity);
                Ok((hash, false))
            }
        }
    }

    /// Stores the updated version of the entity previously keyed by
    /// `old_hash`.
    ///
    /// If the update changed the hash and the new hash is already taken,
    /// the updated entity is merged into that entry and its old slot is
    /// dropped. Since `absorb` keeps the target hash stable, one re-key
    /// step always reaches a fixed point.
    ///
    /// Returns the resulting hash and whether a merge happened.
    pub(crate) fn rekey(&mut self, old_hash: &str, updated: E) -> CartResult<(String, bool)> {
        let idx = self.position(old_hash).ok_or_else(|| not_found::<E>(old_hash))?;
        let new_hash = updated.hash().to_string();

        if new_hash != old_hash {
            if let Some(target) = self.position(&new_hash) {
                self.entries[target].absorb(updated)?;
                self.entries.remove(idx);
                return Ok((new_hash, true));
            }
        }

        self.entries[idx] = updated;
        Ok((new_hash, false))
    }

    /// Removes an entity by hash.
    pub(crate) fn remove(&mut self, hash: &str) -> CartResult<E> {
        let idx = self.position(hash).ok_or_else(|| not_found::<E>(hash))?;
        Ok(self.entries.remove(idx))
    }

    /// Removes every entity.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Stable sort by a derived key.
    pub(crate) fn sort_by_key<K: Ord>(&mut self, key: impl FnMut(&E) -> K) {
        self.entries.sort_by_key(key);
    }
}

impl<'a, E> IntoIterator for &'a Container<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn not_found<E: Entity>(hash: &str) -> CartError {
    CartError::NotFound {
        kind: E::KIND,
        hash: hash.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
