//! # Lifecycle Events
//!
//! Observers registered on a cart see every mutation twice.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cart.add_item(..)                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fire "cart.item.adding"  ── any observer returns Cancel ──► Vetoed     │
//! │       │                       (memory and store untouched)              │
//! │       ▼                                                                 │
//! │  commit + persist                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  notify "cart.item.added" (signals ignored)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Names
//! `cart.<kind>.<phase>` with kind one of `item`, `action`, `item_action`,
//! `tax`, `cart`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Item,
    /// Cart-scoped action.
    Action,
    /// Action owned by an item.
    ItemAction,
    Tax,
    Cart,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Item => "item",
            EventKind::Action => "action",
            EventKind::ItemAction => "item_action",
            EventKind::Tax => "tax",
            EventKind::Cart => "cart",
        }
    }
}

/// Lifecycle point. "-ing" phases can be vetoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Adding,
    Added,
    Updating,
    Updated,
    Removing,
    Removed,
    Clearing,
    Cleared,
    Destroying,
    Destroyed,
}

impl Phase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Adding => "adding",
            Phase::Added => "added",
            Phase::Updating => "updating",
            Phase::Updated => "updated",
            Phase::Removing => "removing",
            Phase::Removed => "removed",
            Phase::Clearing => "clearing",
            Phase::Cleared => "cleared",
            Phase::Destroying => "destroying",
            Phase::Destroyed => "destroyed",
        }
    }

    /// Checks if the phase fires before commit.
    pub const fn is_pending(&self) -> bool {
        matches!(
            self,
            Phase::Adding | Phase::Updating | Phase::Removing | Phase::Clearing | Phase::Destroying
        )
    }

    /// The phase fired after a pending phase commits.
    pub const fn completed(&self) -> Phase {
        match self {
            Phase::Adding => Phase::Added,
            Phase::Updating => Phase::Updated,
            Phase::Removing => Phase::Removed,
            Phase::Clearing => Phase::Cleared,
            Phase::Destroying => Phase::Destroyed,
            done => *done,
        }
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartEvent {
    pub kind: EventKind,
    pub phase: Phase,
    /// Cart name.
    pub cart: String,
    /// Hash of the owning item for item-scoped actions.
    pub scope: Option<String>,
    /// Entity snapshot or operation arguments.
    pub payload: Value,
}

impl CartEvent {
    pub fn new(kind: EventKind, phase: Phase, cart: impl Into<String>, payload: Value) -> Self {
        CartEvent {
            kind,
            phase,
            cart: cart.into(),
            scope: None,
            payload,
        }
    }

    pub fn scoped(mut self, item_hash: impl Into<String>) -> Self {
        self.scope = Some(item_hash.into());
        self
    }

    /// Dotted event name, e.g. `cart.item.adding`.
    pub fn name(&self) -> String {
        format!("cart.{}.{}", self.kind.as_str(), self.phase.as_str())
    }

    /// The matching "-ed" event carrying `payload`.
    pub fn completed(&self, payload: Value) -> CartEvent {
        CartEvent {
            phase: self.phase.completed(),
            payload,
            ..self.clone()
        }
    }
}

/// Observer answer to a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    Continue,
    Cancel,
}

/// Receives cart lifecycle events.
pub trait CartObserver: Send + Sync {
    fn on_event(&self, event: &CartEvent) -> Signal;
}

impl<F> CartObserver for F
where
    F: Fn(&CartEvent) -> Signal + Send + Sync,
{
    fn on_event(&self, event: &CartEvent) -> Signal {
        self(event)
    }
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn CartObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn CartObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Fires a pending event. Stops at the first observer that cancels.
    pub fn fire(&self, event: &CartEvent) -> Signal {
        for observer in &self.observers {
            if observer.on_event(event) == Signal::Cancel {
                debug!(event = %event.name(), cart = %event.cart, "Event cancelled by observer");
                return Signal::Cancel;
            }
        }
        Signal::Continue
    }

    /// Delivers a completed event to every observer.
    pub fn notify(&self, event: &CartEvent) {
        for observer in &self.observers {
            let _ = observer.on_event(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_names() {
        let event = CartEvent::new(EventKind::ItemAction, Phase::Removing, "shop", json!({}))
            .scoped("item_abc");
        assert_eq!(event.name(), "cart.item_action.removing");
        assert_eq!(event.scope.as_deref(), Some("item_abc"));

        let done = event.completed(json!({"hash": "action_x"}));
        assert_eq!(done.name(), "cart.item_action.removed");
        assert!(!done.phase.is_pending());
        assert!(event.phase.is_pending());
    }

    #[test]
    fn test_fire_stops_at_first_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let counter = Arc::clone(&calls);
        bus.subscribe(Arc::new(move |_: &CartEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Signal::Cancel
        }));
        let counter = Arc::clone(&calls);
        bus.subscribe(Arc::new(move |_: &CartEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Signal::Continue
        }));

        let event = CartEvent::new(EventKind::Item, Phase::Adding, "shop", Value::Null);
        assert_eq!(bus.fire(&event), Signal::Cancel);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        bus.notify(&event.completed(Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_bus_continues() {
        let bus = EventBus::new();
        let event = CartEvent::new(EventKind::Cart, Phase::Clearing, "shop", Value::Null);
        assert_eq!(bus.fire(&event), Signal::Continue);
        assert!(bus.is_empty());
    }
}
