//! # cartwheel-core: Cart Pricing & Ordering Engine
//!
//! Items, fee/discount actions and taxes combine through an ordered,
//! rule-governed pipeline into deterministic cart totals.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cartwheel Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      cart (aggregate)                           │   │
//! │  │   open / configure / destroy · mutations · totals · details     │   │
//! │  └──────┬──────────────────┬──────────────────┬────────────────────┘   │
//! │         │                  │                  │                         │
//! │  ┌──────▼──────┐    ┌──────▼──────┐    ┌──────▼──────┐                 │
//! │  │ Container   │    │ Container   │    │ Container   │                 │
//! │  │   <Item>    │    │  <Action>   │    │   <Tax>     │                 │
//! │  │  └ actions  │    │  (resolver) │    │             │                 │
//! │  └─────────────┘    └─────────────┘    └─────────────┘                 │
//! │                                                                         │
//! │  identity · query · value · rules · validation · error                  │
//! │                                                                         │
//! │  Injected:  Store (persistence) · CartObserver (events)                 │
//! │             ModelResolver (external objects)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`cart`] - The `Cart` aggregate
//! - [`action`] - Actions, order keys and the amount resolver
//! - [`item`] / [`tax`] - The other two entity kinds
//! - [`container`] - Ordered hash-keyed containers
//! - [`query`] - Filters and recursive diff/intersect
//! - [`config`] - Per-cart configuration (TOML + environment)
//! - [`store`] / [`events`] / [`resolver`] - Injected collaborators
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use cartwheel_core::{ActionTarget, Cart, MemoryStore, NewAction, NewItem, NewTax};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut cart = Cart::open("shop", store).unwrap();
//!
//! cart.add_item(NewItem::new("SKU-1", "Coffee", 10.0).quantity(2)).unwrap();
//! cart.apply_action(
//!     NewAction::new("promo", "10% off")
//!         .target(ActionTarget::ItemsSubtotal)
//!         .value("-10%"),
//! )
//! .unwrap();
//! cart.apply_tax(NewTax::new("vat", "VAT").rate(5.0)).unwrap();
//!
//! assert_eq!(cart.subtotal(), 18.0);
//! assert_eq!(cart.tax_amount(), 0.9);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod cart;
pub mod config;
pub mod container;
pub mod details;
pub mod error;
pub mod events;
pub mod identity;
pub mod item;
pub mod query;
pub mod resolver;
pub mod rules;
pub mod store;
pub mod tax;
pub mod validation;
pub mod value;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use action::{Action, ActionTarget, ActionUpdate, NewAction, OrderKey, ResolvedAction};
pub use cart::{Cart, CartMeta};
pub use config::CartConfig;
pub use container::{Container, Creator, Entity, EntityKind};
pub use details::{ActionDetails, CartDetails, ItemDetails, TaxDetails};
pub use error::{CartError, CartResult, ValidationError};
pub use events::{CartEvent, CartObserver, EventKind, Phase, Signal};
pub use item::{Item, ItemUpdate, NewItem};
pub use query::Filter;
pub use resolver::{MemoryResolver, ModelResolver};
pub use rules::{Relation, RuleSource, Rules};
pub use store::{MemoryStore, Store};
pub use tax::{NewTax, Tax, TaxUpdate};
pub use value::ActionValue;
