//! # Cart Aggregate
//!
//! Owns the item, action and tax containers of one named cart, rolls up
//! totals and is the only entry point for mutations.
//!
//! ## Totals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items_subtotal  = Σ item.subtotal                                      │
//! │  subtotal        = items_subtotal + Σ enabled cart action amounts       │
//! │  taxable_amount  = 0 unless taxes are enabled, else                     │
//! │                    Σ item.taxable_amount + Σ taxable cart action amounts│
//! │  tax_rate        = Σ tax.rate                                           │
//! │  tax_amount      = Σ taxable_amount × tax.rate / 100                    │
//! │  total           = subtotal + tax_amount                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mutations
//! Every mutation builds the next state on a copy, validates it, fires the
//! pending ("-ing") event, and only then swaps the copy in and writes the
//! touched store sections. A validation error or a veto leaves both memory
//! and store exactly as they were.
//!
//! ## Concurrency
//! A cart has a single logical owner (`&mut self` for every mutation).
//! Carts with different names share nothing but the store handle, so they
//! can live on different tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::action::{resolve_actions, Action, ActionUpdate, NewAction, ParentBase, ResolvedAction};
use crate::config::CartConfig;
use crate::container::{Container, Creator, Entity, EntityKind};
use crate::details::{ActionDetails, CartDetails, ItemDetails, TaxDetails};
use crate::error::{CartError, CartResult, ValidationError};
use crate::events::{CartEvent, CartObserver, EventBus, EventKind, Phase, Signal};
use crate::item::{Item, ItemUpdate, NewItem};
use crate::query::Filter;
use crate::rules::RuleHandlers;
use crate::store::{section_path, Section, Store};
use crate::tax::{NewTax, Tax, TaxUpdate};
use crate::validation::validate_cart_name;

// =============================================================================
// State
// =============================================================================

/// Bookkeeping stored next to a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartMeta {
    /// Last order number handed out to an action.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartMeta {
    fn new() -> Self {
        let now = Utc::now();
        CartMeta {
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
struct CartState {
    config: CartConfig,
    items: Container<Item>,
    actions: Container<Action>,
    taxes: Container<Tax>,
    extra_info: Map<String, Value>,
    meta: CartMeta,
}

impl CartState {
    fn next_sequence(&mut self) -> u64 {
        self.meta.sequence += 1;
        self.meta.sequence
    }

    fn encode(&self, section: Section) -> Result<Value, serde_json::Error> {
        match section {
            Section::Items => serde_json::to_value(&self.items),
            Section::Actions => serde_json::to_value(&self.actions),
            Section::Taxes => serde_json::to_value(&self.taxes),
            Section::Config => serde_json::to_value(&self.config),
            Section::Meta => serde_json::to_value(&self.meta),
            Section::ExtraInfo => Ok(Value::Object(self.extra_info.clone())),
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A named cart bound to a store.
pub struct Cart {
    name: String,
    store: Arc<dyn Store>,
    events: EventBus,
    handlers: RuleHandlers,
    state: CartState,
}

impl Cart {
    /// Opens the cart `name`, creating it with the default configuration on
    /// first access.
    pub fn open(name: impl Into<String>, store: Arc<dyn Store>) -> CartResult<Cart> {
        Self::open_with_config(name, store, CartConfig::default())
    }

    /// Opens the cart `name`. `config` only applies when the cart does not
    /// exist yet; an existing cart keeps its stored configuration.
    pub fn open_with_config(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        config: CartConfig,
    ) -> CartResult<Cart> {
        let name = name.into();
        validate_cart_name(&name)?;

        let meta: Option<CartMeta> = load_section(store.as_ref(), &name, Section::Meta)?;
        let created = meta.is_none();

        let config = match load_section(store.as_ref(), &name, Section::Config)? {
            Some(stored) => stored,
            None => {
                config.validate()?;
                config
            }
        };

        let state = CartState {
            config,
            items: load_section(store.as_ref(), &name, Section::Items)?.unwrap_or_default(),
            actions: load_section(store.as_ref(), &name, Section::Actions)?.unwrap_or_default(),
            taxes: load_section(store.as_ref(), &name, Section::Taxes)?.unwrap_or_default(),
            extra_info: load_section(store.as_ref(), &name, Section::ExtraInfo)?
                .unwrap_or_default(),
            meta: meta.unwrap_or_else(CartMeta::new),
        };

        let mut cart = Cart {
            name,
            store,
            events: EventBus::new(),
            handlers: RuleHandlers::new(),
            state,
        };
        cart.attach_all();

        if created {
            cart.write(&cart.state, &[Section::Config, Section::Meta])?;
            info!(cart = %cart.name, "Cart created");
        } else {
            info!(
                cart = %cart.name,
                items = cart.state.items.len(),
                actions = cart.state.actions.len(),
                taxes = cart.state.taxes.len(),
                "Cart opened"
            );
        }

        Ok(cart)
    }

    /// Forgets every stored section of the cart.
    pub fn destroy(self) -> CartResult<()> {
        let pending = self.event(EventKind::Cart, Phase::Destroying, json!({ "name": self.name }));
        self.check(&pending)?;

        for section in Section::ALL {
            self.store.forget(&section_path(&self.name, section));
        }

        info!(cart = %self.name, "Cart destroyed");
        self.events.notify(&pending.completed(json!({ "name": self.name })));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CartConfig {
        &self.state.config
    }

    pub fn meta(&self) -> &CartMeta {
        &self.state.meta
    }

    /// Registers an observer for lifecycle events.
    pub fn subscribe(&mut self, observer: impl CartObserver + 'static) {
        self.events.subscribe(Arc::new(observer));
    }

    /// Registers a named rule handler for actions of this cart.
    pub fn register_rule_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Action) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.handlers.register(name, handler);
    }

    pub fn rule_handlers(&self) -> &RuleHandlers {
        &self.handlers
    }

    /// Replaces the configuration.
    ///
    /// Group ranks are recomputed and every action container is resorted.
    /// Switching to non-commercial drops all actions and taxes; disabling
    /// the builtin tax system drops all taxes.
    pub fn configure(&mut self, config: CartConfig) -> CartResult<()> {
        config.validate()?;

        let mut next = self.state.clone();
        next.config = config;

        if !next.config.commercial {
            next.actions.clear();
            for item in next.items.iter_mut() {
                item.actions_mut().clear();
            }
        }
        if !next.config.taxes_enabled() {
            next.taxes.clear();
        }

        for action in next.actions.iter_mut() {
            action.rerank(&next.config);
        }
        next.actions.sort_by_key(Action::order_key);
        for item in next.items.iter_mut() {
            for action in item.actions_mut().iter_mut() {
                action.rerank(&next.config);
            }
            item.actions_mut().sort_by_key(Action::order_key);
        }

        let payload = snapshot(&next.config);
        let pending = self.event(EventKind::Cart, Phase::Updating, payload.clone());
        self.commit(
            pending,
            next,
            &[Section::Config, Section::Items, Section::Actions, Section::Taxes],
            payload,
        )?;

        info!(cart = %self.name, "Cart reconfigured");
        Ok(())
    }

    /// Removes every item, action and tax, and the cart's extra info.
    pub fn clear(&mut self) -> CartResult<()> {
        let mut next = self.state.clone();
        next.items.clear();
        next.actions.clear();
        next.taxes.clear();
        next.extra_info.clear();

        let pending = self.event(EventKind::Cart, Phase::Clearing, Value::Null);
        self.commit(
            pending,
            next,
            &[Section::Items, Section::Actions, Section::Taxes, Section::ExtraInfo],
            Value::Null,
        )?;

        debug!(cart = %self.name, "Cart cleared");
        Ok(())
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Adds an item, merging into an existing line with the same hash.
    ///
    /// Returns the hash of the line.
    pub fn add_item(&mut self, input: NewItem) -> CartResult<String> {
        let mut item = Item::new(input)?;
        item.set_creator(Some(Creator::cart(&self.name)));

        let payload = snapshot(&item);
        let mut next = self.state.clone();
        let (hash, merged) = next.items.upsert(item)?;

        let pending = self.event(EventKind::Item, Phase::Adding, payload);
        let done = json!({ "hash": hash, "merged": merged });
        self.commit(pending, next, &[Section::Items], done)?;

        debug!(cart = %self.name, hash = %hash, merged, "Item added");
        Ok(hash)
    }

    /// Updates an item. A quantity of zero or less removes it.
    ///
    /// Returns the (possibly new) hash, or `None` when the item was removed.
    pub fn update_item(&mut self, hash: &str, update: ItemUpdate) -> CartResult<Option<String>> {
        if update.removes() {
            self.remove_item(hash)?;
            return Ok(None);
        }

        let updated = self.state.items.find(hash)?.updated(update)?;
        let payload = json!({ "hash": hash, "item": snapshot(&updated) });

        let mut next = self.state.clone();
        let (new_hash, merged) = next.items.rekey(hash, updated)?;
        if let Some(item) = next.items.get_mut(&new_hash) {
            attach_item_actions(&self.name, item);
        }

        let pending = self.event(EventKind::Item, Phase::Updating, payload);
        let done = json!({ "hash": new_hash, "previous": hash, "merged": merged });
        self.commit(pending, next, &[Section::Items], done)?;

        debug!(cart = %self.name, hash = %new_hash, previous = %hash, "Item updated");
        Ok(Some(new_hash))
    }

    /// Removes an item and its actions.
    pub fn remove_item(&mut self, hash: &str) -> CartResult<Item> {
        let mut next = self.state.clone();
        let removed = next.items.remove(hash)?;

        let pending = self.event(EventKind::Item, Phase::Removing, json!({ "hash": hash }));
        self.commit(pending, next, &[Section::Items], json!({ "hash": hash }))?;

        debug!(cart = %self.name, hash = %hash, "Item removed");
        Ok(detached(removed, Item::set_creator))
    }

    /// Removes every item.
    pub fn clear_items(&mut self) -> CartResult<()> {
        let mut next = self.state.clone();
        next.items.clear();

        let pending = self.event(EventKind::Item, Phase::Clearing, Value::Null);
        self.commit(pending, next, &[Section::Items], Value::Null)?;

        debug!(cart = %self.name, "Items cleared");
        Ok(())
    }

    /// Looks up an item by hash.
    pub fn item(&self, hash: &str) -> CartResult<&Item> {
        self.state.items.find(hash)
    }

    pub fn has_item(&self, hash: &str) -> bool {
        self.state.items.contains(hash)
    }

    pub fn items(&self) -> &Container<Item> {
        &self.state.items
    }

    /// Items accepted by `filter`, in container order.
    pub fn query_items(&self, filter: &Filter<'_, Item>, match_all: bool) -> Vec<&Item> {
        self.state
            .items
            .query(filter, match_all, |item| item.filter_view(&self.handlers))
    }

    // =========================================================================
    // Cart Actions
    // =========================================================================

    /// Applies a cart-scoped action. Returns its hash.
    pub fn apply_action(&mut self, input: NewAction) -> CartResult<String> {
        self.ensure_commercial()?;

        let mut next = self.state.clone();
        let sequence = next.next_sequence();
        let mut action = Action::new(input, sequence, &next.config, &self.handlers)?;
        action.set_creator(Some(Creator::cart(&self.name)));

        let payload = snapshot(&action);
        let (hash, merged) = next.actions.upsert(action)?;
        next.actions.sort_by_key(Action::order_key);

        let pending = self.event(EventKind::Action, Phase::Adding, payload);
        let done = json!({ "hash": hash, "merged": merged });
        self.commit(pending, next, &[Section::Actions], done)?;

        debug!(cart = %self.name, hash = %hash, merged, "Action applied");
        Ok(hash)
    }

    /// Updates a cart-scoped action. Returns the (possibly new) hash.
    pub fn update_action(&mut self, hash: &str, update: ActionUpdate) -> CartResult<String> {
        let updated = self
            .state
            .actions
            .find(hash)?
            .updated(update, &self.state.config, &self.handlers)?;
        let payload = json!({ "hash": hash, "action": snapshot(&updated) });

        let mut next = self.state.clone();
        let (new_hash, merged) = next.actions.rekey(hash, updated)?;
        next.actions.sort_by_key(Action::order_key);

        let pending = self.event(EventKind::Action, Phase::Updating, payload);
        let done = json!({ "hash": new_hash, "previous": hash, "merged": merged });
        self.commit(pending, next, &[Section::Actions], done)?;

        debug!(cart = %self.name, hash = %new_hash, previous = %hash, "Action updated");
        Ok(new_hash)
    }

    pub fn remove_action(&mut self, hash: &str) -> CartResult<Action> {
        let mut next = self.state.clone();
        let removed = next.actions.remove(hash)?;

        let pending = self.event(EventKind::Action, Phase::Removing, json!({ "hash": hash }));
        self.commit(pending, next, &[Section::Actions], json!({ "hash": hash }))?;

        debug!(cart = %self.name, hash = %hash, "Action removed");
        Ok(detached(removed, Action::set_creator))
    }

    pub fn clear_actions(&mut self) -> CartResult<()> {
        let mut next = self.state.clone();
        next.actions.clear();

        let pending = self.event(EventKind::Action, Phase::Clearing, Value::Null);
        self.commit(pending, next, &[Section::Actions], Value::Null)?;

        debug!(cart = %self.name, "Actions cleared");
        Ok(())
    }

    pub fn action(&self, hash: &str) -> CartResult<&Action> {
        self.state.actions.find(hash)
    }

    pub fn has_action(&self, hash: &str) -> bool {
        self.state.actions.contains(hash)
    }

    /// Cart-scoped actions, in order-key order.
    pub fn actions(&self) -> &Container<Action> {
        &self.state.actions
    }

    /// Cart-scoped actions accepted by `filter`.
    ///
    /// Attribute filters match against the resolved filter view, so
    /// `{"enabled": true}` and `{"taxable": false}` work.
    pub fn query_actions(&self, filter: &Filter<'_, Action>, match_all: bool) -> Vec<&Action> {
        let resolved = self.resolved_actions();
        query_resolved(&self.state.actions, &resolved, filter, match_all)
    }

    // =========================================================================
    // Item Actions
    // =========================================================================

    /// Applies an action scoped to one item. Returns the action hash.
    pub fn apply_item_action(&mut self, item_hash: &str, input: NewAction) -> CartResult<String> {
        self.ensure_commercial()?;

        let mut next = self.state.clone();
        let sequence = next.next_sequence();
        let mut action = Action::new(input, sequence, &next.config, &self.handlers)?;
        action.set_creator(Some(Creator::item(&self.name, item_hash)));

        let payload = snapshot(&action);
        let actions = next.items.find_mut(item_hash)?.actions_mut();
        let (hash, merged) = actions.upsert(action)?;
        actions.sort_by_key(Action::order_key);

        let pending = self
            .event(EventKind::ItemAction, Phase::Adding, payload)
            .scoped(item_hash);
        let done = json!({ "hash": hash, "merged": merged });
        self.commit(pending, next, &[Section::Items], done)?;

        debug!(cart = %self.name, item = %item_hash, hash = %hash, merged, "Item action applied");
        Ok(hash)
    }

    pub fn update_item_action(
        &mut self,
        item_hash: &str,
        hash: &str,
        update: ActionUpdate,
    ) -> CartResult<String> {
        let updated = self
            .item_action(item_hash, hash)?
            .updated(update, &self.state.config, &self.handlers)?;
        let payload = json!({ "hash": hash, "action": snapshot(&updated) });

        let mut next = self.state.clone();
        let actions = next.items.find_mut(item_hash)?.actions_mut();
        let (new_hash, merged) = actions.rekey(hash, updated)?;
        actions.sort_by_key(Action::order_key);

        let pending = self
            .event(EventKind::ItemAction, Phase::Updating, payload)
            .scoped(item_hash);
        let done = json!({ "hash": new_hash, "previous": hash, "merged": merged });
        self.commit(pending, next, &[Section::Items], done)?;

        debug!(cart = %self.name, item = %item_hash, hash = %new_hash, "Item action updated");
        Ok(new_hash)
    }

    pub fn remove_item_action(&mut self, item_hash: &str, hash: &str) -> CartResult<Action> {
        let mut next = self.state.clone();
        let removed = next.items.find_mut(item_hash)?.actions_mut().remove(hash)?;

        let pending = self
            .event(EventKind::ItemAction, Phase::Removing, json!({ "hash": hash }))
            .scoped(item_hash);
        self.commit(pending, next, &[Section::Items], json!({ "hash": hash }))?;

        debug!(cart = %self.name, item = %item_hash, hash = %hash, "Item action removed");
        Ok(detached(removed, Action::set_creator))
    }

    pub fn clear_item_actions(&mut self, item_hash: &str) -> CartResult<()> {
        let mut next = self.state.clone();
        next.items.find_mut(item_hash)?.actions_mut().clear();

        let pending = self
            .event(EventKind::ItemAction, Phase::Clearing, Value::Null)
            .scoped(item_hash);
        self.commit(pending, next, &[Section::Items], Value::Null)?;

        debug!(cart = %self.name, item = %item_hash, "Item actions cleared");
        Ok(())
    }

    pub fn item_action(&self, item_hash: &str, hash: &str) -> CartResult<&Action> {
        self.state.items.find(item_hash)?.actions().find(hash)
    }

    /// Actions of one item accepted by `filter`.
    pub fn query_item_actions(
        &self,
        item_hash: &str,
        filter: &Filter<'_, Action>,
        match_all: bool,
    ) -> CartResult<Vec<&Action>> {
        let item = self.state.items.find(item_hash)?;
        let resolved = item.resolved_actions(self.state.config.builtin_tax, &self.handlers);
        Ok(query_resolved(item.actions(), &resolved, filter, match_all))
    }

    // =========================================================================
    // Taxes
    // =========================================================================

    /// Applies a tax. Returns its hash.
    pub fn apply_tax(&mut self, input: NewTax) -> CartResult<String> {
        self.ensure_taxes()?;

        let mut tax = Tax::new(input, &self.state.config)?;
        tax.set_creator(Some(Creator::cart(&self.name)));

        let payload = snapshot(&tax);
        let mut next = self.state.clone();
        let (hash, merged) = next.taxes.upsert(tax)?;

        let pending = self.event(EventKind::Tax, Phase::Adding, payload);
        let done = json!({ "hash": hash, "merged": merged });
        self.commit(pending, next, &[Section::Taxes], done)?;

        debug!(cart = %self.name, hash = %hash, merged, "Tax applied");
        Ok(hash)
    }

    pub fn update_tax(&mut self, hash: &str, update: TaxUpdate) -> CartResult<String> {
        let updated = self.state.taxes.find(hash)?.updated(update)?;
        let payload = json!({ "hash": hash, "tax": snapshot(&updated) });

        let mut next = self.state.clone();
        let (new_hash, merged) = next.taxes.rekey(hash, updated)?;

        let pending = self.event(EventKind::Tax, Phase::Updating, payload);
        let done = json!({ "hash": new_hash, "previous": hash, "merged": merged });
        self.commit(pending, next, &[Section::Taxes], done)?;

        debug!(cart = %self.name, hash = %new_hash, previous = %hash, "Tax updated");
        Ok(new_hash)
    }

    pub fn remove_tax(&mut self, hash: &str) -> CartResult<Tax> {
        let mut next = self.state.clone();
        let removed = next.taxes.remove(hash)?;

        let pending = self.event(EventKind::Tax, Phase::Removing, json!({ "hash": hash }));
        self.commit(pending, next, &[Section::Taxes], json!({ "hash": hash }))?;

        debug!(cart = %self.name, hash = %hash, "Tax removed");
        Ok(detached(removed, Tax::set_creator))
    }

    pub fn clear_taxes(&mut self) -> CartResult<()> {
        let mut next = self.state.clone();
        next.taxes.clear();

        let pending = self.event(EventKind::Tax, Phase::Clearing, Value::Null);
        self.commit(pending, next, &[Section::Taxes], Value::Null)?;

        debug!(cart = %self.name, "Taxes cleared");
        Ok(())
    }

    pub fn tax(&self, hash: &str) -> CartResult<&Tax> {
        self.state.taxes.find(hash)
    }

    pub fn has_tax(&self, hash: &str) -> bool {
        self.state.taxes.contains(hash)
    }

    pub fn taxes(&self) -> &Container<Tax> {
        &self.state.taxes
    }

    pub fn query_taxes(&self, filter: &Filter<'_, Tax>, match_all: bool) -> Vec<&Tax> {
        self.state.taxes.query(filter, match_all, Tax::filter_view)
    }

    // =========================================================================
    // Extra Info
    // =========================================================================

    /// Sets a value at a dotted key path, creating intermediate objects.
    pub fn set_extra_info(&mut self, key: &str, value: Value) -> CartResult<()> {
        let segments = key_segments(key)?;

        let mut next = self.state.clone();
        set_path(&mut next.extra_info, &segments, value.clone());

        let payload = json!({ "key": key, "value": value });
        let pending = self.event(EventKind::Cart, Phase::Updating, payload.clone());
        self.commit(pending, next, &[Section::ExtraInfo], payload)?;

        debug!(cart = %self.name, key, "Extra info set");
        Ok(())
    }

    /// Reads the value at a dotted key path.
    pub fn extra_info(&self, key: &str) -> Option<&Value> {
        let segments = key_segments(key).ok()?;
        get_path(&self.state.extra_info, &segments)
    }

    /// Removes the value at a dotted key path, returning it.
    pub fn remove_extra_info(&mut self, key: &str) -> CartResult<Option<Value>> {
        let segments = key_segments(key)?;

        let mut next = self.state.clone();
        let Some(removed) = remove_path(&mut next.extra_info, &segments) else {
            return Ok(None);
        };

        let payload = json!({ "key": key, "value": Value::Null });
        let pending = self.event(EventKind::Cart, Phase::Updating, payload.clone());
        self.commit(pending, next, &[Section::ExtraInfo], payload)?;

        debug!(cart = %self.name, key, "Extra info removed");
        Ok(Some(removed))
    }

    /// The whole extra info object.
    pub fn all_extra_info(&self) -> &Map<String, Value> {
        &self.state.extra_info
    }

    // =========================================================================
    // Totals
    // =========================================================================

    /// Σ item subtotals.
    pub fn items_subtotal(&self) -> f64 {
        self.state
            .items
            .iter()
            .map(|item| item.subtotal(&self.handlers))
            .sum()
    }

    fn cart_base(&self) -> ParentBase {
        let items_subtotal = self.items_subtotal();
        ParentBase {
            quantity: 1.0,
            total_price: items_subtotal,
            items_subtotal,
            item_taxable: None,
            accumulates: true,
        }
    }

    /// Resolved state of every cart-scoped action, in order.
    pub fn resolved_actions(&self) -> Vec<ResolvedAction> {
        resolve_actions(
            &self.state.actions,
            &self.cart_base(),
            self.state.config.builtin_tax,
            &self.handlers,
        )
    }

    /// Items subtotal plus enabled cart action amounts.
    pub fn subtotal(&self) -> f64 {
        self.items_subtotal()
            + self
                .resolved_actions()
                .iter()
                .map(ResolvedAction::amount)
                .sum::<f64>()
    }

    /// Amount subject to tax. 0 unless taxes are enabled.
    pub fn taxable_amount(&self) -> f64 {
        if !self.state.config.taxes_enabled() {
            return 0.0;
        }

        let items: f64 = self
            .state
            .items
            .iter()
            .map(|item| item.taxable_amount(true, &self.handlers))
            .sum();
        let actions: f64 = self
            .resolved_actions()
            .iter()
            .filter(|r| r.is_taxable())
            .map(ResolvedAction::amount)
            .sum();

        items + actions
    }

    /// Σ tax rates.
    pub fn tax_rate(&self) -> f64 {
        self.state.taxes.iter().map(Tax::rate).sum()
    }

    /// Σ tax amounts.
    pub fn tax_amount(&self) -> f64 {
        let taxable = self.taxable_amount();
        self.state
            .taxes
            .iter()
            .map(|tax| tax.amount_on(taxable))
            .sum()
    }

    /// Subtotal plus tax amount.
    pub fn total(&self) -> f64 {
        self.subtotal() + self.tax_amount()
    }

    // =========================================================================
    // Ownership Walks
    // =========================================================================

    /// Amount of a tax owned by this cart.
    ///
    /// A tax this cart does not own (detached, removed, or from another
    /// cart) has an amount of 0.
    pub fn tax_amount_of(&self, tax: &Tax) -> f64 {
        match self.tax_owner(tax) {
            Ok(owned) => owned.amount_on(self.taxable_amount()),
            Err(e) => {
                warn!(cart = %self.name, error = %e, "Tax amount unavailable, using 0");
                0.0
            }
        }
    }

    fn tax_owner(&self, tax: &Tax) -> CartResult<&Tax> {
        let unknown = || unknown_owner(EntityKind::Tax, tax.hash());

        match tax.creator() {
            Some(creator) if creator.cart == self.name && creator.item.is_none() => {
                self.state.taxes.get(tax.hash()).ok_or_else(unknown)
            }
            _ => Err(unknown()),
        }
    }

    /// Resolved state of an action, found by walking its creator handle to
    /// the container that owns it.
    pub fn action_state(&self, action: &Action) -> CartResult<ResolvedAction> {
        let unknown = || unknown_owner(EntityKind::Action, action.hash());
        let creator = action.creator().ok_or_else(unknown)?;
        if creator.cart != self.name {
            return Err(unknown());
        }

        let resolved = match &creator.item {
            Some(item_hash) => self
                .state
                .items
                .get(item_hash)
                .ok_or_else(unknown)?
                .resolved_actions(self.state.config.builtin_tax, &self.handlers),
            None => self.resolved_actions(),
        };

        resolved
            .into_iter()
            .find(|r| r.hash() == action.hash())
            .ok_or_else(unknown)
    }

    /// Amount of an action owned by this cart.
    pub fn action_amount(&self, action: &Action) -> CartResult<f64> {
        self.action_state(action).map(|r| r.amount())
    }

    // =========================================================================
    // Details
    // =========================================================================

    /// Snapshot of the whole cart with every computed amount.
    pub fn details(&self) -> CartDetails {
        let builtin_tax = self.state.config.builtin_tax;

        let items: Vec<ItemDetails> = self
            .state
            .items
            .iter()
            .map(|item| {
                let resolved = item.resolved_actions(builtin_tax, &self.handlers);
                ItemDetails::new(
                    item,
                    action_details(item.actions(), &resolved),
                    item.subtotal(&self.handlers),
                    item.taxable_amount(self.state.config.taxes_enabled(), &self.handlers),
                )
            })
            .collect();

        let resolved = self.resolved_actions();
        let taxable_amount = self.taxable_amount();
        let taxes: Vec<TaxDetails> = self
            .state
            .taxes
            .iter()
            .map(|tax| TaxDetails::new(tax, tax.amount_on(taxable_amount)))
            .collect();

        CartDetails {
            name: self.name.clone(),
            commercial: self.state.config.commercial,
            builtin_tax,
            items,
            actions: action_details(&self.state.actions, &resolved),
            taxes,
            items_subtotal: self.items_subtotal(),
            subtotal: self.subtotal(),
            taxable_amount,
            tax_rate: self.tax_rate(),
            tax_amount: self.tax_amount(),
            total: self.total(),
            extra_info: self.state.extra_info.clone(),
            created_at: self.state.meta.created_at,
            updated_at: self.state.meta.updated_at,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_commercial(&self) -> CartResult<()> {
        if !self.state.config.commercial {
            return Err(CartError::NonCommercial {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn ensure_taxes(&self) -> CartResult<()> {
        self.ensure_commercial()?;
        if !self.state.config.builtin_tax {
            return Err(CartError::TaxSystemDisabled {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn event(&self, kind: EventKind, phase: Phase, payload: Value) -> CartEvent {
        CartEvent::new(kind, phase, &self.name, payload)
    }

    fn check(&self, pending: &CartEvent) -> CartResult<()> {
        if self.events.fire(pending) == Signal::Cancel {
            return Err(CartError::Vetoed {
                event: pending.name(),
            });
        }
        Ok(())
    }

    /// Fires `pending`, then swaps in `next` and writes `sections` (plus
    /// meta), then notifies the completed event.
    fn commit(
        &mut self,
        pending: CartEvent,
        mut next: CartState,
        sections: &[Section],
        done: Value,
    ) -> CartResult<()> {
        next.meta.updated_at = Utc::now();

        let mut touched = sections.to_vec();
        if !touched.contains(&Section::Meta) {
            touched.push(Section::Meta);
        }
        let writes = encode_sections(&self.name, &next, &touched)?;

        self.check(&pending)?;

        self.state = next;
        for (path, value) in writes {
            self.store.put(&path, value);
        }

        self.events.notify(&pending.completed(done));
        Ok(())
    }

    fn write(&self, state: &CartState, sections: &[Section]) -> CartResult<()> {
        for (path, value) in encode_sections(&self.name, state, sections)? {
            self.store.put(&path, value);
        }
        Ok(())
    }

    /// Points every entity's creator handle at this cart.
    fn attach_all(&mut self) {
        let name = self.name.clone();
        for item in self.state.items.iter_mut() {
            item.set_creator(Some(Creator::cart(&name)));
            attach_item_actions(&name, item);
        }
        for action in self.state.actions.iter_mut() {
            action.set_creator(Some(Creator::cart(&name)));
        }
        for tax in self.state.taxes.iter_mut() {
            tax.set_creator(Some(Creator::cart(&name)));
        }
    }
}

impl std::fmt::Debug for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("name", &self.name)
            .field("items", &self.state.items.len())
            .field("actions", &self.state.actions.len())
            .field("taxes", &self.state.taxes.len())
            .field("events", &self.events)
            .field("handlers", &self.handlers)
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn load_section<T: DeserializeOwned>(
    store: &dyn Store,
    cart: &str,
    section: Section,
) -> CartResult<Option<T>> {
    let path = section_path(cart, section);
    match store.get(&path) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| CartError::CorruptState { path, source }),
    }
}

fn encode_sections(
    cart: &str,
    state: &CartState,
    sections: &[Section],
) -> CartResult<Vec<(String, Value)>> {
    sections
        .iter()
        .map(|&section| {
            let path = section_path(cart, section);
            state
                .encode(section)
                .map(|value| (path.clone(), value))
                .map_err(|source| CartError::CorruptState { path, source })
        })
        .collect()
}

fn attach_item_actions(cart: &str, item: &mut Item) {
    let creator = Creator::item(cart, item.hash());
    for action in item.actions_mut().iter_mut() {
        action.set_creator(Some(creator.clone()));
    }
}

fn detached<E>(mut entity: E, set_creator: fn(&mut E, Option<Creator>)) -> E {
    set_creator(&mut entity, None);
    entity
}

fn unknown_owner(kind: EntityKind, hash: &str) -> CartError {
    CartError::UnknownOwner {
        kind,
        hash: hash.to_string(),
    }
}

fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn query_resolved<'a>(
    actions: &'a Container<Action>,
    resolved: &[ResolvedAction],
    filter: &Filter<'_, Action>,
    match_all: bool,
) -> Vec<&'a Action> {
    actions.query(filter, match_all, |action| {
        action.filter_view(resolved.iter().find(|r| r.hash() == action.hash()))
    })
}

fn action_details(actions: &Container<Action>, resolved: &[ResolvedAction]) -> Vec<ActionDetails> {
    actions
        .iter()
        .zip(resolved)
        .map(|(action, state)| ActionDetails::new(action, state))
        .collect()
}

fn key_segments(key: &str) -> Result<Vec<&str>, ValidationError> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ValidationError::invalid_format(
            "key",
            "dotted key segments must not be empty",
        ));
    }
    Ok(segments)
}

fn get_path<'a>(map: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (last, parents) = segments.split_last()?;
    let mut current = map;
    for segment in parents {
        current = current.get(*segment)?.as_object()?;
    }
    current.get(*last)
}

fn set_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = map;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(inner) = slot else {
            return;
        };
        current = inner;
    }
    current.insert(last.to_string(), value);
}

fn remove_path(map: &mut Map<String, Value>, segments: &[&str]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut current = map;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    current.remove(*last)
}

// =============================================================================
// Unit Tests
// =============================================================================
