//! # Item
//!
//! A line in the cart: an externally-owned product reference with quantity,
//! unit price, taxability and its own container of item-scoped actions.
//!
//! ## Identity
//! ```text
//! hash = digest(associated_id, price, associated_class, options)
//!
//! ("SKU-1", 9.5, "product", {size: L, color: red})  ┐
//! ("SKU-1", 9.5, "product", {color: red, size: L})  ┘ same hash → quantities add
//! ("SKU-1", 9.5, "product", {size: M})                different line
//! ```
//!
//! Title, quantity, taxability and extra info are not part of the identity.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::action::{extra_info_map, resolve_actions, Action, ParentBase, ResolvedAction};
use crate::container::{Container, Creator, Entity, EntityKind};
use crate::error::{CartError, CartResult, ValidationError};
use crate::identity::content_hash;
use crate::resolver::ModelResolver;
use crate::rules::RuleHandlers;
use crate::validation::{validate_id, validate_price, validate_quantity, validate_title};

/// Attributes for adding an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub associated_id: String,
    #[serde(default)]
    pub associated_class: Option<String>,
    pub title: String,
    /// Defaults to 1.
    #[serde(default)]
    pub quantity: Option<i64>,
    pub price: f64,
    /// Defaults to true.
    #[serde(default)]
    pub taxable: Option<bool>,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

impl NewItem {
    pub fn new(associated_id: impl Into<String>, title: impl Into<String>, price: f64) -> Self {
        NewItem {
            associated_id: associated_id.into(),
            title: title.into(),
            price,
            ..Default::default()
        }
    }

    pub fn associated_class(mut self, class: impl Into<String>) -> Self {
        self.associated_class = Some(class.into());
        self
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn taxable(mut self, taxable: bool) -> Self {
        self.taxable = Some(taxable);
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn extra_info(mut self, extra_info: Value) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Attribute changes for an existing item.
///
/// A `quantity` of zero or less removes the item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub associated_id: Option<String>,
    #[serde(default)]
    pub associated_class: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub taxable: Option<bool>,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

impl ItemUpdate {
    /// Update that only sets the quantity.
    pub fn quantity(quantity: i64) -> Self {
        ItemUpdate {
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    /// Whether the update removes the item instead of changing it.
    pub fn removes(&self) -> bool {
        self.quantity.is_some_and(|q| q <= 0)
    }
}

/// A cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    hash: String,
    associated_id: String,
    associated_class: Option<String>,
    title: String,
    quantity: i64,
    price: f64,
    taxable: bool,
    options: Map<String, Value>,
    extra_info: Map<String, Value>,
    #[serde(default)]
    actions: Container<Action>,
    #[serde(default)]
    creator: Option<Creator>,
}

impl Item {
    /// Builds a detached item.
    pub fn new(input: NewItem) -> CartResult<Item> {
        validate_id("associated_id", &input.associated_id)?;
        validate_title(&input.title)?;
        validate_price(input.price)?;

        let quantity = input.quantity.unwrap_or(1);
        validate_quantity(quantity)?;

        let options = options_map(input.options)?.unwrap_or_default();
        let extra_info = extra_info_map(input.extra_info)?.unwrap_or_default();

        let hash = item_hash(
            &input.associated_id,
            input.price,
            input.associated_class.as_deref(),
            &options,
        );

        Ok(Item {
            hash,
            associated_id: input.associated_id,
            associated_class: input.associated_class,
            title: input.title,
            quantity,
            price: input.price,
            taxable: input.taxable.unwrap_or(true),
            options,
            extra_info,
            actions: Container::new(),
            creator: None,
        })
    }

    /// Returns an updated copy. Removal (quantity ≤ 0) is decided by the
    /// cart before this is called.
    pub(crate) fn updated(&self, update: ItemUpdate) -> CartResult<Item> {
        let mut next = self.clone();

        if let Some(id) = update.associated_id {
            validate_id("associated_id", &id)?;
            next.associated_id = id;
        }
        if let Some(class) = update.associated_class {
            next.associated_class = Some(class);
        }
        if let Some(title) = update.title {
            validate_title(&title)?;
            next.title = title;
        }
        if let Some(quantity) = update.quantity {
            validate_quantity(quantity)?;
            next.quantity = quantity;
        }
        if let Some(price) = update.price {
            validate_price(price)?;
            next.price = price;
        }
        if let Some(taxable) = update.taxable {
            next.taxable = taxable;
        }
        if let Some(options) = options_map(update.options)? {
            next.options = options;
        }
        if let Some(extra_info) = extra_info_map(update.extra_info)? {
            next.extra_info = extra_info;
        }

        next.hash = item_hash(
            &next.associated_id,
            next.price,
            next.associated_class.as_deref(),
            &next.options,
        );
        Ok(next)
    }

    pub(crate) fn set_creator(&mut self, creator: Option<Creator>) {
        self.creator = creator;
    }

    pub(crate) fn actions_mut(&mut self) -> &mut Container<Action> {
        &mut self.actions
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn associated_id(&self) -> &str {
        &self.associated_id
    }

    pub fn associated_class(&self) -> Option<&str> {
        self.associated_class.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn is_taxable(&self) -> bool {
        self.taxable
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn extra_info(&self) -> &Map<String, Value> {
        &self.extra_info
    }

    /// Item-scoped actions, in order-key order.
    pub fn actions(&self) -> &Container<Action> {
        &self.actions
    }

    pub fn creator(&self) -> Option<&Creator> {
        self.creator.as_ref()
    }

    // -------------------------------------------------------------------------
    // Amounts
    // -------------------------------------------------------------------------

    /// quantity × price.
    pub fn total_price(&self) -> f64 {
        self.quantity as f64 * self.price
    }

    pub(crate) fn base(&self) -> ParentBase {
        let total = self.total_price();
        ParentBase {
            quantity: self.quantity as f64,
            total_price: total,
            items_subtotal: total,
            item_taxable: Some(self.taxable),
            accumulates: false,
        }
    }

    /// Resolves the item's actions against its own totals.
    pub fn resolved_actions(
        &self,
        builtin_tax: bool,
        handlers: &RuleHandlers,
    ) -> Vec<ResolvedAction> {
        resolve_actions(&self.actions, &self.base(), builtin_tax, handlers)
    }

    /// Total price plus every enabled action amount.
    pub fn subtotal(&self, handlers: &RuleHandlers) -> f64 {
        let resolved = self.resolved_actions(false, handlers);
        self.total_price() + resolved.iter().map(ResolvedAction::amount).sum::<f64>()
    }

    /// Amount of this item subject to tax.
    ///
    /// ## Rules
    /// - 0 when builtin tax is off or the item is not taxable
    /// - otherwise total price plus the amounts of taxable actions
    pub fn taxable_amount(&self, builtin_tax: bool, handlers: &RuleHandlers) -> f64 {
        if !builtin_tax || !self.taxable {
            return 0.0;
        }
        let resolved = self.resolved_actions(builtin_tax, handlers);
        self.total_price()
            + resolved
                .iter()
                .filter(|r| r.is_taxable())
                .map(ResolvedAction::amount)
                .sum::<f64>()
    }

    /// Re-resolves the external object this item stands for.
    pub fn associated_model(&self, resolver: &dyn ModelResolver) -> CartResult<Value> {
        let not_found = || CartError::NotFound {
            kind: EntityKind::Item,
            hash: self.hash.clone(),
        };

        let class = self.associated_class.as_deref().ok_or_else(not_found)?;
        resolver.resolve(class, &self.associated_id).ok_or_else(not_found)
    }

    pub(crate) fn filter_view(&self, handlers: &RuleHandlers) -> Value {
        json!({
            "hash": self.hash,
            "associated_id": self.associated_id,
            "associated_class": self.associated_class,
            "title": self.title,
            "quantity": self.quantity,
            "price": self.price,
            "taxable": self.taxable,
            "options": self.options,
            "extra_info": self.extra_info,
            "total_price": self.total_price(),
            "subtotal": self.subtotal(handlers),
        })
    }
}

impl Entity for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn hash(&self) -> &str {
        &self.hash
    }

    /// Quantities add up; everything else stays.
    fn absorb(&mut self, incoming: Self) -> Result<(), ValidationError> {
        self.quantity = self
            .quantity
            .checked_add(incoming.quantity)
            .ok_or_else(|| ValidationError::TooLarge {
                field: "quantity".to_string(),
            })?;
        Ok(())
    }
}

fn item_hash(id: &str, price: f64, class: Option<&str>, options: &Map<String, Value>) -> String {
    content_hash(
        EntityKind::Item,
        &json!({
            "id": id,
            "price": price,
            "associated_class": class,
            "options": options,
        }),
    )
}

fn options_map(options: Option<Value>) -> Result<Option<Map<String, Value>>, ValidationError> {
    match options {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ValidationError::invalid_type("options", "a map")),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionTarget, NewAction};
    use crate::config::CartConfig;
    use crate::resolver::MemoryResolver;

    fn shirt() -> NewItem {
        NewItem::new("SKU-1", "Shirt", 25.0)
            .associated_class("product")
            .options(json!({"size": "L", "color": "red"}))
    }

    fn with_actions(mut item: Item, actions: Vec<NewAction>) -> Item {
        let config = CartConfig::default();
        for (seq, input) in actions.into_iter().enumerate() {
            let action = Action::new(input, seq as u64 + 1, &config, &RuleHandlers::new()).unwrap();
            item.actions_mut().upsert(action).unwrap();
        }
        item.actions_mut().sort_by_key(Action::order_key);
        item
    }

    #[test]
    fn test_hash_ignores_option_key_order_and_title() {
        let a = Item::new(shirt()).unwrap();
        let b = Item::new(NewItem {
            title: "Shirt (red)".into(),
            quantity: Some(4),
            options: Some(json!({"color": "red", "size": "L"})),
            ..shirt()
        })
        .unwrap();
        let c = Item::new(shirt().options(json!({"size": "M"}))).unwrap();

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert!(a.hash().starts_with("item_"));
    }

    #[test]
    fn test_absorb_adds_quantity() {
        let mut a = Item::new(shirt().quantity(2)).unwrap();
        let b = Item::new(shirt().quantity(3)).unwrap();
        a.absorb(b).unwrap();
        assert_eq!(a.quantity(), 5);
    }

    #[test]
    fn test_absorb_rejects_overflowing_quantity() {
        let mut a = Item::new(shirt().quantity(i64::MAX)).unwrap();
        let b = Item::new(shirt().quantity(1)).unwrap();

        let err = a.absorb(b).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                field: "quantity".to_string()
            }
        );
        assert_eq!(a.quantity(), i64::MAX);
    }

    #[test]
    fn test_validation() {
        assert!(Item::new(NewItem::new("", "Shirt", 1.0)).is_err());
        assert!(Item::new(NewItem::new("SKU", "", 1.0)).is_err());
        assert!(Item::new(NewItem::new("SKU", "Shirt", -1.0)).is_err());
        assert!(Item::new(NewItem::new("SKU", "Shirt", 1.0).quantity(0)).is_err());
        assert!(Item::new(NewItem::new("SKU", "Shirt", 1.0).options(json!(1))).is_err());

        let item = Item::new(NewItem::new("SKU", "Shirt", 1.0)).unwrap();
        assert_eq!(item.quantity(), 1);
        assert!(item.is_taxable());
    }

    #[test]
    fn test_update_recomputes_hash() {
        let item = Item::new(shirt()).unwrap();
        let renamed = item
            .updated(ItemUpdate {
                title: Some("Tee".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(renamed.hash(), item.hash());

        let repriced = item
            .updated(ItemUpdate {
                price: Some(20.0),
                ..Default::default()
            })
            .unwrap();
        assert_ne!(repriced.hash(), item.hash());
        assert!(ItemUpdate::quantity(0).removes());
        assert!(!ItemUpdate::quantity(2).removes());
    }

    #[test]
    fn test_subtotal_and_taxable_amount() {
        let item = with_actions(
            Item::new(shirt().quantity(2)).unwrap(),
            vec![
                NewAction::new("disc", "Discount").value("-10%"),
                NewAction::new("wrap", "Gift wrap")
                    .value("3")
                    .rules(json!({"taxable": false})),
            ],
        );
        let handlers = RuleHandlers::new();

        assert_eq!(item.total_price(), 50.0);
        assert_eq!(item.subtotal(&handlers), 50.0 - 5.0 + 3.0);
        assert_eq!(item.taxable_amount(true, &handlers), 45.0);
        assert_eq!(item.taxable_amount(false, &handlers), 0.0);
    }

    #[test]
    fn test_non_taxable_item_has_no_taxable_amount() {
        let item = with_actions(
            Item::new(shirt().taxable(false)).unwrap(),
            vec![NewAction::new("fee", "Fee").value("2").target(ActionTarget::Price)],
        );
        let handlers = RuleHandlers::new();
        assert_eq!(item.taxable_amount(true, &handlers), 0.0);
        assert!(item
            .resolved_actions(true, &handlers)
            .iter()
            .all(|r| !r.is_taxable()));
    }

    #[test]
    fn test_associated_model() {
        let mut resolver = MemoryResolver::new();
        resolver.insert("product", "SKU-1", json!({"name": "Shirt"}));

        let item = Item::new(shirt()).unwrap();
        assert_eq!(item.associated_model(&resolver).unwrap(), json!({"name": "Shirt"}));

        let unclassed = Item::new(NewItem::new("SKU-1", "Shirt", 25.0)).unwrap();
        assert!(matches!(
            unclassed.associated_model(&resolver),
            Err(CartError::NotFound { .. })
        ));
    }
}
