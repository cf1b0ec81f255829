//! # Action Engine
//!
//! Fees and discounts applied to an item or to the whole cart.
//!
//! ## Ordering
//! Every action carries an [`OrderKey`]: its group rank (from the cart's
//! `action_groups_order`) and a strictly increasing sequence number taken
//! at construction. Within one container the keys form a strict total
//! order; it is the only dependency order between actions.
//!
//! ```text
//! order id  "1.<rank>.<seq>"   group listed in action_groups_order
//!           "2.0.<seq>"        group not listed (sorts after every ranked group)
//! ```
//!
//! ## Resolution (single pass, ascending order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ for each action A, in order:                                            │
//! │   deactivated = allow_others_disable(A) and some earlier enabled P      │
//! │                 has disable_others(P) selecting A                        │
//! │   enabled     = enable(A) and not deactivated                           │
//! │   target      = parent base for target(A)                               │
//! │                 (cart total_price/price: + earlier cart action amounts) │
//! │                 + amounts of earlier actions include_calculations(A)     │
//! │                   selects                                               │
//! │   amount      = percentage → target × value / 100, then clamped          │
//! │                 fixed      → value (× parent quantity for target=price)  │
//! │   amount      = max(-target, amount)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rules only ever look backward, so no action's state depends on a later
//! action and one pass resolves the whole container.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::config::CartConfig;
use crate::container::{Container, Creator, Entity, EntityKind};
use crate::error::{CartResult, ValidationError};
use crate::identity::content_hash;
use crate::rules::{RuleHandlers, RuleSource, Rules};
use crate::validation::{validate_group, validate_id, validate_title};
use crate::value::ActionValue;

/// Group assigned to actions created without one.
pub const DEFAULT_GROUP: &str = "unknown";

// =============================================================================
// Target
// =============================================================================

/// The base amount an action is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    /// Subtotal of the items (the item's own total price at item level).
    ItemsSubtotal,
    /// Running total of the parent node.
    #[default]
    TotalPrice,
    /// Unit price: fixed values are multiplied by the parent quantity.
    Price,
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::ItemsSubtotal => write!(f, "items_subtotal"),
            ActionTarget::TotalPrice => write!(f, "total_price"),
            ActionTarget::Price => write!(f, "price"),
        }
    }
}

// =============================================================================
// Order Key
// =============================================================================

/// Sort key of an action: (tier, group rank, sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    rank: Option<usize>,
    sequence: u64,
}

impl OrderKey {
    pub(crate) fn new(rank: Option<usize>, sequence: u64) -> Self {
        OrderKey { rank, sequence }
    }

    /// Construction sequence number.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Rank of the group in the configured ordering, if listed.
    pub const fn rank(&self) -> Option<usize> {
        self.rank
    }

    /// Dotted order id: `1.<rank>.<seq>` or `2.0.<seq>`.
    pub fn id(&self) -> String {
        match self.rank {
            Some(rank) => format!("1.{}.{}", rank, self.sequence),
            None => format!("2.0.{}", self.sequence),
        }
    }

    fn tuple(&self) -> (u8, usize, u64) {
        match self.rank {
            Some(rank) => (1, rank, self.sequence),
            None => (2, 0, self.sequence),
        }
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tuple().cmp(&other.tuple())
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Attributes for applying a new action.
///
/// ## Example
/// ```rust
/// use cartwheel_core::action::{ActionTarget, NewAction};
/// use serde_json::json;
///
/// let promo = NewAction::new("SUMMER", "Summer sale")
///     .group("discount")
///     .target(ActionTarget::ItemsSubtotal)
///     .value("-10%")
///     .rules(json!({"max_amount": -50}));
/// assert_eq!(promo.id, "SUMMER");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub target: Option<ActionTarget>,
    /// Percentage string (`"10%"`), numeric string (`"-5"`) or number.
    #[serde(default)]
    pub value: Value,
    /// Literal rule map.
    #[serde(default)]
    pub rules: Option<Value>,
    /// Name of a registered rule handler (instead of `rules`).
    #[serde(default)]
    pub rule_handler: Option<String>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

impl NewAction {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        NewAction {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn target(mut self, target: ActionTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn rules(mut self, rules: Value) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn rule_handler(mut self, name: impl Into<String>) -> Self {
        self.rule_handler = Some(name.into());
        self
    }

    pub fn extra_info(mut self, extra_info: Value) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Attribute changes for an existing action. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionUpdate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub target: Option<ActionTarget>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub rules: Option<Value>,
    #[serde(default)]
    pub rule_handler: Option<String>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

// =============================================================================
// Action
// =============================================================================

/// A rule-governed fee or discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    hash: String,
    id: String,
    group: String,
    title: String,
    target: ActionTarget,
    value: ActionValue,
    rules: RuleSource,
    rule_defaults: Map<String, Value>,
    extra_info: Map<String, Value>,
    order: OrderKey,
    #[serde(default)]
    creator: Option<Creator>,
}

impl Action {
    /// Builds a detached action.
    ///
    /// `sequence` must come from the owning cart's monotonic counter; the
    /// cart does this when an action is applied through it.
    pub fn new(
        input: NewAction,
        sequence: u64,
        config: &CartConfig,
        handlers: &RuleHandlers,
    ) -> CartResult<Action> {
        validate_id("id", &input.id)?;
        validate_title(&input.title)?;

        let group = input.group.unwrap_or_else(|| DEFAULT_GROUP.to_string());
        validate_group(&group)?;

        let value = parse_value(&input.value)?;
        let rule_defaults = config.default_action_rules.clone();
        let rules = rule_source(input.rules, input.rule_handler, &rule_defaults, handlers)?
            .unwrap_or_default();
        let extra_info = extra_info_map(input.extra_info)?.unwrap_or_default();

        let order = OrderKey::new(config.group_rank(&group), sequence);
        let hash = action_hash(&input.id, &group);

        Ok(Action {
            hash,
            id: input.id,
            group,
            title: input.title,
            target: input.target.unwrap_or_default(),
            value,
            rules,
            rule_defaults,
            extra_info,
            order,
            creator: None,
        })
    }

    /// Returns an updated copy; `self` is untouched on error.
    pub(crate) fn updated(
        &self,
        update: ActionUpdate,
        config: &CartConfig,
        handlers: &RuleHandlers,
    ) -> CartResult<Action> {
        let mut next = self.clone();

        if let Some(id) = update.id {
            validate_id("id", &id)?;
            next.id = id;
        }
        if let Some(group) = update.group {
            validate_group(&group)?;
            next.order = OrderKey::new(config.group_rank(&group), self.order.sequence);
            next.group = group;
        }
        if let Some(title) = update.title {
            validate_title(&title)?;
            next.title = title;
        }
        if let Some(target) = update.target {
            next.target = target;
        }
        if let Some(value) = update.value {
            next.value = parse_value(&value)?;
        }
        if let Some(source) =
            rule_source(update.rules, update.rule_handler, &self.rule_defaults, handlers)?
        {
            next.rules = source;
        }
        if let Some(extra_info) = extra_info_map(update.extra_info)? {
            next.extra_info = extra_info;
        }

        next.hash = action_hash(&next.id, &next.group);
        Ok(next)
    }

    /// Recomputes the group rank after a configuration change.
    pub(crate) fn rerank(&mut self, config: &CartConfig) {
        self.order = OrderKey::new(config.group_rank(&self.group), self.order.sequence);
    }

    pub(crate) fn set_creator(&mut self, creator: Option<Creator>) {
        self.creator = creator;
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn target(&self) -> ActionTarget {
        self.target
    }

    pub fn value(&self) -> ActionValue {
        self.value
    }

    pub fn rule_source(&self) -> &RuleSource {
        &self.rules
    }

    pub fn extra_info(&self) -> &Map<String, Value> {
        &self.extra_info
    }

    pub fn order_key(&self) -> OrderKey {
        self.order
    }

    /// Dotted order id, e.g. `1.0.12`.
    pub fn order_id(&self) -> String {
        self.order.id()
    }

    /// Handle of the container that owns this action, if attached.
    pub fn creator(&self) -> Option<&Creator> {
        self.creator.as_ref()
    }

    /// Whether `self` is ordered strictly before `other`.
    pub fn is_previous_of(&self, other: &Action) -> bool {
        self.order < other.order
    }

    /// Whether `self` is ordered strictly after `other`.
    pub fn is_behind_of(&self, other: &Action) -> bool {
        self.order > other.order
    }

    /// Normalized rules.
    ///
    /// Handler-produced maps that fail to normalize, and handlers that are
    /// no longer registered, fall back to the action's default rules.
    pub fn rules(&self, handlers: &RuleHandlers) -> Rules {
        let raw = match &self.rules {
            RuleSource::Map(map) => map.clone(),
            RuleSource::Handler(name) => match handlers.get(name) {
                Some(handler) => handler(self),
                None => {
                    warn!(action = %self.hash, handler = %name, "Rule handler not registered");
                    Map::new()
                }
            },
        };

        Rules::resolve(&self.rule_defaults, &raw).unwrap_or_else(|e| {
            warn!(action = %self.hash, error = %e, "Rules failed to normalize, using defaults");
            Rules::resolve(&self.rule_defaults, &Map::new()).unwrap_or_default()
        })
    }

    /// Filter view: queryable attributes plus resolved state.
    pub(crate) fn filter_view(&self, resolved: Option<&ResolvedAction>) -> Value {
        json!({
            "hash": self.hash,
            "id": self.id,
            "group": self.group,
            "title": self.title,
            "target": self.target.to_string(),
            "value": self.value.to_string(),
            "rules": resolved.map(|r| r.rules.to_value()),
            "extra_info": self.extra_info,
            "order_id": self.order.id(),
            "enabled": resolved.is_some_and(ResolvedAction::is_enabled),
            "taxable": resolved.is_some_and(ResolvedAction::is_taxable),
        })
    }
}

impl Entity for Action {
    const KIND: EntityKind = EntityKind::Action;

    fn hash(&self) -> &str {
        &self.hash
    }

    /// Incoming attributes replace the current ones; the order key and
    /// owner stay.
    fn absorb(&mut self, incoming: Self) -> Result<(), ValidationError> {
        self.title = incoming.title;
        self.target = incoming.target;
        self.value = incoming.value;
        self.rules = incoming.rules;
        self.extra_info = incoming.extra_info;
        Ok(())
    }
}

fn action_hash(id: &str, group: &str) -> String {
    content_hash(EntityKind::Action, &json!({ "id": id, "group": group }))
}

fn parse_value(value: &Value) -> Result<ActionValue, ValidationError> {
    match value {
        Value::Null => Err(ValidationError::required("value")),
        Value::String(s) => s.parse(),
        Value::Number(n) => n
            .as_f64()
            .filter(|n| n.is_finite())
            .map(ActionValue::Fixed)
            .ok_or_else(|| ValidationError::invalid_format("value", "must be a finite number")),
        _ => Err(ValidationError::invalid_type(
            "value",
            "a number or percentage string",
        )),
    }
}

fn rule_source(
    rules: Option<Value>,
    handler: Option<String>,
    defaults: &Map<String, Value>,
    handlers: &RuleHandlers,
) -> Result<Option<RuleSource>, ValidationError> {
    match (rules, handler) {
        (Some(_), Some(_)) => Err(ValidationError::invalid_format(
            "rules",
            "set either a rule map or a rule handler, not both",
        )),
        (Some(Value::Object(map)), None) => {
            Rules::resolve(defaults, &map)?;
            Ok(Some(RuleSource::Map(map)))
        }
        (Some(_), None) => Err(ValidationError::invalid_type("rules", "a map")),
        (None, Some(name)) => {
            if !handlers.contains(&name) {
                return Err(ValidationError::invalid_format(
                    "rule_handler",
                    format!("no handler registered as '{}'", name),
                ));
            }
            Ok(Some(RuleSource::Handler(name)))
        }
        (None, None) => Ok(None),
    }
}

pub(crate) fn extra_info_map(
    extra_info: Option<Value>,
) -> Result<Option<Map<String, Value>>, ValidationError> {
    match extra_info {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ValidationError::invalid_type("extra_info", "a map")),
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Amounts an action can target, taken from its parent node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ParentBase {
    /// Item quantity; 1 for the cart.
    pub quantity: f64,
    /// Parent total before any action: quantity × price for an item,
    /// the items subtotal for the cart.
    pub total_price: f64,
    /// Items subtotal of the parent (an item's own total price).
    pub items_subtotal: f64,
    /// Taxability of the parent item; `None` for the cart.
    pub item_taxable: Option<bool>,
    /// Earlier action amounts accumulate into the running total that
    /// `total_price` and `price` targets see. Set for the cart.
    pub accumulates: bool,
}

impl ParentBase {
    fn target_amount(&self, target: ActionTarget, applied: f64) -> f64 {
        match target {
            ActionTarget::ItemsSubtotal => self.items_subtotal,
            ActionTarget::TotalPrice | ActionTarget::Price if self.accumulates => {
                self.total_price + applied
            }
            ActionTarget::TotalPrice | ActionTarget::Price => self.total_price,
        }
    }
}

/// Resolved state of one action within its container.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    hash: String,
    group: String,
    order: OrderKey,
    rules: Rules,
    deactivated: bool,
    taxable: bool,
    amount: f64,
}

impl ResolvedAction {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// The `enable` rule.
    pub fn is_self_activated(&self) -> bool {
        self.rules.enable
    }

    /// Deactivated by an earlier enabled action's `disable_others`.
    pub fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    pub fn is_enabled(&self) -> bool {
        self.is_self_activated() && !self.deactivated
    }

    pub fn is_taxable(&self) -> bool {
        self.taxable
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }
}

/// Resolves every action of a container in ascending order.
///
/// The result is in container order, which is the order-key order.
pub(crate) fn resolve_actions(
    actions: &Container<Action>,
    base: &ParentBase,
    builtin_tax: bool,
    handlers: &RuleHandlers,
) -> Vec<ResolvedAction> {
    let mut resolved: Vec<ResolvedAction> = Vec::with_capacity(actions.len());

    for action in actions {
        let rules = action.rules(handlers);

        let deactivated = rules.allow_others_disable
            && resolved.iter().any(|p| {
                p.order < action.order
                    && p.is_enabled()
                    && p.rules.disable_others.selects(&p.group, &action.group)
            });

        let enabled = rules.enable && !deactivated;
        let amount = if enabled {
            compute_amount(action, &rules, &resolved, base)
        } else {
            0.0
        };

        let taxable = if builtin_tax && base.item_taxable == Some(false) {
            false
        } else {
            rules.taxable
        };

        resolved.push(ResolvedAction {
            hash: action.hash.clone(),
            group: action.group.clone(),
            order: action.order,
            rules,
            deactivated,
            taxable,
            amount,
        });
    }

    resolved
}

fn compute_amount(
    action: &Action,
    rules: &Rules,
    earlier: &[ResolvedAction],
    base: &ParentBase,
) -> f64 {
    let applied = earlier
        .iter()
        .filter(|e| e.order < action.order)
        .map(|e| e.amount)
        .sum::<f64>();
    let mut target = base.target_amount(action.target, applied);

    if rules.include_calculations.is_set() {
        target += earlier
            .iter()
            .filter(|e| {
                e.order < action.order
                    && rules.include_calculations.selects(&action.group, &e.group)
            })
            .map(|e| e.amount)
            .sum::<f64>();
    }

    let amount = match action.value {
        ActionValue::Percentage(percent) => {
            clamp_percentage(target * percent / 100.0, rules.min_amount, rules.max_amount)
        }
        ActionValue::Fixed(value) if action.target == ActionTarget::Price => base.quantity * value,
        ActionValue::Fixed(value) => value,
    };

    let amount = amount.max(-target);
    if amount == 0.0 {
        0.0
    } else {
        amount
    }
}

/// Clamps a percentage amount.
///
/// Negative amounts: `max_amount` first, then `min_amount`, so a
/// `min_amount` like -20 caps a discount's magnitude. Non-negative
/// amounts: `min_amount` first, then `max_amount`.
fn clamp_percentage(amount: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let mut amount = amount;

    if amount < 0.0 {
        if let Some(max) = max {
            amount = amount.min(max);
        }
        if let Some(min) = min {
            amount = amount.max(min);
        }
    } else {
        if let Some(min) = min {
            amount = amount.max(min);
        }
        if let Some(max) = max {
            amount = amount.min(max);
        }
    }

    amount
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_groups(groups: &[&str]) -> CartConfig {
        CartConfig {
            action_groups_order: groups.iter().map(|g| g.to_string()).collect(),
            ..CartConfig::default()
        }
    }

    fn action(input: NewAction, sequence: u64, config: &CartConfig) -> Action {
        Action::new(input, sequence, config, &RuleHandlers::new()).unwrap()
    }

    fn item_base(quantity: f64, price: f64) -> ParentBase {
        ParentBase {
            quantity,
            total_price: quantity * price,
            items_subtotal: quantity * price,
            item_taxable: Some(true),
            accumulates: false,
        }
    }

    fn container(actions: Vec<Action>) -> Container<Action> {
        let mut c = Container::new();
        for a in actions {
            c.upsert(a).unwrap();
        }
        c.sort_by_key(|a| a.order_key());
        c
    }

    fn amounts(c: &Container<Action>, base: &ParentBase) -> Vec<f64> {
        resolve_actions(c, base, true, &RuleHandlers::new())
            .iter()
            .map(ResolvedAction::amount)
            .collect()
    }

    #[test]
    fn test_hash_depends_only_on_id_and_group() {
        let config = CartConfig::default();
        let a = action(NewAction::new("ship", "Shipping").group("fees").value("5"), 1, &config);
        let b = action(
            NewAction::new("ship", "Express").group("fees").value("9%"),
            2,
            &config,
        );
        let c = action(NewAction::new("ship", "Shipping").group("promo").value("5"), 3, &config);

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());

        let renamed = a
            .updated(
                ActionUpdate {
                    title: Some("Renamed".into()),
                    value: Some(json!("-3%")),
                    rules: Some(json!({"taxable": false})),
                    ..Default::default()
                },
                &config,
                &RuleHandlers::new(),
            )
            .unwrap();
        assert_eq!(renamed.hash(), a.hash());
    }

    #[test]
    fn test_defaults_and_validation() {
        let config = CartConfig::default();
        let a = action(NewAction::new("fee", "Fee").value(2), 1, &config);
        assert_eq!(a.group(), DEFAULT_GROUP);
        assert_eq!(a.target(), ActionTarget::TotalPrice);
        assert_eq!(a.value(), ActionValue::Fixed(2.0));

        let handlers = RuleHandlers::new();
        let bad = [
            NewAction::new("", "Fee").value(1),
            NewAction::new("fee", "").value(1),
            NewAction::new("fee", "Fee"),
            NewAction::new("fee", "Fee").value("ten"),
            NewAction::new("fee", "Fee").value(1).rules(json!(["enable"])),
            NewAction::new("fee", "Fee").value(1).extra_info(json!("note")),
            NewAction::new("fee", "Fee").value(1).rule_handler("missing"),
        ];
        for input in bad {
            assert!(Action::new(input, 1, &config, &handlers).is_err());
        }
    }

    #[test]
    fn test_order_key_is_strict_total_order() {
        let config = config_with_groups(&["discount", "shipping"]);
        let shipping = action(NewAction::new("s", "S").group("shipping").value(1), 1, &config);
        let discount = action(NewAction::new("d", "D").group("discount").value(1), 2, &config);
        let other = action(NewAction::new("o", "O").group("misc").value(1), 3, &config);
        let discount2 = action(NewAction::new("d2", "D2").group("discount").value(1), 4, &config);

        assert_eq!(discount.order_id(), "1.0.2");
        assert_eq!(shipping.order_id(), "1.1.1");
        assert_eq!(other.order_id(), "2.0.3");

        let all = [&shipping, &discount, &other, &discount2];
        for a in all {
            for b in all {
                if a.hash() == b.hash() {
                    assert!(!a.is_previous_of(b) && !a.is_behind_of(b));
                } else {
                    assert!(a.is_previous_of(b) ^ a.is_behind_of(b));
                    assert_eq!(a.is_previous_of(b), a.order_key() < b.order_key());
                }
            }
        }

        assert!(discount.is_previous_of(&discount2));
        assert!(discount2.is_previous_of(&shipping));
        assert!(shipping.is_previous_of(&other));
    }

    #[test]
    fn test_percentage_of_items_subtotal() {
        let config = CartConfig::default();
        let c = container(vec![action(
            NewAction::new("p", "Ten percent")
                .target(ActionTarget::ItemsSubtotal)
                .value("10%"),
            1,
            &config,
        )]);

        assert_eq!(amounts(&c, &item_base(1.0, 100.0)), vec![10.0]);
    }

    #[test]
    fn test_fixed_value_on_price_multiplies_quantity() {
        let config = CartConfig::default();
        let c = container(vec![action(
            NewAction::new("f", "Per unit")
                .target(ActionTarget::Price)
                .value("-5"),
            1,
            &config,
        )]);

        assert_eq!(amounts(&c, &item_base(3.0, 20.0)), vec![-15.0]);
        // Guard: the discount never exceeds the target amount.
        assert_eq!(amounts(&c, &item_base(3.0, 2.0)), vec![-6.0]);
    }

    #[test]
    fn test_negative_percentage_clamped_by_min_amount() {
        let config = CartConfig::default();
        let c = container(vec![action(
            NewAction::new("d", "Capped discount")
                .value("-5%")
                .rules(json!({"min_amount": -20})),
            1,
            &config,
        )]);

        assert_eq!(amounts(&c, &item_base(1.0, 1000.0)), vec![-20.0]);
    }

    #[test]
    fn test_clamp_percentage_branches() {
        assert_eq!(clamp_percentage(-50.0, Some(-20.0), None), -20.0);
        assert_eq!(clamp_percentage(-2.0, None, Some(-5.0)), -5.0);
        assert_eq!(clamp_percentage(3.0, Some(5.0), None), 5.0);
        assert_eq!(clamp_percentage(30.0, None, Some(12.0)), 12.0);
        assert_eq!(clamp_percentage(7.0, Some(5.0), Some(12.0)), 7.0);
    }

    #[test]
    fn test_disabled_action_has_zero_amount() {
        let config = CartConfig::default();
        let c = container(vec![action(
            NewAction::new("off", "Off")
                .value("-10%")
                .rules(json!({"enable": false})),
            1,
            &config,
        )]);

        let resolved = resolve_actions(&c, &item_base(1.0, 100.0), true, &RuleHandlers::new());
        assert!(!resolved[0].is_enabled());
        assert!(!resolved[0].is_self_activated());
        assert_eq!(resolved[0].amount(), 0.0);
    }

    #[test]
    fn test_earlier_action_disables_later_ones() {
        let config = config_with_groups(&["vip", "promo"]);
        let vip = action(
            NewAction::new("vip", "VIP")
                .group("vip")
                .value("-20%")
                .rules(json!({"disable_others": "previous_groups"})),
            1,
            &config,
        );
        let promo = action(
            NewAction::new("promo", "Promo").group("promo").value("-5%"),
            2,
            &config,
        );
        let same = action(NewAction::new("vip2", "VIP bonus").group("vip").value("-1"), 3, &config);

        let c = container(vec![promo, vip, same]);
        let resolved = resolve_actions(&c, &item_base(1.0, 100.0), true, &RuleHandlers::new());

        let by_id = |id: &str| {
            let hash = action_hash(id, if id == "promo" { "promo" } else { "vip" });
            resolved.iter().find(|r| r.hash() == hash).cloned().unwrap()
        };
        assert!(by_id("vip").is_enabled());
        assert!(by_id("promo").is_deactivated());
        assert_eq!(by_id("promo").amount(), 0.0);
        // Same group is not "previous_groups".
        assert!(by_id("vip2").is_enabled());
    }

    #[test]
    fn test_later_action_cannot_disable_earlier() {
        let config = CartConfig::default();
        let first = action(NewAction::new("a1", "First").value("-10%"), 1, &config);
        let second = action(
            NewAction::new("a2", "Second")
                .value("-1")
                .rules(json!({"disable_others": "previous_actions"})),
            2,
            &config,
        );

        let c = container(vec![first, second]);
        let resolved = resolve_actions(&c, &item_base(1.0, 100.0), true, &RuleHandlers::new());
        assert!(resolved.iter().all(ResolvedAction::is_enabled));
        assert_eq!(resolved[0].amount(), -10.0);
    }

    #[test]
    fn test_allow_others_disable_false_is_immune() {
        let config = CartConfig::default();
        let first = action(
            NewAction::new("a1", "First")
                .value("-1")
                .rules(json!({"disable_others": "previous_actions"})),
            1,
            &config,
        );
        let second = action(
            NewAction::new("a2", "Second")
                .value("-2")
                .rules(json!({"allow_others_disable": false})),
            2,
            &config,
        );

        let c = container(vec![first, second]);
        let resolved = resolve_actions(&c, &item_base(1.0, 100.0), true, &RuleHandlers::new());
        assert!(!resolved[1].is_deactivated());
        assert_eq!(resolved[1].amount(), -2.0);
    }

    #[test]
    fn test_explicit_group_list_disables_matching_groups() {
        let config = CartConfig::default();
        let first = action(
            NewAction::new("a1", "Exclusive")
                .group("exclusive")
                .value("-1")
                .rules(json!({"disable_others": ["coupon"]})),
            1,
            &config,
        );
        let coupon = action(NewAction::new("c", "Coupon").group("coupon").value("-2"), 2, &config);
        let fee = action(NewAction::new("f", "Fee").group("fee").value("3"), 3, &config);

        let c = container(vec![first, coupon, fee]);
        let resolved = resolve_actions(&c, &item_base(1.0, 100.0), true, &RuleHandlers::new());
        assert!(resolved[1].is_deactivated());
        assert!(!resolved[2].is_deactivated());
    }

    #[test]
    fn test_deactivated_action_does_not_disable_others() {
        let config = CartConfig::default();
        let a = action(
            NewAction::new("a", "A")
                .value("-1")
                .rules(json!({"disable_others": "previous_actions"})),
            1,
            &config,
        );
        let b = action(
            NewAction::new("b", "B")
                .value("-1")
                .rules(json!({"disable_others": "previous_actions"})),
            2,
            &config,
        );
        let c_action = action(NewAction::new("c", "C").value("-1"), 3, &config);

        let c = container(vec![a, b, c_action]);
        let resolved = resolve_actions(&c, &item_base(1.0, 100.0), true, &RuleHandlers::new());
        assert!(resolved[0].is_enabled());
        assert!(resolved[1].is_deactivated());
        // Disabled by `a`, not by the deactivated `b`.
        assert!(resolved[2].is_deactivated());
    }

    #[test]
    fn test_include_calculations_adds_earlier_amounts() {
        let config = CartConfig::default();
        let discount = action(NewAction::new("d", "Discount").value("-20"), 1, &config);
        let fee = action(
            NewAction::new("f", "Fee on discounted total")
                .value("10%")
                .rules(json!({"include_calculations": "previous_actions"})),
            2,
            &config,
        );
        let plain = action(NewAction::new("p", "Plain fee").value("10%"), 3, &config);

        let c = container(vec![discount, fee, plain]);
        assert_eq!(amounts(&c, &item_base(1.0, 100.0)), vec![-20.0, 8.0, 10.0]);
    }

    #[test]
    fn test_item_taxability_overrides_rule_under_builtin_tax() {
        let config = CartConfig::default();
        let c = container(vec![action(NewAction::new("f", "Fee").value("1"), 1, &config)]);
        let base = ParentBase {
            item_taxable: Some(false),
            ..item_base(1.0, 10.0)
        };

        let with_tax = resolve_actions(&c, &base, true, &RuleHandlers::new());
        assert!(!with_tax[0].is_taxable());

        let without_tax = resolve_actions(&c, &base, false, &RuleHandlers::new());
        assert!(without_tax[0].is_taxable());
    }

    #[test]
    fn test_rule_handler_drives_rules() {
        let config = CartConfig::default();
        let mut handlers = RuleHandlers::new();
        handlers.register("weekend_only", |a: &Action| {
            let mut map = Map::new();
            map.insert("enable".into(), json!(a.extra_info().get("weekend") == Some(&json!(true))));
            map
        });

        let on = Action::new(
            NewAction::new("w", "Weekend")
                .value("-1")
                .rule_handler("weekend_only")
                .extra_info(json!({"weekend": true})),
            1,
            &config,
            &handlers,
        )
        .unwrap();
        assert!(on.rules(&handlers).enable);

        // Without the handler the default rules apply.
        assert!(on.rules(&RuleHandlers::new()).enable);

        let off = on
            .updated(
                ActionUpdate {
                    extra_info: Some(json!({"weekend": false})),
                    ..Default::default()
                },
                &config,
                &handlers,
            )
            .unwrap();
        assert!(!off.rules(&handlers).enable);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let config = CartConfig::default();
        let c = container(vec![
            action(NewAction::new("a", "A").value("-12.5%"), 1, &config),
            action(NewAction::new("b", "B").value("3.3"), 2, &config),
        ]);
        let base = item_base(3.0, 33.33);
        let first = resolve_actions(&c, &base, true, &RuleHandlers::new());
        let second = resolve_actions(&c, &base, true, &RuleHandlers::new());
        assert_eq!(first, second);
    }
}
