//! # Action Rules
//!
//! Normalization of the raw rule input attached to an action.
//!
//! ## Rule Flags
//! ```text
//! ┌──────────────────────┬────────────────────────────────────────────────┐
//! │ enable               │ bool  - action is self-activated               │
//! │ taxable              │ bool  - amount counts toward the taxable base  │
//! │ allow_others_disable │ bool  - earlier actions may deactivate it      │
//! │ disable_others       │ Relation - which later actions it deactivates  │
//! │ include_calculations │ Relation - which earlier amounts join its base │
//! │ max_amount           │ Option<f64> - clamp for percentage amounts     │
//! │ min_amount           │ Option<f64> - clamp for percentage amounts     │
//! └──────────────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! Raw input is a JSON map, either stored literally on the action or
//! produced by a named handler at evaluation time. Missing keys fall back
//! to the defaults captured from the cart configuration when the action was
//! created.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::action::Action;
use crate::error::ValidationError;

// =============================================================================
// Relation
// =============================================================================

/// Which other actions a relational rule selects.
///
/// Only actions ordered strictly before the rule's subject are ever
/// considered; the relation narrows that set by group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Relation {
    /// Selects nothing.
    #[default]
    None,
    /// Every earlier action.
    PreviousActions,
    /// Earlier actions sharing the owner's group.
    SameGroupPreviousActions,
    /// Earlier actions of any other group.
    PreviousGroups,
    /// Earlier actions belonging to one of the listed groups.
    Groups(Vec<String>),
}

impl Relation {
    /// Lenient parse: unrecognized input normalizes to [`Relation::None`].
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => match s.as_str() {
                "previous_actions" => Relation::PreviousActions,
                "same_group_previous_actions" => Relation::SameGroupPreviousActions,
                "previous_groups" => Relation::PreviousGroups,
                _ => Relation::None,
            },
            Value::Array(items) => {
                let groups: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if groups.is_empty() {
                    Relation::None
                } else {
                    Relation::Groups(groups)
                }
            }
            _ => Relation::None,
        }
    }

    /// JSON form, the inverse of [`Relation::from_value`].
    pub fn to_value(&self) -> Value {
        match self {
            Relation::None => Value::Null,
            Relation::PreviousActions => json!("previous_actions"),
            Relation::SameGroupPreviousActions => json!("same_group_previous_actions"),
            Relation::PreviousGroups => json!("previous_groups"),
            Relation::Groups(groups) => json!(groups),
        }
    }

    /// Checks if the relation is set.
    pub fn is_set(&self) -> bool {
        !matches!(self, Relation::None)
    }

    /// Whether the rule owned by an action of `owner_group` selects an
    /// action of `other_group`.
    pub fn selects(&self, owner_group: &str, other_group: &str) -> bool {
        match self {
            Relation::None => false,
            Relation::PreviousActions => true,
            Relation::SameGroupPreviousActions => owner_group == other_group,
            Relation::PreviousGroups => owner_group != other_group,
            Relation::Groups(groups) => groups.iter().any(|g| g == other_group),
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Normalized rule set of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Rules {
    pub enable: bool,
    pub taxable: bool,
    pub allow_others_disable: bool,
    pub disable_others: Relation,
    pub include_calculations: Relation,
    pub max_amount: Option<f64>,
    pub min_amount: Option<f64>,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            enable: true,
            taxable: true,
            allow_others_disable: true,
            disable_others: Relation::None,
            include_calculations: Relation::None,
            max_amount: None,
            min_amount: None,
        }
    }
}

impl Rules {
    /// Normalizes `raw` layered over `defaults`.
    ///
    /// Boolean flags must be booleans and clamps must be numbers (or null);
    /// relation flags never fail.
    pub fn resolve(
        defaults: &Map<String, Value>,
        raw: &Map<String, Value>,
    ) -> Result<Rules, ValidationError> {
        let mut merged = defaults.clone();
        for (key, value) in raw {
            merged.insert(key.clone(), value.clone());
        }

        let fallback = Rules::default();
        Ok(Rules {
            enable: flag(&merged, "enable", fallback.enable)?,
            taxable: flag(&merged, "taxable", fallback.taxable)?,
            allow_others_disable: flag(
                &merged,
                "allow_others_disable",
                fallback.allow_others_disable,
            )?,
            disable_others: merged
                .get("disable_others")
                .map(Relation::from_value)
                .unwrap_or_default(),
            include_calculations: merged
                .get("include_calculations")
                .map(Relation::from_value)
                .unwrap_or_default(),
            max_amount: clamp(&merged, "max_amount")?,
            min_amount: clamp(&merged, "min_amount")?,
        })
    }

    /// JSON form used in filter views and details.
    pub fn to_value(&self) -> Value {
        json!({
            "enable": self.enable,
            "taxable": self.taxable,
            "allow_others_disable": self.allow_others_disable,
            "disable_others": self.disable_others.to_value(),
            "include_calculations": self.include_calculations.to_value(),
            "max_amount": self.max_amount,
            "min_amount": self.min_amount,
        })
    }
}

fn flag(map: &Map<String, Value>, key: &str, fallback: bool) -> Result<bool, ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(fallback),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ValidationError::invalid_type(
            &format!("rules.{}", key),
            "a boolean",
        )),
    }
}

fn clamp(map: &Map<String, Value>, key: &str) -> Result<Option<f64>, ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(_) => Err(ValidationError::invalid_type(
            &format!("rules.{}", key),
            "a number or null",
        )),
    }
}

/// The default rule map used when a cart configuration does not set one.
pub fn default_rule_map() -> Map<String, Value> {
    match Rules::default().to_value() {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// =============================================================================
// Rule Source & Handlers
// =============================================================================

/// Where an action's raw rules come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// A literal rule map stored with the action.
    Map(Map<String, Value>),
    /// The name of a handler registered on the cart.
    Handler(String),
}

impl Default for RuleSource {
    fn default() -> Self {
        RuleSource::Map(Map::new())
    }
}

/// A function producing raw rules for an action.
pub type RuleHandler = Arc<dyn Fn(&Action) -> Map<String, Value> + Send + Sync>;

/// Named rule handlers available to a cart.
#[derive(Clone, Default)]
pub struct RuleHandlers {
    handlers: HashMap<String, RuleHandler>,
}

impl RuleHandlers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Action) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Checks if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&RuleHandler> {
        self.handlers.get(name)
    }
}

impl fmt::Debug for RuleHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("RuleHandlers").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_relation_parsing() {
        assert_eq!(
            Relation::from_value(&json!("previous_actions")),
            Relation::PreviousActions
        );
        assert_eq!(
            Relation::from_value(&json!(["shipping", "fees"])),
            Relation::Groups(vec!["shipping".to_string(), "fees".to_string()])
        );
        assert_eq!(Relation::from_value(&json!("everything")), Relation::None);
        assert_eq!(Relation::from_value(&json!(42)), Relation::None);
        assert_eq!(Relation::from_value(&json!([])), Relation::None);
    }

    #[test]
    fn test_relation_selects() {
        assert!(Relation::PreviousActions.selects("a", "b"));
        assert!(Relation::SameGroupPreviousActions.selects("a", "a"));
        assert!(!Relation::SameGroupPreviousActions.selects("a", "b"));
        assert!(Relation::PreviousGroups.selects("a", "b"));
        assert!(!Relation::PreviousGroups.selects("a", "a"));
        assert!(Relation::Groups(vec!["b".into()]).selects("a", "b"));
        assert!(!Relation::None.selects("a", "a"));
    }

    #[test]
    fn test_resolve_layers_raw_over_defaults() {
        let defaults = default_rule_map();
        let rules = Rules::resolve(
            &defaults,
            &map(json!({"taxable": false, "min_amount": -20, "disable_others": "bogus"})),
        )
        .unwrap();

        assert!(rules.enable);
        assert!(!rules.taxable);
        assert_eq!(rules.min_amount, Some(-20.0));
        assert_eq!(rules.max_amount, None);
        assert_eq!(rules.disable_others, Relation::None);
    }

    #[test]
    fn test_resolve_rejects_wrong_types() {
        let defaults = default_rule_map();
        assert!(Rules::resolve(&defaults, &map(json!({"enable": "yes"}))).is_err());
        assert!(Rules::resolve(&defaults, &map(json!({"max_amount": "10"}))).is_err());
    }

    #[test]
    fn test_to_value_round_trips() {
        let rules = Rules {
            disable_others: Relation::Groups(vec!["promo".into()]),
            include_calculations: Relation::SameGroupPreviousActions,
            max_amount: Some(50.0),
            ..Rules::default()
        };
        let parsed = Rules::resolve(&Map::new(), &map(rules.to_value())).unwrap();
        assert_eq!(parsed, rules);
    }
}
