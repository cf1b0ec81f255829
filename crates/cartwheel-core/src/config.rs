//! # Cart Configuration
//!
//! Per-cart configuration bag.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CARTWHEEL_COMMERCIAL=false                                          │
//! │     CARTWHEEL_ACTION_GROUPS=discount,shipping                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     passed explicitly to CartConfig::load                              │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     commercial, builtin tax at 10%, no group ordering                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Once a cart is opened its configuration is persisted with it, and flows
//! top-down into every entity created afterwards (tax rate defaults, rule
//! defaults, group ranks).
//!
//! ## Configuration File Format
//! ```toml
//! commercial = true
//! builtin_tax = true
//! default_tax_rate = 8.25
//! action_groups_order = ["discount", "shipping"]
//!
//! [default_action_rules]
//! enable = true
//! taxable = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{CartError, CartResult};
use crate::rules::{default_rule_map, Rules};

/// Configuration of one cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartConfig {
    /// Commercial carts carry prices, actions and taxes.
    /// Non-commercial carts (wishlists) only hold items.
    #[serde(default = "default_true")]
    pub commercial: bool,

    /// Whether the builtin tax system is active.
    #[serde(default = "default_true")]
    pub builtin_tax: bool,

    /// Rate (percent) used for taxes applied without an explicit rate.
    #[serde(default = "default_tax_rate")]
    pub default_tax_rate: f64,

    /// Rule map every new action starts from.
    #[serde(default = "default_rule_map")]
    pub default_action_rules: Map<String, Value>,

    /// Groups in evaluation order. Actions of listed groups sort before
    /// actions of unlisted groups.
    #[serde(default)]
    pub action_groups_order: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_tax_rate() -> f64 {
    10.0
}

impl Default for CartConfig {
    fn default() -> Self {
        CartConfig {
            commercial: default_true(),
            builtin_tax: default_true(),
            default_tax_rate: default_tax_rate(),
            default_action_rules: default_rule_map(),
            action_groups_order: Vec::new(),
        }
    }
}

impl CartConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> CartResult<Self> {
        let config: CartConfig =
            toml::from_str(contents).map_err(|e| CartError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file, then applies environment
    /// overrides.
    pub fn load(path: impl AsRef<Path>) -> CartResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CartError::Config(format!("{}: {}", path.display(), e)))?;

        let mut config: CartConfig =
            toml::from_str(&contents).map_err(|e| CartError::Config(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;

        info!(path = %path.display(), "Cart config loaded");
        Ok(config)
    }

    /// Loads config or returns defaults (with environment overrides) if
    /// loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Failed to load cart config: {}. Using defaults.", e);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CartResult<()> {
        if !self.default_tax_rate.is_finite() || self.default_tax_rate < 0.0 {
            return Err(CartError::Config(format!(
                "default_tax_rate must be a non-negative number, got {}",
                self.default_tax_rate
            )));
        }

        if self.action_groups_order.iter().any(|g| g.trim().is_empty()) {
            return Err(CartError::Config(
                "action_groups_order must not contain empty group names".into(),
            ));
        }

        Rules::resolve(&self.default_action_rules, &Map::new())
            .map_err(|e| CartError::Config(format!("default_action_rules: {}", e)))?;

        Ok(())
    }

    /// Whether taxes apply: the cart must be commercial and use builtin tax.
    pub fn taxes_enabled(&self) -> bool {
        self.commercial && self.builtin_tax
    }

    /// Position of `group` in the configured ordering, if listed.
    pub fn group_rank(&self, group: &str) -> Option<usize> {
        self.action_groups_order.iter().position(|g| g == group)
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(commercial) = env_bool("CARTWHEEL_COMMERCIAL") {
            debug!(commercial, "Overriding commercial mode from environment");
            self.commercial = commercial;
        }

        if let Some(builtin_tax) = env_bool("CARTWHEEL_BUILTIN_TAX") {
            debug!(builtin_tax, "Overriding builtin tax from environment");
            self.builtin_tax = builtin_tax;
        }

        if let Ok(rate) = std::env::var("CARTWHEEL_DEFAULT_TAX_RATE") {
            match rate.parse::<f64>() {
                Ok(r) => self.default_tax_rate = r,
                Err(_) => warn!(rate = %rate, "Invalid default tax rate in environment"),
            }
        }

        if let Ok(groups) = std::env::var("CARTWHEEL_ACTION_GROUPS") {
            self.action_groups_order = groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Unrecognized boolean in environment");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CartConfig::default();
        assert!(config.commercial);
        assert!(config.builtin_tax);
        assert!(config.taxes_enabled());
        assert_eq!(config.default_tax_rate, 10.0);
        assert_eq!(config.default_action_rules.get("enable"), Some(&Value::Bool(true)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let config = CartConfig::from_toml_str(
            r#"
            builtin_tax = false
            default_tax_rate = 8.25
            action_groups_order = ["discount", "shipping"]

            [default_action_rules]
            taxable = false
            "#,
        )
        .unwrap();

        assert!(config.commercial);
        assert!(!config.builtin_tax);
        assert!(!config.taxes_enabled());
        assert_eq!(config.group_rank("shipping"), Some(1));
        assert_eq!(config.group_rank("fees"), None);
        assert_eq!(
            config.default_action_rules.get("taxable"),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(CartConfig::from_toml_str("default_tax_rate = -1.0").is_err());
        assert!(CartConfig::from_toml_str("action_groups_order = [\"\"]").is_err());
        assert!(CartConfig::from_toml_str(
            "[default_action_rules]\nenable = \"sometimes\""
        )
        .is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = CartConfig::load("/nonexistent/cartwheel.toml").unwrap_err();
        assert!(matches!(err, CartError::Config(_)));
    }
}
