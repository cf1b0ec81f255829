//! # Action Value
//!
//! The value of an action is either a percentage of its target amount or a
//! fixed amount.
//!
//! ## Accepted Forms
//! ```text
//! "10%"    → Percentage(10.0)     "-5"     → Fixed(-5.0)
//! "-2.5%"  → Percentage(-2.5)     "+3.75"  → Fixed(3.75)
//! 12.5     → Fixed(12.5)          "abc", "5%%", "1e3", "" → InvalidFormat
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Parsed action value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawValue", into = "String")]
pub enum ActionValue {
    /// Percent of the target amount (`10.0` means 10%).
    Percentage(f64),
    /// Fixed amount.
    Fixed(f64),
}

impl ActionValue {
    /// Checks if the value is a percentage.
    pub const fn is_percentage(&self) -> bool {
        matches!(self, ActionValue::Percentage(_))
    }

    /// The numeric part of the value.
    pub const fn number(&self) -> f64 {
        match self {
            ActionValue::Percentage(n) | ActionValue::Fixed(n) => *n,
        }
    }
}

impl Default for ActionValue {
    fn default() -> Self {
        ActionValue::Fixed(0.0)
    }
}

impl fmt::Display for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionValue::Percentage(n) => write!(f, "{}%", n),
            ActionValue::Fixed(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for ActionValue {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_suffix('%') {
            Some(number) => parse_number(number).map(ActionValue::Percentage),
            None => parse_number(s).map(ActionValue::Fixed),
        }
    }
}

impl From<ActionValue> for String {
    fn from(value: ActionValue) -> Self {
        value.to_string()
    }
}

/// Wire form accepted when deserializing: a string or a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Number(f64),
}

impl TryFrom<RawValue> for ActionValue {
    type Error = ValidationError;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        match raw {
            RawValue::Text(s) => s.parse(),
            RawValue::Number(n) if n.is_finite() => Ok(ActionValue::Fixed(n)),
            RawValue::Number(_) => Err(ValidationError::invalid_format(
                "value",
                "must be a finite number",
            )),
        }
    }
}

/// Parses `[+-]digits[.digits]` into a finite number.
fn parse_number(s: &str) -> Result<f64, ValidationError> {
    let malformed = || {
        ValidationError::invalid_format(
            "value",
            format!("'{}' is not a number or percentage", s),
        )
    };

    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut parts = unsigned.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();

    let digits_ok = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    let has_digits = !whole.is_empty() || fraction.is_some_and(|f| !f.is_empty());

    if !has_digits || !digits_ok(whole) || !fraction.map_or(true, digits_ok) {
        return Err(malformed());
    }

    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percentages() {
        assert_eq!("10%".parse::<ActionValue>(), Ok(ActionValue::Percentage(10.0)));
        assert_eq!("-2.5%".parse::<ActionValue>(), Ok(ActionValue::Percentage(-2.5)));
        assert_eq!(" +7% ".parse::<ActionValue>(), Ok(ActionValue::Percentage(7.0)));
    }

    #[test]
    fn test_parse_fixed() {
        assert_eq!("-5".parse::<ActionValue>(), Ok(ActionValue::Fixed(-5.0)));
        assert_eq!("3.75".parse::<ActionValue>(), Ok(ActionValue::Fixed(3.75)));
        assert_eq!(".5".parse::<ActionValue>(), Ok(ActionValue::Fixed(0.5)));
    }

    #[test]
    fn test_reject_malformed() {
        for bad in ["", "%", "abc", "5%%", "1e3", "--5", "1.2.3", "NaN", "inf", "-"] {
            assert!(bad.parse::<ActionValue>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_reject_out_of_range() {
        let huge = format!("1{}", "0".repeat(400));
        assert!(huge.parse::<ActionValue>().is_err());
        assert!(format!("-{}%", huge).parse::<ActionValue>().is_err());

        let largest = format!("1{}", "0".repeat(300));
        assert!(largest.parse::<ActionValue>().is_ok());
    }

    #[test]
    fn test_display_round_trips_through_serde() {
        let value = ActionValue::Percentage(-5.0);
        assert_eq!(value.to_string(), "-5%");

        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"-5%\"");
        assert_eq!(serde_json::from_str::<ActionValue>(&json).unwrap(), value);

        let bare: ActionValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(bare, ActionValue::Fixed(12.5));
    }
}
