//! # Validation Module
//!
//! Attribute validation for cart entities and cart names.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Where Validation Runs                              │
//! │                                                                         │
//! │  NewItem / NewAction / NewTax  ──► entity constructor                   │
//! │  ItemUpdate / ActionUpdate ... ──► entity update (on a clone)           │
//! │  Cart::open(name)              ──► validate_cart_name                   │
//! │                                                                         │
//! │  Failures become CartError::InvalidArgument (or InvalidName) and no    │
//! │  state is touched. Nothing is silently coerced beyond the documented   │
//! │  default filling (group "unknown", quantity 1, default tax rate ...).   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use cartwheel_core::validation::{validate_price, validate_quantity};
//!
//! assert!(validate_price(9.99).is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::{CartError, ValidationError};
use crate::store::Section;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Returns true for segments that name a store section (`items`, `meta`,
/// `extra_info` ...) and so cannot be part of a cart name.
pub fn is_reserved_segment(segment: &str) -> bool {
    Section::ALL.iter().any(|section| section.as_str() == segment)
}

/// Maximum length of a title.
pub const MAX_TITLE_LEN: usize = 255;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier (item associated id, action id, tax id).
///
/// ## Rules
/// - Must not be empty after trimming
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates a display title.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 255 characters
pub fn validate_title(title: &str) -> ValidationResult<()> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::required("title"));
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LEN,
        });
    }

    Ok(())
}

/// Validates an action group name.
pub fn validate_group(group: &str) -> ValidationResult<()> {
    if group.trim().is_empty() {
        return Err(ValidationError::required("group"));
    }
    Ok(())
}

/// Validates a cart name.
///
/// ## Rules
/// - Dotted segments (`shop.main`), each non-empty
/// - Segments contain only letters, digits, `_` and `-`
/// - No segment may equal a store section name (`items`, `actions`, `taxes`,
///   `config`, `meta`, `extra_info`)
///
/// ## Example
/// ```rust
/// use cartwheel_core::validation::validate_cart_name;
///
/// assert!(validate_cart_name("shop.main").is_ok());
/// assert!(validate_cart_name("shop.extra_info").is_err());
/// assert!(validate_cart_name("shop.items").is_err());
/// assert!(validate_cart_name("shop..main").is_err());
/// ```
pub fn validate_cart_name(name: &str) -> Result<(), CartError> {
    let invalid = |reason: &str| CartError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }

    for segment in name.split('.') {
        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if is_reserved_segment(segment) {
            return Err(invalid(&format!("'{}' is reserved", segment)));
        }
        if !segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "segments may contain only letters, numbers, hyphens, and underscores",
            ));
        }
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an item quantity.
///
/// ## Rules
/// - Must be at least 1 (an item with quantity 0 cannot exist)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 1 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates an item price.
///
/// ## Rules
/// - Must be finite
/// - Must be non-negative (free items are allowed)
///
/// ## Example
/// ```rust
/// use cartwheel_core::validation::validate_price;
///
/// assert!(validate_price(0.0).is_ok());
/// assert!(validate_price(-1.0).is_err());
/// assert!(validate_price(f64::NAN).is_err());
/// ```
pub fn validate_price(price: f64) -> ValidationResult<()> {
    validate_non_negative("price", price)
}

/// Validates a tax rate in percent.
pub fn validate_tax_rate(rate: f64) -> ValidationResult<()> {
    validate_non_negative("rate", rate)
}

fn validate_non_negative(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::invalid_format(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("id", "SKU-1").is_ok());
        assert!(validate_id("id", "").is_err());
        assert!(validate_id("id", "   ").is_err());
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Coffee beans 1kg").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_cart_name() {
        assert!(validate_cart_name("shopping").is_ok());
        assert!(validate_cart_name("shop.main-2").is_ok());
        assert!(validate_cart_name("shop.items_2").is_ok());

        for reserved in ["items", "actions", "taxes", "config", "meta", "extra_info"] {
            assert!(
                validate_cart_name(&format!("shop.{}", reserved)).is_err(),
                "accepted {:?}",
                reserved
            );
        }

        assert!(matches!(
            validate_cart_name("extra_info"),
            Err(CartError::InvalidName { .. })
        ));
        assert!(validate_cart_name("").is_err());
        assert!(validate_cart_name(".shop").is_err());
        assert!(validate_cart_name("shop main").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn test_validate_price_and_rate() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(10.99).is_ok());
        assert!(validate_price(-0.01).is_err());
        assert!(validate_price(f64::INFINITY).is_err());

        assert!(validate_tax_rate(8.25).is_ok());
        assert!(validate_tax_rate(-1.0).is_err());
    }
}
