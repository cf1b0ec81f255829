//! # Error Types
//!
//! Domain-specific error types for cartwheel-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  CartError                                                              │
//! │  ├── InvalidArgument(ValidationError) - attribute fails validation      │
//! │  ├── NotFound         - single-entity lookup by hash missed             │
//! │  ├── UnknownOwner     - ownership chain cannot be walked                │
//! │  ├── InvalidName      - cart name uses a reserved or illegal segment    │
//! │  ├── NonCommercial    - pricing feature on a non-commercial cart        │
//! │  ├── TaxSystemDisabled- tax applied while builtin tax is off            │
//! │  ├── Vetoed           - an observer cancelled the mutation              │
//! │  ├── CorruptState     - stored section fails to (de)serialize           │
//! │  └── Config           - configuration file problems                     │
//! │                                                                         │
//! │  Flow: ValidationError → CartError → caller                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (hash, cart name, field)
//! 3. Errors are enum variants, never String
//! 4. Validation errors are never retried: they are caller mistakes

use thiserror::Error;

use crate::container::EntityKind;

// =============================================================================
// Cart Error
// =============================================================================

/// Errors produced by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// An attribute failed validation at construction or update.
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    /// A direct lookup by hash found nothing.
    ///
    /// ## When This Occurs
    /// - `Cart::item`, `Cart::action`, `Cart::tax` with an unknown hash
    /// - Removing an entity twice
    /// - Updating an entity that was already removed
    ///
    /// Bulk queries never raise this; they return an empty list.
    #[error("{kind} not found: {hash}")]
    NotFound { kind: EntityKind, hash: String },

    /// The entity is not attached to a container reachable from this cart.
    ///
    /// ## When This Occurs
    /// ```text
    /// Tax::new(..)            (never added to a cart)
    ///      │
    ///      ▼
    /// cart.tax_amount_of(&tax)
    ///      │
    ///      ▼
    /// creator unset → UnknownOwner → amount degrades to 0
    /// ```
    #[error("{kind} {hash} has no owner in this cart")]
    UnknownOwner { kind: EntityKind, hash: String },

    /// The cart name is empty, malformed or uses a reserved section name.
    #[error("Invalid cart name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Actions and taxes only exist on commercial carts.
    #[error("Cart '{name}' is not configured for commercial use")]
    NonCommercial { name: String },

    /// Taxes only exist when the builtin tax system is enabled.
    #[error("Cart '{name}' does not use the builtin tax system")]
    TaxSystemDisabled { name: String },

    /// An observer returned a cancel signal for a "-ing" event.
    #[error("Mutation vetoed by observer of '{event}'")]
    Vetoed { event: String },

    /// A stored section could not be encoded or decoded.
    #[error("Stored state at '{path}' is corrupt: {source}")]
    CorruptState {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Attribute validation errors.
///
/// These surface to callers wrapped in [`CartError::InvalidArgument`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value exceeds the representable range (e.g., a merged quantity).
    #[error("{field} is too large")]
    TooLarge { field: String },

    /// Value must not be negative (zero allowed).
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., malformed percentage string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value has the wrong JSON type.
    #[error("{field} must be {expected}")]
    InvalidType { field: String, expected: String },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid_format(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_type(field: &str, expected: &str) -> Self {
        ValidationError::InvalidType {
            field: field.to_string(),
            expected: expected.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CartError.
pub type CartResult<T> = Result<T, CartError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CartError::NotFound {
            kind: EntityKind::Item,
            hash: "item_abc".to_string(),
        };
        assert_eq!(err.to_string(), "item not found: item_abc");

        let err = CartError::InvalidName {
            name: "shop.extra_info".to_string(),
            reason: "'extra_info' is reserved".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid cart name 'shop.extra_info': 'extra_info' is reserved"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::required("id").to_string(), "id is required");

        let err = ValidationError::invalid_format("value", "expected a number");
        assert_eq!(err.to_string(), "value has invalid format: expected a number");
    }

    #[test]
    fn test_validation_converts_to_cart_error() {
        let cart_err: CartError = ValidationError::required("title").into();
        assert!(matches!(cart_err, CartError::InvalidArgument(_)));
    }
}
