//! # Tax
//!
//! A cart-wide tax applied to the cart's taxable amount.
//!
//! Taxes only exist on commercial carts that use the builtin tax system.
//! The amount of a tax is `taxable_amount × rate / 100`, where the taxable
//! amount comes from the owning cart. A tax that cannot reach its cart has
//! an amount of 0 (see `Cart::tax_amount_of`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::action::extra_info_map;
use crate::config::CartConfig;
use crate::container::{Creator, Entity, EntityKind};
use crate::error::{CartResult, ValidationError};
use crate::identity::content_hash;
use crate::validation::{validate_id, validate_tax_rate, validate_title};

/// Attributes for applying a tax.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTax {
    pub id: String,
    pub title: String,
    /// Percent; defaults to the cart's `default_tax_rate`.
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

impl NewTax {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        NewTax {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn extra_info(mut self, extra_info: Value) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Attribute changes for an existing tax.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxUpdate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

/// A tax line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tax {
    hash: String,
    id: String,
    title: String,
    rate: f64,
    extra_info: Map<String, Value>,
    #[serde(default)]
    creator: Option<Creator>,
}

impl Tax {
    /// Builds a detached tax.
    pub fn new(input: NewTax, config: &CartConfig) -> CartResult<Tax> {
        validate_id("id", &input.id)?;
        validate_title(&input.title)?;

        let rate = input.rate.unwrap_or(config.default_tax_rate);
        validate_tax_rate(rate)?;

        let extra_info = extra_info_map(input.extra_info)?.unwrap_or_default();

        Ok(Tax {
            hash: tax_hash(&input.id),
            id: input.id,
            title: input.title,
            rate,
            extra_info,
            creator: None,
        })
    }

    pub(crate) fn updated(&self, update: TaxUpdate) -> CartResult<Tax> {
        let mut next = self.clone();

        if let Some(id) = update.id {
            validate_id("id", &id)?;
            next.hash = tax_hash(&id);
            next.id = id;
        }
        if let Some(title) = update.title {
            validate_title(&title)?;
            next.title = title;
        }
        if let Some(rate) = update.rate {
            validate_tax_rate(rate)?;
            next.rate = rate;
        }
        if let Some(extra_info) = extra_info_map(update.extra_info)? {
            next.extra_info = extra_info;
        }

        Ok(next)
    }

    pub(crate) fn set_creator(&mut self, creator: Option<Creator>) {
        self.creator = creator;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Rate in percent.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn extra_info(&self) -> &Map<String, Value> {
        &self.extra_info
    }

    pub fn creator(&self) -> Option<&Creator> {
        self.creator.as_ref()
    }

    /// Amount of this tax on a given taxable base.
    pub fn amount_on(&self, taxable_amount: f64) -> f64 {
        taxable_amount * self.rate / 100.0
    }

    pub(crate) fn filter_view(&self) -> Value {
        json!({
            "hash": self.hash,
            "id": self.id,
            "title": self.title,
            "rate": self.rate,
            "extra_info": self.extra_info,
        })
    }
}

impl Entity for Tax {
    const KIND: EntityKind = EntityKind::Tax;

    fn hash(&self) -> &str {
        &self.hash
    }

    fn absorb(&mut self, incoming: Self) -> Result<(), ValidationError> {
        self.title = incoming.title;
        self.rate = incoming.rate;
        self.extra_info = incoming.extra_info;
        Ok(())
    }
}

fn tax_hash(id: &str) -> String {
    content_hash(EntityKind::Tax, &json!({ "id": id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_from_config() {
        let config = CartConfig {
            default_tax_rate: 7.5,
            ..CartConfig::default()
        };
        let tax = Tax::new(NewTax::new("vat", "VAT"), &config).unwrap();
        assert_eq!(tax.rate(), 7.5);

        let explicit = Tax::new(NewTax::new("vat", "VAT").rate(20.0), &config).unwrap();
        assert_eq!(explicit.rate(), 20.0);
        assert_eq!(explicit.hash(), tax.hash());
    }

    #[test]
    fn test_validation() {
        let config = CartConfig::default();
        assert!(Tax::new(NewTax::new("", "VAT"), &config).is_err());
        assert!(Tax::new(NewTax::new("vat", "VAT").rate(-1.0), &config).is_err());
        assert!(Tax::new(NewTax::new("vat", "VAT").extra_info(json!([1])), &config).is_err());
    }

    #[test]
    fn test_amount_on() {
        let tax = Tax::new(NewTax::new("vat", "VAT").rate(8.0), &CartConfig::default()).unwrap();
        assert_eq!(tax.amount_on(250.0), 20.0);
        assert_eq!(tax.amount_on(0.0), 0.0);
    }

    #[test]
    fn test_update_and_absorb() {
        let config = CartConfig::default();
        let mut tax = Tax::new(NewTax::new("vat", "VAT"), &config).unwrap();

        let renamed = tax
            .updated(TaxUpdate {
                id: Some("gst".into()),
                ..Default::default()
            })
            .unwrap();
        assert_ne!(renamed.hash(), tax.hash());
        assert_eq!(renamed.rate(), tax.rate());

        let incoming = Tax::new(NewTax::new("vat", "Value added tax").rate(21.0), &config).unwrap();
        tax.absorb(incoming).unwrap();
        assert_eq!(tax.title(), "Value added tax");
        assert_eq!(tax.rate(), 21.0);
    }
}
