//! # Query Module
//!
//! Filtering protocol shared by every container.
//!
//! ## Filter Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Filter::All            every entity, container order                   │
//! │  Filter::Predicate(f)   entities for which f(entity) is true            │
//! │  Filter::Hashes([..])   entities whose hash is listed                   │
//! │                         (container order, not list order)               │
//! │  Filter::Attributes({}) structural match against the entity's           │
//! │                         filter view (see below)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Attribute Matching
//! The filter view is a JSON object snapshot of an entity's queryable
//! attributes plus derived fields (`enabled`, `taxable`, ...).
//!
//! - `match_all = true`: the entity matches when [`diff`] of the filter
//!   against the view is empty. Every filter key must exist in the view
//!   with an identical value, recursively. Extra view keys are ignored.
//! - `match_all = false`: the entity matches when [`intersect`] of the
//!   filter with the view is non-empty.

use serde_json::{Map, Value};

/// Selection criteria for container queries.
pub enum Filter<'f, E> {
    /// No filtering.
    All,
    /// Arbitrary predicate over the entity.
    Predicate(Box<dyn Fn(&E) -> bool + 'f>),
    /// Hash-list membership.
    Hashes(Vec<String>),
    /// Partial or full structural match against the filter view.
    Attributes(Map<String, Value>),
}

impl<'f, E> Filter<'f, E> {
    /// Builds a predicate filter from a closure.
    pub fn predicate(f: impl Fn(&E) -> bool + 'f) -> Self {
        Filter::Predicate(Box::new(f))
    }

    /// Builds a hash-list filter.
    pub fn hashes<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Hashes(hashes.into_iter().map(Into::into).collect())
    }

    /// Builds an attribute filter from a JSON object.
    ///
    /// Non-object values produce a filter that matches nothing when
    /// `match_all = false` and everything when `match_all = true`, the
    /// same as an empty object.
    pub fn attributes(value: Value) -> Self {
        match value {
            Value::Object(map) => Filter::Attributes(map),
            _ => Filter::Attributes(Map::new()),
        }
    }

    /// Tests one entity against the filter.
    ///
    /// `view` is only invoked for [`Filter::Attributes`].
    pub(crate) fn accepts(
        &self,
        entity: &E,
        hash: &str,
        match_all: bool,
        view: impl FnOnce() -> Value,
    ) -> bool {
        match self {
            Filter::All => true,
            Filter::Predicate(f) => f(entity),
            Filter::Hashes(hashes) => hashes.iter().any(|h| h == hash),
            Filter::Attributes(expected) => {
                let view = view();
                let Value::Object(actual) = &view else {
                    return false;
                };
                if match_all {
                    diff(expected, actual).is_empty()
                } else {
                    !intersect(expected, actual).is_empty()
                }
            }
        }
    }
}

/// Returns the entries of `expected` that are missing from, or differ in,
/// `actual`. Nested objects are compared recursively and only their
/// differing sub-entries are kept.
pub fn diff(expected: &Map<String, Value>, actual: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, want) in expected {
        match (want, actual.get(key)) {
            (_, None) => {
                out.insert(key.clone(), want.clone());
            }
            (Value::Object(want_map), Some(Value::Object(have_map))) => {
                let nested = diff(want_map, have_map);
                if !nested.is_empty() {
                    out.insert(key.clone(), Value::Object(nested));
                }
            }
            (_, Some(have)) => {
                if !values_equal(want, have) {
                    out.insert(key.clone(), want.clone());
                }
            }
        }
    }

    out
}

/// Returns the entries of `expected` that are present with an identical
/// value in `actual`. Nested objects contribute their matching
/// sub-entries.
pub fn intersect(
    expected: &Map<String, Value>,
    actual: &Map<String, Value>,
) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, want) in expected {
        let Some(have) = actual.get(key) else {
            continue;
        };
        match (want, have) {
            (Value::Object(want_map), Value::Object(have_map)) => {
                let nested = intersect(want_map, have_map);
                if !nested.is_empty() {
                    out.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {
                if values_equal(want, have) {
                    out.insert(key.clone(), want.clone());
                }
            }
        }
    }

    out
}

/// Structural equality where numbers compare by value (`5` == `5.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_diff_ignores_extra_view_keys() {
        let view = obj(json!({"group": "shipping", "enabled": true, "id": "ship"}));
        assert!(diff(&obj(json!({"group": "shipping"})), &view).is_empty());
        assert!(!diff(&obj(json!({"group": "discount"})), &view).is_empty());
        assert!(!diff(&obj(json!({"missing": 1})), &view).is_empty());
    }

    #[test]
    fn test_diff_recurses_into_nested_maps() {
        let view = obj(json!({"rules": {"enable": true, "taxable": false}}));

        assert!(diff(&obj(json!({"rules": {"enable": true}})), &view).is_empty());

        let d = diff(&obj(json!({"rules": {"enable": true, "taxable": true}})), &view);
        assert_eq!(Value::Object(d), json!({"rules": {"taxable": true}}));
    }

    #[test]
    fn test_intersect_reports_partial_matches() {
        let view = obj(json!({"group": "shipping", "taxable": false}));
        let filter = obj(json!({"group": "shipping", "taxable": true}));

        let i = intersect(&filter, &view);
        assert_eq!(Value::Object(i), json!({"group": "shipping"}));

        let none = intersect(&obj(json!({"group": "fees"})), &view);
        assert!(none.is_empty());
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let view = obj(json!({"price": 5.0, "quantity": 2}));
        assert!(diff(&obj(json!({"price": 5, "quantity": 2.0})), &view).is_empty());
    }

    #[test]
    fn test_filter_accepts() {
        let by_hash: Filter<'_, u8> = Filter::hashes(["a", "b"]);
        assert!(by_hash.accepts(&0, "a", true, || Value::Null));
        assert!(!by_hash.accepts(&0, "c", true, || Value::Null));

        let even: Filter<'_, u8> = Filter::predicate(|n: &u8| n % 2 == 0);
        assert!(even.accepts(&4, "x", true, || Value::Null));
        assert!(!even.accepts(&3, "x", true, || Value::Null));

        let attrs: Filter<'_, u8> = Filter::attributes(json!({"kind": "x"}));
        assert!(attrs.accepts(&0, "h", true, || json!({"kind": "x", "other": 1})));
        assert!(!attrs.accepts(&0, "h", false, || json!({"kind": "y"})));
    }
}
