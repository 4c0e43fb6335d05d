//! Declared relationships that enrich resource responses with related rows.

pub mod has_many;
pub mod many_to_many;

pub use has_many::HasMany;
pub use many_to_many::ManyToMany;

use crate::error::{ApiError, ConfigError};
use crate::values::{ScalarValue, Values};
use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::PgPool;
use std::collections::HashMap;

/// An attached relationship. Built once at startup; queried per request.
#[async_trait]
pub trait Include: Send + Sync {
    /// Key under which results are attached to the parent row.
    fn name(&self) -> &str;

    /// Skip this include on collection responses.
    fn detail_only(&self) -> bool;

    /// Parent-side column whose value this include matches against.
    fn parent_column(&self) -> &str;

    /// Related payload for one parent row (detail views).
    async fn fetch_one(&self, pool: &PgPool, parent: &Values) -> Result<Json, ApiError>;

    /// Related payloads for a parent row set, one query total (list views).
    /// Output is parallel to `parents`: every parent gets its payload, an
    /// empty one when no related rows exist.
    async fn fetch_batch(&self, pool: &PgPool, parents: &[Values])
        -> Result<Vec<Json>, ApiError>;
}

/// Behavior on duplicate keys when folding rows into a map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateKeys {
    /// Later rows overwrite earlier ones. The default, and explicit policy.
    #[default]
    LastWins,
    Error,
}

/// Folds a list of related rows into a `key -> value` mapping using two
/// designated columns.
#[derive(Clone, Debug)]
pub struct MapFold {
    pub key: String,
    pub value: String,
    pub policy: DuplicateKeys,
}

impl MapFold {
    pub fn apply(&self, rows: Vec<Values>) -> Result<Json, ApiError> {
        let mut out = serde_json::Map::new();
        for row in rows {
            let key = match row.get(&self.key) {
                Some(ScalarValue::Text(s)) => s.clone(),
                Some(other) => {
                    return Err(ApiError::Internal(format!(
                        "cannot fold rows into a map: key column '{}' holds non-text value {}",
                        self.key,
                        other.display(),
                    )))
                }
                None => {
                    return Err(ApiError::Internal(format!(
                        "cannot fold rows into a map: key column '{}' is not selected",
                        self.key,
                    )))
                }
            };
            if self.policy == DuplicateKeys::Error && out.contains_key(&key) {
                return Err(ApiError::Internal(format!(
                    "duplicate map key '{}' in column '{}'",
                    key, self.key,
                )));
            }
            let value = row
                .get(&self.value)
                .map(ScalarValue::to_json)
                .unwrap_or(Json::Null);
            out.insert(key, value);
        }
        Ok(Json::Object(out))
    }
}

/// Group rows by the value of `key_column`, preserving row order within
/// each group. When `strip` is set, that column is removed from every row
/// after its value has been read.
pub(crate) fn group_rows(
    rows: Vec<Values>,
    key_column: &str,
    strip: Option<&str>,
) -> HashMap<ScalarValue, Vec<Values>> {
    let mut groups: HashMap<ScalarValue, Vec<Values>> = HashMap::new();
    for mut row in rows {
        let key = row.get(key_column).cloned().unwrap_or(ScalarValue::Null);
        if let Some(name) = strip {
            row.remove(name);
        }
        groups.entry(key).or_default().push(row);
    }
    groups
}

pub(crate) fn rows_to_json(rows: Vec<Values>) -> Json {
    Json::Array(
        rows.iter()
            .map(|r| Json::Object(crate::values::to_json_object(r)))
            .collect(),
    )
}

/// The parent-side value an include matches against.
pub(crate) fn parent_key(parent: &Values, foreign_name: &str) -> Result<ScalarValue, ApiError> {
    parent.get(foreign_name).cloned().ok_or_else(|| {
        ApiError::Internal(format!(
            "parent row does not carry the key column '{}'",
            foreign_name,
        ))
    })
}

/// Distinct parent keys in first-seen order.
pub(crate) fn collect_keys(
    parents: &[Values],
    foreign_name: &str,
) -> Result<Vec<ScalarValue>, ApiError> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for parent in parents {
        let key = parent_key(parent, foreign_name)?;
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Include names become response fields, so they follow field naming rules.
pub(crate) fn validate_include_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIncludeName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, ScalarValue)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn grouping_preserves_order_and_strips_key() {
        let rows = vec![
            row(&[("company_id", ScalarValue::Integer(1)), ("id", ScalarValue::Integer(10))]),
            row(&[("company_id", ScalarValue::Integer(2)), ("id", ScalarValue::Integer(11))]),
            row(&[("company_id", ScalarValue::Integer(1)), ("id", ScalarValue::Integer(12))]),
        ];
        let groups = group_rows(rows, "company_id", Some("company_id"));
        let one = &groups[&ScalarValue::Integer(1)];
        assert_eq!(one.len(), 2);
        assert_eq!(one[0]["id"], ScalarValue::Integer(10));
        assert_eq!(one[1]["id"], ScalarValue::Integer(12));
        assert!(!one[0].contains_key("company_id"));
        assert_eq!(groups[&ScalarValue::Integer(2)].len(), 1);
    }

    #[test]
    fn map_fold_last_write_wins() {
        let fold = MapFold {
            key: "key".into(),
            value: "value".into(),
            policy: DuplicateKeys::LastWins,
        };
        let rows = vec![
            row(&[("key", ScalarValue::Text("a".into())), ("value", ScalarValue::Integer(1))]),
            row(&[("key", ScalarValue::Text("a".into())), ("value", ScalarValue::Integer(2))]),
        ];
        let out = fold.apply(rows).unwrap();
        assert_eq!(out, serde_json::json!({"a": 2}));
    }

    #[test]
    fn map_fold_can_reject_duplicates() {
        let fold = MapFold {
            key: "key".into(),
            value: "value".into(),
            policy: DuplicateKeys::Error,
        };
        let rows = vec![
            row(&[("key", ScalarValue::Text("a".into())), ("value", ScalarValue::Integer(1))]),
            row(&[("key", ScalarValue::Text("a".into())), ("value", ScalarValue::Integer(2))]),
        ];
        assert!(fold.apply(rows).is_err());
    }

    #[test]
    fn map_fold_requires_text_keys() {
        let fold = MapFold {
            key: "key".into(),
            value: "value".into(),
            policy: DuplicateKeys::LastWins,
        };
        let rows = vec![row(&[
            ("key", ScalarValue::Integer(5)),
            ("value", ScalarValue::Integer(1)),
        ])];
        assert!(fold.apply(rows).is_err());
    }

    #[test]
    fn collect_keys_dedups_in_order() {
        let parents = vec![
            row(&[("id", ScalarValue::Integer(2))]),
            row(&[("id", ScalarValue::Integer(1))]),
            row(&[("id", ScalarValue::Integer(2))]),
        ];
        let keys = collect_keys(&parents, "id").unwrap();
        assert_eq!(keys, vec![ScalarValue::Integer(2), ScalarValue::Integer(1)]);
    }

    #[test]
    fn include_names_are_field_like() {
        assert!(validate_include_name("contacts").is_ok());
        assert!(validate_include_name("company_campuses").is_ok());
        assert!(validate_include_name("").is_err());
        assert!(validate_include_name("Has Spaces").is_err());
    }
}
