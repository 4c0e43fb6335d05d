//! One-to-many includes, bound by a foreign key on the target relation.

use crate::error::{ApiError, ConfigError};
use crate::include::{
    collect_keys, group_rows, parent_key, rows_to_json, validate_include_name, DuplicateKeys,
    Include, MapFold,
};
use crate::schema::{Column, ForeignKey, Projection, Relation};
use crate::sql::{select_where_eq, select_where_in};
use crate::store;
use crate::values::Values;
use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::PgPool;
use std::sync::Arc;

/// A one-to-many relationship declaration. Configure with the chainable
/// modifiers, then hand it to `ResourceBuilder::has_many`, which resolves
/// the binding foreign key.
#[derive(Clone, Debug)]
pub struct HasMany {
    name: String,
    relation: Arc<Relation>,
    selects: Projection,
    via: Option<String>,
    keep_fk: bool,
    detail_only: bool,
    as_map: Option<MapFold>,
}

impl HasMany {
    pub fn new(name: impl Into<String>, relation: Arc<Relation>) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_include_name(&name)?;
        let selects = Projection::of(&relation);
        Ok(HasMany {
            name,
            relation,
            selects,
            via: None,
            keep_fk: false,
            detail_only: false,
            as_map: None,
        })
    }

    /// Remove target columns from the projected output.
    pub fn exclude<'a>(
        mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        for name in names {
            self.selects.remove(name)?;
        }
        Ok(self)
    }

    /// Disambiguate when the target has more than one foreign key to the
    /// parent: bind through this local column.
    pub fn via(mut self, column: impl Into<String>) -> Self {
        self.via = Some(column.into());
        self
    }

    /// Retain the binding foreign-key column in attached rows. It is
    /// stripped by default.
    pub fn keep_foreign_key(mut self) -> Self {
        self.keep_fk = true;
        self
    }

    /// Attach to detail responses only, not collections.
    pub fn detail_only(mut self) -> Self {
        self.detail_only = true;
        self
    }

    /// Fold attached rows into a `key -> value` map using two selectable
    /// columns. Duplicate keys follow last-write-wins unless changed with
    /// [`HasMany::on_duplicate_keys`].
    pub fn as_map(mut self, key: &str, value: &str) -> Result<Self, ConfigError> {
        for col in [key, value] {
            if !self.selects.has(col) {
                return Err(ConfigError::NotSelectable {
                    column: col.to_string(),
                });
            }
        }
        let policy = self.as_map.map(|m| m.policy).unwrap_or_default();
        self.as_map = Some(MapFold {
            key: key.to_string(),
            value: value.to_string(),
            policy,
        });
        Ok(self)
    }

    pub fn on_duplicate_keys(mut self, policy: DuplicateKeys) -> Self {
        if let Some(fold) = &mut self.as_map {
            fold.policy = policy;
        }
        self
    }

    /// Resolve the binding foreign key against the parent relation. Zero
    /// candidates, or several without a `via` hint, fail attachment.
    pub(crate) fn attach(self, parent: &Relation) -> Result<AttachedHasMany, ConfigError> {
        if parent.has_column(&self.name) {
            return Err(ConfigError::IncludeNameTaken(self.name));
        }
        let mut candidates = self.relation.foreign_keys_referencing(parent.name());
        if let Some(via) = &self.via {
            candidates.retain(|fk| fk.column() == via);
        }
        let binding = match candidates.len() {
            0 => {
                return Err(ConfigError::UnmatchedForeignKey {
                    include: self.name,
                    relation: self.relation.name().to_string(),
                    parent: parent.name().to_string(),
                })
            }
            1 => candidates[0].clone(),
            _ => {
                return Err(ConfigError::AmbiguousForeignKey {
                    include: self.name,
                    relation: self.relation.name().to_string(),
                })
            }
        };
        let binding_column = self
            .relation
            .column(binding.column())
            .ok_or_else(|| ConfigError::UnknownColumn {
                relation: self.relation.name().to_string(),
                column: binding.column().to_string(),
            })?
            .clone();
        Ok(AttachedHasMany {
            name: self.name,
            relation: self.relation,
            selects: self.selects,
            keep_fk: self.keep_fk,
            detail_only: self.detail_only,
            as_map: self.as_map,
            binding,
            binding_column,
        })
    }
}

#[derive(Debug)]
pub struct AttachedHasMany {
    name: String,
    relation: Arc<Relation>,
    selects: Projection,
    keep_fk: bool,
    detail_only: bool,
    as_map: Option<MapFold>,
    binding: ForeignKey,
    binding_column: Column,
}

impl AttachedHasMany {
    /// Parent-side column this include matches against.
    pub(crate) fn foreign_name(&self) -> &str {
        self.binding.foreign_name()
    }

    /// Columns the include query selects: the projection, plus the binding
    /// column when it was excluded (it is still needed for matching).
    fn query_columns(&self) -> Vec<Column> {
        let mut columns = self.selects.columns().to_vec();
        if !self.selects.has(self.binding.column()) {
            columns.push(self.binding_column.clone());
        }
        columns
    }

    fn stripped(&self) -> Option<&str> {
        if self.keep_fk && self.selects.has(self.binding.column()) {
            None
        } else {
            Some(self.binding.column())
        }
    }

    fn payload(&self, rows: Vec<Values>) -> Result<Json, ApiError> {
        match &self.as_map {
            Some(fold) => fold.apply(rows),
            None => Ok(rows_to_json(rows)),
        }
    }

    /// Post-query half of `fetch_one`: strip the binding column, then fold
    /// or listify.
    fn single_payload(&self, mut rows: Vec<Values>) -> Result<Json, ApiError> {
        if let Some(strip) = self.stripped() {
            for row in &mut rows {
                row.remove(strip);
            }
        }
        self.payload(rows)
    }

    /// Post-query half of `fetch_batch`: group by the binding column, then
    /// build each parent's payload. A batch of one parent must produce the
    /// same payload `single_payload` would for that parent's rows.
    fn batch_payloads(&self, rows: Vec<Values>, parents: &[Values]) -> Result<Vec<Json>, ApiError> {
        let mut groups = group_rows(rows, self.binding.column(), self.stripped());
        parents
            .iter()
            .map(|parent| {
                let key = parent_key(parent, self.foreign_name())?;
                let group = groups.remove(&key).unwrap_or_default();
                self.payload(group)
            })
            .collect()
    }
}

#[async_trait]
impl Include for AttachedHasMany {
    fn name(&self) -> &str {
        &self.name
    }

    fn detail_only(&self) -> bool {
        self.detail_only
    }

    fn parent_column(&self) -> &str {
        self.foreign_name()
    }

    async fn fetch_one(&self, pool: &PgPool, parent: &Values) -> Result<Json, ApiError> {
        let key = parent_key(parent, self.foreign_name())?;
        let columns = self.query_columns();
        let q = select_where_eq(
            self.relation.name(),
            &columns,
            &self.binding_column,
            &key,
            self.relation.primary_key(),
        );
        let rows = store::query_all(pool, &q, &columns).await?;
        self.single_payload(rows)
    }

    async fn fetch_batch(
        &self,
        pool: &PgPool,
        parents: &[Values],
    ) -> Result<Vec<Json>, ApiError> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let keys = collect_keys(parents, self.foreign_name())?;
        let columns = self.query_columns();
        let q = select_where_in(
            self.relation.name(),
            &columns,
            &self.binding_column,
            &keys,
            self.relation.primary_key(),
        );
        let rows = store::query_all(pool, &q, &columns).await?;
        self.batch_payloads(rows, parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::values::ScalarValue;

    fn companies() -> Arc<Relation> {
        Relation::build("companies")
            .column(Column::integer("id"))
            .column(Column::text("name").required())
            .primary_key(["id"])
            .unique(["name"])
            .finish()
            .unwrap()
    }

    fn contacts(parent: &Relation) -> Arc<Relation> {
        Relation::build("contacts")
            .column(Column::integer("id"))
            .foreign_key(Column::integer("company_id").required(), parent, "id")
            .column(Column::text("key").required())
            .column(Column::text("value").required())
            .primary_key(["id"])
            .finish()
            .unwrap()
    }

    #[test]
    fn attach_resolves_the_binding_foreign_key() {
        let parent = companies();
        let include = HasMany::new("contacts", contacts(&parent)).unwrap();
        let attached = include.attach(&parent).unwrap();
        assert_eq!(attached.binding.column(), "company_id");
        assert_eq!(attached.foreign_name(), "id");
        assert_eq!(attached.stripped(), Some("company_id"));
    }

    #[test]
    fn attach_fails_without_a_matching_foreign_key() {
        let parent = companies();
        let unrelated = Relation::build("tags")
            .column(Column::integer("id"))
            .column(Column::text("label"))
            .primary_key(["id"])
            .finish()
            .unwrap();
        let err = HasMany::new("tags", unrelated)
            .unwrap()
            .attach(&parent)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnmatchedForeignKey { .. }));
    }

    #[test]
    fn ambiguous_foreign_keys_require_via() {
        let parent = companies();
        let transfers = Relation::build("transfers")
            .column(Column::integer("id"))
            .foreign_key(Column::integer("from_company_id"), &parent, "id")
            .foreign_key(Column::integer("to_company_id"), &parent, "id")
            .primary_key(["id"])
            .finish()
            .unwrap();

        let err = HasMany::new("outgoing", transfers.clone())
            .unwrap()
            .attach(&parent)
            .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousForeignKey { .. }));

        let attached = HasMany::new("outgoing", transfers)
            .unwrap()
            .via("from_company_id")
            .attach(&parent)
            .unwrap();
        assert_eq!(attached.binding.column(), "from_company_id");
    }

    #[test]
    fn include_name_must_not_shadow_a_parent_column() {
        let parent = companies();
        let err = HasMany::new("name", contacts(&parent))
            .unwrap()
            .attach(&parent)
            .unwrap_err();
        assert!(matches!(err, ConfigError::IncludeNameTaken(_)));
    }

    #[test]
    fn excluded_binding_column_is_still_queried() {
        let parent = companies();
        let attached = HasMany::new("contacts", contacts(&parent))
            .unwrap()
            .exclude(["company_id"])
            .unwrap()
            .attach(&parent)
            .unwrap();
        let names: Vec<_> = attached
            .query_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(names.contains(&"company_id".to_string()));
        assert_eq!(attached.stripped(), Some("company_id"));
    }

    #[test]
    fn keep_foreign_key_disables_stripping() {
        let parent = companies();
        let attached = HasMany::new("contacts", contacts(&parent))
            .unwrap()
            .keep_foreign_key()
            .attach(&parent)
            .unwrap();
        assert_eq!(attached.stripped(), None);
    }

    fn row(pairs: &[(&str, ScalarValue)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn contact_rows() -> Vec<Values> {
        vec![
            row(&[
                ("id", ScalarValue::Integer(10)),
                ("company_id", ScalarValue::Integer(1)),
                ("key", ScalarValue::Text("phone".into())),
                ("value", ScalarValue::Text("555".into())),
            ]),
            row(&[
                ("id", ScalarValue::Integer(11)),
                ("company_id", ScalarValue::Integer(1)),
                ("key", ScalarValue::Text("email".into())),
                ("value", ScalarValue::Text("a@b".into())),
            ]),
        ]
    }

    #[test]
    fn batch_of_one_parent_matches_single_fetch() {
        let parent_rel = companies();
        let attached = HasMany::new("contacts", contacts(&parent_rel))
            .unwrap()
            .attach(&parent_rel)
            .unwrap();
        let parent = row(&[
            ("id", ScalarValue::Integer(1)),
            ("name", ScalarValue::Text("acme".into())),
        ]);

        let single = attached.single_payload(contact_rows()).unwrap();
        let batch = attached
            .batch_payloads(contact_rows(), std::slice::from_ref(&parent))
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0], single);
        // Both paths stripped the binding column.
        assert_eq!(single[0].get("company_id"), None);
        assert_eq!(single[0]["id"], serde_json::json!(10));
    }

    #[test]
    fn batch_of_one_parent_matches_single_fetch_with_map_fold() {
        let parent_rel = companies();
        let attached = HasMany::new("contacts", contacts(&parent_rel))
            .unwrap()
            .as_map("key", "value")
            .unwrap()
            .attach(&parent_rel)
            .unwrap();
        let parent = row(&[("id", ScalarValue::Integer(1))]);

        let single = attached.single_payload(contact_rows()).unwrap();
        let batch = attached
            .batch_payloads(contact_rows(), std::slice::from_ref(&parent))
            .unwrap();
        assert_eq!(batch[0], single);
        assert_eq!(single, serde_json::json!({"phone": "555", "email": "a@b"}));
    }

    #[test]
    fn as_map_requires_selectable_columns() {
        let parent = companies();
        let include = HasMany::new("contacts", contacts(&parent)).unwrap();
        assert!(include.clone().as_map("key", "value").is_ok());
        assert!(include.clone().as_map("nope", "value").is_err());
        let narrowed = include.exclude(["value"]).unwrap();
        assert!(narrowed.as_map("key", "value").is_err());
    }
}
