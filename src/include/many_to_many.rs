//! Many-to-many includes bound through a join table.

use crate::error::{ApiError, ConfigError};
use crate::include::{
    collect_keys, group_rows, parent_key, rows_to_json, validate_include_name, DuplicateKeys,
    Include, MapFold,
};
use crate::schema::{Column, ForeignKey, Projection, Relation};
use crate::sql::{select_many_to_many, PARENT_KEY};
use crate::store;
use crate::values::Values;
use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::PgPool;
use std::sync::Arc;

/// A many-to-many relationship declaration. The through relation must carry
/// exactly one foreign key to the parent and exactly one to the target;
/// attachment classifies them and fails on anything else.
#[derive(Clone, Debug)]
pub struct ManyToMany {
    name: String,
    target: Arc<Relation>,
    through: Arc<Relation>,
    selects: Projection,
    through_extra: Vec<Column>,
    detail_only: bool,
    as_map: Option<MapFold>,
}

impl ManyToMany {
    pub fn new(
        name: impl Into<String>,
        target: Arc<Relation>,
        through: Arc<Relation>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_include_name(&name)?;
        let selects = Projection::of(&target);
        Ok(ManyToMany {
            name,
            target,
            through,
            selects,
            through_extra: Vec::new(),
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

    /// Project a column of the join table alongside the target columns,
    /// e.g. a `role` or `quantity` carried on the association itself.
    pub fn include_through(mut self, column: &str) -> Result<Self, ConfigError> {
        let col = self
            .through
            .column(column)
            .ok_or_else(|| ConfigError::UnknownColumn {
                relation: self.through.name().to_string(),
                column: column.to_string(),
            })?
            .clone();
        if self.selects.has(column) || self.through_extra.iter().any(|c| c.name() == column) {
            return Err(ConfigError::DuplicateColumn {
                relation: self.through.name().to_string(),
                column: column.to_string(),
            });
        }
        self.through_extra.push(col);
        Ok(self)
    }

    /// Attach to detail responses only, not collections.
    pub fn detail_only(mut self) -> Self {
        self.detail_only = true;
        self
    }

    /// Fold attached rows into a `key -> value` map using two projected
    /// columns.
    pub fn as_map(mut self, key: &str, value: &str) -> Result<Self, ConfigError> {
        for col in [key, value] {
            let projected =
                self.selects.has(col) || self.through_extra.iter().any(|c| c.name() == col);
            if !projected {
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

    pub(crate) fn attach(self, parent: &Relation) -> Result<AttachedManyToMany, ConfigError> {
        if parent.has_column(&self.name) {
            return Err(ConfigError::IncludeNameTaken(self.name));
        }
        let resource_fk = classify(&self.name, &self.through, parent.name())?.clone();
        let element_fk = classify(&self.name, &self.through, self.target.name())?.clone();
        let resource_fk_column = through_column(&self.through, resource_fk.column())?;
        let element_fk_column = through_column(&self.through, element_fk.column())?;
        Ok(AttachedManyToMany {
            name: self.name,
            target: self.target,
            through: self.through,
            selects: self.selects,
            through_extra: self.through_extra,
            detail_only: self.detail_only,
            as_map: self.as_map,
            resource_fk,
            resource_fk_column,
            element_fk,
            element_fk_column,
        })
    }
}

fn classify<'a>(
    include: &str,
    through: &'a Relation,
    referenced: &str,
) -> Result<&'a ForeignKey, ConfigError> {
    let candidates = through.foreign_keys_referencing(referenced);
    match candidates.len() {
        0 => Err(ConfigError::UnmatchedForeignKey {
            include: include.to_string(),
            relation: through.name().to_string(),
            parent: referenced.to_string(),
        }),
        1 => Ok(candidates[0]),
        _ => Err(ConfigError::AmbiguousForeignKey {
            include: include.to_string(),
            relation: through.name().to_string(),
        }),
    }
}

fn through_column(through: &Relation, name: &str) -> Result<Column, ConfigError> {
    through
        .column(name)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownColumn {
            relation: through.name().to_string(),
            column: name.to_string(),
        })
}

#[derive(Debug)]
pub struct AttachedManyToMany {
    name: String,
    target: Arc<Relation>,
    through: Arc<Relation>,
    selects: Projection,
    through_extra: Vec<Column>,
    detail_only: bool,
    as_map: Option<MapFold>,
    resource_fk: ForeignKey,
    resource_fk_column: Column,
    element_fk: ForeignKey,
    element_fk_column: Column,
}

impl AttachedManyToMany {
    pub(crate) fn foreign_name(&self) -> &str {
        self.resource_fk.foreign_name()
    }

    /// Table-qualified projection: the target columns plus any join-table
    /// columns pulled in with `include_through`.
    fn qualified_columns(&self) -> Vec<(String, Column)> {
        let mut columns: Vec<(String, Column)> = self
            .selects
            .columns()
            .iter()
            .map(|c| (self.target.name().to_string(), c.clone()))
            .collect();
        for col in &self.through_extra {
            columns.push((self.through.name().to_string(), col.clone()));
        }
        columns
    }

    /// Decode order matches the SELECT list: the synthetic grouping column
    /// first, then the projection.
    fn decode_columns(&self, qualified: &[(String, Column)]) -> Vec<Column> {
        let mut columns =
            vec![Column::new(PARENT_KEY, self.resource_fk_column.ty())];
        columns.extend(qualified.iter().map(|(_, c)| c.clone()));
        columns
    }

    fn payload(&self, rows: Vec<Values>) -> Result<Json, ApiError> {
        match &self.as_map {
            Some(fold) => fold.apply(rows),
            None => Ok(rows_to_json(rows)),
        }
    }

    /// Post-query half of `fetch_one`: drop the synthetic grouping column,
    /// then fold or listify.
    fn single_payload(&self, mut rows: Vec<Values>) -> Result<Json, ApiError> {
        for row in &mut rows {
            row.remove(PARENT_KEY);
        }
        self.payload(rows)
    }

    /// Post-query half of `fetch_batch`: group by the synthetic column, then
    /// build each parent's payload. A batch of one parent must produce the
    /// same payload `single_payload` would for that parent's rows.
    fn batch_payloads(&self, rows: Vec<Values>, parents: &[Values]) -> Result<Vec<Json>, ApiError> {
        let mut groups = group_rows(rows, PARENT_KEY, Some(PARENT_KEY));
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
impl Include for AttachedManyToMany {
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
        let qualified = self.qualified_columns();
        let q = select_many_to_many(
            self.target.name(),
            self.through.name(),
            &qualified,
            &self.element_fk_column,
            self.element_fk.foreign_name(),
            &self.resource_fk_column,
            std::slice::from_ref(&key),
            self.target.primary_key(),
        );
        let decode = self.decode_columns(&qualified);
        let rows = store::query_all(pool, &q, &decode).await?;
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
        let qualified = self.qualified_columns();
        let q = select_many_to_many(
            self.target.name(),
            self.through.name(),
            &qualified,
            &self.element_fk_column,
            self.element_fk.foreign_name(),
            &self.resource_fk_column,
            &keys,
            self.target.primary_key(),
        );
        let decode = self.decode_columns(&qualified);
        let rows = store::query_all(pool, &q, &decode).await?;
        self.batch_payloads(rows, parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::values::ScalarValue;

    fn schema() -> (Arc<Relation>, Arc<Relation>, Arc<Relation>) {
        let companies = Relation::build("companies")
            .column(Column::integer("id"))
            .column(Column::text("name").required())
            .primary_key(["id"])
            .finish()
            .unwrap();
        let services = Relation::build("services")
            .column(Column::integer("id"))
            .column(Column::text("name").required())
            .primary_key(["id"])
            .finish()
            .unwrap();
        let subscriptions = Relation::build("subscriptions")
            .column(Column::integer("id"))
            .foreign_key(Column::integer("company_id").required(), &companies, "id")
            .foreign_key(Column::integer("service_id").required(), &services, "id")
            .column(Column::text("tier"))
            .primary_key(["id"])
            .finish()
            .unwrap();
        (companies, services, subscriptions)
    }

    #[test]
    fn attach_classifies_both_foreign_keys() {
        let (companies, services, subscriptions) = schema();
        let attached = ManyToMany::new("services", services, subscriptions)
            .unwrap()
            .attach(&companies)
            .unwrap();
        assert_eq!(attached.resource_fk.column(), "company_id");
        assert_eq!(attached.element_fk.column(), "service_id");
        assert_eq!(attached.foreign_name(), "id");
    }

    #[test]
    fn attach_fails_when_a_side_is_missing() {
        let (companies, services, _) = schema();
        let broken = Relation::build("subscriptions")
            .column(Column::integer("id"))
            .foreign_key(Column::integer("service_id"), &services, "id")
            .primary_key(["id"])
            .finish()
            .unwrap();
        let err = ManyToMany::new("services", services, broken)
            .unwrap()
            .attach(&companies)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnmatchedForeignKey { .. }));
    }

    #[test]
    fn include_through_projects_join_columns() {
        let (companies, services, subscriptions) = schema();
        let attached = ManyToMany::new("services", services, subscriptions)
            .unwrap()
            .include_through("tier")
            .unwrap()
            .attach(&companies)
            .unwrap();
        let qualified = attached.qualified_columns();
        let tier = qualified.last().unwrap();
        assert_eq!(tier.0, "subscriptions");
        assert_eq!(tier.1.name(), "tier");
    }

    #[test]
    fn include_through_rejects_unknown_and_colliding_columns() {
        let (_, services, subscriptions) = schema();
        let m2m = ManyToMany::new("services", services, subscriptions).unwrap();
        assert!(m2m.clone().include_through("nope").is_err());
        assert!(matches!(
            m2m.include_through("tier")
                .unwrap()
                .include_through("tier")
                .unwrap_err(),
            ConfigError::DuplicateColumn { .. }
        ));
    }

    fn row(pairs: &[(&str, ScalarValue)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn batch_of_one_parent_matches_single_fetch() {
        let (companies, services, subscriptions) = schema();
        let attached = ManyToMany::new("services", services, subscriptions)
            .unwrap()
            .attach(&companies)
            .unwrap();
        let parent = row(&[("id", ScalarValue::Integer(1))]);
        let rows = vec![
            row(&[
                (PARENT_KEY, ScalarValue::Integer(1)),
                ("id", ScalarValue::Integer(7)),
                ("name", ScalarValue::Text("backup".into())),
            ]),
            row(&[
                (PARENT_KEY, ScalarValue::Integer(1)),
                ("id", ScalarValue::Integer(8)),
                ("name", ScalarValue::Text("hosting".into())),
            ]),
        ];

        let single = attached.single_payload(rows.clone()).unwrap();
        let batch = attached
            .batch_payloads(rows, std::slice::from_ref(&parent))
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0], single);
        // Both paths dropped the grouping column.
        assert_eq!(single[0].get(PARENT_KEY), None);
        assert_eq!(single[1]["name"], serde_json::json!("hosting"));
    }

    #[test]
    fn decode_list_leads_with_the_grouping_column() {
        let (companies, services, subscriptions) = schema();
        let attached = ManyToMany::new("services", services, subscriptions)
            .unwrap()
            .attach(&companies)
            .unwrap();
        let qualified = attached.qualified_columns();
        let decode = attached.decode_columns(&qualified);
        assert_eq!(decode[0].name(), PARENT_KEY);
        assert_eq!(decode.len(), qualified.len() + 1);
    }
}
