//! Resources: a relation exposed as a REST collection with derived CRUD
//! operations, column whitelisting, and attached includes.

use crate::error::{ApiError, ConfigError, FieldErrors};
use crate::filter::Filter;
use crate::include::{HasMany, Include, ManyToMany};
use crate::meta::{ListMeta, DEFAULT_LIMIT};
use crate::registry::slugify;
use crate::schema::{Column, Projection, Relation};
use crate::sql::{
    delete_by_key, exists_where, insert_returning, select_by_key, select_list, update_by_key,
};
use crate::store::{self, is_unique_violation};
use crate::values::{to_json_object, ScalarValue};
use serde::Serialize;
use serde_json::Value as Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Collection response: the echoed paging parameters and the rows.
#[derive(Serialize)]
pub struct ListEnvelope {
    pub meta: ListMeta,
    pub results: Vec<Json>,
}

/// One relation served as a REST collection. Built once at startup and
/// shared read-only across requests.
pub struct Resource {
    relation: Arc<Relation>,
    path_name: String,
    selects: Projection,
    inserts: Projection,
    filters: BTreeMap<String, Filter>,
    sortable: Vec<String>,
    default_limit: u32,
    includes: Vec<Box<dyn Include>>,
}

impl Resource {
    pub fn build(relation: Arc<Relation>) -> ResourceBuilder {
        let selects = Projection::of(&relation);
        let mut inserts = Projection::of(&relation);
        // The builder guarantees the pk column exists.
        let _ = inserts.remove(relation.primary_key());
        ResourceBuilder {
            path_name: slugify(relation.name()),
            relation,
            selects,
            inserts,
            default_limit: DEFAULT_LIMIT,
            includes: Vec::new(),
        }
    }

    pub fn path_name(&self) -> &str {
        &self.path_name
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    fn pk(&self) -> &Column {
        self.relation.pk_column()
    }

    fn parse_key(&self, raw: &str) -> Result<ScalarValue, ApiError> {
        self.pk()
            .parse_text(raw)
            .map_err(|msg| ApiError::field(self.pk().name(), msg))
    }

    /// SELECT over the selectable columns with request-derived filters,
    /// ordering, and paging, then one batched query per list include.
    pub async fn list(
        &self,
        pool: &PgPool,
        params: &HashMap<String, String>,
    ) -> Result<ListEnvelope, ApiError> {
        let meta = ListMeta::parse(
            params,
            &self.filters,
            &self.sortable,
            self.relation.primary_key(),
            self.default_limit,
        )?;
        let q = select_list(
            self.relation.name(),
            self.selects.columns(),
            &meta.filters,
            &meta.order,
            meta.limit,
            meta.offset,
        );
        let rows = store::query_all(pool, &q, self.selects.columns()).await?;

        let mut objects: Vec<serde_json::Map<String, Json>> =
            rows.iter().map(to_json_object).collect();
        for include in &self.includes {
            if include.detail_only() {
                continue;
            }
            let payloads = include.fetch_batch(pool, &rows).await?;
            for (object, payload) in objects.iter_mut().zip(payloads) {
                object.insert(include.name().to_string(), payload);
            }
        }

        Ok(ListEnvelope {
            meta,
            results: objects.into_iter().map(Json::Object).collect(),
        })
    }

    /// SELECT one row by primary key, enriched by every include.
    pub async fn get(&self, pool: &PgPool, raw_key: &str) -> Result<Json, ApiError> {
        let key = self.parse_key(raw_key)?;
        let q = select_by_key(self.relation.name(), self.selects.columns(), self.pk(), &key);
        let row = store::query_opt(pool, &q, self.selects.columns())
            .await?
            .ok_or_else(|| ApiError::not_found(self.pk().name(), raw_key))?;

        let mut object = to_json_object(&row);
        for include in &self.includes {
            let payload = include.fetch_one(pool, &row).await?;
            object.insert(include.name().to_string(), payload);
        }
        Ok(Json::Object(object))
    }

    /// Validate and INSERT a new row, returning it with the same column
    /// list a GET would produce.
    pub async fn post(&self, pool: &PgPool, body: Json) -> Result<Json, ApiError> {
        let object = body
            .as_object()
            .ok_or_else(|| ApiError::Decode("request body must be a JSON object".into()))?;
        let values = self.validate_insert_body(object)?;
        self.check_unique_constraints(pool, &values).await?;

        let q = insert_returning(self.relation.name(), &values, self.selects.columns());
        let row = match store::query_opt(pool, &q, self.selects.columns()).await {
            Err(ApiError::Storage(e)) if is_unique_violation(&e) => {
                return Err(self.duplicate_error(None))
            }
            other => other?,
        };
        row.map(|r| Json::Object(to_json_object(&r)))
            .ok_or_else(|| ApiError::Internal("insert returned no row".into()))
    }

    /// Validate and UPDATE an existing row by primary key. Partial bodies
    /// are fine; includes are not applied to the response.
    pub async fn patch(&self, pool: &PgPool, raw_key: &str, body: Json) -> Result<Json, ApiError> {
        let key = self.parse_key(raw_key)?;
        let object = body
            .as_object()
            .ok_or_else(|| ApiError::Decode("request body must be a JSON object".into()))?;
        let sets = self.validate_patch_body(object, &key)?;
        if sets.is_empty() {
            // Nothing to change; behave like a read so the caller still
            // gets the row (or a 404).
            let q = select_by_key(self.relation.name(), self.selects.columns(), self.pk(), &key);
            return store::query_opt(pool, &q, self.selects.columns())
                .await?
                .map(|r| Json::Object(to_json_object(&r)))
                .ok_or_else(|| ApiError::not_found(self.pk().name(), raw_key));
        }

        let q = update_by_key(
            self.relation.name(),
            &sets,
            self.pk(),
            &key,
            self.selects.columns(),
        );
        let row = match store::query_opt(pool, &q, self.selects.columns()).await {
            Err(ApiError::Storage(e)) if is_unique_violation(&e) => {
                return Err(self.duplicate_error(None))
            }
            other => other?,
        };
        row.map(|r| Json::Object(to_json_object(&r)))
            .ok_or_else(|| ApiError::not_found(self.pk().name(), raw_key))
    }

    /// DELETE one row by primary key. Zero rows affected is a 404.
    pub async fn delete(&self, pool: &PgPool, raw_key: &str) -> Result<(), ApiError> {
        let key = self.parse_key(raw_key)?;
        let q = delete_by_key(self.relation.name(), self.pk(), &key);
        let affected = store::execute(pool, &q).await?;
        if affected == 0 {
            return Err(ApiError::not_found(self.pk().name(), raw_key));
        }
        Ok(())
    }

    /// Full-body validation for Post. Accumulates one message per problem
    /// so the client sees every unknown key, type failure, and missing
    /// required column in a single response.
    fn validate_insert_body<'a>(
        &'a self,
        object: &serde_json::Map<String, Json>,
    ) -> Result<Vec<(&'a Column, ScalarValue)>, ApiError> {
        let mut errors = FieldErrors::new();
        let mut values = Vec::new();
        for (key, raw) in object {
            if key == self.relation.primary_key() {
                errors.set(key.clone(), "cannot be set explicitly");
                continue;
            }
            let column = match self.inserts.column(key) {
                Some(c) => c,
                None => {
                    errors.set(key.clone(), "is not an insertable field");
                    continue;
                }
            };
            match column.validate_json(raw) {
                Ok(value) => values.push((column, value)),
                Err(msg) => errors.set(key.clone(), msg),
            }
        }
        for column in self.inserts.columns() {
            if column.is_required() && !object.contains_key(column.name()) {
                errors.set(column.name().to_string(), "is required");
            }
        }
        errors.into_result()?;
        Ok(values)
    }

    /// Partial-body validation for Patch: no required checks, and the
    /// primary key may only appear when it matches the path key.
    fn validate_patch_body<'a>(
        &'a self,
        object: &serde_json::Map<String, Json>,
        path_key: &ScalarValue,
    ) -> Result<Vec<(&'a Column, ScalarValue)>, ApiError> {
        let mut errors = FieldErrors::new();
        let mut values = Vec::new();
        for (key, raw) in object {
            if key == self.relation.primary_key() {
                match self.pk().validate_json(raw) {
                    Ok(value) if &value == path_key => {}
                    _ => errors.set(key.clone(), "cannot be changed"),
                }
                continue;
            }
            let column = match self.inserts.column(key) {
                Some(c) => c,
                None => {
                    errors.set(key.clone(), "is not an updatable field");
                    continue;
                }
            };
            match column.validate_json(raw) {
                Ok(value) => values.push((column, value)),
                Err(msg) => errors.set(key.clone(), msg),
            }
        }
        errors.into_result()?;
        Ok(values)
    }

    /// Pre-check SELECT per unique constraint whose columns are all present
    /// in the incoming values. Racy against concurrent writes, so the write
    /// paths additionally map SQLSTATE 23505 to the same error.
    async fn check_unique_constraints(
        &self,
        pool: &PgPool,
        values: &[(&Column, ScalarValue)],
    ) -> Result<(), ApiError> {
        for constraint in self.relation.unique_constraints() {
            let mut pairs = Vec::new();
            for name in constraint.columns() {
                match values.iter().find(|(c, _)| c.name() == name) {
                    Some((column, value)) => pairs.push((*column, value)),
                    None => {
                        pairs.clear();
                        break;
                    }
                }
            }
            if pairs.is_empty() {
                continue;
            }
            let q = exists_where(self.relation.name(), &pairs);
            if store::exists(pool, &q).await? {
                return Err(self.duplicate_error(Some(constraint.columns())));
            }
        }
        Ok(())
    }

    fn duplicate_error(&self, columns: Option<&[String]>) -> ApiError {
        let detail = match columns {
            Some(cols) => format!(
                "a {} with the same {} already exists",
                self.path_name,
                cols.join(", ")
            ),
            None => format!("a conflicting {} already exists", self.path_name),
        };
        ApiError::Duplicate(detail)
    }
}

/// Configures a [`Resource`]. Modifiers apply in sequence and fail on the
/// first invalid step.
pub struct ResourceBuilder {
    relation: Arc<Relation>,
    path_name: String,
    selects: Projection,
    inserts: Projection,
    default_limit: u32,
    includes: Vec<Box<dyn Include>>,
}

impl ResourceBuilder {
    /// Override the URL segment this resource is served under. Slugified.
    pub fn path_name(mut self, name: &str) -> Self {
        self.path_name = slugify(name);
        self
    }

    /// Remove columns from both the selectable and insertable sets. The
    /// primary key cannot be excluded.
    pub fn exclude<'a>(
        mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        for name in names {
            if name == self.relation.primary_key() {
                return Err(ConfigError::NotSelectable {
                    column: name.to_string(),
                });
            }
            self.selects.remove(name)?;
            if self.inserts.has(name) {
                self.inserts.remove(name)?;
            }
        }
        Ok(self)
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn has_many(self, include: HasMany) -> Result<Self, ConfigError> {
        let attached = include.attach(&self.relation)?;
        self.push_include(Box::new(attached))
    }

    pub fn many_to_many(self, include: ManyToMany) -> Result<Self, ConfigError> {
        let attached = include.attach(&self.relation)?;
        self.push_include(Box::new(attached))
    }

    fn push_include(mut self, include: Box<dyn Include>) -> Result<Self, ConfigError> {
        if self.includes.iter().any(|i| i.name() == include.name()) {
            return Err(ConfigError::IncludeNameTaken(include.name().to_string()));
        }
        // The include matches against a parent column; it must survive
        // exclusion or every fetch would fail at request time.
        if !self.selects.has(include.parent_column()) {
            return Err(ConfigError::NotSelectable {
                column: include.parent_column().to_string(),
            });
        }
        self.includes.push(include);
        Ok(self)
    }

    pub fn finish(self) -> Result<Arc<Resource>, ConfigError> {
        let filters = self
            .selects
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), Filter::for_column(c)))
            .collect();
        let sortable = self.selects.names().map(str::to_string).collect();
        Ok(Arc::new(Resource {
            relation: self.relation,
            path_name: self.path_name,
            selects: self.selects,
            inserts: self.inserts,
            filters,
            sortable,
            default_limit: self.default_limit,
            includes: self.includes,
        }))
    }
}
