//! Relations: named tables with a primary key, unique constraints, and
//! foreign keys. Immutable once built - every other component relies on
//! that for safe introspection.

use crate::error::ConfigError;
use crate::schema::Column;
use std::sync::Arc;

/// A set of column names whose combined values must be distinct across rows.
#[derive(Clone, Debug)]
pub struct UniqueConstraint {
    columns: Vec<String>,
}

impl UniqueConstraint {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// A local column referencing a column on another table. The referenced
/// column name doubles as the "foreign name": the parent-side key that
/// derived queries read when matching rows.
#[derive(Clone, Debug)]
pub struct ForeignKey {
    column: String,
    references_table: String,
    references_column: String,
}

impl ForeignKey {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn references_table(&self, table: &str) -> bool {
        self.references_table == table
    }

    pub fn foreign_name(&self) -> &str {
        &self.references_column
    }
}

#[derive(Clone, Debug)]
pub struct Relation {
    name: String,
    columns: Vec<Column>,
    primary_key: String,
    uniques: Vec<UniqueConstraint>,
    foreign_keys: Vec<ForeignKey>,
}

impl Relation {
    pub fn build(name: impl Into<String>) -> RelationBuilder {
        RelationBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            uniques: Vec::new(),
            foreign_keys: Vec::new(),
            invalid: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn pk_column(&self) -> &Column {
        // Guaranteed by the builder.
        self.column(&self.primary_key)
            .expect("primary key column exists")
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.uniques
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Foreign keys on this relation whose referenced table is `table`.
    pub fn foreign_keys_referencing(&self, table: &str) -> Vec<&ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.references_table(table))
            .collect()
    }
}

pub struct RelationBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Vec<String>,
    uniques: Vec<UniqueConstraint>,
    foreign_keys: Vec<ForeignKey>,
    // First error seen mid-chain; reported by finish().
    invalid: Option<ConfigError>,
}

impl RelationBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Declare a column that references a column on another relation.
    /// The referenced relation must already be built so the target column
    /// can be checked.
    pub fn foreign_key(
        mut self,
        column: Column,
        references: &Relation,
        referenced_column: &str,
    ) -> Self {
        if !references.has_column(referenced_column) && self.invalid.is_none() {
            self.invalid = Some(ConfigError::UnknownColumn {
                relation: references.name().to_string(),
                column: referenced_column.to_string(),
            });
        }
        self.foreign_keys.push(ForeignKey {
            column: column.name().to_string(),
            references_table: references.name().to_string(),
            references_column: referenced_column.to_string(),
        });
        self.columns.push(column);
        self
    }

    pub fn primary_key<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.primary_key = columns.into_iter().map(String::from).collect();
        self
    }

    pub fn unique<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.uniques.push(UniqueConstraint {
            columns: columns.into_iter().map(String::from).collect(),
        });
        self
    }

    pub fn finish(self) -> Result<Arc<Relation>, ConfigError> {
        if let Some(err) = self.invalid {
            return Err(err);
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name().to_string()) {
                return Err(ConfigError::DuplicateColumn {
                    relation: self.name,
                    column: c.name().to_string(),
                });
            }
        }
        let pk = match self.primary_key.as_slice() {
            [] => return Err(ConfigError::MissingPrimaryKey(self.name)),
            [pk] => pk.clone(),
            _ => return Err(ConfigError::CompositePrimaryKey(self.name)),
        };
        if !seen.contains(&pk) {
            return Err(ConfigError::UnknownColumn {
                relation: self.name,
                column: pk,
            });
        }
        for unique in &self.uniques {
            for col in unique.columns() {
                if !seen.contains(col) {
                    return Err(ConfigError::UnknownColumn {
                        relation: self.name,
                        column: col.clone(),
                    });
                }
            }
        }
        Ok(Arc::new(Relation {
            name: self.name,
            columns: self.columns,
            primary_key: pk,
            uniques: self.uniques,
            foreign_keys: self.foreign_keys,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Arc<Relation> {
        Relation::build("users")
            .column(Column::integer("id"))
            .column(Column::text("name").required())
            .primary_key(["id"])
            .unique(["name"])
            .finish()
            .unwrap()
    }

    #[test]
    fn builds_with_pk_and_unique() {
        let rel = users();
        assert_eq!(rel.primary_key(), "id");
        assert_eq!(rel.unique_constraints().len(), 1);
        assert!(rel.has_column("name"));
    }

    #[test]
    fn missing_primary_key_rejected() {
        let err = Relation::build("nopk")
            .column(Column::integer("id"))
            .finish()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingPrimaryKey(_)));
    }

    #[test]
    fn composite_primary_key_rejected() {
        let err = Relation::build("pair")
            .column(Column::integer("a"))
            .column(Column::integer("b"))
            .primary_key(["a", "b"])
            .finish()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CompositePrimaryKey(_)));
    }

    #[test]
    fn duplicate_column_rejected() {
        let err = Relation::build("dup")
            .column(Column::integer("id"))
            .column(Column::text("id"))
            .primary_key(["id"])
            .finish()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateColumn { .. }));
    }

    #[test]
    fn foreign_key_to_an_unknown_column_rejected() {
        let parent = users();
        let err = Relation::build("contacts")
            .column(Column::integer("id"))
            .foreign_key(Column::integer("user_id"), &parent, "uuid")
            .primary_key(["id"])
            .finish()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownColumn { relation, column }
                if relation == "users" && column == "uuid"
        ));
    }

    #[test]
    fn foreign_keys_match_by_referenced_table() {
        let parent = users();
        let rel = Relation::build("contacts")
            .column(Column::integer("id"))
            .foreign_key(Column::integer("user_id").required(), &parent, "id")
            .primary_key(["id"])
            .finish()
            .unwrap();
        let fks = rel.foreign_keys_referencing("users");
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].column(), "user_id");
        assert_eq!(fks[0].foreign_name(), "id");
        assert!(rel.foreign_keys_referencing("companies").is_empty());
    }
}
