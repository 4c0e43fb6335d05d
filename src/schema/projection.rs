//! Ordered selectable column sets with exclusion.

use crate::error::ConfigError;
use crate::schema::{Column, Relation};

/// The columns a query projects, in relation order. Exclusion narrows the
/// set.
#[derive(Clone, Debug)]
pub struct Projection {
    columns: Vec<Column>,
}

impl Projection {
    /// All columns of the relation, in declaration order.
    pub fn of(relation: &Relation) -> Self {
        Projection {
            columns: relation.columns().to_vec(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name() == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Remove a column by name. Unknown or already-removed names are a
    /// configuration error, not a no-op.
    pub fn remove(&mut self, name: &str) -> Result<(), ConfigError> {
        let before = self.columns.len();
        self.columns.retain(|c| c.name() != name);
        if self.columns.len() == before {
            return Err(ConfigError::NotSelectable {
                column: name.to_string(),
            });
        }
        Ok(())
    }
}
