//! Per-column request filters derived from column type.

use crate::schema::{Column, ScalarType};
use crate::values::ScalarValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    /// Case-insensitive substring match (`ILIKE '%value%'`).
    ILike,
    /// Typed equality.
    Eq,
}

/// A bound predicate ready for SQL composition.
#[derive(Clone, Debug)]
pub struct FilterClause {
    pub column: String,
    pub op: FilterOp,
    pub value: ScalarValue,
    /// Cast for the bound parameter; `None` for plain text comparison.
    pub pg_cast: Option<&'static str>,
}

/// The default filter for one selectable column: substring match for text
/// columns, exact match for everything else. Query-parameter values always
/// arrive as strings and are typed through the column here.
#[derive(Clone, Debug)]
pub struct Filter {
    column: Column,
}

impl Filter {
    pub fn for_column(column: &Column) -> Self {
        Filter {
            column: column.clone(),
        }
    }

    pub fn apply(&self, raw: &str) -> Result<FilterClause, String> {
        match self.column.ty() {
            ScalarType::Text => Ok(FilterClause {
                column: self.column.name().to_string(),
                op: FilterOp::ILike,
                value: ScalarValue::Text(format!("%{}%", raw.trim())),
                pg_cast: None,
            }),
            ty => {
                let value = self.column.parse_text(raw)?;
                Ok(FilterClause {
                    column: self.column.name().to_string(),
                    op: FilterOp::Eq,
                    value,
                    pg_cast: Some(ty.pg_type()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_columns_get_substring_match() {
        let f = Filter::for_column(&Column::text("name"));
        let clause = f.apply(" g ").unwrap();
        assert_eq!(clause.op, FilterOp::ILike);
        assert_eq!(clause.value, ScalarValue::Text("%g%".into()));
        assert!(clause.pg_cast.is_none());
    }

    #[test]
    fn non_text_columns_get_exact_match() {
        let f = Filter::for_column(&Column::integer("age"));
        let clause = f.apply("57").unwrap();
        assert_eq!(clause.op, FilterOp::Eq);
        assert_eq!(clause.value, ScalarValue::Integer(57));
        assert_eq!(clause.pg_cast, Some("bigint"));
    }

    #[test]
    fn unparseable_typed_value_is_an_error() {
        let f = Filter::for_column(&Column::boolean("active"));
        assert!(f.apply("maybe").is_err());
        assert_eq!(
            f.apply("true").unwrap().value,
            ScalarValue::Bool(true)
        );
    }
}
