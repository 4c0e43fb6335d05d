//! Immutable table schemas: columns, constraints, and selectable projections.

pub mod column;
pub mod projection;
pub mod relation;

pub use column::{Column, ScalarType};
pub use projection::Projection;
pub use relation::{ForeignKey, Relation, RelationBuilder, UniqueConstraint};
