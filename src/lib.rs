//! restable: REST resources declared from relational table schemas.
//!
//! Declare a [`Relation`], wrap it in a [`Resource`] with optional
//! includes, register it, and serve the router. Every resource gets list,
//! create, read, update, and delete operations with whitelisted columns,
//! derived filters and ordering, and batched relationship fetches.

pub mod error;
pub mod filter;
pub mod handlers;
pub mod include;
pub mod meta;
pub mod registry;
pub mod resource;
pub mod routes;
pub mod schema;
pub mod sql;
pub mod state;
pub mod store;
pub mod values;

pub use error::{ApiError, ConfigError, FieldErrors};
pub use include::{DuplicateKeys, HasMany, ManyToMany};
pub use meta::{ListMeta, DEFAULT_LIMIT, MAX_LIMIT};
pub use registry::{slugify, Registry};
pub use resource::{ListEnvelope, Resource, ResourceBuilder};
pub use routes::{app, common_routes, resource_routes};
pub use schema::{Column, Relation, RelationBuilder, ScalarType};
pub use state::AppState;
pub use values::{ScalarValue, Values};
