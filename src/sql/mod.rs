//! Parameterized SQL composition over relation schemas.

pub mod builder;
pub mod params;

pub use builder::{
    delete_by_key, exists_where, insert_returning, select_by_key, select_list,
    select_many_to_many, select_where_eq, select_where_in, update_by_key, QueryBuf, PARENT_KEY,
};
pub use params::PgValue;
