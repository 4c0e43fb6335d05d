//! Builds parameterized SELECT, INSERT, UPDATE, DELETE over relation schemas.

use crate::filter::{FilterClause, FilterOp};
use crate::meta::OrderKey;
use crate::schema::Column;
use crate::sql::PgValue;
use crate::values::ScalarValue;

/// Alias under which join queries carry the parent-side grouping key.
/// Stripped from results before they reach the wire.
pub const PARENT_KEY: &str = "_parent_key";

/// Quote identifier for PostgreSQL (safe: only from registered schemas).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: &ScalarValue) -> u32 {
        self.params.push(PgValue::from(v));
        self.params.len() as u32
    }
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| quoted(c.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholder(n: u32, cast: Option<&str>) -> String {
    match cast {
        Some(t) => format!("${}::{}", n, t),
        None => format!("${}", n),
    }
}

fn order_clause(order: &[OrderKey]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order
        .iter()
        .map(|o| {
            format!(
                "{} {}",
                quoted(&o.column),
                if o.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT by primary key equality.
pub fn select_by_key(table: &str, columns: &[Column], pk: &Column, key: &ScalarValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(key);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        column_list(columns),
        quoted(table),
        quoted(pk.name()),
        placeholder(n, Some(pk.pg_type())),
    );
    q
}

/// SELECT with AND-combined filters, ordering, LIMIT and OFFSET.
pub fn select_list(
    table: &str,
    columns: &[Column],
    filters: &[FilterClause],
    order: &[OrderKey],
    limit: u32,
    offset: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for clause in filters {
        let n = q.push_param(&clause.value);
        let op = match clause.op {
            FilterOp::ILike => "ILIKE",
            FilterOp::Eq => "=",
        };
        where_parts.push(format!(
            "{} {} {}",
            quoted(&clause.column),
            op,
            placeholder(n, clause.pg_cast),
        ));
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        column_list(columns),
        quoted(table),
        where_clause,
        order_clause(order),
        limit,
        offset,
    );
    q
}

/// SELECT rows where `column` equals one value, ordered by the target
/// primary key for stable output.
pub fn select_where_eq(
    table: &str,
    columns: &[Column],
    by: &Column,
    value: &ScalarValue,
    pk: &str,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(value);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} ORDER BY {} ASC",
        column_list(columns),
        quoted(table),
        quoted(by.name()),
        placeholder(n, Some(by.pg_type())),
        quoted(pk),
    );
    q
}

/// SELECT rows where `column IN (...)`, ordered by the grouping column then
/// the target primary key so batch output order is deterministic.
pub fn select_where_in(
    table: &str,
    columns: &[Column],
    by: &Column,
    values: &[ScalarValue],
    pk: &str,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!(
            "SELECT {} FROM {} WHERE 1 = 0",
            column_list(columns),
            quoted(table)
        );
        return q;
    }
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| {
            let n = q.push_param(v);
            placeholder(n, Some(by.pg_type()))
        })
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {} ASC, {} ASC",
        column_list(columns),
        quoted(table),
        quoted(by.name()),
        placeholders.join(", "),
        quoted(by.name()),
        quoted(pk),
    );
    q
}

/// Two-way join for many-to-many includes: `through` joined to the target
/// relation on the element foreign key, filtered by the through table's
/// resource-FK column. Each projected column is table-qualified; the
/// resource-FK value rides along as [`PARENT_KEY`] for grouping.
#[allow(clippy::too_many_arguments)]
pub fn select_many_to_many(
    target: &str,
    through: &str,
    columns: &[(String, Column)],
    element_fk: &Column,
    element_ref: &str,
    resource_fk: &Column,
    keys: &[ScalarValue],
    target_pk: &str,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut select_parts = vec![format!(
        "{}.{} AS {}",
        quoted(through),
        quoted(resource_fk.name()),
        quoted(PARENT_KEY),
    )];
    for (table, col) in columns {
        select_parts.push(format!(
            "{}.{} AS {}",
            quoted(table),
            quoted(col.name()),
            quoted(col.name()),
        ));
    }
    let predicate = if keys.len() == 1 {
        let n = q.push_param(&keys[0]);
        format!("= {}", placeholder(n, Some(resource_fk.pg_type())))
    } else {
        let placeholders: Vec<String> = keys
            .iter()
            .map(|v| {
                let n = q.push_param(v);
                placeholder(n, Some(resource_fk.pg_type()))
            })
            .collect();
        format!("IN ({})", placeholders.join(", "))
    };
    q.sql = format!(
        "SELECT {} FROM {} JOIN {} ON {}.{} = {}.{} WHERE {}.{} {} ORDER BY {}.{} ASC, {}.{} ASC",
        select_parts.join(", "),
        quoted(through),
        quoted(target),
        quoted(target),
        quoted(element_ref),
        quoted(through),
        quoted(element_fk.name()),
        quoted(through),
        quoted(resource_fk.name()),
        predicate,
        quoted(through),
        quoted(resource_fk.name()),
        quoted(target),
        quoted(target_pk),
    );
    q
}

/// SELECT 1 ... LIMIT 1 existence probe for unique-constraint pre-checks.
pub fn exists_where(table: &str, pairs: &[(&Column, &ScalarValue)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_parts: Vec<String> = pairs
        .iter()
        .map(|(col, val)| {
            let n = q.push_param(val);
            format!("{} = {}", quoted(col.name()), placeholder(n, Some(col.pg_type())))
        })
        .collect();
    q.sql = format!(
        "SELECT 1 FROM {} WHERE {} LIMIT 1",
        quoted(table),
        where_parts.join(" AND "),
    );
    q
}

/// INSERT the given column/value pairs, returning the select column list so
/// the response shape matches a subsequent GET.
pub fn insert_returning(
    table: &str,
    values: &[(&Column, ScalarValue)],
    returning: &[Column],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            quoted(table),
            column_list(returning),
        );
        return q;
    }
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (col, val) in values {
        let n = q.push_param(val);
        cols.push(quoted(col.name()));
        placeholders.push(placeholder(n, Some(col.pg_type())));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(table),
        cols.join(", "),
        placeholders.join(", "),
        column_list(returning),
    );
    q
}

/// UPDATE by primary key, setting only the given columns.
pub fn update_by_key(
    table: &str,
    sets: &[(&Column, ScalarValue)],
    pk: &Column,
    key: &ScalarValue,
    returning: &[Column],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let set_parts: Vec<String> = sets
        .iter()
        .map(|(col, val)| {
            let n = q.push_param(val);
            format!("{} = {}", quoted(col.name()), placeholder(n, Some(col.pg_type())))
        })
        .collect();
    let n = q.push_param(key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        quoted(table),
        set_parts.join(", "),
        quoted(pk.name()),
        placeholder(n, Some(pk.pg_type())),
        column_list(returning),
    );
    q
}

/// DELETE by primary key.
pub fn delete_by_key(table: &str, pk: &Column, key: &ScalarValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(key);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(table),
        quoted(pk.name()),
        placeholder(n, Some(pk.pg_type())),
    );
    q
}
