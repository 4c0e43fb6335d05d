//! Query execution against PostgreSQL: one-row, many-row, and row-count
//! forms, decoding rows into `Values` by declared column type.

use crate::error::ApiError;
use crate::schema::{Column, ScalarType};
use crate::sql::QueryBuf;
use crate::values::{ScalarValue, Values};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// SQLSTATE for unique-constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// True when the error is a unique-constraint violation, so concurrent
/// writes that slip past the duplicate pre-check still surface as a
/// structured duplicate error.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

pub async fn query_all(
    pool: &PgPool,
    q: &QueryBuf,
    columns: &[Column],
) -> Result<Vec<Values>, ApiError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(|r| decode_row(r, columns)).collect()
}

pub async fn query_opt(
    pool: &PgPool,
    q: &QueryBuf,
    columns: &[Column],
) -> Result<Option<Values>, ApiError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let row = query.fetch_optional(pool).await?;
    row.as_ref().map(|r| decode_row(r, columns)).transpose()
}

/// Execute a statement, returning the number of affected rows.
pub async fn execute(pool: &PgPool, q: &QueryBuf) -> Result<u64, ApiError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn exists(pool: &PgPool, q: &QueryBuf) -> Result<bool, ApiError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "exists");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    Ok(query.fetch_optional(pool).await?.is_some())
}

/// Decode a row by ordinal position against the column list that built the
/// statement. Narrower database types fall back gracefully (e.g. a SERIAL
/// column decodes through i32).
fn decode_row(row: &PgRow, columns: &[Column]) -> Result<Values, ApiError> {
    let mut values = Values::new();
    for (i, col) in columns.iter().enumerate() {
        values.insert(col.name().to_string(), decode_cell(row, i, col.ty())?);
    }
    Ok(values)
}

fn decode_cell(row: &PgRow, i: usize, ty: ScalarType) -> Result<ScalarValue, ApiError> {
    let value = match ty {
        ScalarType::Integer => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                v.map(ScalarValue::Integer)
            } else if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
                v.map(|n| ScalarValue::Integer(n.into()))
            } else {
                row.try_get::<Option<i16>, _>(i)?
                    .map(|n| ScalarValue::Integer(n.into()))
            }
        }
        ScalarType::Float => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                v.map(ScalarValue::Float)
            } else {
                row.try_get::<Option<f32>, _>(i)?
                    .map(|n| ScalarValue::Float(n.into()))
            }
        }
        ScalarType::Text => {
            if let Ok(v) = row.try_get::<Option<String>, _>(i) {
                v.map(ScalarValue::Text)
            } else {
                row.try_get::<Option<uuid::Uuid>, _>(i)?
                    .map(|u| ScalarValue::Text(u.to_string()))
            }
        }
        ScalarType::Boolean => row.try_get::<Option<bool>, _>(i)?.map(ScalarValue::Bool),
        ScalarType::Timestamp => {
            if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
                v.map(ScalarValue::Timestamp)
            } else {
                row.try_get::<Option<chrono::NaiveDateTime>, _>(i)?
                    .map(|t| ScalarValue::Timestamp(t.and_utc()))
            }
        }
        ScalarType::Bytes => row.try_get::<Option<Vec<u8>>, _>(i)?.map(ScalarValue::Bytes),
    };
    Ok(value.unwrap_or(ScalarValue::Null))
}
