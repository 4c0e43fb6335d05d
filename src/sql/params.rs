//! Convert scalar row values to types that sqlx can bind.

use crate::values::ScalarValue;
use chrono::SecondsFormat;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value bound to a PostgreSQL query. Statements carry explicit casts
/// (e.g. `$1::bigint`) so text-typed parameters bind correctly.
#[derive(Clone, Debug)]
pub enum PgValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&ScalarValue> for PgValue {
    fn from(v: &ScalarValue) -> Self {
        match v {
            ScalarValue::Null => PgValue::Null,
            ScalarValue::Integer(n) => PgValue::I64(*n),
            ScalarValue::Float(f) => PgValue::F64(*f),
            ScalarValue::Text(s) => PgValue::Text(s.clone()),
            ScalarValue::Bool(b) => PgValue::Bool(*b),
            ScalarValue::Timestamp(t) => {
                PgValue::Text(t.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            ScalarValue::Bytes(b) => PgValue::Bytes(b.clone()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgValue::Text(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgValue::Bytes(b) => <Vec<u8> as Encode<Postgres>>::encode_by_ref(b, buf)?,
        })
    }
}

impl sqlx::Type<Postgres> for PgValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
