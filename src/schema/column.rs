//! Typed column descriptors and value validation.

use crate::values::ScalarValue;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Bytes,
}

impl ScalarType {
    /// PostgreSQL type name, used for explicit casts on bound parameters.
    pub fn pg_type(&self) -> &'static str {
        match self {
            ScalarType::Integer => "bigint",
            ScalarType::Float => "double precision",
            ScalarType::Text => "text",
            ScalarType::Boolean => "boolean",
            ScalarType::Timestamp => "timestamptz",
            ScalarType::Bytes => "bytea",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    ty: ScalarType,
    nullable: bool,
    required: bool,
    max_length: Option<usize>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Column {
            name: name.into(),
            ty,
            nullable: true,
            required: false,
            max_length: None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Column::new(name, ScalarType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Column::new(name, ScalarType::Float)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Column::new(name, ScalarType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Column::new(name, ScalarType::Boolean)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Column::new(name, ScalarType::Timestamp)
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Column::new(name, ScalarType::Bytes)
    }

    /// Must be present in create bodies. Implies NOT NULL.
    pub fn required(mut self) -> Self {
        self.required = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ScalarType {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn pg_type(&self) -> &'static str {
        self.ty.pg_type()
    }

    /// Validate a decoded request-body value against this column's type.
    /// Returns the cleaned scalar or a client-facing message.
    pub fn validate_json(&self, raw: &Json) -> Result<ScalarValue, String> {
        if raw.is_null() {
            if self.nullable {
                return Ok(ScalarValue::Null);
            }
            return Err("must not be null".into());
        }
        match self.ty {
            ScalarType::Integer => raw
                .as_i64()
                .map(ScalarValue::Integer)
                .ok_or_else(|| "must be an integer".into()),
            ScalarType::Float => raw
                .as_f64()
                .map(ScalarValue::Float)
                .ok_or_else(|| "must be a number".into()),
            ScalarType::Text => {
                let s = raw.as_str().ok_or("must be a string")?;
                if self.required && s.is_empty() {
                    return Err("is required".into());
                }
                if let Some(max) = self.max_length {
                    if s.chars().count() > max {
                        return Err(format!("cannot be longer than {} characters", max));
                    }
                }
                Ok(ScalarValue::Text(s.to_string()))
            }
            ScalarType::Boolean => raw
                .as_bool()
                .map(ScalarValue::Bool)
                .ok_or_else(|| "must be a boolean".into()),
            ScalarType::Timestamp => {
                let s = raw.as_str().ok_or("must be an RFC 3339 timestamp")?;
                parse_timestamp(s)
                    .map(ScalarValue::Timestamp)
                    .ok_or_else(|| "must be an RFC 3339 timestamp".into())
            }
            ScalarType::Bytes => {
                let s = raw.as_str().ok_or("must be a string")?;
                Ok(ScalarValue::Bytes(s.as_bytes().to_vec()))
            }
        }
    }

    /// Validate a raw string - path-parameter keys and query-filter values
    /// arrive as strings and go through the same column typing.
    pub fn parse_text(&self, raw: &str) -> Result<ScalarValue, String> {
        match self.ty {
            ScalarType::Integer => raw
                .parse::<i64>()
                .map(ScalarValue::Integer)
                .map_err(|_| "must be an integer".into()),
            ScalarType::Float => raw
                .parse::<f64>()
                .map(ScalarValue::Float)
                .map_err(|_| "must be a number".into()),
            ScalarType::Text => {
                if let Some(max) = self.max_length {
                    if raw.chars().count() > max {
                        return Err(format!("cannot be longer than {} characters", max));
                    }
                }
                Ok(ScalarValue::Text(raw.to_string()))
            }
            ScalarType::Boolean => {
                if raw.eq_ignore_ascii_case("true") {
                    Ok(ScalarValue::Bool(true))
                } else if raw.eq_ignore_ascii_case("false") {
                    Ok(ScalarValue::Bool(false))
                } else {
                    Err("must be a boolean".into())
                }
            }
            ScalarType::Timestamp => parse_timestamp(raw)
                .map(ScalarValue::Timestamp)
                .ok_or_else(|| "must be an RFC 3339 timestamp".into()),
            ScalarType::Bytes => Ok(ScalarValue::Bytes(raw.as_bytes().to_vec())),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
