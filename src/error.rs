//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Schema-construction failures. Surfaced at startup from the resource
/// builder pipeline; never reachable at request time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("relation {relation} has no column named '{column}'")]
    UnknownColumn { relation: String, column: String },
    #[error("relation {relation} already has a column named '{column}'")]
    DuplicateColumn { relation: String, column: String },
    #[error("relation {0} must have a primary key")]
    MissingPrimaryKey(String),
    #[error("composite primary keys are not supported (relation {0})")]
    CompositePrimaryKey(String),
    #[error("column '{column}' is not selectable - it does not exist or has already been excluded")]
    NotSelectable { column: String },
    #[error("could not match include '{include}' to a foreign key on '{relation}' referencing '{parent}'")]
    UnmatchedForeignKey {
        include: String,
        relation: String,
        parent: String,
    },
    #[error("include '{include}' matches more than one foreign key on '{relation}'; disambiguate with via()")]
    AmbiguousForeignKey { include: String, relation: String },
    #[error("the parent relation already has a field named '{0}'")]
    IncludeNameTaken(String),
    #[error("invalid include name '{0}'")]
    InvalidIncludeName(String),
    #[error("a resource is already registered at '{0}'")]
    DuplicateResource(String),
}

/// Per-field validation messages, aggregated so a client sees every problem
/// in one round trip.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Err(ApiError::Schema) when any field error was recorded.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Schema(self))
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("could not decode request body: {0}")]
    Decode(String),
    #[error("validation failed for {} field(s)", .0.len())]
    Schema(FieldErrors),
    #[error("duplicate entry: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(key: &str, value: &str) -> Self {
        ApiError::NotFound(format!("no resource with {} {}", key, value))
    }

    /// A 400 scoped to a single field, e.g. an invalid path key.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.set(name, message);
        ApiError::Schema(fields)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Decode(_) | ApiError::Schema(_) | ApiError::Duplicate(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    pub fields: FieldErrors,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, messages, fields) = match self {
            ApiError::Decode(msg) => ("bad_request", vec![msg], FieldErrors::new()),
            ApiError::Schema(fields) => ("validation_error", Vec::new(), fields),
            ApiError::Duplicate(msg) => ("duplicate_entry", vec![msg], FieldErrors::new()),
            ApiError::NotFound(msg) => ("not_found", vec![msg], FieldErrors::new()),
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                ("database_error", vec!["internal error".into()], FieldErrors::new())
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal failure");
                ("internal_error", vec!["internal error".into()], FieldErrors::new())
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                messages,
                fields,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_aggregate() {
        let mut fields = FieldErrors::new();
        fields.set("name", "is required");
        fields.set("extra", "does not exist in this resource");
        assert_eq!(fields.len(), 2);
        let err = fields.into_result().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        match err {
            ApiError::Schema(f) => assert_eq!(f.get("name"), Some("is required")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn statuses() {
        assert_eq!(
            ApiError::not_found("id", "0").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Decode("bad json".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Storage(sqlx::Error::PoolClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
