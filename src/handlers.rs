//! Resource CRUD handlers: list, create, read, update, delete, index.

use crate::error::ApiError;
use crate::resource::Resource;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn resolve(state: &AppState, slug: &str) -> Result<Arc<Resource>, ApiError> {
    state
        .registry
        .get(slug)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("no resource named '{}'", slug)))
}

/// A malformed body is a structured 400, not axum's default plain-text
/// rejection.
fn decode(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::Decode(rejection.body_text())),
    }
}

pub async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(state.registry.index())
}

pub async fn list(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let resource = resolve(&state, &slug)?;
    let envelope = resource.list(&state.pool, &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

pub async fn create(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let resource = resolve(&state, &slug)?;
    let body = decode(body)?;
    let row = resource.post(&state.pool, body).await?;
    Ok((StatusCode::OK, Json(row)))
}

pub async fn read(
    State(state): State<AppState>,
    Path((slug, key)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let resource = resolve(&state, &slug)?;
    let row = resource.get(&state.pool, &key).await?;
    Ok((StatusCode::OK, Json(row)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((slug, key)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let resource = resolve(&state, &slug)?;
    let body = decode(body)?;
    let row = resource.patch(&state.pool, &key, body).await?;
    Ok((StatusCode::OK, Json(row)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((slug, key)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let resource = resolve(&state, &slug)?;
    resource.delete(&state.pool, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
