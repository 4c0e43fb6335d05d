//! Router assembly: the resource index, entity CRUD paths, and the common
//! health and version routes.

use crate::handlers::{create, delete as delete_handler, index, list, read, update};
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthBody>, (axum::http::StatusCode, Json<HealthBody>)> {
    if sqlx::query("SELECT 1")
        .fetch_optional(&state.pool)
        .await
        .is_err()
    {
        return Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody { status: "degraded" }),
        ));
    }
    Ok(Json(HealthBody { status: "ok" }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}

/// The resource index at `/` plus list/create and read/update/delete paths
/// for every registered resource. Handlers resolve the resource by its
/// path segment.
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/:resource", get(list).post(create))
        .route(
            "/:resource/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .with_state(state)
}

/// Everything merged into one application router.
pub fn app(state: AppState) -> Router {
    common_routes(state.clone()).merge(resource_routes(state))
}
