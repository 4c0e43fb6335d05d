//! Route-layer behavior that resolves before any query runs: resource
//! lookup, body decoding, and request validation. The pool is lazy and
//! never connected.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use restable::{app, AppState, Column, Registry, Relation, Resource};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let companies = Relation::build("companies")
        .column(Column::integer("id"))
        .column(Column::text("name").required())
        .primary_key(["id"])
        .unique(["name"])
        .finish()
        .unwrap();
    let resource = Resource::build(companies).finish().unwrap();
    let mut registry = Registry::new();
    registry.register(resource).unwrap();

    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();
    app(AppState::new(pool, registry))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn the_index_and_health_routes_respond() {
    assert_eq!(
        test_app().oneshot(get("/")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        test_app().oneshot(get("/health")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        test_app().oneshot(get("/version")).await.unwrap().status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn unknown_resources_are_not_found() {
    let response = test_app().oneshot(get("/widgets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let response = test_app()
        .oneshot(json_request("POST", "/companies", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_body_fields_are_a_bad_request() {
    let response = test_app()
        .oneshot(json_request(
            "POST",
            "/companies",
            r#"{"name": "acme", "sprocket": 1}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn an_unparseable_path_key_is_a_bad_request() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/companies/not-a-number")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
