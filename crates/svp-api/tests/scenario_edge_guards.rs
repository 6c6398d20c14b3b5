//! Edge guard rails, driven in-process through the router.
//!
//! GREEN when:
//! - a status query without task_id or import_name is a 400;
//! - a wrong or missing bearer token is a 403 when a token is configured;
//! - the health endpoint is reachable without credentials.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use svp_api::{build_router, ApiState};
use svp_client::DataGatewayClient;
use svp_config::{BrokerSettings, Topology};
use svp_messaging::{BrokerFactory, Publisher};
use tower::ServiceExt;

fn state(auth_token: Option<&str>) -> Arc<ApiState> {
    let broker = BrokerSettings {
        host: "localhost".into(),
        port: 5672,
        username: "guest".into(),
        password: "guest".into(),
        virtual_host: "/".into(),
    };
    // The publisher connects lazily; none of these scenarios publish.
    let factory = BrokerFactory::new(&broker, Topology::from_env());
    Arc::new(ApiState::new(
        Publisher::new(factory),
        DataGatewayClient::new("http://127.0.0.1:59999"),
        auth_token.map(str::to_string),
    ))
}

#[tokio::test]
async fn status_without_identifiers_is_bad_request() {
    let app = build_router(state(None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/validation/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_bearer_token_is_forbidden() {
    let app = build_router(state(Some("sekrit")));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/schemas/status?task_id=t-1")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_token_is_forbidden_when_configured() {
    let app = build_router(state(Some("sekrit")));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/validation/status?task_id=t-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let app = build_router(state(Some("sekrit")));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn gateway_down_surfaces_as_service_unavailable() {
    // No data gateway listens on the configured port: with a valid token
    // and `new=false`, the cached-list lookup fails with a transport error
    // that must translate to 503.
    let app = build_router(state(None));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/schemas/upload/u1")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name": {"type": "string"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
