//! Messaging-gateway parameter surface, driven through the router without
//! a broker (workers are constructed but never started).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use svp_config::{BrokerSettings, RetryPolicy, Topology, WorkerSettings};
use svp_gateway::messaging::{build_router, MessagingState, WorkerManager};
use svp_messaging::BrokerFactory;
use tower::ServiceExt;

fn state() -> Arc<MessagingState> {
    let broker = BrokerSettings {
        host: "mq".into(),
        port: 5672,
        username: "svp".into(),
        password: "secret".into(),
        virtual_host: "/".into(),
    };
    let topology = Topology::from_env();
    let factory = BrokerFactory::new(&broker, topology.clone());
    let settings = WorkerSettings {
        prefetch_count: 10,
        queue_capacity: 16,
        max_validators: 2,
    };
    let manager = WorkerManager::new(
        &factory,
        RetryPolicy::new(3, 0.1, 2.0, 60.0),
        settings.prefetch_count,
        settings.queue_capacity,
    );
    Arc::new(MessagingState {
        manager,
        broker,
        topology,
    })
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn params_expose_topology_but_never_the_password() {
    let (status, body) = get_json(build_router(state()), "/v1/messaging/params").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["host"], "mq");
    assert_eq!(body["exchange"], "svp.exchange");
    assert_eq!(body["queues"].as_array().unwrap().len(), 4);
    assert!(body.get("password").is_none());
    assert!(!body.to_string().contains("secret"));
}

#[tokio::test]
async fn routing_keys_switch_on_the_results_flag() {
    let (_, body) = get_json(build_router(state()), "/v1/routing-keys/schemas").await;
    assert_eq!(body["routing_key"], "schemas.update");

    let (_, body) = get_json(
        build_router(state()),
        "/v1/routing-keys/schemas?results=true",
    )
    .await;
    assert_eq!(body["routing_key"], "schemas.result.update");

    let (_, body) = get_json(
        build_router(state()),
        "/v1/routing-keys/validations?results=true",
    )
    .await;
    assert_eq!(body["routing_key"], "validation.result.request");
}

#[tokio::test]
async fn health_reports_queue_depths() {
    let (status, body) = get_json(build_router(state()), "/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schemas_queue_depth"], 0);
    assert_eq!(body["validations_queue_depth"], 0);
}
