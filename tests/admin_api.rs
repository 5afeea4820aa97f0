//! Admin / producer API.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use xds_control_plane::admin::setup_admin_router;
use xds_control_plane::cache::SnapshotStore;
use xds_control_plane::config::ControlPlaneConfig;
use xds_control_plane::http::AppState;
use xds_control_plane::lifecycle::Shutdown;

const KEY: &str = "test-admin-key";

fn admin() -> (Router, AppState) {
    let mut config = ControlPlaneConfig::default();
    config.admin.enabled = true;
    config.admin.api_key = KEY.into();
    let state = AppState::new(config, Arc::new(SnapshotStore::new()), Shutdown::new());
    (setup_admin_router(state.clone()), state)
}

fn call(method: Method, path: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", KEY));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn document(version: &str) -> Value {
    json!({
        "version": version,
        "resources": {
            "listener": [{ "name": "main", "payload": { "address": "0.0.0.0", "port_value": 80 } }],
            "cluster": [{ "name": "web_service", "payload": { "connect_timeout": "5s" } }]
        }
    })
}

#[tokio::test]
async fn requires_bearer_token() {
    let (app, _) = admin();
    let missing = app
        .clone()
        .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .oneshot(
            Request::builder()
                .uri("/admin/status")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn publish_inspect_and_clear() {
    let (app, state) = admin();

    let created = app
        .clone()
        .oneshot(call(Method::PUT, "/admin/snapshots/edge", Some(document("1"))))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let status = json_body(created).await;
    assert_eq!(status["version"], "1");
    assert_eq!(status["resources"]["listener"], 1);
    assert_eq!(state.store().get_snapshot(&"edge".into()).unwrap().version(), "1");

    let conflict = app
        .clone()
        .oneshot(call(Method::PUT, "/admin/snapshots/edge", Some(document("1"))))
        .await
        .unwrap();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let fetched = app
        .clone()
        .oneshot(call(Method::GET, "/admin/snapshots/edge", None))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = json_body(fetched).await;
    assert_eq!(body["node_group"], "edge");
    assert_eq!(body["resources"]["cluster"][0]["name"], "web_service");
    assert_eq!(body["resources"]["listener"][0]["payload"]["port_value"], 80);

    let listed = app
        .clone()
        .oneshot(call(Method::GET, "/admin/snapshots", None))
        .await
        .unwrap();
    assert_eq!(json_body(listed).await.as_array().unwrap().len(), 1);

    let cleared = app
        .clone()
        .oneshot(call(Method::DELETE, "/admin/snapshots/edge", None))
        .await
        .unwrap();
    assert_eq!(cleared.status(), StatusCode::NO_CONTENT);

    let gone = app
        .oneshot(call(Method::GET, "/admin/snapshots/edge", None))
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_documents_are_bad_requests() {
    let (app, state) = admin();

    let duplicate = json!({
        "version": "1",
        "resources": { "listener": [ { "name": "main" }, { "name": "main" } ] }
    });
    let response = app
        .clone()
        .oneshot(call(Method::PUT, "/admin/snapshots/edge", Some(duplicate)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unknown_type = json!({ "version": "1", "resources": { "gateway": [ { "name": "g" } ] } });
    let response = app
        .clone()
        .oneshot(call(Method::PUT, "/admin/snapshots/edge", Some(unknown_type)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut other_group = document("1");
    other_group["node_group"] = json!("core");
    let response = app
        .oneshot(call(Method::PUT, "/admin/snapshots/edge", Some(other_group)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(state.store().node_groups().is_empty());
}

#[tokio::test]
async fn status_and_connections() {
    let (app, _) = admin();
    let status = app
        .clone()
        .oneshot(call(Method::GET, "/admin/status", None))
        .await
        .unwrap();
    let body = json_body(status).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["node_groups"], 0);
    assert_eq!(body["active_streams"], 0);

    let connections = app
        .oneshot(call(Method::GET, "/admin/connections", None))
        .await
        .unwrap();
    assert_eq!(json_body(connections).await, json!([]));
}

#[tokio::test]
async fn clearing_unknown_group_is_not_found() {
    let (app, _) = admin();
    let response = app
        .oneshot(call(Method::DELETE, "/admin/snapshots/nowhere", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
