//! End-to-end discovery over the WebSocket transport.

use std::time::Duration;

use reqwest::StatusCode;
use xds_control_plane::config::ControlPlaneConfig;
use xds_control_plane::discovery::{ClientMessage, DiscoveryRequest, DiscoveryResponse, ErrorDetail, ServerMessage};

mod common;
use common::{connect, expect_silence, recv, send, start_control_plane, CLUSTER, LISTENER};

fn request(type_url: &str, version: &str, nonce: &str) -> ClientMessage {
    ClientMessage::Discovery(DiscoveryRequest {
        node_group: "edge".into(),
        type_url: type_url.into(),
        version_info: version.into(),
        response_nonce: nonce.into(),
        ..DiscoveryRequest::default()
    })
}

fn discovery(message: Option<ServerMessage>) -> DiscoveryResponse {
    match message {
        Some(ServerMessage::Discovery(response)) => response,
        other => panic!("expected discovery response, got {:?}", other),
    }
}

#[tokio::test]
async fn proxy_follows_published_versions() {
    let plane = start_control_plane(ControlPlaneConfig::default()).await;
    let mut client = connect(&plane).await;

    send(&mut client, &request(LISTENER, "", "")).await;
    expect_silence(&mut client).await;

    plane.publish("edge", "v1", &["main"]);
    let first = discovery(recv(&mut client).await);
    assert_eq!(first.version_info, "v1");
    assert_eq!(first.type_url, LISTENER);
    assert_eq!(first.resources[0].name, "main");

    send(&mut client, &request(LISTENER, "v1", &first.nonce)).await;
    expect_silence(&mut client).await;

    plane.publish("edge", "v2", &["main", "admin"]);
    let second = discovery(recv(&mut client).await);
    assert_eq!(second.version_info, "v2");
    assert_eq!(second.resources.len(), 2);
    assert_ne!(second.nonce, first.nonce);

    send(&mut client, &request(LISTENER, "v2", &second.nonce)).await;
    expect_silence(&mut client).await;

    let connections = plane.state.tracker().connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].subscriptions[0].acked_version.as_deref(), Some("v2"));
}

#[tokio::test]
async fn rejected_version_is_not_resent_immediately() {
    let plane = start_control_plane(ControlPlaneConfig::default()).await;
    plane.publish("edge", "v1", &["main"]);
    let mut client = connect(&plane).await;

    send(&mut client, &request(LISTENER, "", "")).await;
    let first = discovery(recv(&mut client).await);

    send(
        &mut client,
        &ClientMessage::Discovery(DiscoveryRequest {
            node_group: "edge".into(),
            type_url: LISTENER.into(),
            response_nonce: first.nonce.clone(),
            error_detail: Some(ErrorDetail {
                code: 3,
                message: "listener rejected".into(),
            }),
            ..DiscoveryRequest::default()
        }),
    )
    .await;
    expect_silence(&mut client).await;

    let connections = plane.state.tracker().connections();
    let subscription = &connections[0].subscriptions[0];
    assert_eq!(subscription.acked_version, None);
    assert_eq!(subscription.consecutive_rejections, 1);
    assert_eq!(subscription.last_rejection.as_deref(), Some("listener rejected"));

    // A newer version goes out straight away.
    plane.publish("edge", "v2", &["main"]);
    assert_eq!(discovery(recv(&mut client).await).version_info, "v2");
}

#[tokio::test]
async fn malformed_stream_is_closed_others_continue() {
    let plane = start_control_plane(ControlPlaneConfig::default()).await;
    let mut healthy = connect(&plane).await;
    let mut broken = connect(&plane).await;

    send(&mut healthy, &request(CLUSTER, "", "")).await;
    send(&mut broken, &request("type.googleapis.com/envoy.Unknown", "", "")).await;

    match recv(&mut broken).await {
        Some(ServerMessage::Rejected(rejection)) => assert!(rejection.reason.contains("unknown")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(recv(&mut broken).await.is_none(), "stream should be closed");

    plane.publish("edge", "v1", &["main"]);
    let response = discovery(recv(&mut healthy).await);
    assert_eq!(response.type_url, CLUSTER);
    assert!(response.resources.is_empty());
}

#[tokio::test]
async fn disconnect_releases_subscriptions() {
    let plane = start_control_plane(ControlPlaneConfig::default()).await;
    let mut client = connect(&plane).await;
    send(&mut client, &request(LISTENER, "", "")).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(plane.state.tracker().connection_count(), 1);
    assert_eq!(plane.state.streams.active_count(), 1);

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), async {
        while plane.state.tracker().connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriptions released");
}

#[tokio::test]
async fn stream_limit_refuses_upgrade() {
    let mut config = ControlPlaneConfig::default();
    config.listener.max_streams = 1;
    let plane = start_control_plane(config).await;

    let _first = connect(&plane).await;
    let refused = tokio_tungstenite::connect_async(format!("ws://{}/v3/discovery", plane.addr)).await;
    assert!(refused.is_err());
}

#[tokio::test]
async fn rest_fetch_long_polls() {
    let mut config = ControlPlaneConfig::default();
    config.discovery.fetch_timeout_secs = 1;
    let plane = start_control_plane(config).await;
    plane.publish("edge", "v1", &["main"]);
    let client = reqwest::Client::new();

    let response = client
        .post(plane.url("/v3/discovery/listeners"))
        .json(&DiscoveryRequest {
            node_group: "edge".into(),
            ..DiscoveryRequest::default()
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: DiscoveryResponse = response.json().await.unwrap();
    assert_eq!(body.version_info, "v1");

    let current = client
        .post(plane.url("/v3/discovery/listeners"))
        .json(&DiscoveryRequest {
            node_group: "edge".into(),
            version_info: "v1".into(),
            ..DiscoveryRequest::default()
        })
        .send()
        .await
        .unwrap();
    assert_eq!(current.status(), StatusCode::NOT_MODIFIED);

    let unknown = client
        .post(plane.url("/v3/discovery/gateways"))
        .json(&DiscoveryRequest::default())
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shutdown_closes_streams() {
    let plane = start_control_plane(ControlPlaneConfig::default()).await;
    let mut client = connect(&plane).await;
    send(&mut client, &request(LISTENER, "", "")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    plane.shutdown.trigger();
    assert!(recv(&mut client).await.is_none());
    let stopped = tokio::time::timeout(Duration::from_secs(5), plane.server).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn healthz_reports_streams() {
    let plane = start_control_plane(ControlPlaneConfig::default()).await;
    let body: serde_json::Value = reqwest::get(plane.url("/healthz"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_streams"], 0);
}
