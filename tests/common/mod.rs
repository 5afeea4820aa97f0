//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use xds_control_plane::cache::SnapshotStore;
use xds_control_plane::config::ControlPlaneConfig;
use xds_control_plane::discovery::{ClientMessage, ServerMessage};
use xds_control_plane::http::{AppState, XdsServer};
use xds_control_plane::lifecycle::Shutdown;
use xds_control_plane::resources::{NodeGroup, Resource, ResourceType, Snapshot};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const LISTENER: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const CLUSTER: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

/// A control plane serving on an ephemeral port.
pub struct TestPlane {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub server: JoinHandle<Result<(), std::io::Error>>,
}

impl TestPlane {
    pub fn store(&self) -> &Arc<SnapshotStore> {
        self.state.store()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn publish(&self, group: &str, version: &str, listeners: &[&str]) {
        let snapshot = Snapshot::new(
            version,
            [(
                ResourceType::Listener,
                listeners
                    .iter()
                    .map(|name| Resource::new(*name, format!("{}@{}", name, version).into_bytes()))
                    .collect(),
            )],
        )
        .unwrap();
        self.store().set_snapshot(&NodeGroup::from(group), snapshot).unwrap();
    }
}

pub async fn start_control_plane(mut config: ControlPlaneConfig) -> TestPlane {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let state = AppState::new(config, Arc::new(SnapshotStore::new()), shutdown.clone());
    let server = tokio::spawn(XdsServer::new(state.clone()).run(listener));

    TestPlane {
        addr,
        state,
        shutdown,
        server,
    }
}

pub async fn connect(plane: &TestPlane) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}/v3/discovery", plane.addr))
        .await
        .expect("websocket upgrade");
    client
}

pub async fn send(client: &mut Client, message: &ClientMessage) {
    let frame = serde_json::to_string(message).unwrap();
    client.send(Message::text(frame)).await.unwrap();
}

/// Next server message; `None` when the server closed the stream.
pub async fn recv(client: &mut Client) -> Option<ServerMessage> {
    let next = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = client.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str::<ServerMessage>(text.as_str()).unwrap())
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    })
    .await;
    next.expect("timed out waiting for the server")
}

pub async fn expect_silence(client: &mut Client) {
    assert!(
        tokio::time::timeout(Duration::from_millis(100), client.next())
            .await
            .is_err(),
        "no message expected"
    );
}
