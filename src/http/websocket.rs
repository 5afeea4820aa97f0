//! WebSocket transport for the aggregated discovery stream.
//!
//! # Data Flow
//! ```text
//! Client ──text frames──→ reader task ──ClientMessage──→ DiscoveryStream
//! Client ←─text frames─── writer task ←─ServerMessage─── DiscoveryStream
//! ```
//!
//! # Design Decisions
//! - The bridge holds no protocol state; it only encodes and decodes frames
//! - Undecodable frames are forwarded as errors so the stream can reject them
//! - The writer drains queued messages (e.g. a rejection) before closing

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;

use crate::discovery::stream::Inbound;
use crate::discovery::{ClientMessage, ServerMessage};
use crate::error::XdsError;
use crate::http::server::AppState;
use crate::net::listener::StreamPermit;

/// `GET /v3/discovery`.
pub async fn discovery_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let Some(permit) = state.stream_limit.try_acquire() else {
        tracing::warn!(
            peer = %peer,
            max_streams = state.stream_limit.max_streams(),
            "Refusing discovery stream, limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many discovery streams").into_response();
    };

    ws.on_upgrade(move |socket| serve_socket(socket, state, permit, peer))
}

async fn serve_socket(socket: WebSocket, state: AppState, _permit: StreamPermit, peer: SocketAddr) {
    let guard = state.streams.track();
    let buffer = state.discovery.config().stream_buffer;
    let (in_tx, in_rx) = mpsc::channel(buffer);
    let (out_tx, out_rx) = mpsc::channel(buffer);

    let (sink, source) = socket.split();
    let reader = tokio::spawn(read_frames(source, in_tx));
    let writer = tokio::spawn(write_frames(sink, out_rx));

    tracing::info!(connection_id = %guard.id(), peer = %peer, "Discovery stream opened");
    let stream = state.discovery.open_stream(guard.id(), out_tx);
    let end = stream.run(in_rx, state.shutdown.subscribe()).await;

    reader.abort();
    let _ = writer.await;
    tracing::info!(connection_id = %guard.id(), peer = %peer, reason = ?end, "Discovery stream closed");
}

fn decode(frame: &[u8]) -> Inbound {
    serde_json::from_slice::<ClientMessage>(frame)
        .map_err(|e| XdsError::MalformedRequest(format!("undecodable frame: {}", e)))
}

async fn read_frames(mut source: SplitStream<WebSocket>, inbound: mpsc::Sender<Inbound>) {
    while let Some(frame) = source.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => decode(text.as_str().as_bytes()),
            Ok(Message::Binary(bytes)) => decode(&bytes),
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum.
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket read failed");
                break;
            }
        };
        if inbound.send(message).await.is_err() {
            break;
        }
    }
}

async fn write_frames(mut sink: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<ServerMessage>) {
    while let Some(message) = outbound.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server message");
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reports_garbage_as_malformed() {
        assert!(matches!(decode(b"{not json"), Err(XdsError::MalformedRequest(_))));
        assert!(matches!(
            decode(br#"{"kind":"discovery","type_url":"listener"}"#),
            Ok(ClientMessage::Discovery(_))
        ));
    }
}
