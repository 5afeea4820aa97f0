//! Per-stream driver.
//!
//! The task suspends on four sources at once: the next client frame, a
//! snapshot change for its node group, the earliest NACK retry deadline and
//! server shutdown.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::cache::{SnapshotStore, SnapshotWatch};
use crate::config::DiscoveryConfig;
use crate::discovery::protocol::{ClientMessage, ServerMessage, StreamRejection};
use crate::discovery::{delta, sotw};
use crate::error::{Result, XdsError};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::resources::{NodeGroup, ResourceType, Snapshot};
use crate::subscription::{
    DeliveryMode, Registration, RequestOutcome, SubscriptionRequest, SubscriptionTracker,
};

/// Inbound item: a decoded frame, or the reason a frame could not be decoded.
pub type Inbound = std::result::Result<ClientMessage, XdsError>;

/// Why a stream task finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The client closed its side.
    ClientClosed,
    /// The outbound side went away.
    TransportClosed,
    /// Closed after a malformed request.
    Rejected(String),
    /// Server shutdown.
    Shutdown,
}

pub struct DiscoveryStream {
    id: ConnectionId,
    store: Arc<SnapshotStore>,
    tracker: Arc<SubscriptionTracker>,
    config: DiscoveryConfig,
    default_group: NodeGroup,
    outbound: mpsc::Sender<ServerMessage>,
    node_group: Option<NodeGroup>,
    watch: Option<SnapshotWatch>,
    _registration: Registration,
}

impl DiscoveryStream {
    pub(crate) fn new(
        id: ConnectionId,
        store: Arc<SnapshotStore>,
        tracker: Arc<SubscriptionTracker>,
        config: DiscoveryConfig,
        default_group: NodeGroup,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        let registration = tracker.register(id);
        Self {
            id,
            store,
            tracker,
            config,
            default_group,
            outbound,
            node_group: None,
            watch: None,
            _registration: registration,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn node_group(&self) -> Option<&NodeGroup> {
        self.node_group.as_ref()
    }

    /// Drive the stream until the client leaves, the stream is rejected or
    /// the server shuts down. Subscriptions are released on return.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Inbound>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> StreamEnd {
        tracing::debug!(connection_id = %self.id, "Discovery stream started");

        let end = loop {
            let retry_at = self.tracker.next_retry_at(self.id);

            let step = tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => self.on_frame(frame).await,
                    None => Err(StreamEnd::ClientClosed),
                },
                snapshot = next_snapshot(self.watch.as_mut()) => {
                    tracing::debug!(
                        connection_id = %self.id,
                        version = %snapshot.version(),
                        generation = snapshot.generation(),
                        "Snapshot changed"
                    );
                    self.push_all(&snapshot).await.map_err(|_| StreamEnd::TransportClosed)
                }
                _ = sleep_until(retry_at) => self.retry().await,
                _ = shutdown.recv() => Err(StreamEnd::Shutdown),
            };

            if let Err(end) = step {
                break end;
            }
        };

        tracing::debug!(
            connection_id = %self.id,
            node_group = ?self.node_group.as_ref().map(NodeGroup::as_str),
            reason = ?end,
            "Discovery stream finished"
        );
        end
    }

    async fn on_frame(&mut self, frame: Inbound) -> std::result::Result<(), StreamEnd> {
        let type_url = frame
            .as_ref()
            .ok()
            .map(|m| m.type_url().to_string())
            .filter(|t| !t.is_empty());
        match self.handle(frame).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_rejection() => self.reject(type_url, e).await,
            Err(_) => Err(StreamEnd::TransportClosed),
        }
    }

    async fn handle(&mut self, frame: Inbound) -> Result<()> {
        let request = frame?.into_request(&self.default_group)?;
        let resource_type = request.resource_type;
        self.bind(&request.node_group, resource_type)?;
        self.on_request(request)?;
        self.push_if_needed(resource_type).await
    }

    /// Record a request; stale ACKs are ignored but still fall through to a push check.
    fn on_request(&self, request: SubscriptionRequest) -> Result<()> {
        let resource_type = request.resource_type;
        match self.tracker.on_request(self.id, request) {
            Ok(RequestOutcome::Rejected { version, retry_after }) => {
                tracing::warn!(
                    connection_id = %self.id,
                    resource_type = %resource_type,
                    version = %version,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Client rejected version"
                );
                Ok(())
            }
            Ok(outcome) => {
                tracing::debug!(
                    connection_id = %self.id,
                    resource_type = %resource_type,
                    outcome = ?outcome,
                    "Request recorded"
                );
                Ok(())
            }
            Err(XdsError::StaleAck { nonce, .. }) => {
                tracing::debug!(
                    connection_id = %self.id,
                    resource_type = %resource_type,
                    nonce = %nonce,
                    "Ignoring response to superseded nonce"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Bind the stream to its node group on the first request.
    fn bind(&mut self, node_group: &NodeGroup, resource_type: ResourceType) -> Result<()> {
        match &self.node_group {
            Some(bound) if bound == node_group => Ok(()),
            Some(bound) => Err(XdsError::MalformedRequest(format!(
                "stream is bound to node group {}, request names {}",
                bound, node_group
            ))),
            None => {
                // Registered before anything is read from the store.
                self.watch = Some(self.store.watch(node_group, resource_type, None));
                self.node_group = Some(node_group.clone());
                tracing::debug!(connection_id = %self.id, node_group = %node_group, "Stream bound");
                Ok(())
            }
        }
    }

    async fn reject(&mut self, type_url: Option<String>, error: XdsError) -> std::result::Result<(), StreamEnd> {
        let reason = error.to_string();
        metrics::record_rejection(match error {
            XdsError::UnknownResourceType(_) => "unknown_type",
            _ => "malformed",
        });
        tracing::warn!(connection_id = %self.id, reason = %reason, "Rejecting request");

        let message = ServerMessage::Rejected(StreamRejection {
            type_url,
            reason: reason.clone(),
        });
        if self.outbound.send(message).await.is_err() {
            return Err(StreamEnd::TransportClosed);
        }
        if self.config.close_on_malformed {
            Err(StreamEnd::Rejected(reason))
        } else {
            Ok(())
        }
    }

    async fn retry(&mut self) -> std::result::Result<(), StreamEnd> {
        match self.current_snapshot() {
            Some(snapshot) => self.push_all(&snapshot).await.map_err(|_| StreamEnd::TransportClosed),
            None => Ok(()),
        }
    }

    fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.watch.as_ref().and_then(SnapshotWatch::current)
    }

    async fn push_all(&mut self, snapshot: &Snapshot) -> Result<()> {
        for resource_type in self.tracker.subscribed_types(self.id) {
            self.push(resource_type, snapshot).await?;
        }
        Ok(())
    }

    async fn push_if_needed(&mut self, resource_type: ResourceType) -> Result<()> {
        match self.current_snapshot() {
            Some(snapshot) => self.push(resource_type, &snapshot).await,
            // Nothing published yet; the watch fires once something is.
            None => Ok(()),
        }
    }

    async fn push(&mut self, resource_type: ResourceType, snapshot: &Snapshot) -> Result<()> {
        let Some(subscription) = self.tracker.subscription(self.id, resource_type) else {
            return Ok(());
        };
        if !subscription.wants(snapshot, Instant::now()) {
            return Ok(());
        }

        let message = match subscription.mode {
            DeliveryMode::StateOfTheWorld => {
                let nonce = self.tracker.record_push(self.id, resource_type, snapshot, None)?;
                ServerMessage::Discovery(sotw::response(
                    snapshot,
                    resource_type,
                    |name| subscription.matches(name),
                    nonce,
                ))
            }
            DeliveryMode::Delta => {
                let diff = delta::diff(snapshot, &subscription);
                if diff.is_empty() && subscription.has_delivered() {
                    self.tracker.mark_current(self.id, resource_type, snapshot);
                    return Ok(());
                }
                let nonce = self.tracker.record_push(
                    self.id,
                    resource_type,
                    snapshot,
                    Some(diff.next_known.clone()),
                )?;
                ServerMessage::Delta(diff.into_response(snapshot, resource_type.type_url(), nonce))
            }
        };

        tracing::debug!(
            connection_id = %self.id,
            resource_type = %resource_type,
            version = %snapshot.version(),
            "Sending response"
        );
        self.outbound.send(message).await.map_err(|_| XdsError::StreamClosed)?;
        metrics::record_response(resource_type, subscription.mode);
        Ok(())
    }
}

async fn next_snapshot(watch: Option<&mut SnapshotWatch>) -> Arc<Snapshot> {
    match watch {
        Some(watch) => watch.changed().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
