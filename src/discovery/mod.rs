//! Discovery service subsystem.
//!
//! # Data Flow
//! ```text
//! transport frame
//!     → protocol.rs (ClientMessage → SubscriptionRequest)
//!     → stream.rs (bind node group, update tracker)
//!     → sotw.rs / delta.rs (build response from the current snapshot)
//!     → tracker records nonce → ServerMessage out
//!
//! SnapshotStore publish
//!     → SnapshotWatch wakes the stream task
//!     → every subscription that wants the new version gets a response
//! ```
//!
//! # Design Decisions
//! - One task per stream; all per-stream state lives in the tracker
//! - A stream never sends a snapshot older than one it already sent
//! - Malformed input is answered with a rejection and never disturbs other streams

pub mod delta;
pub mod fetch;
pub mod protocol;
pub mod sotw;
pub mod stream;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::SnapshotStore;
use crate::config::DiscoveryConfig;
use crate::net::connection::ConnectionId;
use crate::resources::NodeGroup;
use crate::subscription::SubscriptionTracker;

pub use protocol::{
    ClientMessage, DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest,
    DiscoveryResponse, ErrorDetail, ServerMessage, StreamRejection,
};
pub use stream::{DiscoveryStream, StreamEnd};

/// Shared entry point for discovery streams and REST fetches.
#[derive(Debug)]
pub struct DiscoveryService {
    store: Arc<SnapshotStore>,
    tracker: Arc<SubscriptionTracker>,
    config: DiscoveryConfig,
    default_group: NodeGroup,
}

impl DiscoveryService {
    pub fn new(
        store: Arc<SnapshotStore>,
        tracker: Arc<SubscriptionTracker>,
        config: DiscoveryConfig,
        default_group: NodeGroup,
    ) -> Self {
        Self {
            store,
            tracker,
            config,
            default_group,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<SubscriptionTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn default_group(&self) -> &NodeGroup {
        &self.default_group
    }

    /// Start a stream for connection `id`. Responses are written to `outbound`.
    pub fn open_stream(&self, id: ConnectionId, outbound: mpsc::Sender<ServerMessage>) -> DiscoveryStream {
        DiscoveryStream::new(
            id,
            Arc::clone(&self.store),
            Arc::clone(&self.tracker),
            self.config.clone(),
            self.default_group.clone(),
            outbound,
        )
    }
}
