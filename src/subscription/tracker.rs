//! Connection-scoped subscription registry.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{Result, XdsError};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resources::{ResourceType, Snapshot};
use crate::subscription::state::{
    RequestOutcome, Subscription, SubscriptionRequest, SubscriptionState, SubscriptionSummary,
};

#[derive(Debug, Default)]
struct ConnectionEntry {
    nonce_counter: u64,
    subscriptions: HashMap<ResourceType, Subscription>,
}

/// Serializable view of one connection for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub connection_id: String,
    pub subscriptions: Vec<SubscriptionSummary>,
}

/// Owns every subscription of every live connection.
#[derive(Debug)]
pub struct SubscriptionTracker {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    backoff: Backoff,
}

impl SubscriptionTracker {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            connections: DashMap::new(),
            backoff,
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Start tracking a connection. The returned guard releases all of its
    /// subscriptions when dropped.
    pub fn register(self: &Arc<Self>, id: ConnectionId) -> Registration {
        self.connections.entry(id).or_default();
        Registration {
            tracker: Arc::clone(self),
            id,
        }
    }

    /// Record a client request against its subscription.
    ///
    /// ACKs advance `acked_version`; NACKs (requests carrying an error detail)
    /// leave it untouched and start the retry backoff. A nonce issued earlier
    /// on this connection yields [`XdsError::StaleAck`]; one never issued here
    /// is a [`XdsError::MalformedRequest`]. Neither touches the subscription.
    pub fn on_request(&self, id: ConnectionId, request: SubscriptionRequest) -> Result<RequestOutcome> {
        let mut entry = self.connections.entry(id).or_default();
        let entry = &mut *entry;
        let resource_type = request.resource_type;

        let subscription = match entry.subscriptions.entry(resource_type) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                tracing::debug!(
                    connection_id = %id,
                    node_group = %request.node_group,
                    resource_type = %resource_type,
                    mode = ?request.mode,
                    "Subscription created"
                );
                vacant.insert(Subscription::from_request(request));
                return Ok(RequestOutcome::Subscribed);
            }
        };

        if subscription.mode != request.mode {
            return Err(XdsError::MalformedRequest(format!(
                "{} subscription cannot switch delivery mode",
                resource_type
            )));
        }

        if request.response_nonce.is_empty() {
            subscription.node_group = request.node_group;
            let names_changed = subscription.apply_names(&request.names);
            return Ok(RequestOutcome::Updated { names_changed });
        }

        if request.response_nonce != subscription.nonce {
            return if issued_on_connection(&request.response_nonce, entry.nonce_counter) {
                Err(XdsError::StaleAck {
                    resource_type,
                    nonce: request.response_nonce,
                })
            } else {
                Err(XdsError::MalformedRequest(format!(
                    "nonce {:?} was never issued for {}",
                    request.response_nonce, resource_type
                )))
            };
        }

        subscription.node_group = request.node_group;
        subscription.apply_names(&request.names);

        let outcome = match request.error_detail {
            Some(detail) => {
                metrics::record_nack(resource_type);
                subscription.reject(detail, &self.backoff, Instant::now())
            }
            None => {
                metrics::record_ack(resource_type);
                subscription.ack()
            }
        };
        Ok(outcome)
    }

    /// Record that a response for `snapshot` is being sent; returns its nonce.
    ///
    /// `delivered` is the delta view the client will hold once it ACKs.
    pub fn record_push(
        &self,
        id: ConnectionId,
        resource_type: ResourceType,
        snapshot: &Snapshot,
        delivered: Option<BTreeMap<String, String>>,
    ) -> Result<String> {
        let mut entry = self.connections.get_mut(&id).ok_or(XdsError::StreamClosed)?;
        let entry = &mut *entry;

        let subscription = entry.subscriptions.get_mut(&resource_type).ok_or_else(|| {
            XdsError::MalformedRequest(format!("no {} subscription on this stream", resource_type))
        })?;

        entry.nonce_counter += 1;
        let nonce = format!("n{}", entry.nonce_counter);
        subscription.pushed(snapshot, nonce.clone(), delivered);
        Ok(nonce)
    }

    /// Move an idle subscription to `snapshot` without sending anything
    /// (delta subscriptions whose resources did not change).
    pub fn mark_current(&self, id: ConnectionId, resource_type: ResourceType, snapshot: &Snapshot) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            if let Some(subscription) = entry.subscriptions.get_mut(&resource_type) {
                if subscription.is_pending() {
                    return;
                }
                subscription.acked_version = Some(snapshot.version().to_string());
                subscription.state = SubscriptionState::Acked {
                    version: snapshot.version().to_string(),
                };
                subscription.last_pushed_generation = snapshot.generation();
                subscription.force_push = false;
            }
        }
    }

    /// Copy of a subscription's current state.
    pub fn subscription(&self, id: ConnectionId, resource_type: ResourceType) -> Option<Subscription> {
        self.connections
            .get(&id)
            .and_then(|entry| entry.subscriptions.get(&resource_type).cloned())
    }

    /// Resource types the connection is subscribed to.
    pub fn subscribed_types(&self, id: ConnectionId) -> Vec<ResourceType> {
        let mut types: Vec<ResourceType> = self
            .connections
            .get(&id)
            .map(|entry| entry.subscriptions.keys().copied().collect())
            .unwrap_or_default();
        types.sort();
        types
    }

    /// Earliest future retry deadline across the connection's subscriptions.
    pub fn next_retry_at(&self, id: ConnectionId) -> Option<Instant> {
        let now = Instant::now();
        self.connections.get(&id).and_then(|entry| {
            entry
                .subscriptions
                .values()
                .filter_map(Subscription::retry_at)
                .filter(|at| *at > now)
                .min()
        })
    }

    /// Forget every subscription of a connection. Idempotent.
    pub fn on_disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            tracing::debug!(connection_id = %id, "Subscriptions released");
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<(u64, ConnectionSummary)> = self
            .connections
            .iter()
            .map(|entry| {
                let mut subscriptions: Vec<SubscriptionSummary> =
                    entry.value().subscriptions.values().map(Subscription::summary).collect();
                subscriptions.sort_by_key(|s| s.resource_type);
                (
                    entry.key().as_u64(),
                    ConnectionSummary {
                        connection_id: entry.key().to_string(),
                        subscriptions,
                    },
                )
            })
            .collect();
        summaries.sort_by_key(|(id, _)| *id);
        summaries.into_iter().map(|(_, summary)| summary).collect()
    }
}

fn issued_on_connection(nonce: &str, issued: u64) -> bool {
    nonce
        .strip_prefix('n')
        .and_then(|n| n.parse::<u64>().ok())
        .map_or(false, |n| n >= 1 && n <= issued)
}

/// Drop guard tying subscriptions to a connection's lifetime.
#[derive(Debug)]
pub struct Registration {
    tracker: Arc<SubscriptionTracker>,
    id: ConnectionId,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.tracker.on_disconnect(self.id);
    }
}
