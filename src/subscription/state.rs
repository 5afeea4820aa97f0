//! Per-subscription state.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::resilience::backoff::Backoff;
use crate::resources::{NodeGroup, ResourceType, Snapshot};

/// Wildcard token used by incremental clients.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Every response carries the full resource set of the type.
    StateOfTheWorld,
    /// Responses carry only changed and removed resources.
    Delta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Interest registered, nothing pushed yet.
    Requested,
    /// A version was pushed and is awaiting ACK/NACK.
    Subscribed { pending_version: String },
    /// The client acknowledged this version.
    Acked { version: String },
}

/// How a request changes the subscribed names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameUpdate {
    /// State-of-the-world: the request lists the full set (empty = all).
    Replace(BTreeSet<String>),
    /// Incremental: names added and removed since the previous request.
    Delta {
        subscribe: BTreeSet<String>,
        unsubscribe: BTreeSet<String>,
    },
}

/// A decoded client request as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub node_group: NodeGroup,
    pub resource_type: ResourceType,
    pub mode: DeliveryMode,
    pub names: NameUpdate,
    pub response_nonce: String,
    pub error_detail: Option<String>,
    /// Last version the client applied (state-of-the-world only).
    pub version_info: String,
    /// Resource versions the client already holds (delta only).
    pub initial_versions: BTreeMap<String, String>,
}

/// What a request did to its subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// First request of this type on the connection.
    Subscribed,
    /// Nonce-less follow-up; `names_changed` when the subscription grew or changed.
    Updated { names_changed: bool },
    /// The pending version was accepted.
    Acked { version: String },
    /// The pending version was rejected and will not be re-pushed before `retry_after`.
    Rejected { version: String, retry_after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub version: String,
    pub retry_at: Instant,
    pub detail: String,
}

/// State for one (connection, resource type) pair.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub node_group: NodeGroup,
    pub resource_type: ResourceType,
    pub mode: DeliveryMode,
    pub subscribed_names: BTreeSet<String>,
    pub wildcard: bool,
    pub acked_version: Option<String>,
    pub nonce: String,
    pub state: SubscriptionState,
    pub(crate) last_pushed_generation: u64,
    pub(crate) force_push: bool,
    pub(crate) consecutive_rejections: u32,
    pub(crate) rejection: Option<Rejection>,
    /// Resource name → version the client has acknowledged (delta).
    pub(crate) known: BTreeMap<String, String>,
    /// View including the in-flight push, committed on ACK (delta).
    pub(crate) pending_known: Option<BTreeMap<String, String>>,
}

impl Subscription {
    pub(crate) fn from_request(request: SubscriptionRequest) -> Self {
        let mut subscription = Self {
            node_group: request.node_group,
            resource_type: request.resource_type,
            mode: request.mode,
            subscribed_names: BTreeSet::new(),
            wildcard: false,
            acked_version: None,
            nonce: String::new(),
            state: SubscriptionState::Requested,
            last_pushed_generation: 0,
            force_push: false,
            consecutive_rejections: 0,
            rejection: None,
            known: BTreeMap::new(),
            pending_known: None,
        };

        match request.names {
            NameUpdate::Replace(names) => {
                subscription.wildcard = names.is_empty();
                subscription.subscribed_names = names;
            }
            NameUpdate::Delta {
                mut subscribe,
                unsubscribe,
            } => {
                subscription.wildcard = subscribe.is_empty() || subscribe.remove(WILDCARD);
                subscription.subscribed_names =
                    subscribe.difference(&unsubscribe).cloned().collect();
            }
        }

        match request.mode {
            DeliveryMode::StateOfTheWorld if !request.version_info.is_empty() => {
                subscription.acked_version = Some(request.version_info.clone());
                subscription.state = SubscriptionState::Acked {
                    version: request.version_info,
                };
            }
            DeliveryMode::Delta => subscription.known = request.initial_versions,
            _ => {}
        }

        subscription
    }

    /// Whether `name` is covered by this subscription.
    pub fn matches(&self, name: &str) -> bool {
        self.wildcard || self.subscribed_names.contains(name)
    }

    /// Whether `snapshot` should be pushed now.
    pub fn wants(&self, snapshot: &Snapshot, now: Instant) -> bool {
        // Never go backwards.
        if snapshot.generation() < self.last_pushed_generation {
            return false;
        }
        // A rejected version waits out its backoff, even across name changes.
        if let Some(rejection) = &self.rejection {
            if rejection.version == snapshot.version() && now < rejection.retry_at {
                return false;
            }
        }
        if self.force_push {
            return true;
        }
        if let SubscriptionState::Subscribed { pending_version } = &self.state {
            if pending_version == snapshot.version() {
                return false;
            }
        }
        self.acked_version.as_deref() != Some(snapshot.version())
    }

    /// Deadline after which a rejected version may be pushed again.
    pub fn retry_at(&self) -> Option<Instant> {
        self.rejection.as_ref().map(|r| r.retry_at)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SubscriptionState::Subscribed { .. })
    }

    /// Whether anything was ever delivered on this subscription.
    pub fn has_delivered(&self) -> bool {
        self.last_pushed_generation > 0 || self.acked_version.is_some()
    }

    pub fn consecutive_rejections(&self) -> u32 {
        self.consecutive_rejections
    }

    /// What the client holds once the in-flight push lands (delta).
    pub fn delivered_view(&self) -> &BTreeMap<String, String> {
        self.pending_known.as_ref().unwrap_or(&self.known)
    }

    /// Apply a name update; returns true when a push is required.
    pub(crate) fn apply_names(&mut self, update: &NameUpdate) -> bool {
        let changed = match update {
            NameUpdate::Replace(names) => {
                let wildcard = names.is_empty();
                let changed = wildcard != self.wildcard || *names != self.subscribed_names;
                self.wildcard = wildcard;
                self.subscribed_names = names.clone();
                changed
            }
            NameUpdate::Delta {
                subscribe,
                unsubscribe,
            } => {
                let mut added = false;
                for name in subscribe {
                    if name == WILDCARD {
                        added |= !self.wildcard;
                        self.wildcard = true;
                    } else {
                        added |= self.subscribed_names.insert(name.clone());
                    }
                }
                for name in unsubscribe {
                    if name == WILDCARD {
                        self.wildcard = false;
                        continue;
                    }
                    self.subscribed_names.remove(name);
                    self.known.remove(name);
                    if let Some(pending) = self.pending_known.as_mut() {
                        pending.remove(name);
                    }
                }
                // Dropping names needs no response; the client forgets them itself.
                added
            }
        };
        if changed {
            self.force_push = true;
        }
        changed
    }

    pub(crate) fn ack(&mut self) -> RequestOutcome {
        let version = match &self.state {
            SubscriptionState::Subscribed { pending_version } => pending_version.clone(),
            SubscriptionState::Acked { version } => {
                return RequestOutcome::Acked {
                    version: version.clone(),
                }
            }
            SubscriptionState::Requested => {
                return RequestOutcome::Updated {
                    names_changed: false,
                }
            }
        };

        self.acked_version = Some(version.clone());
        self.state = SubscriptionState::Acked {
            version: version.clone(),
        };
        self.consecutive_rejections = 0;
        self.rejection = None;
        if let Some(pending) = self.pending_known.take() {
            self.known = pending;
        }
        RequestOutcome::Acked { version }
    }

    pub(crate) fn reject(&mut self, detail: String, backoff: &Backoff, now: Instant) -> RequestOutcome {
        let version = match &self.state {
            SubscriptionState::Subscribed { pending_version } => pending_version.clone(),
            _ => {
                // Repeated NACK of a nonce already handled.
                return match &self.rejection {
                    Some(rejection) => RequestOutcome::Rejected {
                        version: rejection.version.clone(),
                        retry_after: rejection.retry_at.saturating_duration_since(now),
                    },
                    None => RequestOutcome::Updated {
                        names_changed: false,
                    },
                };
            }
        };

        self.consecutive_rejections += 1;
        let retry_after = backoff.delay(self.consecutive_rejections);
        self.rejection = Some(Rejection {
            version: version.clone(),
            retry_at: now + retry_after,
            detail,
        });
        self.pending_known = None;
        self.state = match &self.acked_version {
            Some(acked) => SubscriptionState::Acked {
                version: acked.clone(),
            },
            None => SubscriptionState::Requested,
        };
        RequestOutcome::Rejected {
            version,
            retry_after,
        }
    }

    pub(crate) fn pushed(&mut self, snapshot: &Snapshot, nonce: String, delivered: Option<BTreeMap<String, String>>) {
        self.nonce = nonce;
        self.state = SubscriptionState::Subscribed {
            pending_version: snapshot.version().to_string(),
        };
        self.last_pushed_generation = snapshot.generation();
        self.force_push = false;
        self.rejection = None;
        self.pending_known = delivered;
    }

    pub(crate) fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            node_group: self.node_group.clone(),
            resource_type: self.resource_type,
            mode: self.mode,
            state: self.state.clone(),
            acked_version: self.acked_version.clone(),
            nonce: self.nonce.clone(),
            wildcard: self.wildcard,
            names: self.subscribed_names.iter().cloned().collect(),
            consecutive_rejections: self.consecutive_rejections,
            last_rejection: self.rejection.as_ref().map(|r| r.detail.clone()),
        }
    }
}

/// Serializable view of a subscription for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub node_group: NodeGroup,
    #[serde(rename = "type_url")]
    pub resource_type: ResourceType,
    pub mode: DeliveryMode,
    #[serde(flatten)]
    pub state: SubscriptionState,
    pub acked_version: Option<String>,
    pub nonce: String,
    pub wildcard: bool,
    pub names: Vec<String>,
    pub consecutive_rejections: u32,
    pub last_rejection: Option<String>,
}
