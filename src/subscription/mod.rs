//! Subscription tracking subsystem.
//!
//! # State Machine (per connection and resource type)
//! ```text
//! (none) ──first request──▶ Requested
//! Requested ──push v──▶ Subscribed(v)
//! Subscribed(v) ──ACK nonce──▶ Acked(v)
//! Subscribed(v) ──NACK nonce──▶ Acked(previous) | Requested   (+ backoff before re-pushing v)
//! Acked(v) ──push w──▶ Subscribed(w)
//! Subscribed(v) ──push w──▶ Subscribed(w)   (ACK of v is now stale)
//! any ──disconnect──▶ (none)
//! ```
//!
//! # Design Decisions
//! - Nonces are issued per connection (`n1`, `n2`, ...), so a nonce from
//!   another stream is recognisably foreign
//! - A rejected version is retried only after exponential backoff; a newer
//!   version is pushed immediately
//! - Connection state is released by a drop guard, so a cancelled stream task
//!   cannot leak subscriptions

pub mod state;
pub mod tracker;

pub use state::{
    DeliveryMode, NameUpdate, RequestOutcome, Subscription, SubscriptionRequest,
    SubscriptionState, SubscriptionSummary,
};
pub use tracker::{ConnectionSummary, Registration, SubscriptionTracker};
