//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Client rejects a pushed version (NACK):
//!     → subscription tracker counts consecutive rejections
//!     → backoff.rs computes the delay before the same version is re-pushed
//!     → stream driver sleeps until the earliest retry deadline
//! ```
//!
//! # Design Decisions
//! - Retries of a rejected version are delayed; newer versions are not
//! - Jittered backoff prevents a fleet of rejecting proxies retrying in lockstep
//! - The delay never exceeds the configured cap, jitter included

pub mod backoff;
