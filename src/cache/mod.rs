//! Snapshot store subsystem.
//!
//! # Data Flow
//! ```text
//! set_snapshot(group, snapshot)
//!     → per-group publish lock (single writer)
//!     → version conflict check
//!     → ArcSwap store (readers never block)
//!     → watch signal bumped (wakes every SnapshotWatch of the group)
//!
//! SnapshotWatch::changed()
//!     → registered at creation, before the first check
//!     → resolves once the current version differs from the last one seen
//! ```

pub mod store;
pub mod watch;

pub use store::{SnapshotStatus, SnapshotStore};
pub use watch::SnapshotWatch;
