//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close discovery streams → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup in main: config, logging, store, bootstrap snapshot, listeners
//! - Every stream task holds a shutdown receiver and exits on the broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
