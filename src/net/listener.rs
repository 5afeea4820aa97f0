//! Listener binding and stream admission.
//!
//! # Responsibilities
//! - Bind the configured discovery address
//! - Cap concurrent discovery streams via a semaphore
//! - Surface bind errors with the offending address

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
}

/// Bind a TCP listener for the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let address: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|source| ListenerError::Address {
            address: config.bind_address.clone(),
            source,
        })?;

    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(address),
        max_streams = config.max_streams,
        "Listener bound"
    );
    Ok(listener)
}

/// Caps the number of concurrent discovery streams.
///
/// Excess upgrades are refused instead of queued; a proxy will simply
/// reconnect later.
#[derive(Debug, Clone)]
pub struct StreamLimiter {
    permits: Arc<Semaphore>,
    max_streams: usize,
}

impl StreamLimiter {
    pub fn new(max_streams: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_streams)),
            max_streams,
        }
    }

    /// Reserve a stream slot, or `None` when the limit is reached.
    pub fn try_acquire(&self) -> Option<StreamPermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| StreamPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_streams(&self) -> usize {
        self.max_streams
    }
}

/// A reserved stream slot, released on drop.
#[derive(Debug)]
pub struct StreamPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_refuses_past_capacity() {
        let limiter = StreamLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        drop(a);
        assert_eq!(limiter.available(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn bind_reports_bad_address() {
        let config = ListenerConfig {
            bind_address: "not-an-address".into(),
            ..ListenerConfig::default()
        };
        assert!(matches!(bind(&config).await, Err(ListenerError::Address { .. })));
    }
}
