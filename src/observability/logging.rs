//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives when neither `RUST_LOG` nor a usable level is given.
fn default_directives(level: &str) -> String {
    format!("xds_control_plane={level},tower_http={level}")
}

/// Build the filter for `level`, letting `RUST_LOG` override it.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directives(level))
            .unwrap_or_else(|_| EnvFilter::new(default_directives("info")))
    })
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let result = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::debug!(level, "Logging initialized");
    }
}
