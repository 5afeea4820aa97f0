//! xDS control plane (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!   producer ─PUT────▶ │  admin API ──▶ SnapshotStore ◀── bootstrap file      │
//!   (xds-cli)          │                    │  (per node group, versioned)    │
//!                      │                    │ watch                           │
//!                      │                    ▼                                 │
//!   proxy ◀──ws──────▶ │  http/websocket ─▶ DiscoveryStream ◀─▶ Subscription  │
//!   proxy ──POST─────▶ │  http/fetch ─────▶ DiscoveryService       Tracker    │
//!                      │                                                      │
//!                      │  config · observability · lifecycle · resilience     │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use xds_control_plane::admin::setup_admin_router;
use xds_control_plane::cache::SnapshotStore;
use xds_control_plane::config::loader::{load_config, load_snapshot_document};
use xds_control_plane::config::validation::validate_config;
use xds_control_plane::config::watcher::SnapshotFileWatcher;
use xds_control_plane::config::ControlPlaneConfig;
use xds_control_plane::http::{AppState, XdsServer};
use xds_control_plane::lifecycle::{signals, Shutdown};
use xds_control_plane::net::listener;
use xds_control_plane::observability::{logging, metrics};
use xds_control_plane::resources::{NodeGroup, SnapshotDocument};

#[derive(Parser)]
#[command(name = "xds-control-plane")]
#[command(about = "Serves versioned proxy configuration over discovery streams", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Overrides bootstrap.snapshot_path.
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ControlPlaneConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(snapshot) = &args.snapshot {
        config.bootstrap.snapshot_path = Some(snapshot.display().to_string());
    }
    validate_config(&config).map_err(|errors| {
        errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    })?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("xds-control-plane v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_streams = config.listener.max_streams,
        nack_backoff_base_ms = config.discovery.nack_backoff_base_ms,
        nack_backoff_max_ms = config.discovery.nack_backoff_max_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(SnapshotStore::new());
    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    // Kept alive for the lifetime of the process.
    let _snapshot_watcher = match config.bootstrap.snapshot_path.clone() {
        Some(path) => bootstrap(&store, &config, Path::new(&path))?,
        None => None,
    };

    let state = AppState::new(config.clone(), Arc::clone(&store), shutdown.clone());

    if config.admin.enabled {
        let admin_listener = tokio::net::TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin = setup_admin_router(state.clone());
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = listener::bind(&config.listener).await?;
    XdsServer::new(state).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Publish the bootstrap snapshot and, if configured, start re-publishing it on change.
fn bootstrap(
    store: &Arc<SnapshotStore>,
    config: &ControlPlaneConfig,
    path: &Path,
) -> Result<Option<notify::RecommendedWatcher>, Box<dyn std::error::Error>> {
    let default_group = NodeGroup::new(config.bootstrap.node_group.clone());
    let document = load_snapshot_document(path)?;
    publish(store, &default_group, document)?;

    if !config.bootstrap.watch {
        return Ok(None);
    }

    let (watcher, mut updates) = SnapshotFileWatcher::new(path);
    let handle = watcher.run()?;
    let store = Arc::clone(store);
    tokio::spawn(async move {
        while let Some(document) = updates.recv().await {
            if let Err(e) = publish(&store, &default_group, document) {
                tracing::warn!(error = %e, "Reloaded snapshot not published");
            }
        }
    });
    Ok(Some(handle))
}

fn publish(
    store: &SnapshotStore,
    default_group: &NodeGroup,
    document: SnapshotDocument,
) -> Result<(), xds_control_plane::XdsError> {
    let group = document
        .node_group
        .clone()
        .map(NodeGroup::new)
        .unwrap_or_else(|| default_group.clone());
    store.publish_document(&group, document).map(|_| ())
}
