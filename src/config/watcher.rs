//! Snapshot file watcher for hot re-publishing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_snapshot_document;
use crate::resources::SnapshotDocument;

/// Monitors the bootstrap snapshot file and emits every document that parses.
pub struct SnapshotFileWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<SnapshotDocument>,
}

impl SnapshotFileWatcher {
    /// Returns the watcher and a receiver for reloaded documents.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<SnapshotDocument>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self {
            path: path.to_path_buf(),
            update_tx,
        }, update_rx)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Snapshot file change detected, reloading");
                        match load_snapshot_document(&path) {
                            Ok(document) => {
                                let _ = tx.send(document);
                            }
                            Err(e) => {
                                tracing::error!("Failed to reload snapshot file: {}. Keeping current snapshot.", e);
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Snapshot file watcher started");
        Ok(watcher)
    }
}
