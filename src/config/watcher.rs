//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Notice edits to the configuration file, including editors that save by
//!   replacing the file
//! - Reload and validate the file once per burst of change events
//! - Publish only snapshots that differ from the last one
//!
//! # Data Flow
//! ```text
//! notify event (parent directory) → filter by file name → dirty signal
//!     → debounce → load_config → changed? → update channel
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::EmulatorConfig;

/// Quiet period that ends a burst of change events.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<EmulatorConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<EmulatorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Must be called inside a Tokio runtime; the returned
    /// watcher must be kept alive, and dropping it stops reloads.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(ToOwned::to_owned);
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|path| path.file_name() == file_name.as_deref());
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = dirty_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Configuration watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tokio::spawn(reload_loop(self.path.clone(), dirty_rx, self.update_tx));

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Turn dirty signals into validated, de-duplicated snapshots.
async fn reload_loop(
    path: PathBuf,
    mut dirty: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<EmulatorConfig>,
) {
    let mut last = load_config(&path).ok();

    while dirty.recv().await.is_some() {
        loop {
            match tokio::time::timeout(RELOAD_DEBOUNCE, dirty.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match load_config(&path) {
            Ok(config) if last.as_ref() == Some(&config) => {
                tracing::debug!(path = %path.display(), "Configuration unchanged, skipping reload");
            }
            Ok(config) => {
                tracing::info!(
                    path = %path.display(),
                    behaviors = config.behaviors.len(),
                    "Configuration change detected, reloading"
                );
                last = Some(config.clone());
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload configuration, keeping current one");
            }
        }
    }
}
