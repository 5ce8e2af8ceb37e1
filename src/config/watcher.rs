//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself so that
//! editors which save by rename keep triggering reloads. Events are reduced
//! to "the file's content changed" before anything is parsed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::ForwarderConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ForwarderConfig>,
}

/// Remembers the last content seen so repeated events for one save reload once.
#[derive(Debug, Default)]
struct ContentGate {
    last: Mutex<Option<String>>,
}

impl ContentGate {
    fn seeded(content: Option<String>) -> Self {
        Self {
            last: Mutex::new(content),
        }
    }

    /// Returns the content if it differs from the last accepted one.
    fn changed(&self, content: String) -> Option<String> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(content.as_str()) {
            return None;
        }
        *last = Some(content.clone());
        Some(content)
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event.paths.iter().any(|p| p.file_name() == path.file_name())
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ForwarderConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path;
        let gate = ContentGate::seeded(fs::read_to_string(&path).ok());
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &file) => {
                    let content = match fs::read_to_string(&file) {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!(path = ?file, error = %e, "Config file unreadable");
                            return;
                        }
                    };
                    let Some(content) = gate.changed(content) else {
                        return;
                    };
                    tracing::info!(path = ?file, "Config file change detected, reloading");
                    match parse_config(&content) {
                        Ok(new_config) => {
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Failed to reload config; keeping current configuration"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
