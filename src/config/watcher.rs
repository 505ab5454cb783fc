//! Configuration file watcher for hot reload.
//!
//! The watcher only reports that the file changed. Loading, compiling and
//! swapping the new configuration happen in the reload coordinator, off the
//! notify callback thread.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A watcher that monitors the configuration file for content changes.
pub struct ConfigWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver that yields one unit per observed
    /// content change.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned guard must be kept alive for the lifetime of the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_content_event(&event.kind) {
                        tracing::debug!(kind = ?event.kind, "config file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "config file watcher error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(file = %self.path.display(), "config file watcher started");
        Ok(watcher)
    }
}

// Creates count as content changes because editors often save by replacing
// the file. Metadata-only and rename events are ignored.
fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
    )
}
