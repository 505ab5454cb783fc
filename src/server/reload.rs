//! Debounced configuration reload.
//!
//! Sits between the file watcher and the serving state. Change events
//! arrive over a channel; a burst of them (editors write several times
//! per save) collapses into one reload attempt. The new configuration is
//! loaded and compiled off the async runtime and published as a whole
//! snapshot; any failure leaves the previous snapshot serving.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::server::{
    build_active_configuration, ActiveConfiguration, AppState, InstanceInfo, ServerError,
};

/// How long the file must stay quiet before a reload is attempted.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Load(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] ServerError),

    #[error("reload worker was cancelled")]
    Cancelled,
}

/// Applies config file changes to the running server.
pub struct ConfigReloadCoordinator {
    path: PathBuf,
    state: AppState,
    events: mpsc::UnboundedReceiver<()>,
}

impl ConfigReloadCoordinator {
    pub fn new(path: &Path, state: AppState, events: mpsc::UnboundedReceiver<()>) -> Self {
        Self {
            path: path.to_path_buf(),
            state,
            events,
        }
    }

    /// Consumes change events until the watcher side closes the channel.
    pub async fn run(mut self) {
        while self.events.recv().await.is_some() {
            self.settle().await;
            self.reload().await;
        }
        tracing::debug!("change events channel closed, reload coordinator stopping");
    }

    /// Drains further events until the burst has been quiet for the
    /// debounce window.
    async fn settle(&mut self) {
        loop {
            match tokio::time::timeout(DEBOUNCE_WINDOW, self.events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    async fn reload(&self) {
        tracing::info!(file = %self.path.display(), "config file changed, reloading");
        match rebuild(&self.path, &self.state.info).await {
            Ok(active) => {
                let active = Arc::new(active);
                let routes_count = active.rules.len();
                {
                    let mut current = self.state.active.write().await;
                    *current = Arc::clone(&active);
                }
                tracing::info!(
                    file = %self.path.display(),
                    routes_count,
                    "configuration reloaded successfully"
                );
                for (index, rule) in active.rules.iter().enumerate() {
                    tracing::debug!(
                        index,
                        pattern = %rule.pattern,
                        method = %rule.verb,
                        is_regex = rule.path.is_regex(),
                        template_source = %rule.template_source,
                        "reloaded route"
                    );
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to reload config, keeping current configuration");
            }
        }
    }
}

/// Loads and compiles the config on a blocking thread; file reads and
/// regex compilation do not belong on the runtime.
async fn rebuild(path: &Path, info: &Arc<InstanceInfo>) -> Result<ActiveConfiguration, ReloadError> {
    let path = path.to_path_buf();
    let info = Arc::clone(info);
    tokio::task::spawn_blocking(move || {
        let config = load_config(&path)?;
        Ok(build_active_configuration(&config, &info)?)
    })
    .await
    .map_err(|_| ReloadError::Cancelled)?
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tempfile::NamedTempFile;
    use tokio::sync::RwLock;

    use crate::config::MockConfig;

    use super::*;

    const ONE_ROUTE: &str = r#"
routes:
  - path: /one
    verb: GET
    template: "1"
"#;

    const TWO_ROUTES: &str = r#"
routes:
  - path: /one
    verb: GET
    template: "1"
  - path: /two
    verb: GET
    template: "2"
"#;

    fn seeded_state() -> AppState {
        let config: MockConfig = serde_yaml::from_str(ONE_ROUTE).unwrap();
        let info = Arc::new(InstanceInfo {
            version: "test".to_string(),
            config_path: "config.yaml".to_string(),
            started_at: Instant::now(),
        });
        let active = build_active_configuration(&config, &info).unwrap();
        AppState {
            active: Arc::new(RwLock::new(Arc::new(active))),
            info,
        }
    }

    fn coordinator_for(
        file: &NamedTempFile,
        state: &AppState,
    ) -> (ConfigReloadCoordinator, mpsc::UnboundedSender<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ConfigReloadCoordinator::new(file.path(), state.clone(), rx),
            tx,
        )
    }

    #[tokio::test]
    async fn successful_reload_swaps_the_snapshot() {
        let state = seeded_state();
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), TWO_ROUTES).unwrap();
        let (coordinator, _tx) = coordinator_for(&file, &state);

        coordinator.reload().await;

        let active = state.active.read().await;
        assert_eq!(active.rules.len(), 2);
    }

    #[tokio::test]
    async fn broken_config_keeps_the_current_snapshot() {
        let state = seeded_state();
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "routes: [        ").unwrap();
        let (coordinator, _tx) = coordinator_for(&file, &state);

        coordinator.reload().await;

        let active = state.active.read().await;
        assert_eq!(active.rules.len(), 1);
    }

    #[tokio::test]
    async fn invalid_route_keeps_the_current_snapshot() {
        let state = seeded_state();
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "routes:\n  - path: /x\n    verb: YEET\n    template: nope\n",
        )
        .unwrap();
        let (coordinator, _tx) = coordinator_for(&file, &state);

        coordinator.reload().await;

        let active = state.active.read().await;
        assert_eq!(active.rules.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_drains_the_event_burst() {
        let state = seeded_state();
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), ONE_ROUTE).unwrap();
        let (mut coordinator, tx) = coordinator_for(&file, &state);

        tx.send(()).unwrap();
        tx.send(()).unwrap();
        tx.send(()).unwrap();

        coordinator.settle().await;
        assert!(coordinator.events.try_recv().is_err());
    }
}
