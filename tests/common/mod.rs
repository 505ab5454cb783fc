//! Shared harness for integration tests.
//!
//! Boots a real quill server on an ephemeral port against a config file
//! in a temp directory, with the file watcher and reload coordinator
//! running, so tests exercise the same wiring as `main`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::RecommendedWatcher;
use tempfile::TempDir;
use tokio::net::TcpListener;

use quill::config::loader::load_config;
use quill::config::watcher::ConfigWatcher;
use quill::lifecycle::Shutdown;
use quill::server::{ConfigReloadCoordinator, Server};

const READY_DEADLINE: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    config_path: PathBuf,
    shutdown: Arc<Shutdown>,
    _watch_guard: RecommendedWatcher,
    _config_dir: TempDir,
}

impl TestServer {
    /// Writes the config to a temp directory and boots the full stack:
    /// server, file watcher and reload coordinator.
    pub async fn start(config_yaml: &str) -> TestServer {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, config_yaml).expect("write config");

        let config = load_config(&config_path).expect("config should load");
        let server = Server::new(&config, &config_path, "test").expect("server should build");

        let (watcher, change_events) = ConfigWatcher::new(&config_path);
        let watch_guard = watcher.run().expect("watcher should start");
        let coordinator =
            ConfigReloadCoordinator::new(&config_path, server.state(), change_events);
        tokio::spawn(coordinator.run());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let shutdown = Arc::new(Shutdown::new());
        let server_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let _ = server.run(listener, &server_shutdown).await;
        });

        let harness = TestServer {
            addr,
            config_path,
            shutdown,
            _watch_guard: watch_guard,
            _config_dir: dir,
        };
        harness.wait_until_healthy().await;
        harness
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    #[allow(dead_code)]
    pub fn config_dir(&self) -> &Path {
        self._config_dir.path()
    }

    /// Overwrites the config file; the running watcher picks the change up.
    #[allow(dead_code)]
    pub fn rewrite_config(&self, config_yaml: &str) {
        std::fs::write(&self.config_path, config_yaml).expect("rewrite config");
    }

    pub async fn wait_until_healthy(&self) {
        let client = client();
        let deadline = Instant::now() + READY_DEADLINE;
        loop {
            if let Ok(response) = client.get(self.url("/health")).send().await {
                if response.status() == 200 {
                    return;
                }
            }
            assert!(
                Instant::now() < deadline,
                "server did not become healthy within {READY_DEADLINE:?}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Polls the health endpoint until it reports the expected route
    /// count, the sign that a reload has been published.
    #[allow(dead_code)]
    pub async fn wait_for_routes(&self, expected: u64) {
        let client = client();
        let deadline = Instant::now() + READY_DEADLINE;
        loop {
            if let Ok(response) = client.get(self.url("/health")).send().await {
                if let Ok(payload) = response.json::<serde_json::Value>().await {
                    if payload["routes"] == expected {
                        return;
                    }
                }
            }
            assert!(
                Instant::now() < deadline,
                "reload to {expected} routes not observed within {READY_DEADLINE:?}"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("build http client")
}
