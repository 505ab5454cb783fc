//! HTTP server setup and request entry point.
//!
//! # Responsibilities
//! - Compile config into an immutable `ActiveConfiguration` snapshot
//! - Create the Axum router with a catch-all entry handler
//! - Wire the middleware chain around the dispatcher
//! - Serve with graceful, deadline-bounded shutdown
//! - Swap snapshots atomically on reload (see `reload.rs`)
//!
//! # Design Decisions
//! - One snapshot per config generation: rules, engine and the fully
//!   wrapped handler travel together, so a request never observes a
//!   half-reloaded configuration
//! - The entry handler holds the snapshot lock only long enough to clone
//!   an `Arc`; dispatch runs lock-free

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::MockConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::middleware::{Chain, Handler, MiddlewareError};
use crate::routing::{CompileError, RuleCompiler, RuleSet};
use crate::template::Engine;

pub mod dispatcher;
pub mod reload;
pub mod responses;

pub use reload::ConfigReloadCoordinator;

/// Errors building a serving configuration out of a loaded config.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to compile routes: {0}")]
    Compile(#[from] CompileError),

    #[error("failed to create middleware chain: {0}")]
    Middleware(#[from] MiddlewareError),
}

/// Static facts about this server process, reported by the health
/// endpoint.
pub struct InstanceInfo {
    pub version: String,
    pub config_path: String,
    pub started_at: Instant,
}

/// Everything derived from one configuration generation. Immutable once
/// built; reload publishes a fresh one.
pub struct ActiveConfiguration {
    pub rules: Arc<RuleSet>,
    pub engine: Arc<Engine>,
    /// The dispatcher wrapped in the configured middleware chain.
    pub handler: Handler,
    /// Names of the configured middlewares, outermost first.
    pub middleware: Vec<&'static str>,
}

/// Application state injected into the entry handler.
#[derive(Clone)]
pub struct AppState {
    pub active: Arc<RwLock<Arc<ActiveConfiguration>>>,
    pub info: Arc<InstanceInfo>,
}

/// Compiles routes and templates, builds the middleware chain, and wires
/// the dispatcher into one serving snapshot.
pub fn build_active_configuration(
    config: &MockConfig,
    info: &Arc<InstanceInfo>,
) -> Result<ActiveConfiguration, ServerError> {
    let (rules, engine) = RuleCompiler::new().compile(&config.routes)?;
    let rules = Arc::new(rules);
    let engine = Arc::new(engine);

    let chain = Chain::from_specs(&config.middleware.enabled)?;
    let middleware = chain.names();

    let innermost = dispatcher::handler(
        Arc::clone(&rules),
        Arc::clone(&engine),
        &config.server,
        Arc::clone(info),
    );
    let handler = chain.around(innermost);

    Ok(ActiveConfiguration {
        rules,
        engine,
        handler,
        middleware,
    })
}

/// The mock HTTP server.
pub struct Server {
    state: AppState,
    shutdown_bound: Duration,
}

impl Server {
    /// Creates a server from a loaded configuration, compiling the
    /// initial snapshot. Fails if routes, templates or middleware do not
    /// compile.
    pub fn new(config: &MockConfig, config_path: &Path, version: &str) -> Result<Self, ServerError> {
        let info = Arc::new(InstanceInfo {
            version: version.to_string(),
            config_path: config_path.display().to_string(),
            started_at: Instant::now(),
        });
        let active = build_active_configuration(config, &info)?;

        Ok(Self {
            state: AppState {
                active: Arc::new(RwLock::new(Arc::new(active))),
                info,
            },
            shutdown_bound: Duration::from_secs(config.server.timeouts.shutdown_secs),
        })
    }

    /// Shared state handle for the reload coordinator.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serves until the shutdown signal fires, then drains in-flight
    /// connections for at most the configured shutdown timeout.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        {
            let active = self.state.active.read().await;
            tracing::info!(
                address = %addr,
                routes_count = active.rules.len(),
                middleware = ?active.middleware,
                "HTTP server starting"
            );
        }

        let app = Router::new()
            .route("/{*path}", any(entry))
            .route("/", any(entry))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        let mut stop = shutdown.subscribe();
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop.recv().await;
            tracing::info!("shutting down server");
        });

        let drain_bound = self.shutdown_bound;
        let mut drain = shutdown.subscribe();
        let drain_deadline = async move {
            let _ = drain.recv().await;
            tokio::time::sleep(drain_bound).await;
        };

        tokio::select! {
            result = server => result?,
            _ = drain_deadline => {
                tracing::warn!(
                    timeout_secs = drain_bound.as_secs(),
                    "graceful shutdown deadline exceeded, dropping open connections"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all entry point. Clones the current snapshot under a brief read
/// lock, then dispatches without holding it.
async fn entry(State(state): State<AppState>, request: Request<Body>) -> Response {
    let active = {
        let guard = state.active.read().await;
        Arc::clone(&guard)
    };
    (*active.handler)(request).await
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::config::schema::RouteSpec;

    use super::*;

    fn test_info() -> Arc<InstanceInfo> {
        Arc::new(InstanceInfo {
            version: "test".to_string(),
            config_path: "config.yaml".to_string(),
            started_at: Instant::now(),
        })
    }

    fn one_route_config() -> MockConfig {
        MockConfig {
            routes: vec![RouteSpec {
                path: "/hello".to_string(),
                verb: "GET".to_string(),
                template: Some("hi".to_string()),
                ..RouteSpec::default()
            }],
            ..MockConfig::default()
        }
    }

    #[tokio::test]
    async fn snapshot_serves_compiled_routes() {
        let active = build_active_configuration(&one_route_config(), &test_info()).unwrap();
        assert_eq!(active.rules.len(), 1);
        assert!(active.middleware.is_empty());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/hello")
            .body(Body::empty())
            .unwrap();
        let response = (*active.handler)(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn snapshot_includes_middleware_chain() {
        let yaml = r#"
middleware:
  enabled:
    - type: cors
    - type: logger
"#;
        let mut config: MockConfig = serde_yaml::from_str(yaml).unwrap();
        config.routes = one_route_config().routes;

        let active = build_active_configuration(&config, &test_info()).unwrap();
        assert_eq!(active.middleware, vec!["cors", "logger"]);
    }

    #[test]
    fn broken_route_fails_construction() {
        let mut config = one_route_config();
        config.routes[0].template = None;
        let err = build_active_configuration(&config, &test_info()).err().unwrap();
        assert!(matches!(err, ServerError::Compile(_)));
    }
}
