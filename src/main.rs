//! quill: a configuration-driven mock HTTP server.
//!
//! Serves templated responses described in a YAML file, with hot reload
//! on file change.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌─────────────────────────────────────────────────────┐
//!                        │                       QUILL                         │
//!                        │                                                     │
//!     Client Request     │  ┌──────────┐    ┌────────────┐    ┌────────────┐  │
//!     ───────────────────┼─▶│  server  │───▶│ middleware │───▶│ dispatcher │  │
//!                        │  │  entry   │    │   chain    │    │            │  │
//!                        │  └──────────┘    └────────────┘    └─────┬──────┘  │
//!                        │                                          │         │
//!                        │                                          ▼         │
//!                        │                  ┌──────────┐    ┌────────────┐    │
//!     Client Response    │                  │ template │◀───│  routing   │    │
//!     ◀──────────────────┼──────────────────│  engine  │    │   rules    │    │
//!                        │                  └──────────┘    └────────────┘    │
//!                        │                                                    │
//!                        │  ┌──────────────────────────────────────────────┐  │
//!                        │  │            Cross-Cutting Concerns            │  │
//!                        │  │  ┌────────┐ ┌─────────┐ ┌────────┐ ┌──────┐  │  │
//!                        │  │  │ config │ │ watcher │ │ reload │ │ life │  │  │
//!                        │  │  │ loader │ │         │ │ coord. │ │ cycle│  │  │
//!                        │  │  └────────┘ └─────────┘ └────────┘ └──────┘  │  │
//!                        │  └──────────────────────────────────────────────┘  │
//!                        └─────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quill::config::loader::load_config;
use quill::config::watcher::ConfigWatcher;
use quill::lifecycle::{signals, Shutdown};
use quill::server::{ConfigReloadCoordinator, Server};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Configuration-driven mock HTTP server", long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Validate the configuration file and exit.
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let default_filter = if args.debug {
        "quill=debug,tower_http=debug"
    } else {
        "quill=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(file = %args.config.display(), error = %err, "failed to load configuration");
            return Err(err.into());
        }
    };
    tracing::info!(
        file = %args.config.display(),
        routes_count = config.routes.len(),
        "configuration loaded successfully"
    );

    // Compile routes, templates and middleware up front; this is also the
    // whole of --validate
    let server = match Server::new(&config, &args.config, VERSION) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to create server");
            return Err(err.into());
        }
    };

    if args.validate {
        tracing::info!("configuration validation completed successfully");
        println!("✅ Configuration file {:?} is valid", args.config);
        println!("   - Found {} routes", config.routes.len());
        println!("   - All validation checks passed");
        return Ok(());
    }

    // Bind TCP listener
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    // Watch the config file for hot reload
    let (watcher, change_events) = ConfigWatcher::new(&args.config);
    let _watch_guard = match watcher.run() {
        Ok(guard) => guard,
        Err(err) => {
            tracing::error!(error = %err, "failed to start config file watcher");
            return Err(err.into());
        }
    };
    let coordinator = ConfigReloadCoordinator::new(&args.config, server.state(), change_events);
    tokio::spawn(coordinator.run());

    // Translate OS signals into the shutdown broadcast
    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        signals::wait().await;
        signal_shutdown.trigger();
    });

    tracing::info!(version = VERSION, address = %local_addr, "starting quill server");
    server.run(listener, &shutdown).await?;

    tracing::info!("server stopped gracefully");
    Ok(())
}
