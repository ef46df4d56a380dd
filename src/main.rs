//! Edge Emulator
//!
//! Runs edge stage handlers locally against a real origin.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ http::server ──▶ routing (behavior)
//!                                                          │
//!                                                          ▼
//!                          ┌──────────────── pipeline ────────────────┐
//!                          │ viewer-request ─▶ origin-request ─▶      │
//!                          │        origin fetch ─▶ origin-response ─▶│──▶ Origin
//!                          │                       viewer-response    │
//!                          └─────┬────────────────────────────────────┘
//!                                │ per stage
//!                                ▼
//!                 handler (runtime process + loopback callback)
//!                 security (read-only header policy)
//!
//!     Client Response ◀── http::response (outcome or 502 page)
//! ```

use std::path::PathBuf;

use clap::Parser;

use edge_emulator::config::{load_config, ConfigWatcher, CONFIG_FILE_NAME};
use edge_emulator::http::HttpServer;
use edge_emulator::lifecycle::{wait_for_shutdown, Shutdown};
use edge_emulator::net;
use edge_emulator::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "edge-emulator", version, about = "Run edge stage handlers locally")]
struct Cli {
    /// Project directory containing config.toml.
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Explicit configuration file; overrides the project directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.dir.join(CONFIG_FILE_NAME))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config_path();

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    logging::init(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "edge-emulator starting"
    );

    tracing::info!(
        address = %config.listener.address,
        port = config.listener.port,
        origins = config.origins.len(),
        behaviors = config.behaviors.len(),
        working_directory = %config.handlers.working_directory.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = net::bind(&config.listener)?;

    let (watcher, config_updates) = ConfigWatcher::new(&config_path);
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Configuration hot reload disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_shutdown(&shutdown) => {}
        result = &mut server_task => {
            result??;
            return Ok(());
        }
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
