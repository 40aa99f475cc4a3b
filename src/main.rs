//! # Telemetry Node
//!
//! Runs one sensor node against a remote collector.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Set up logging (stdout, plus a daily log file when configured)
//!    - Build the link connector and sensor source
//!
//! 2. **Main Loop**
//!    - Register with the collector once connected
//!    - Report sensor readings and heartbeats on schedule
//!    - Apply control commands to the actuator
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the producer and link tasks
//!    - Log total frame count
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use telemetry_link::clock::SystemClock;
use telemetry_link::config::{Config, LoggingConfig};
use telemetry_link::events::{ActuatorHandler, EventHandler};
use telemetry_link::link::connector_from_config;
use telemetry_link::node::Node;
use telemetry_link::sensor::sensor_from_config;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `logging.dir`
const LOG_FILE_NAME: &str = "telemetry-node.log";

/// Install the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes the file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let stdout = tracing_subscriber::fmt::layer();

    if config.dir.is_empty() {
        tracing_subscriber::registry().with(filter).with(stdout).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("Telemetry node v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let handler: Arc<dyn EventHandler> = Arc::new(ActuatorHandler::new());
    let node = Node::new(
        &config,
        connector_from_config(&config.link),
        Box::new(SystemClock),
        sensor_from_config(&config.sensor),
        handler,
    );

    info!("Press Ctrl+C to exit");
    node.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    })
    .await;

    Ok(())
}
