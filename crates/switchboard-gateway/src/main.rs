//! # switchboard-gateway
//!
//! Gateway binary: wires settings, logging, metrics, the registry, the idle
//! reaper and the HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_core::logging::init_subscriber;
use switchboard_core::{Reaper, Registry};
use switchboard_server::{ServerConfig, SwitchboardServer};
use switchboard_settings::{SwitchboardSettings, load_settings, load_settings_from_path};

/// How long shutdown waits for sessions, the server and the reaper.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Switchboard real-time messaging gateway.
#[derive(Parser, Debug)]
#[command(name = "switchboard-gateway", about = "Switchboard real-time messaging gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.switchboard/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Disable idle-connection reaping.
    #[arg(long)]
    no_reaper: bool,
}

impl Cli {
    /// Load settings and layer the command-line flags over them.
    fn resolve_settings(&self) -> Result<SwitchboardSettings> {
        let settings = match &self.config {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => load_settings().context("Failed to load settings")?,
        };
        Ok(self.apply(settings))
    }

    fn apply(&self, mut settings: SwitchboardSettings) -> SwitchboardSettings {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.no_reaper {
            settings.reaper.enabled = false;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = switchboard_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let registry = Arc::new(Registry::new());
    let server = SwitchboardServer::new(
        ServerConfig::from_settings(&settings.server),
        Arc::clone(&registry),
    )
    .with_metrics(metrics);

    let shutdown = Arc::clone(server.shutdown());
    if settings.reaper.enabled {
        let reaper = Reaper::new(Arc::clone(&registry), settings.reaper.max_idle());
        shutdown.track(reaper.spawn(settings.reaper.interval(), shutdown.token()));
        tracing::info!(
            interval_secs = settings.reaper.interval_secs,
            max_idle_secs = settings.reaper.max_idle_secs,
            "idle reaper started"
        );
    } else {
        tracing::info!("idle reaper disabled");
    }

    let (addr, server_handle) = server.listen().await.context("Failed to bind server")?;
    shutdown.track(server_handle);
    tracing::info!("Switchboard gateway listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = shutdown.drain(SHUTDOWN_TIMEOUT).await;

    tracing::info!(
        drained = report.connections_at_start.saturating_sub(report.evicted),
        evicted = report.evicted,
        "Shutdown complete"
    );
    Ok(())
}
