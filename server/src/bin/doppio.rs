//! Doppio HTTP server
//!
//! Serves static directories and a health endpoint described by a JSON
//! configuration file, and shuts down gracefully on SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use doppio_server::error::{ConfigError, ServeError};
use doppio_server::{App, ServerConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "doppio")]
#[command(version)]
#[command(about = "Doppio HTTP server", long_about = None)]
struct Args {
    /// Path to JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override HTTP server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override HTTP server hostname
    #[arg(long)]
    hostname: Option<String>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = match &args.config {
        Some(path) => {
            let config = ServerConfig::from_file(path)?;
            info!(path = %path.display(), "configuration loaded");
            config
        }
        None => ServerConfig::default(),
    };

    if let Some(port) = args.port {
        info!(port, "overriding port");
        config.port = port;
    }
    if let Some(hostname) = args.hostname {
        info!(%hostname, "overriding hostname");
        config.hostname = hostname;
    }

    let app = App::from_config(&config)?;
    let listener = TcpListener::bind(config.socket_addr()).await?;

    let server = {
        let app = app.clone();
        tokio::spawn(async move { app.serve(listener).await })
    };

    tokio::select! {
        result = server => {
            // The accept loop only returns on its own when it failed
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    match app.shutdown_timeout(config.shutdown_timeout()).await {
        Ok(()) => info!("server shut down"),
        Err(ServeError::Timeout) => {
            warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "connections still open after shutdown timeout"
            );
        }
        Err(err) => {
            error!(error = %err, "shutdown failed");
            return Err(err.into());
        }
    }
    Ok(())
}

/// Initialize structured logging with a configurable filter
fn init_logging(level: &str) -> Result<(), ConfigError> {
    let env_filter = level
        .parse::<EnvFilter>()
        .map_err(|e| ConfigError::Invalid(format!("Invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = signal::ctrl_c() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}
