//! warpbridged — the WarpGrid invocation bridge daemon.
//!
//! Loads the bridge configuration, builds the function invoker once,
//! and serves HTTP until interrupted.
//!
//! # Usage
//!
//! ```text
//! warpbridged serve --config /etc/warpgrid/warpbridge.toml
//! warpbridged serve --listen 0.0.0.0:8080 --endpoint http://127.0.0.1:9001
//! warpbridged print-config
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use warpgrid_bridge::{BridgeConfig, BridgeServer, HttpInvoker, pipeline};

#[derive(Parser)]
#[command(name = "warpbridged", about = "WarpGrid invocation bridge")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve HTTP and bridge every request to a function invocation.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address (overrides `server.listen`).
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Invoke API endpoint (overrides `invoker.endpoint`).
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Print the effective configuration and exit.
    PrintConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            config,
            listen,
            endpoint,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(endpoint) = endpoint {
                config.invoker.endpoint = endpoint;
            }
            config.validate()?;
            run(config).await
        }
        Command::PrintConfig { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

const DEFAULT_LOG_FILTER: &str = "info,warpbridged=debug,warpgrid_bridge=debug";

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    info!("WarpGrid bridge starting");

    // The invoker lives for the whole process and is shared read-only.
    let invoker = HttpInvoker::new(&config.invoker.endpoint, config.invoker.timeout())
        .context("failed to initialize function invoker")?;
    info!(
        endpoint = invoker.endpoint(),
        timeout_ms = config.invoker.timeout_ms,
        "function invoker initialized"
    );

    let handler = pipeline(&config, Arc::new(invoker));
    info!(attempts = config.retry.attempts, "request pipeline assembled");

    let server = BridgeServer::bind(
        config.server.listen,
        handler,
        config.limits.max_body_bytes,
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(server.serve(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    server_handle.await.context("server task panicked")??;
    info!("WarpGrid bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_overrides_parse() {
        let cli = Cli::try_parse_from([
            "warpbridged",
            "serve",
            "--listen",
            "127.0.0.1:9000",
            "--endpoint",
            "http://lambda:9001",
        ])
        .unwrap();
        match cli.command {
            Command::Serve {
                config,
                listen,
                endpoint,
            } => {
                assert!(config.is_none());
                assert_eq!(listen, Some("127.0.0.1:9000".parse().unwrap()));
                assert_eq!(endpoint.as_deref(), Some("http://lambda:9001"));
            }
            Command::PrintConfig { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn default_config_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }
}
