//! `cartlock` server binary.
//!
//! ```text
//! main() -> Cli::parse -> load config -> init_tracing -> Coordinator -> serve
//! ```
//!
//! Ctrl-C (or SIGTERM on unix) stops accepting connections and drains
//! in-flight requests before exiting.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cartlock_config::CartlockConfig;
use cartlock_core::{Coordinator, SharedClock, SystemClock, epoch_source};
use cartlock_server::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "cartlock",
    version,
    about = "Cartridge ownership lock and mining-session coordinator"
)]
struct Cli {
    /// Config file (default: $CARTLOCK_CONFIG or ~/.cartlock/config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address, overriding `[server] listen`.
    #[arg(long, value_name = "ADDR", env = "CARTLOCK_LISTEN")]
    listen: Option<String>,
}

fn load_config(path: Option<&Path>) -> Result<CartlockConfig> {
    match path {
        Some(path) => CartlockConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(CartlockConfig::load()
            .context("failed to load config")?
            .unwrap_or_default()),
    }
}

fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let mut warning = None;
    if let Some(path) = log_file {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                tracing::info!(path = %path.display(), "Logging initialized");
                return;
            }
            Err(e) => warning = Some(format!("Failed to open log file {}: {e}", path.display())),
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(config.log_file().as_deref());

    let policy = config.policy().context("invalid [policy] section")?;
    let epoch_plan = config.epoch_plan().context("invalid [epoch] section")?;
    tracing::info!(?policy, ?epoch_plan, "Coordinator policy");

    let clock: SharedClock = Arc::new(SystemClock);
    let coordinator = Coordinator::in_memory(policy, epoch_source(epoch_plan, clock.clone()), clock);
    let state = AppState::new(Arc::new(coordinator), config.api_token());

    let listen = cli.listen.unwrap_or_else(|| config.listen_addr());
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;

    cartlock_server::serve(listener, state, shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("cartlock stopped");
    Ok(())
}
