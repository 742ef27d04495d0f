//! mpmon-sync - Main entry point
//!
//! One sync run per invocation: resolve configuration, take the process lock,
//! run the selected mode, release the lock. Intended to be run from cron or a
//! systemd timer.
//!
//! Exit codes: 0 success (item failures included), 1 another sync holds the
//! lock, 2 fatal configuration error.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use mpmon_common::config::TomlConfig;
use mpmon_common::CacheStore;
use mpmon_sync::orchestrator::status::StatusReport;
use mpmon_sync::{OpenParliamentClient, Orchestrator, RunMode, RunOptions};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_CONFIG: u8 = 2;

/// Command-line arguments for mpmon-sync
#[derive(Parser, Debug)]
#[command(name = "mpmon-sync")]
#[command(about = "Mirror the parliamentary API into a local cache and compute party-line statistics")]
#[command(version)]
struct Args {
    /// Sync mode
    #[arg(short, long, value_enum, default_value_t = RunMode::Auto, env = "MPMON_MODE")]
    mode: RunMode,

    /// Treat every cache as stale and recompute analytics from scratch
    #[arg(short, long)]
    force: bool,

    /// Process at most this many legislators in the views and analytics phases
    #[arg(long)]
    max_mps: Option<usize>,

    /// Log filter (e.g. `debug`, `mpmon_sync=trace`); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Cache directory; overrides MPMON_CACHE_DIR and the config file
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Config file; overrides MPMON_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Config is read before logging so its [logging] section can apply
    let config = TomlConfig::load(args.config.as_deref());
    let fallback_level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let log_file = config.as_ref().ok().and_then(|c| c.logging.file.clone());
    if let Err(e) = init_tracing(args.log_level.as_deref(), &fallback_level, log_file.as_deref()) {
        eprintln!("mpmon-sync: {:#}", e);
        return ExitCode::from(EXIT_CONFIG);
    }

    let config = match config.and_then(|c| c.sync.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Fatal configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let cache_dir = config.resolve_cache_dir(args.cache_dir.as_deref());
    let store = CacheStore::new(&cache_dir);

    if args.mode == RunMode::Status {
        for line in StatusReport::collect(&store).lines() {
            println!("{}", line);
        }
        return ExitCode::SUCCESS;
    }

    if let Err(e) = std::fs::create_dir_all(&cache_dir) {
        error!(cache_dir = %cache_dir.display(), error = %e, "Cannot create cache directory");
        return ExitCode::from(EXIT_CONFIG);
    }

    let client = match OpenParliamentClient::new(&config.upstream, &config.sync) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build upstream client");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    info!(
        mode = %args.mode,
        force = args.force,
        cache_dir = %cache_dir.display(),
        upstream = %config.upstream.base_url,
        "Starting mpmon-sync"
    );

    let orchestrator = Orchestrator::new(
        Arc::new(client),
        store,
        config.sync.clone(),
        RunOptions {
            mode: args.mode,
            force: args.force,
            max_mps: args.max_mps,
        },
    );

    ExitCode::from(orchestrator.run_exclusive(&cancel_token).await.code())
}

/// Level precedence: `--log-level`, then RUST_LOG, then the config file
fn init_tracing(cli_level: Option<&str>, config_level: &str, file: Option<&Path>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config_level))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let file_layer = match file {
        Some(path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(log_file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current item");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing current item");
        },
    }
}
