use barakah_bank::{BankClient, HttpBankClient};
use barakah_core::{SweepPolicy, Sweeper, SystemClock};
use barakah_email::{create_provider, Mailer};
use barakah_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod metrics;
mod server;

#[cfg(test)]
mod tests;

use config::ServerConfig;
use server::AppState;

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "barakah-server")]
#[command(about = "Barakah backend: HTTP callables and scheduled cleanup")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db)
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "sqlite://barakah.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server and the periodic sweep
    Serve {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },
    /// Run one sweep of stale codes and reset tokens, then exit
    Sweep,
}

// ────────────────────────────────────── Commands ──────────────────────────────────────

async fn cmd_serve(database_url: &str, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = addr.parse()?;
    let config = ServerConfig::from_env()?;
    let store = Arc::new(SqliteStore::open(database_url).await?);

    let mailer = match &config.email {
        Some(email) => {
            let provider = create_provider(&email.provider)?;
            Some(Mailer::new(
                provider,
                email.from_address.clone(),
                email.from_name.clone(),
            ))
        }
        None => {
            warn!("no email provider configured, codes will not be delivered");
            None
        }
    };

    let bank: Option<Arc<dyn BankClient>> = match config.bank.clone() {
        Some(bank) => Some(Arc::new(HttpBankClient::new(bank)?)),
        None => {
            warn!("bank API not configured, transaction sync disabled");
            None
        }
    };

    let clock = Arc::new(SystemClock);
    let handle = metrics::init_metrics()?;
    let state = AppState::new(
        store.clone(),
        mailer,
        bank,
        clock.clone(),
        config.upstream_timeout,
    )
    .with_metrics(handle);

    let sweeper = Sweeper::new(
        store.clone(),
        store,
        clock,
        SweepPolicy {
            upstream_timeout: config.upstream_timeout,
            ..SweepPolicy::default()
        },
    );
    let sweeps = tokio::spawn(run_sweeps(sweeper, config.sweep_interval));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "barakah-server listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeps.abort();
    Ok(())
}

async fn cmd_sweep(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let store = Arc::new(SqliteStore::open(database_url).await?);
    let sweeper = Sweeper::new(
        store.clone(),
        store,
        Arc::new(SystemClock),
        SweepPolicy {
            upstream_timeout: config.upstream_timeout,
            ..SweepPolicy::default()
        },
    );

    let report = sweeper.run_once().await?;
    println!(
        "Deleted {} OTP record(s) and {} reset token(s)",
        report.otps_deleted, report.tokens_deleted
    );
    Ok(())
}

/// Sweep now and then every `every`. A failed run is logged and the
/// schedule continues.
async fn run_sweeps(sweeper: Sweeper, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match sweeper.run_once().await {
            Ok(report) => {
                metrics::record_swept("otp", report.otps_deleted);
                metrics::record_swept("reset_token", report.tokens_deleted);
            }
            Err(e) => warn!(error = %e, "scheduled sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
    }
}

// ────────────────────────────────────── Main ──────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { addr } => cmd_serve(&cli.database_url, &addr).await?,
        Command::Sweep => cmd_sweep(&cli.database_url).await?,
    }

    Ok(())
}
