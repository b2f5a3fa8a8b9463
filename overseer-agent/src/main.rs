//! Overseer command-line entry point
//!
//! - `overseer notify <message>`: one-shot message to every subscriber
//! - `overseer monitor [-i N]`: watch GPUs and report significant changes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overseer_agent::config::OverseerConfig;
use overseer_agent::directory::PasswdDirectory;
use overseer_agent::metrics::{NvmlSource, SnapshotCollector};
use overseer_agent::monitor::Monitor;
use overseer_agent::notifier::NotificationSink;
use overseer_agent::store::SubscriberStore;
use overseer_agent::telegram::TelegramTransport;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Telegram notifier for GPU availability status.
#[derive(Parser)]
#[command(name = "overseer", version, about)]
struct Cli {
    /// Set logging level to DEBUG.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message to every subscriber.
    Notify {
        /// Message text (Telegram HTML allowed).
        message: String,
    },
    /// Watch GPU occupancy and notify subscribers about significant changes.
    Monitor {
        /// Waiting interval in seconds between GPU availability checks.
        #[arg(short = 'i', long)]
        check_interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine
    dotenvy::dotenv().ok();
    init_tracing(cli.debug);
    debug!("Overseer {} started", env!("CARGO_PKG_VERSION"));

    let mut config = OverseerConfig::load()
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Notify { message } => {
            let mut sink = open_sink(&config).await?;
            let report = sink.notify(&message).await.context("Notification failed")?;
            info!(
                "Sent to {} subscriber(s), {} failed",
                report.delivered, report.failed
            );
        }
        Command::Monitor { check_interval } => {
            if let Some(secs) = check_interval {
                config.monitor.check_interval_secs = secs;
            }
            let interval = config.check_interval()?;
            let sink = open_sink(&config).await?;

            let monitor = Monitor::new(
                SnapshotCollector::new(NvmlSource::new()),
                Box::new(PasswdDirectory),
                sink,
                interval,
            );
            monitor.run().await.context("Monitor stopped")?;
        }
    }

    Ok(())
}

/// Validate the chat settings and load the subscriber store.
async fn open_sink(config: &OverseerConfig) -> Result<NotificationSink> {
    let endpoint = config.telegram_endpoint()?;
    let transport = TelegramTransport::new(endpoint)?;
    let store = SubscriberStore::new(config.subscriber_file_path()?);
    debug!("Subscriber store: {}", store.path().display());

    let sink = NotificationSink::open(Arc::new(transport), store)
        .await
        .context("Failed to open subscriber store")?;
    Ok(sink)
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
