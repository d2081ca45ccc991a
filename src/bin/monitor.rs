use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use spark_listing_monitor::api::SparkClient;
use spark_listing_monitor::config::{AppConfig, CONFIG_PATH};
use spark_listing_monitor::notify::Dispatcher;
use spark_listing_monitor::poller::Poller;
use spark_listing_monitor::store::SnapshotStore;
use spark_listing_monitor::web;

#[derive(Parser)]
#[command(name = "monitor", about = "Spark MLS listing change monitor")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Do not start the trigger/status HTTP server
    #[arg(long)]
    no_server: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    info!("Loaded config from {}", args.config.display());
    config.validate().context("invalid configuration")?;
    if config.settings.poll_interval_secs == 0 {
        anyhow::bail!("settings.poll_interval_secs must be positive");
    }

    let client = SparkClient::new(
        &config.spark.api_base,
        &config.spark.access_token,
        config.spark.page_size,
    )?;
    let dispatcher = Dispatcher::from_config(&config.notifications)?;
    info!(
        "{} notification channel(s) configured",
        dispatcher.channel_count()
    );

    let store = match &config.settings.cursor_path {
        Some(path) => SnapshotStore::with_cursor_file(path),
        None => SnapshotStore::new(),
    };

    let interval = Duration::from_secs(config.settings.poll_interval_secs);
    let poller = Arc::new(Poller::new(
        client,
        dispatcher,
        store,
        interval,
        config.settings.enable_polling,
    ));

    if args.once {
        let report = poller.run_cycle().await?;
        info!(
            "Cycle complete: {} listings, {} new, {} events",
            report.listings_fetched, report.new_listings, report.events_dispatched
        );
        return Ok(());
    }

    if !args.no_server {
        let server_poller = Arc::clone(&poller);
        let port = config.settings.listen_port;
        tokio::spawn(async move {
            if let Err(e) = web::serve(server_poller, port).await {
                warn!("HTTP server error: {e:#}");
            }
        });
    }

    poller.run().await;
    Ok(())
}
