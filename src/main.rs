use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use mesh_ingest::config::Config;
use mesh_ingest::group_buffer::GroupBuffer;
use mesh_ingest::logging::{init_logging, LogFormat};
use mesh_ingest::mqtt::Supervisor;
use mesh_ingest::notifier::StoreBackedNotifier;
use mesh_ingest::pipeline::Pipeline;
use mesh_ingest::store::{RedisStore, Store};

#[derive(Parser)]
#[command(name = "mesh-ingest")]
#[command(about = "Multi-broker MQTT ingest pipeline for a mesh-radio network")]
struct Cli {
    /// Path to a TOML config file. Falls back to built-in defaults plus
    /// `INGEST_`-prefixed environment overrides when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON instead of the default human-readable format.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    init_logging(log_format);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if config.brokers.is_empty() {
        bail!("no brokers configured, nothing to do");
    }
    let config = Arc::new(config);

    let store: Arc<dyn Store> = Arc::new(
        RedisStore::connect(&config.kv_endpoint)
            .await
            .context("failed to connect to key-value store")?,
    );

    let notifier = Arc::new(StoreBackedNotifier::new(store.clone()));
    let group_buffer = Arc::new(GroupBuffer::new(notifier, config.group_window));
    let pipeline = Arc::new(Pipeline::new(config.clone(), store.clone(), group_buffer.clone()));

    let cancel = CancellationToken::new();
    let supervisor = Supervisor::spawn(config.clone(), cancel.clone(), {
        let pipeline = pipeline.clone();
        move |frame| {
            let pipeline = pipeline.clone();
            async move { pipeline.process(frame).await }
        }
    });

    let flush_task = tokio::spawn({
        let group_buffer = group_buffer.clone();
        let cancel = cancel.clone();
        async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => group_buffer.flush_expired().await,
                }
            }
        }
    });

    info!(brokers = config.brokers.len(), "mesh-ingest started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!("shutdown signal received, draining");
    cancel.cancel();
    let _ = flush_task.await;
    supervisor.shutdown().await;

    Ok(())
}
