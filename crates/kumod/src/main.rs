use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kumod::config::Config;
use kumod::host::AccessoryStore;
use kumod::host::HOST_EVENT_CHANNEL_SIZE;
use kumod::kumo::KumoApi;
use kumod::Platform;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bridge Kumo Cloud heat pumps to a home-automation host
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "kumod.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("kumod starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let store = Arc::new(
        AccessoryStore::open(&config.storage.path)
            .await
            .context("Failed to open accessory store")?,
    );
    tracing::info!(
        "Loaded {} cached accessories from {}",
        store.accessories().await.len(),
        store.path().display()
    );
    let kumo = KumoApi::new(&config.kumo).context("Failed to create Kumo Cloud client")?;

    let platform = Arc::new(Platform::new(
        kumo,
        store.clone(),
        config.platform.clone(),
        config.kumo.timeout(),
    ));

    let (tx, rx) = mpsc::channel(HOST_EVENT_CHANNEL_SIZE);
    let platform_task = {
        let platform = platform.clone();
        tokio::spawn(async move { platform.run(rx).await })
    };

    store
        .launch(&tx)
        .await
        .context("Platform stopped before launch completed")?;

    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // Closing the channel ends the platform's event loop
    drop(tx);
    if let Err(e) = platform_task.await {
        tracing::error!("Platform task failed: {}", e);
    }

    tracing::info!("kumod shutdown complete");

    Ok(())
}
