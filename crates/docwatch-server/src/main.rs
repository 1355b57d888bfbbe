//! docwatch server binary.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docwatch_server::{Args, Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docwatch_server=info,docwatch_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting docwatch server");

    let config = Args::parse().into_config()?;
    info!(
        data_path = %config.data_path.display(),
        listen = %config.listen_addr,
        collections = ?config.watches.iter().map(|w| w.collection.as_str()).collect::<Vec<_>>(),
        preheat = config.preheat,
        global_room = config.global_room,
        "configuration loaded"
    );

    if config.watches.is_empty() {
        anyhow::bail!("nothing to watch, pass at least one --watch <collection>");
    }

    let runtime = Runtime::open(config)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
                return;
            }
            info!("received shutdown signal");
            shutdown.cancel();
        }
    });

    runtime.run(shutdown).await?;
    info!("server shutdown complete");

    Ok(())
}
