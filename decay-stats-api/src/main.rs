mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use decay_stats::{DEFAULT_COMPRESSION, DistributionRegistry, TimeDistribution, TimeUnit};
use log::{info, warn};
use tokio::{net::TcpListener, signal};

/// Serves decayed latency distributions over HTTP.
#[derive(Debug, Parser)]
#[command(name = "decay-stats-api")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Decay rate per second for new distributions (0 disables decay).
    #[arg(long, default_value_t = 0.0)]
    alpha: f64,

    /// Unit new distributions report in.
    #[arg(long, default_value = "seconds")]
    unit: TimeUnit,

    /// Digest compression for new distributions.
    #[arg(long, default_value_t = DEFAULT_COMPRESSION)]
    compression: usize,

    #[arg(long, default_value = "sample-app")]
    app: String,

    #[arg(long, default_value = "local")]
    node: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let defaults = TimeDistribution::builder()
        .alpha(args.alpha)
        .unit(args.unit)
        .compression(args.compression);
    let registry = DistributionRegistry::new(args.app, args.node, defaults)
        .context("invalid distribution settings")?;
    let rtr = routes::router(Arc::new(registry));

    let listener = TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    info!("Listening on {}", args.addr);

    axum::serve(listener, rtr)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
    }
    info!("Exiting...");
}
