//! Pod EIP Controller
//!
//! Watches pod lifecycle notifications and keeps elastic IP association and
//! advanced shield protection in line with each pod's annotations.
//!
//! ## Architecture
//!
//! - **Feed**: Reads JSON-lines notifications from stdin
//! - **Handler**: Translates notifications into events
//! - **Dispatcher**: Routes events onto ordered lanes by pod address
//! - **Lane workers**: Deduplicate and reconcile, one event at a time

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use podeip_controller::config::Config;
use podeip_controller::{feed, Handler};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    config.validate()?;

    info!(
        lanes = config.lanes,
        queue_capacity = config.queue_capacity,
        reconcile_timeout_secs = config.reconcile_timeout_secs,
        commit_policy = ?config.commit_policy,
        "Starting pod EIP controller"
    );

    let (handler, cloud) = Handler::bootstrap(&config).await?;
    info!(context = %cloud.context(), "Controller ready, reading notifications from stdin");

    tokio::select! {
        stats = feed::run(BufReader::new(tokio::io::stdin()), &handler) => {
            if stats.rejected > 0 {
                warn!(rejected = stats.rejected, "Some notifications were rejected");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    let stats = handler.shutdown().await;
    info!(
        processed = stats.iter().map(|s| s.processed).sum::<u64>(),
        failed = stats.iter().map(|s| s.failed).sum::<u64>(),
        tracked = stats.iter().map(|s| s.tracked).sum::<usize>(),
        "Controller shutdown complete"
    );
    Ok(())
}
