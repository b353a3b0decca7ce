use crate::App;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

/// Runs the refresh scheduler until Ctrl-C, then stops it after the current
/// cycle.
pub async fn run(app: &App, interval_seconds: Option<u64>) -> Result<()> {
    let interval = interval_seconds
        .map(Duration::from_secs)
        .unwrap_or_else(|| app.config.rates.refresh_interval());
    if interval.is_zero() {
        anyhow::bail!("Refresh interval must be positive");
    }

    let handle = app
        .scheduler
        .start(interval)
        .await
        .context("Failed to start scheduler")?;
    println!(
        "Refreshing rates every {}s, press Ctrl-C to stop",
        interval.as_secs()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Stop requested, waiting for the current cycle");
    app.scheduler.stop().await;
    handle.await.context("Scheduler task failed")?;
    println!("Scheduler stopped");
    Ok(())
}
