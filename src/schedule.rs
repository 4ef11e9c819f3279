//! Periodic runs
//!
//! Re-runs the checker on a fixed interval until Ctrl+C. A run that is already
//! in progress is allowed to finish before the loop exits.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::checker::{ReleaseChecker, RunSummary};

/// Parse duration strings like "30m", "1h", "2d" or plain seconds
pub fn parse_interval(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let secs = if let Some(value) = duration_str.strip_suffix('s') {
        value.parse::<u64>().context("Invalid seconds value")?
    } else if let Some(value) = duration_str.strip_suffix('m') {
        value.parse::<u64>().map(|v| v * 60).context("Invalid minutes value")?
    } else if let Some(value) = duration_str.strip_suffix('h') {
        value.parse::<u64>().map(|v| v * 3600).context("Invalid hours value")?
    } else if let Some(value) = duration_str.strip_suffix('d') {
        value.parse::<u64>().map(|v| v * 86400).context("Invalid days value")?
    } else {
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '30m', '1h', '2d'")?
    };

    if secs == 0 {
        anyhow::bail!("Interval must be greater than zero");
    }

    Ok(Duration::from_secs(secs))
}

/// Run `checker` every `every` until Ctrl+C, calling `report` after each run
pub async fn run_periodically<F>(checker: &ReleaseChecker, every: Duration, mut report: F) -> Result<()>
where
    F: FnMut(&RunSummary),
{
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Running every {:?} (Ctrl+C to stop)", every);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received, stopping");
                break;
            }

            _ = timer.tick() => {
                debug!("Starting scheduled run");
                match checker.run().await {
                    Ok(summary) => report(&summary),
                    Err(e) => error!("Scheduled run failed: {:#}", e),
                }
            }
        }
    }

    Ok(())
}
