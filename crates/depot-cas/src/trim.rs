use std::time::Duration;

use depot_cache::Cache;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How often the background task trims the cache.
pub const CACHE_TRIM_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub(crate) fn spawn(cache: Cache, max_bytes: u64, cancel: CancellationToken) {
    tokio::spawn(run(cache, max_bytes, CACHE_TRIM_INTERVAL, cancel));
}

/// Periodic trim loop. A tick that outruns the interval delays the next
/// tick rather than queueing it; cancellation returns promptly.
async fn run(cache: Cache, max_bytes: u64, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; swallow it so
    // the first trim happens one full period after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                info!("trimming cache");
                if let Err(e) = cache.trim(max_bytes).await {
                    error!(error = %e, "failed to trim cache");
                }
            }
        }
    }
}
