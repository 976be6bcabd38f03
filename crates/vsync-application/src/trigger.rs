//! Funnels a steady tick and a coordination-store watch into one
//! unbuffered channel: whichever fires first wins the handoff, and the
//! cycle controller picks up exactly one trigger per iteration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vsync_domain::CoordStore;

use crate::telemetry;

/// Send a unit value every `tick` until `cancel` fires. `fired_metric`
/// names the counter incremented each time the interval elapses,
/// distinguishing the origin ticker from the destination ticker.
pub async fn run_ticker(tick: Duration, trigger: mpsc::Sender<()>, cancel: CancellationToken, fired_metric: &'static str) {
    let mut interval = tokio::time::interval(tick);
    interval.tick().await; // first tick fires immediately; skip it
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = interval.tick() => {
                metrics::counter!(fired_metric).increment(1);
                if trigger.send(()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Long-poll `watch_key` in `coord`, sending a unit value into `trigger`
/// whenever its modify index changes, until `cancel` fires.
pub async fn run_watch(
    coord: Arc<dyn CoordStore>,
    watch_key: String,
    trigger: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut last_index = 0u64;
    loop {
        let watched = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = coord.watch(&watch_key, last_index) => result,
        };

        match watched {
            Ok(new_index) => {
                if new_index != last_index {
                    last_index = new_index;
                    debug!(key = %watch_key, index = new_index, "watch triggered");
                    metrics::counter!(telemetry::DESTINATION_WATCH_TRIGGERED).increment(1);
                    if trigger.send(()).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(key = %watch_key, error = %err, "watch failed, retrying");
            }
        }
    }
}
