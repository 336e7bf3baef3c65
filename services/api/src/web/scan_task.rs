//! services/api/src/web/scan_task.rs
//!
//! This module contains the asynchronous "worker" function that drives the
//! fallback activator: a fixed-interval scan over the pending queue. The
//! interval only has to keep the wait threshold honored within a small
//! slack, so a missed tick is delayed, never compensated with a burst.

use std::time::Duration;

use consultation_core::FallbackActivator;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs forever, applying the wait-threshold policy once per interval.
pub async fn fallback_scan_loop(activator: FallbackActivator, period: Duration) {
    info!("Fallback scan started (every {period:?}).");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match activator.scan_once().await {
            Ok(0) => {}
            Ok(activated) => {
                info!("Fallback scan activated the assistant on {activated} consultation(s).")
            }
            Err(e) => error!("Fallback scan pass failed: {e}"),
        }
    }
}
