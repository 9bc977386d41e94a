//! Shared controller plumbing: every controller owns its own ticker
//! (default 60s), pulls the most recent reading from storage rather than
//! subscribing to the live bus, and rejects a semantically faulty
//! pull before attempting to publish it upstream.
//!
//! Grounded on `weex-daemon::scheduler::Scheduler::run`'s "loop, log
//! errors, keep running" shape, adapted from a pull-every-iteration
//! driver loop to a fixed-interval ticker since controllers read state
//! rather than drive it.

use crate::error::{ControllerError, ControllerResult};
use async_trait::async_trait;
use rw_core::Reading;
use rw_storage::TimescaleEngine;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait Controller: Send {
    fn name(&self) -> &str;
    async fn tick(&self) -> ControllerResult<()>;
}

/// Fetches the most recent 1-minute aggregate for `device`, rejecting an
/// absent or semantically faulty row rather than publishing it.
pub async fn pull_latest(storage: &TimescaleEngine, device: &str) -> ControllerResult<Reading> {
    let reading = storage
        .latest_aggregate_reading(device)
        .await?
        .ok_or_else(|| ControllerError::NoReadingYet(device.to_string()))?;

    if reading.is_semantically_faulty() {
        return Err(ControllerError::FaultyReading(device.to_string()));
    }
    Ok(reading)
}

/// Drives one controller on its own ticker until cancelled. A failed tick
/// is logged and retried on the next regular tick — there is no separate
/// backoff schedule, since a controller's cadence is already the
/// upstream-facing rate limit.
pub async fn run_controller_loop(controller: Box<dyn Controller>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if let Err(err) = controller.tick().await {
            tracing::warn!(controller = controller.name(), error = %err, "controller tick failed, retrying next cycle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rw_core::StationKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingController {
        count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Controller for CountingController {
        fn name(&self) -> &str {
            "counting"
        }

        async fn tick(&self) -> ControllerResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn controller_loop_ticks_on_its_own_interval() {
        let count = Arc::new(AtomicU32::new(0));
        let controller = Box::new(CountingController { count: Arc::clone(&count) });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_controller_loop(controller, Duration::from_secs(10), cancel.clone()));

        tokio::time::advance(Duration::from_secs(35)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn faulty_reading_helper_shape() {
        let mut r = Reading::empty(Utc::now(), "d1", StationKind::Davis);
        r.temp_out = Some(0.0);
        r.barometer = Some(0.0);
        assert!(r.is_semantically_faulty());
    }
}
