//! Shared adapter contract and the reconnect-loop runner every station
//! adapter is driven by.

use crate::backoff::Backoff;
use async_trait::async_trait;
use rw_bus::BusProducer;
use tokio_util::sync::CancellationToken;

/// One connect-and-stream attempt against a station. Implementors own
/// their transport; `run_once` returns only when the connection drops or
/// a protocol error makes it unrecoverable, never on a single bad frame.
#[async_trait]
pub trait StationAdapter: Send {
    /// Used in log fields to identify which configured device this is.
    fn device_name(&self) -> &str;

    /// Connect, stream readings onto `bus` until the connection fails or
    /// `cancel` fires, then return. A clean cancellation returns `Ok(())`.
    async fn run_once(&mut self, bus: &BusProducer, cancel: &CancellationToken) -> crate::error::IngestResult<()>;
}

/// Drives a [`StationAdapter`] forever: on every `run_once` failure, sleep
/// per `backoff` and reconnect, until `cancel` fires. Used as the body of
/// the task each adapter is spawned as.
pub async fn run_adapter_loop(
    mut adapter: Box<dyn StationAdapter>,
    bus: BusProducer,
    cancel: CancellationToken,
    mut backoff: Backoff,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match adapter.run_once(&bus, &cancel).await {
            Ok(()) => {
                if cancel.is_cancelled() {
                    tracing::info!(device = adapter.device_name(), "adapter stopped on cancellation");
                    return;
                }
                tracing::warn!(device = adapter.device_name(), "adapter connection closed, reconnecting");
                backoff.reset();
            }
            Err(err) => {
                tracing::warn!(device = adapter.device_name(), error = %err, "adapter failed, reconnecting");
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
