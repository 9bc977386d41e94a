//! The reading bus: a process-wide fan-in/fan-out conduit.
//!
//! Many station adapters share one fan-in channel; a single distributor
//! task reads from it and forwards each [`Reading`] to every registered
//! storage engine, in registration order, awaiting each send. A storage
//! engine with a full queue therefore blocks the distributor, which
//! blocks the fan-in channel, which blocks the producing adapters — the
//! explicit back-pressure design: slow sinks
//! throttle ingest rather than silently dropping data.
//!
//! Grounded on `weex_ingest::{PacketSender, PacketReceiver,
//! create_packet_channel}`'s channel-based plumbing, generalized from one
//! producer/one consumer to many producers fanning out to many named
//! consumers.

use rw_core::Reading;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Default bounded depth for a per-engine queue.
pub const DEFAULT_ENGINE_QUEUE_DEPTH: usize = 10;

/// The write end every station adapter holds; cloneable, many-producer safe.
pub type BusProducer = mpsc::Sender<Reading>;

/// Validates a reading and forwards it onto the bus; a reading that fails
/// validation (e.g. a wind direction outside `[0, 360)`) is logged and
/// dropped here rather than handed to the distributor. Adapters should
/// call this instead of sending on `BusProducer` directly.
pub async fn publish(bus: &BusProducer, reading: Reading) -> Result<(), mpsc::error::SendError<Reading>> {
    if let Err(err) = reading.validate() {
        tracing::warn!(
            station = %reading.station_name,
            error = %err,
            "dropping reading that failed validation"
        );
        return Ok(());
    }
    bus.send(reading).await
}

struct EngineSender {
    name: String,
    tx: mpsc::Sender<Reading>,
}

/// Shared fan-in point plus the registry of fan-out engine queues.
pub struct ReadingBus {
    fan_in_tx: mpsc::Sender<Reading>,
    fan_in_rx: Option<mpsc::Receiver<Reading>>,
    engines: Arc<RwLock<Vec<EngineSender>>>,
}

impl ReadingBus {
    /// `fan_in_capacity` bounds how many readings across *all* adapters
    /// can be queued before the first hop back-pressures; each registered
    /// engine gets its own independent bound via [`ReadingBus::register`].
    pub fn new(fan_in_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(fan_in_capacity);
        Self {
            fan_in_tx: tx,
            fan_in_rx: Some(rx),
            engines: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A cloneable write end for a station adapter to publish onto.
    pub fn producer(&self) -> BusProducer {
        self.fan_in_tx.clone()
    }

    /// Register a new storage engine. The engine
    /// receives every reading produced from this moment forward — readings
    /// already forwarded to other engines before this call are not
    /// replayed to it.
    pub async fn register(&self, name: impl Into<String>, queue_depth: usize) -> mpsc::Receiver<Reading> {
        let (tx, rx) = mpsc::channel(queue_depth);
        let name = name.into();
        tracing::info!(engine = %name, depth = queue_depth, "engine registered on reading bus");
        self.engines.write().await.push(EngineSender { name, tx });
        rx
    }

    /// Take the distributor that drives the fan-out loop. Must be called
    /// exactly once; panics otherwise, since running two distributors over
    /// the same fan-in channel would silently split traffic between them.
    pub fn distributor(&mut self) -> Distributor {
        let fan_in_rx = self
            .fan_in_rx
            .take()
            .expect("distributor already taken from this ReadingBus");
        Distributor {
            fan_in_rx,
            engines: Arc::clone(&self.engines),
        }
    }
}

/// Drives the fan-out loop: receives from the shared fan-in channel and
/// forwards to every registered engine in order, sequentially, so a
/// blocked engine back-pressures every adapter upstream of it.
pub struct Distributor {
    fan_in_rx: mpsc::Receiver<Reading>,
    engines: Arc<RwLock<Vec<EngineSender>>>,
}

impl Distributor {
    /// Runs until `cancel` fires or the fan-in channel closes (every
    /// producer dropped). On cancellation the distributor simply stops
    /// pulling new readings; already-registered engines drain whatever is
    /// already sitting in their own queues at their own pace.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let reading = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("reading bus distributor cancelled");
                    return;
                }
                reading = self.fan_in_rx.recv() => reading,
            };

            let Some(reading) = reading else {
                tracing::info!("reading bus fan-in closed, distributor exiting");
                return;
            };

            // Snapshot the registry so we don't hold the lock across
            // potentially-blocking sends; registration only ever appends,
            // so a snapshot taken here is a valid prefix of the final list.
            let targets: Vec<(String, mpsc::Sender<Reading>)> = self
                .engines
                .read()
                .await
                .iter()
                .map(|e| (e.name.clone(), e.tx.clone()))
                .collect();

            for (name, tx) in targets {
                if tx.send(reading.clone()).await.is_err() {
                    tracing::warn!(engine = %name, "engine queue closed, dropping further sends to it");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rw_core::StationKind;

    fn reading(station: &str) -> Reading {
        Reading::empty(Utc::now(), station, StationKind::Davis)
    }

    #[tokio::test]
    async fn publish_drops_reading_with_out_of_range_wind_dir() {
        let bus = ReadingBus::new(4);
        let producer = bus.producer();
        let mut bad = reading("s1");
        bad.wind_dir = Some(360.0);
        publish(&producer, bad).await.unwrap();

        let mut good = reading("s1");
        good.wind_dir = Some(10.0);
        publish(&producer, good.clone()).await.unwrap();

        drop(producer);
        // Only the valid reading reaches the fan-in channel.
        let mut rx = bus.fan_in_rx.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.wind_dir, Some(10.0));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn each_registered_engine_receives_every_reading() {
        let mut bus = ReadingBus::new(4);
        let mut rx_a = bus.register("a", 4).await;
        let mut rx_b = bus.register("b", 4).await;
        let distributor = bus.distributor();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(distributor.run(cancel.clone()));

        let producer = bus.producer();
        producer.send(reading("s1")).await.unwrap();
        producer.send(reading("s1")).await.unwrap();

        let a1 = rx_a.recv().await.unwrap();
        let a2 = rx_a.recv().await.unwrap();
        let b1 = rx_b.recv().await.unwrap();
        let b2 = rx_b.recv().await.unwrap();
        assert_eq!(a1.station_name, "s1");
        assert_eq!(a2.station_name, "s1");
        assert_eq!(b1.station_name, "s1");
        assert_eq!(b2.station_name, "s1");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn engine_registered_later_does_not_see_earlier_readings() {
        let mut bus = ReadingBus::new(4);
        let mut rx_early = bus.register("early", 4).await;
        let distributor = bus.distributor();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(distributor.run(cancel.clone()));

        let producer = bus.producer();
        producer.send(reading("first")).await.unwrap();
        // Ensure the first reading is forwarded before the next engine joins.
        let _ = rx_early.recv().await.unwrap();

        let mut rx_late = bus.register("late", 4).await;
        producer.send(reading("second")).await.unwrap();
        let late_first = rx_late.recv().await.unwrap();
        assert_eq!(late_first.station_name, "second");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn slow_engine_backpressures_without_starving_others_already_delivered() {
        // depth 1: second send blocks until the slow engine's queue is drained.
        let mut bus = ReadingBus::new(4);
        let rx_slow = bus.register("slow", 1).await;
        let mut rx_fast = bus.register("fast", 4).await;
        let distributor = bus.distributor();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(distributor.run(cancel.clone()));

        let producer = bus.producer();
        producer.send(reading("r1")).await.unwrap();
        // fast engine already has r1 queued even though slow's queue is now full.
        let r1 = rx_fast.recv().await.unwrap();
        assert_eq!(r1.station_name, "r1");

        drop(rx_slow);
        cancel.cancel();
        handle.await.unwrap();
    }
}
