//! gRPC streaming storage engine: fans live readings out to subscribers
//! and answers historical span queries against the timescale aggregates.
//!
//! The subscriber registry mirrors `rw_bus::ReadingBus`'s
//! `Arc<RwLock<Vec<_>>>` fan-out shape, generalized to a map so a
//! subscriber can be deregistered by id when its stream drops. A
//! full subscriber queue gets its reading dropped rather than blocking
//! the bus — unlike the bus's own engines, a streaming client going slow
//! must never back-pressure ingest.

use crate::error::StorageResult;
use crate::timescale::{bucket_to_reading, Resolution, TimescaleEngine};
use rw_config::GrpcStorageConfig;
use rw_core::{Reading, SubscriberId};
use rw_proto::weather_server::{Weather, WeatherServer};
use rw_proto::{LiveWeatherRequest, WeatherReading, WeatherSpan, WeatherSpanRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};

/// Bounded depth for one subscriber's live-stream queue.
const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

struct Registry {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<Reading>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    async fn register(&self) -> (SubscriberId, mpsc::Receiver<Reading>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.write().await.insert(id, tx);
        (id, rx)
    }

    async fn deregister(&self, id: SubscriberId) {
        self.subscribers.write().await.remove(&id);
    }

    /// Fans a reading out to every subscriber, dropping it for any whose
    /// queue is full rather than waiting.
    async fn fan_out(&self, reading: &Reading) {
        let subscribers = self.subscribers.read().await;
        for (id, tx) in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(reading.clone()) {
                tracing::debug!(subscriber = %id, "live subscriber queue full, dropping reading");
            }
        }
    }
}

/// Runs as a bus sink (receiving every reading) and as a tonic service
/// (answering live-stream and span queries).
#[derive(Clone)]
pub struct GrpcEngine {
    registry: Arc<Registry>,
    timescale: Arc<TimescaleEngine>,
    /// `GetWeatherSpan` carries no station in its request (the filtered
    /// form lives on the REST read API instead); this is the station it
    /// reports on, taken from `storage.grpc.default-station`.
    default_station: String,
}

impl GrpcEngine {
    pub fn new(timescale: Arc<TimescaleEngine>, default_station: String) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            timescale,
            default_station,
        }
    }

    /// Consumes readings off the bus and fans them out to live
    /// subscribers until the channel closes or `cancel` fires.
    pub async fn run(self, mut rx: mpsc::Receiver<Reading>, cancel: CancellationToken) {
        loop {
            let reading = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                reading = rx.recv() => reading,
            };
            let Some(reading) = reading else { return };
            self.registry.fan_out(&reading).await;
        }
    }

    /// Serves the `Weather` service on `config.listen:config.port`,
    /// binding TLS only when both a cert and key path are configured.
    pub async fn serve(self, config: &GrpcStorageConfig, cancel: CancellationToken) -> StorageResult<()> {
        let addr = format!("{}:{}", config.listen, config.port)
            .parse()
            .map_err(|e| crate::error::StorageError::Config(format!("invalid grpc listen address: {e}")))?;

        let mut builder = Server::builder();
        if let Some(tls) = &config.tls {
            let cert = tokio::fs::read(&tls.cert_path).await?;
            let key = tokio::fs::read(&tls.key_path).await?;
            let identity = Identity::from_pem(cert, key);
            builder = builder
                .tls_config(ServerTlsConfig::new().identity(identity))
                .map_err(|e| crate::error::StorageError::Protocol(format!("tls setup failed: {e}")))?;
        }

        tracing::info!(%addr, "gRPC weather service listening");
        builder
            .add_service(WeatherServer::new(self))
            .serve_with_shutdown(addr, cancel.cancelled())
            .await
            .map_err(crate::error::StorageError::Grpc)?;
        Ok(())
    }
}

#[tonic::async_trait]
impl Weather for GrpcEngine {
    type GetLiveWeatherStream = ReceiverStream<Result<WeatherReading, Status>>;

    async fn get_live_weather(
        &self,
        request: Request<LiveWeatherRequest>,
    ) -> Result<Response<Self::GetLiveWeatherStream>, Status> {
        let station_filter = request.into_inner().station;
        let (id, mut rx) = self.registry.register().await;
        let (out_tx, out_rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            while let Some(reading) = rx.recv().await {
                if let Some(station) = &station_filter {
                    if &reading.station_name != station {
                        continue;
                    }
                }
                if out_tx.send(Ok(WeatherReading::from(&reading))).await.is_err() {
                    break;
                }
            }
            registry.deregister(id).await;
        });

        Ok(Response::new(ReceiverStream::new(out_rx)))
    }

    async fn get_weather_span(
        &self,
        request: Request<WeatherSpanRequest>,
    ) -> Result<Response<WeatherSpan>, Status> {
        let req = request.into_inner();
        let duration = humantime::parse_duration(&req.duration)
            .map_err(|e| Status::invalid_argument(format!("invalid duration {:?}: {e}", req.duration)))?;

        let resolution = Resolution::for_span(duration);
        let since = chrono::Utc::now() - chrono::Duration::from_std(duration)
            .map_err(|e| Status::invalid_argument(format!("duration out of range: {e}")))?;

        let buckets = self
            .timescale
            .span(&self.default_station, resolution, since)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        let readings: Vec<WeatherReading> = buckets
            .iter()
            .map(|b| WeatherReading::from(&bucket_to_reading(b)))
            .collect();

        Ok(Response::new(WeatherSpan {
            span_start_unix_seconds: since.timestamp(),
            readings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn full_subscriber_queue_drops_instead_of_blocking() {
        let registry = Registry::new();
        let (_id, mut rx) = registry.register().await;

        let reading = Reading::empty(Utc::now(), "s1", rw_core::StationKind::Davis);
        for _ in 0..(SUBSCRIBER_QUEUE_DEPTH + 5) {
            registry.fan_out(&reading).await;
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert!(received <= SUBSCRIBER_QUEUE_DEPTH);
    }
}
