//! Snow-gauge ingest adapter: a tonic client against a remote ultrasonic
//! distance sensor's `SnowGaugeService`, converting raw distance readings
//! into snow depth relative to a configured baseline.

use crate::backoff::Backoff;
use crate::common::StationAdapter;
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use chrono::Utc;
use rw_bus::BusProducer;
use rw_config::DeviceConfig;
use rw_core::{Reading, StationKind};
use rw_proto::snow_gauge_service_client::SnowGaugeServiceClient;
use rw_proto::StreamRequest;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

pub struct SnowGaugeAdapter {
    device: DeviceConfig,
    endpoint: String,
}

impl SnowGaugeAdapter {
    /// `endpoint` is the gRPC URI of the snow-gauge sensor, e.g.
    /// `http://snow-gauge.local:50051`.
    pub fn new(device: DeviceConfig, endpoint: String) -> Self {
        Self { device, endpoint }
    }
}

#[async_trait]
impl StationAdapter for SnowGaugeAdapter {
    fn device_name(&self) -> &str {
        &self.device.name
    }

    async fn run_once(&mut self, bus: &BusProducer, cancel: &CancellationToken) -> IngestResult<()> {
        let mut client = SnowGaugeServiceClient::connect(self.endpoint.clone()).await?;
        let mut stream = client.stream_reading(StreamRequest {}).await?.into_inner();

        let base_distance = self.device.base_snow_distance;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };

            let Some(item) = next else {
                return Ok(()); // stream closed cleanly, reconnect
            };
            let snow_reading = item?;

            let distance = snow_reading.distance_mm as f64;
            if let Some(base) = base_distance {
                if distance > base {
                    tracing::debug!(
                        device = %self.device.name,
                        distance,
                        base,
                        "discarding snow reading deeper than configured baseline"
                    );
                    continue;
                }
            }

            let mut r = Reading::empty(Utc::now(), &self.device.name, StationKind::SnowGauge);
            r.snow_distance = Some(distance);
            r.snow_depth = base_distance.map(|base| base - distance);

            if rw_bus::publish(bus, r).await.is_err() {
                return Ok(());
            }
        }
    }
}

pub fn default_backoff() -> Backoff {
    Backoff::grpc()
}
