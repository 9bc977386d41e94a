//! Station ingest adapters: Davis LOOP, Campbell Scientific JSON lines,
//! and snow-gauge gRPC streaming, plus the reconnect-loop runner and
//! per-device spawn helper shared by all three.

mod backoff;
mod campbell;
mod common;
mod davis;
mod error;
mod snowgauge;

pub use backoff::Backoff;
pub use campbell::CampbellAdapter;
pub use common::{run_adapter_loop, StationAdapter};
pub use davis::DavisAdapter;
pub use error::{IngestError, IngestResult};
pub use snowgauge::SnowGaugeAdapter;

use rw_bus::BusProducer;
use rw_config::{DeviceConfig, DeviceKind, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builds the right adapter (and its default backoff policy) for a
/// configured device.
pub fn build_adapter(device: DeviceConfig) -> IngestResult<(Box<dyn StationAdapter>, Backoff)> {
    match device.kind {
        DeviceKind::Davis => Ok((Box::new(DavisAdapter::new(device)), davis::default_backoff())),
        DeviceKind::Campbell => Ok((Box::new(CampbellAdapter::new(device)), campbell::default_backoff())),
        DeviceKind::SnowGauge => {
            let endpoint = match &device.transport {
                Transport::Tcp { host, port } => format!("http://{host}:{port}"),
                Transport::Serial { .. } => {
                    return Err(IngestError::Config(format!(
                        "snow-gauge device {:?} must use a tcp transport (gRPC endpoint)",
                        device.name
                    )))
                }
            };
            let backoff = snowgauge::default_backoff();
            Ok((Box::new(SnowGaugeAdapter::new(device, endpoint)), backoff))
        }
    }
}

/// Builds and spawns the reconnect loop for one configured device onto a
/// producer handle of the reading bus. Returns once the adapter is
/// constructed; it does not wait for the first successful connection.
pub fn spawn_adapter(
    device: DeviceConfig,
    bus: BusProducer,
    cancel: CancellationToken,
) -> IngestResult<JoinHandle<()>> {
    let (adapter, backoff) = build_adapter(device)?;
    Ok(tokio::spawn(run_adapter_loop(adapter, bus, cancel, backoff)))
}
