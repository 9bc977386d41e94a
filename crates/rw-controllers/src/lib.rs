mod aeris;
mod common;
mod error;
mod upstream;

pub use aeris::AerisController;
pub use common::{run_controller_loop, Controller, DEFAULT_TICK_INTERVAL};
pub use error::{ControllerError, ControllerResult};
pub use upstream::{UpstreamController, UpstreamVariant};

use rw_config::ControllerConfig;
use rw_storage::TimescaleEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builds and spawns one controller loop per configured controller. The
/// REST controller is skipped here — it configures the read API instead
/// of running its own ticker, and is wired up by `rw-api`.
pub fn spawn_controllers(
    configs: &[ControllerConfig],
    storage: Arc<TimescaleEngine>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for config in configs {
        let (controller, interval): (Box<dyn Controller>, Duration) = match config {
            ControllerConfig::PwsWeather(c) => (
                Box::new(UpstreamController::new(UpstreamVariant::PwsWeather, c.clone(), Arc::clone(&storage))),
                Duration::from_secs(c.upload_interval_seconds),
            ),
            ControllerConfig::Wunderground(c) => (
                Box::new(UpstreamController::new(UpstreamVariant::Wunderground, c.clone(), Arc::clone(&storage))),
                Duration::from_secs(c.upload_interval_seconds),
            ),
            ControllerConfig::Aeris(c) => (
                Box::new(AerisController::new(c.clone(), Arc::clone(&storage))),
                Duration::from_secs(c.upload_interval_seconds),
            ),
            ControllerConfig::Rest(_) => continue,
        };

        let cancel = cancel.clone();
        handles.push(tokio::spawn(run_controller_loop(controller, interval, cancel)));
    }

    handles
}
