//! Storage engines that sit downstream of the reading bus: a
//! TimescaleDB-style time-series sink, a gRPC live/historical read
//! service, and an APRS/CWOP beacon — each registered as an independent
//! fan-out consumer so a slow one only back-pressures the bus, never the
//! others.

#[cfg(feature = "aprs")]
pub mod aprs;
pub mod error;
#[cfg(feature = "grpc-stream")]
pub mod grpc;
#[cfg(feature = "timescale")]
pub mod timescale;

pub use error::{StorageError, StorageResult};

#[cfg(feature = "aprs")]
pub use aprs::AprsEngine;
#[cfg(feature = "grpc-stream")]
pub use grpc::GrpcEngine;
#[cfg(feature = "timescale")]
pub use timescale::{ForecastRecord, Resolution, TimescaleEngine};

use rw_bus::ReadingBus;
use rw_config::StorageConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connects and schema-initialises every configured engine, registers
/// each on the bus, and spawns its run loop. Returns the join handles so
/// the supervisor can wait on them during shutdown, plus a handle to the
/// timescale engine (when configured) for the read API to query directly.
pub async fn spawn_engines(
    config: &StorageConfig,
    bus: &ReadingBus,
    cancel: CancellationToken,
) -> StorageResult<(Vec<JoinHandle<()>>, Option<Arc<TimescaleEngine>>)> {
    let mut handles = Vec::new();
    let mut timescale_handle = None;

    #[cfg(feature = "timescale")]
    if let Some(ts_config) = &config.timescale {
        let engine = TimescaleEngine::connect(&ts_config.dsn).await?;
        engine.init_schema().await?;
        let engine = Arc::new(engine);
        timescale_handle = Some(Arc::clone(&engine));

        let rx = bus.register("timescale", rw_bus::DEFAULT_ENGINE_QUEUE_DEPTH).await;
        let cancel = cancel.clone();
        let engine_for_run = (*engine).clone();
        handles.push(tokio::spawn(engine_for_run.run(rx, cancel)));
    }

    #[cfg(feature = "grpc-stream")]
    if let Some(grpc_config) = &config.grpc {
        let ts = timescale_handle
            .clone()
            .ok_or_else(|| StorageError::Config("grpc storage engine requires storage.timescale to also be configured".to_string()))?;
        let engine = GrpcEngine::new(ts, grpc_config.default_station.clone());

        let rx = bus.register("grpc", rw_bus::DEFAULT_ENGINE_QUEUE_DEPTH).await;
        let fanout_cancel = cancel.clone();
        let fanout_engine = engine.clone();
        handles.push(tokio::spawn(fanout_engine.run(rx, fanout_cancel)));

        let serve_config = grpc_config.clone();
        let serve_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = engine.serve(&serve_config, serve_cancel).await {
                tracing::error!(error = %err, "grpc storage engine exited with an error");
            }
        }));
    }

    #[cfg(feature = "aprs")]
    if let Some(aprs_config) = &config.aprs {
        let engine = AprsEngine::new(aprs_config.clone());
        let rx = bus.register("aprs", rw_bus::DEFAULT_ENGINE_QUEUE_DEPTH).await;

        let run_cancel = cancel.clone();
        let run_engine = engine.clone();
        handles.push(tokio::spawn(run_engine.run(rx, run_cancel)));

        let ticker_cancel = cancel.clone();
        handles.push(tokio::spawn(engine.run_ticker(ticker_cancel)));
    }

    Ok((handles, timescale_handle))
}
