//! Boots every component in dependency order and supervises them until a
//! shutdown signal arrives.
//!
//! Boot order is storage engines, then station adapters, then
//! controllers, then the read API: each later stage depends on a handle
//! produced by an earlier one (controllers and the read API both need
//! the timescale engine handle; adapters need the bus producer that only
//! exists once the bus is built). `shutdown_signal` mirrors
//! `rusty-timer`'s `server` binary's Ctrl-C/SIGTERM race; the run loop
//! generalizes `weex-daemon::main`'s single `tokio::select!` between one
//! scheduler and one shutdown future into an N-task `JoinSet` wait-group
//! driven by a shared `CancellationToken`.

mod error;

pub use error::{SupervisorError, SupervisorResult};

use rw_bus::ReadingBus;
use rw_config::{AppConfig, ControllerConfig};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs the full pipeline until cancelled. Returns once every spawned
/// component has exited (cleanly, because `cancel` fired, or because one
/// of them returned early and `cancel` was triggered in response).
pub async fn run(config: AppConfig, cancel: CancellationToken) -> SupervisorResult<()> {
    let mut bus = ReadingBus::new(rw_bus::DEFAULT_ENGINE_QUEUE_DEPTH);
    let mut tasks = JoinSet::new();

    // 1. Storage engines — everything downstream reads from the bus, so
    // engines must be registered before the distributor starts and before
    // any adapter can usefully produce.
    let (storage_handles, timescale) =
        rw_storage::spawn_engines(&config.storage, &bus, cancel.clone())
            .await
            .map_err(SupervisorError::Storage)?;
    for handle in storage_handles {
        tasks.spawn(async move {
            let _ = handle.await;
        });
    }

    let distributor = bus.distributor();
    tasks.spawn(distributor.run(cancel.clone()));

    // 2. Station adapters.
    for device in config.devices.clone() {
        let name = device.name.clone();
        let producer = bus.producer();
        let adapter_cancel = cancel.clone();
        match rw_ingest::spawn_adapter(device, producer, adapter_cancel) {
            Ok(handle) => {
                tasks.spawn(async move {
                    let _ = handle.await;
                });
            }
            Err(err) => {
                tracing::error!(device = %name, error = %err, "failed to start station adapter");
                return Err(SupervisorError::Ingest(err));
            }
        }
    }

    // 3. Controllers (PWS/WU/Aeris tickers) plus the REST controller,
    // which configures the read API rather than running its own ticker.
    let rest_config = config
        .controllers
        .iter()
        .find_map(|c| match c {
            ControllerConfig::Rest(rest) => Some(rest.clone()),
            _ => None,
        });

    if !config.controllers.is_empty() {
        let ts = timescale.clone().ok_or_else(|| {
            SupervisorError::Config(
                "controllers are configured but storage.timescale is not".to_string(),
            )
        })?;
        let handles =
            rw_controllers::spawn_controllers(&config.controllers, ts, cancel.clone());
        for handle in handles {
            tasks.spawn(async move {
                let _ = handle.await;
            });
        }
    }

    // 4. Read API, if a REST controller section is configured.
    if let Some(rest_config) = rest_config {
        let ts = timescale.clone().ok_or_else(|| {
            SupervisorError::Config(
                "a rest controller is configured but storage.timescale is not".to_string(),
            )
        })?;
        let state = Arc::new(rw_api::AppState {
            storage: ts,
            devices: config.devices.clone(),
            weather_site: rest_config.weather_site.clone(),
            metrics: rw_api::ApiMetrics::new(),
        });
        let api_cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(err) = rw_api::serve(&rest_config, state, api_cancel).await {
                tracing::error!(error = %err, "read API exited with an error");
            }
        });
    }

    tracing::info!(tasks = tasks.len(), "supervisor boot complete");

    // Wait for every task to finish. A task returning before cancellation
    // is only expected for adapters/engines permanently failing to start
    // their first connection retry loop iteration; we don't treat an
    // individual task's exit as fatal, since the cancellation token is
    // the single source of truth for "shut down everything".
    while tasks.join_next().await.is_some() {}

    Ok(())
}

/// Races Ctrl-C against SIGTERM (SIGTERM is unix-only; on other
/// platforms only Ctrl-C fires). Returns once either arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_once_cancelled_with_an_empty_config() {
        let config = AppConfig::default();
        let cancel = CancellationToken::new();
        let cancel_for_trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel_for_trigger.cancel();
        });

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), run(config, cancel)).await;
        assert!(result.is_ok(), "supervisor did not shut down within the timeout");
        assert!(result.unwrap().is_ok());
    }
}
