//! Aeris forecast controller: periodically fetches a forecast for the
//! configured location and writes it to the forecast table, ready for
//! the read API's `/forecast/{span_hours}` route. Structurally identical
//! to [`crate::upstream::UpstreamController`] — own ticker, pull-based —
//! except it fetches from, rather than publishes to, the upstream.

use crate::common::Controller;
use crate::error::{ControllerError, ControllerResult};
use async_trait::async_trait;
use reqwest::Client;
use rw_config::AerisConfig;
use rw_storage::TimescaleEngine;
use std::sync::Arc;
use std::time::Duration;

const AERIS_ENDPOINT: &str = "https://api.aerisapi.com/forecasts";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
/// Aeris' standard forecast span per request.
const SPAN_HOURS: i32 = 72;

pub struct AerisController {
    config: AerisConfig,
    storage: Arc<TimescaleEngine>,
    client: Client,
}

impl AerisController {
    pub fn new(config: AerisConfig, storage: Arc<TimescaleEngine>) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client builder with only a timeout cannot fail");
        Self { config, storage, client }
    }
}

#[async_trait]
impl Controller for AerisController {
    fn name(&self) -> &str {
        "aeris"
    }

    async fn tick(&self) -> ControllerResult<()> {
        let url = format!("{AERIS_ENDPOINT}/{}", self.config.location);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControllerError::UpstreamRejected(format!(
                "aeris forecast request for {} returned status {status}",
                self.config.location
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        if payload.get("success").and_then(|v| v.as_bool()) == Some(false) {
            return Err(ControllerError::UpstreamRejected(format!(
                "aeris rejected forecast request for {}: {payload}",
                self.config.location
            )));
        }

        self.storage.write_forecast(&self.config.location, SPAN_HOURS, &payload).await?;
        tracing::debug!(location = %self.config.location, "aeris forecast refreshed");
        Ok(())
    }
}
