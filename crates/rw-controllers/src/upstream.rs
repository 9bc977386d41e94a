//! PWS Weather and Weather Underground share the same venerable HTTP GET
//! "update protocol": URL-encoded current-conditions parameters sent as a
//! query string, with a response body that must contain the substring
//! `success` for the update to count. The two differ only in endpoint,
//! a couple of extra Wunderground-only parameters, and whether solar
//! radiation is sent at all.

use crate::common::{pull_latest, Controller};
use crate::error::{ControllerError, ControllerResult};
use async_trait::async_trait;
use reqwest::Client;
use rw_config::UpstreamPublisherConfig;
use rw_core::Reading;
use rw_storage::TimescaleEngine;
use std::sync::Arc;
use std::time::Duration;

const PWS_WEATHER_ENDPOINT: &str = "https://pwsupdate.pwsweather.com/api/v1/submitwx";
const WUNDERGROUND_ENDPOINT: &str = "https://rtupdate.wunderground.com/weatherstation/updateweatherstation.php";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamVariant {
    PwsWeather,
    Wunderground,
}

impl UpstreamVariant {
    fn default_endpoint(self) -> &'static str {
        match self {
            UpstreamVariant::PwsWeather => PWS_WEATHER_ENDPOINT,
            UpstreamVariant::Wunderground => WUNDERGROUND_ENDPOINT,
        }
    }

    fn name(self) -> &'static str {
        match self {
            UpstreamVariant::PwsWeather => "pws-weather",
            UpstreamVariant::Wunderground => "wunderground",
        }
    }
}

/// Builds the URL-encoded query parameters for one reading, per the
/// shared update protocol. `ID`/`PASSWORD`/`dateutc` plus the scalar
/// observations are common to both variants; Wunderground additionally
/// requires `action=updateraw` and a realtime hint.
fn build_query(variant: UpstreamVariant, config: &UpstreamPublisherConfig, reading: &Reading) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("ID", config.station_id.clone()),
        ("PASSWORD", config.api_key.clone()),
        ("dateutc", reading.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
    ];

    if let Some(v) = reading.wind_dir {
        params.push(("winddir", format!("{v:.0}")));
    }
    if let Some(v) = reading.wind_speed {
        params.push(("windspeedmph", format!("{v:.1}")));
    }
    // No independent gust reading: use twice the sustained speed, matching
    // the APRS beacon's stand-in for a missing gust sample.
    let gust = reading.wind_gust.or_else(|| reading.wind_speed.map(|s| s * 2.0));
    if let Some(v) = gust {
        params.push(("windgustmph", format!("{v:.1}")));
    }
    if let Some(v) = reading.humidity_out {
        params.push(("humidity", format!("{v:.0}")));
    }
    if let Some(v) = reading.temp_out {
        params.push(("tempf", format!("{v:.1}")));
    }
    if let Some(v) = reading.rain_day {
        params.push(("dailyrainin", format!("{v:.2}")));
    }
    if let Some(v) = reading.barometer {
        params.push(("baromin", format!("{v:.3}")));
    }
    if variant == UpstreamVariant::PwsWeather {
        if let Some(v) = reading.solar_watts {
            params.push(("solarradiation", format!("{v:.1}")));
        }
    }

    params.push(("softwaretype", format!("remoteweather-{}", env!("CARGO_PKG_VERSION"))));
    if variant == UpstreamVariant::Wunderground {
        params.push(("action", "updateraw".to_string()));
        params.push(("realtime", "1".to_string()));
        params.push(("rtfreq", "2.5".to_string()));
    }
    params
}

pub struct UpstreamController {
    variant: UpstreamVariant,
    config: UpstreamPublisherConfig,
    storage: Arc<TimescaleEngine>,
    client: Client,
}

impl UpstreamController {
    pub fn new(variant: UpstreamVariant, config: UpstreamPublisherConfig, storage: Arc<TimescaleEngine>) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client builder with only a timeout cannot fail");
        Self { variant, config, storage, client }
    }
}

#[async_trait]
impl Controller for UpstreamController {
    fn name(&self) -> &str {
        self.variant.name()
    }

    async fn tick(&self) -> ControllerResult<()> {
        let reading = pull_latest(&self.storage, &self.config.pull_from_device).await?;
        let endpoint = self.config.endpoint.as_deref().unwrap_or_else(|| self.variant.default_endpoint());
        let query = build_query(self.variant, &self.config, &reading);

        let response = self.client.get(endpoint).query(&query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() || !body.contains("success") {
            return Err(ControllerError::UpstreamRejected(format!(
                "{} returned status {status} body {body:?}",
                self.variant.name()
            )));
        }
        tracing::debug!(variant = self.variant.name(), device = %self.config.pull_from_device, "upstream update accepted");
        Ok(())
    }
}
