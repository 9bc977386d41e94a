//! The read surface: latest reading, historical spans, snow depth, and
//! cached forecasts. Handler shape (`State<Arc<AppState>>` + `Query`,
//! `IntoResponse` via a typed error) follows `weewx-cli::lib`'s
//! `current`/`history`/`healthz`/`readyz` handlers, adapted from an
//! in-memory ring buffer to the timescale storage engine.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{Datelike, Duration, TimeZone, Utc};
use rw_storage::Resolution;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StationQuery {
    station: Option<String>,
}

impl StationQuery {
    fn station_or_default<'a>(&'a self, state: &'a AppState) -> &'a str {
        self.station
            .as_deref()
            .unwrap_or(&state.weather_site.pull_from_device)
    }
}

pub async fn latest(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let station = q.station_or_default(&state);
    let reading = state
        .storage
        .latest_reading(station)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no reading yet for station {station:?}")))?;
    Ok(Json(reading))
}

pub async fn span(
    State(state): State<Arc<AppState>>,
    Path(duration): Path<String>,
    Query(q): Query<StationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let station = q.station_or_default(&state);
    let span = humantime::parse_duration(&duration)
        .map_err(|_| ApiError::InvalidDuration(duration.clone()))?;
    let resolution = Resolution::for_span(span);
    let since = Utc::now() - Duration::from_std(span).map_err(|_| ApiError::InvalidDuration(duration.clone()))?;
    let buckets = state.storage.span(station, resolution, since).await?;
    Ok(Json(buckets))
}

#[derive(Debug, serde::Serialize)]
struct SnowReport {
    station: String,
    snow_distance: Option<f64>,
    snow_depth: Option<f64>,
    storm_total: f64,
    last_24h: f64,
    last_72h: f64,
    today: f64,
    season_total: f64,
}

/// October 1st of the current winter season: if today is before October 1,
/// the season that's still running started on October 1st of last year.
fn default_season_start(now: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    let oct_1_this_year = Utc.with_ymd_and_hms(now.year(), 10, 1, 0, 0, 0).unwrap();
    if now < oct_1_this_year {
        Utc.with_ymd_and_hms(now.year() - 1, 10, 1, 0, 0, 0).unwrap()
    } else {
        oct_1_this_year
    }
}

fn today_midnight(now: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0).unwrap()
}

pub async fn snow(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let station = q
        .station
        .clone()
        .or_else(|| state.weather_site.snow_device.clone())
        .ok_or_else(|| ApiError::NotFound("no snow device configured".to_string()))?;

    let reading = state
        .storage
        .latest_reading(&station)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no reading yet for station {station:?}")))?;

    let snow_depth = match (state.base_snow_distance(&station), reading.snow_distance) {
        (Some(base), Some(distance)) => Some(base - distance),
        _ => reading.snow_depth,
    };

    let now = Utc::now();
    let storm_total = state.storage.snow_storm_total(&station).await?;
    let last_24h = state.storage.snow_season_total(&station, now - Duration::hours(24)).await?;
    let last_72h = state.storage.snow_season_total(&station, now - Duration::hours(72)).await?;
    let today = state.storage.snow_season_total(&station, today_midnight(now)).await?;
    let season_total = state.storage.snow_season_total(&station, default_season_start(now)).await?;

    Ok(Json(SnowReport {
        station,
        snow_distance: reading.snow_distance,
        snow_depth,
        storm_total,
        last_24h,
        last_72h,
        today,
        season_total,
    }))
}

pub async fn forecast(
    State(state): State<Arc<AppState>>,
    Path(span_hours): Path<i32>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let location = q.get("location").cloned();
    let record = state
        .storage
        .latest_forecast(location.as_deref(), span_hours)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("no cached forecast for {location:?}/{span_hours}h"))
        })?;
    Ok(Json(record))
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.storage.ping().await {
        Ok(()) => {
            state.metrics.set_ready(true);
            StatusCode::OK
        }
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            state.metrics.set_ready(false);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_query_prefers_explicit_station_over_default() {
        let q = StationQuery {
            station: Some("vantage-2".to_string()),
        };
        let fallback = "vantage-1".to_string();
        assert_eq!(q.station.as_deref().unwrap_or(&fallback), "vantage-2");
    }

    #[test]
    fn station_query_falls_back_when_absent() {
        let q = StationQuery { station: None };
        let fallback = "vantage-1".to_string();
        assert_eq!(q.station.as_deref().unwrap_or(&fallback), "vantage-1");
    }

    #[test]
    fn season_start_is_october_1st_of_this_year_once_past_it() {
        let now = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();
        assert_eq!(default_season_start(now), Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn season_start_rolls_back_to_last_october_before_the_1st() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(default_season_start(now), Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn today_midnight_truncates_the_time_of_day() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 14, 32, 9).unwrap();
        assert_eq!(today_midnight(now), Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap());
    }
}
