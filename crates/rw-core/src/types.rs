//! The canonical normalised observation and its identifying metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::ReadingError;

/// Tag identifying which protocol family produced a [`Reading`].
///
/// `#[non_exhaustive]` so new station families can be added without
/// breaking downstream exhaustive matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StationKind {
    Davis,
    Campbell,
    SnowGauge,
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StationKind::Davis => "davis",
            StationKind::Campbell => "campbell",
            StationKind::SnowGauge => "snow-gauge",
        };
        f.write_str(s)
    }
}

/// The canonical, normalised observation. Every station adapter emits one
/// of these per decoded packet; every sink consumes the same shape.
///
/// Scalars use `Option<f64>` rather than a sentinel value so "absent" is
/// distinguishable from zero on the wire and in storage.
/// Never mutated once it leaves an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub station_name: String,
    pub station_kind: StationKind,

    pub temp_out: Option<f64>,
    pub temp_in: Option<f64>,
    pub humidity_out: Option<f64>,
    pub humidity_in: Option<f64>,
    pub barometer: Option<f64>,
    /// Signed 3-hour barometer trend; only carried by frames in the Davis
    /// "Flavor B" LOOP layout, absent from every other station family.
    pub barometer_trend: Option<f64>,

    pub wind_speed: Option<f64>,
    pub wind_speed_10min_avg: Option<f64>,
    pub wind_gust: Option<f64>,
    /// Degrees, `[0, 360)` when present.
    pub wind_dir: Option<f64>,

    pub rain_rate: Option<f64>,
    pub rain_incremental: Option<f64>,
    pub rain_day: Option<f64>,
    pub rain_month: Option<f64>,
    pub rain_year: Option<f64>,
    pub rain_storm: Option<f64>,

    pub solar_watts: Option<f64>,
    pub solar_joules: Option<f64>,
    pub uv_index: Option<f64>,
    pub radiation: Option<f64>,

    pub soil_temp_1: Option<f64>,
    pub soil_temp_2: Option<f64>,
    pub soil_temp_3: Option<f64>,
    pub soil_temp_4: Option<f64>,
    pub soil_moisture_1: Option<f64>,
    pub soil_moisture_2: Option<f64>,
    pub soil_moisture_3: Option<f64>,
    pub soil_moisture_4: Option<f64>,

    pub leaf_temp_1: Option<f64>,
    pub leaf_temp_2: Option<f64>,
    pub leaf_wetness_1: Option<f64>,
    pub leaf_wetness_2: Option<f64>,

    pub battery_voltage_console: Option<f64>,
    pub battery_voltage_transmitter: Option<f64>,

    /// Raw sensor distance to the snow/ground surface, millimetres.
    pub snow_distance: Option<f64>,
    /// Derived: `base_snow_distance - snow_distance`, millimetres.
    pub snow_depth: Option<f64>,

    pub heat_index: Option<f64>,
    pub wind_chill: Option<f64>,

    /// Reserved numeric extras not otherwise named above.
    #[serde(default)]
    pub extra_numeric: HashMap<String, f64>,
    /// Reserved textual extras (e.g. raw firmware strings).
    #[serde(default)]
    pub extra_text: HashMap<String, String>,
}

impl Reading {
    /// A `Reading` with every scalar absent, for adapters to fill in.
    pub fn empty(timestamp: DateTime<Utc>, station_name: impl Into<String>, kind: StationKind) -> Self {
        Self {
            timestamp,
            station_name: station_name.into(),
            station_kind: kind,
            temp_out: None,
            temp_in: None,
            humidity_out: None,
            humidity_in: None,
            barometer: None,
            barometer_trend: None,
            wind_speed: None,
            wind_speed_10min_avg: None,
            wind_gust: None,
            wind_dir: None,
            rain_rate: None,
            rain_incremental: None,
            rain_day: None,
            rain_month: None,
            rain_year: None,
            rain_storm: None,
            solar_watts: None,
            solar_joules: None,
            uv_index: None,
            radiation: None,
            soil_temp_1: None,
            soil_temp_2: None,
            soil_temp_3: None,
            soil_temp_4: None,
            soil_moisture_1: None,
            soil_moisture_2: None,
            soil_moisture_3: None,
            soil_moisture_4: None,
            leaf_temp_1: None,
            leaf_temp_2: None,
            leaf_wetness_1: None,
            leaf_wetness_2: None,
            battery_voltage_console: None,
            battery_voltage_transmitter: None,
            snow_distance: None,
            snow_depth: None,
            heat_index: None,
            wind_chill: None,
            extra_numeric: HashMap::new(),
            extra_text: HashMap::new(),
        }
    }

    /// Checks the invariants a `Reading` must hold: wind
    /// direction, if present, lies in `[0, 360)`.
    pub fn validate(&self) -> Result<(), ReadingError> {
        if let Some(dir) = self.wind_dir {
            if !(0.0..360.0).contains(&dir) {
                return Err(ReadingError::WindDirOutOfRange(dir));
            }
        }
        Ok(())
    }

    /// A reading is considered semantically faulty when both outside temperature and
    /// barometer are exactly zero — almost certainly an uninitialised or
    /// disconnected sensor rather than a real observation.
    pub fn is_semantically_faulty(&self) -> bool {
        matches!((self.temp_out, self.barometer), (Some(t), Some(b)) if t == 0.0 && b == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Reading {
        Reading::empty(Utc::now(), "test-station", StationKind::Davis)
    }

    #[test]
    fn validate_accepts_absent_wind_dir() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn validate_accepts_boundary_zero() {
        let mut r = base();
        r.wind_dir = Some(0.0);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn validate_rejects_360() {
        let mut r = base();
        r.wind_dir = Some(360.0);
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative() {
        let mut r = base();
        r.wind_dir = Some(-1.0);
        assert!(r.validate().is_err());
    }

    #[test]
    fn faulty_requires_both_zero() {
        let mut r = base();
        r.temp_out = Some(0.0);
        r.barometer = Some(0.0);
        assert!(r.is_semantically_faulty());

        r.barometer = Some(30.1);
        assert!(!r.is_semantically_faulty());
    }

    #[test]
    fn station_kind_display() {
        assert_eq!(StationKind::Davis.to_string(), "davis");
        assert_eq!(StationKind::SnowGauge.to_string(), "snow-gauge");
    }
}
