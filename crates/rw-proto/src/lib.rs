//! Generated protobuf/tonic types for the snow-gauge ingest service and
//! the gRPC weather streaming service, plus
//! conversions to and from [`rw_core::Reading`].

use chrono::{DateTime, TimeZone, Utc};
use rw_core::{Reading, StationKind};

tonic::include_proto!("remoteweather.v1");

impl From<&Reading> for WeatherReading {
    fn from(r: &Reading) -> Self {
        WeatherReading {
            timestamp_unix_seconds: r.timestamp.timestamp(),
            station_name: r.station_name.clone(),
            station_kind: r.station_kind.to_string(),
            temp_out: r.temp_out,
            temp_in: r.temp_in,
            humidity_out: r.humidity_out,
            humidity_in: r.humidity_in,
            barometer: r.barometer,
            wind_speed: r.wind_speed,
            wind_speed_10min_avg: r.wind_speed_10min_avg,
            wind_gust: r.wind_gust,
            wind_dir: r.wind_dir,
            rain_rate: r.rain_rate,
            rain_incremental: r.rain_incremental,
            rain_day: r.rain_day,
            rain_month: r.rain_month,
            rain_year: r.rain_year,
            rain_storm: r.rain_storm,
            solar_watts: r.solar_watts,
            solar_joules: r.solar_joules,
            uv_index: r.uv_index,
            radiation: r.radiation,
            snow_distance: r.snow_distance,
            snow_depth: r.snow_depth,
            heat_index: r.heat_index,
            wind_chill: r.wind_chill,
        }
    }
}

impl WeatherReading {
    /// Reconstruct a full [`Reading`] from the wire projection. The
    /// soil/leaf/battery extras the wire format omits (kept lean for
    /// live-stream bandwidth) come back absent; storage-backed queries
    /// fill those straight from the database row instead of this path.
    pub fn into_reading(self) -> Reading {
        let timestamp: DateTime<Utc> = Utc
            .timestamp_opt(self.timestamp_unix_seconds, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let station_kind = match self.station_kind.as_str() {
            "davis" => StationKind::Davis,
            "campbell" => StationKind::Campbell,
            _ => StationKind::SnowGauge,
        };
        let mut reading = Reading::empty(timestamp, self.station_name, station_kind);
        reading.temp_out = self.temp_out;
        reading.temp_in = self.temp_in;
        reading.humidity_out = self.humidity_out;
        reading.humidity_in = self.humidity_in;
        reading.barometer = self.barometer;
        reading.wind_speed = self.wind_speed;
        reading.wind_speed_10min_avg = self.wind_speed_10min_avg;
        reading.wind_gust = self.wind_gust;
        reading.wind_dir = self.wind_dir;
        reading.rain_rate = self.rain_rate;
        reading.rain_incremental = self.rain_incremental;
        reading.rain_day = self.rain_day;
        reading.rain_month = self.rain_month;
        reading.rain_year = self.rain_year;
        reading.rain_storm = self.rain_storm;
        reading.solar_watts = self.solar_watts;
        reading.solar_joules = self.solar_joules;
        reading.uv_index = self.uv_index;
        reading.radiation = self.radiation;
        reading.snow_distance = self.snow_distance;
        reading.snow_depth = self.snow_depth;
        reading.heat_index = self.heat_index;
        reading.wind_chill = self.wind_chill;
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rw_core::StationKind;

    #[test]
    fn reading_roundtrips_through_wire_projection() {
        let mut r = Reading::empty(Utc::now(), "ws-1", StationKind::Davis);
        r.temp_out = Some(71.8);
        r.wind_dir = Some(250.0);

        let wire = WeatherReading::from(&r);
        let back = wire.into_reading();

        assert_eq!(back.station_name, r.station_name);
        assert_eq!(back.temp_out, r.temp_out);
        assert_eq!(back.wind_dir, r.wind_dir);
        assert_eq!(back.timestamp.timestamp(), r.timestamp.timestamp());
    }
}
