//! APRS/CWOP beacon engine: holds only the single most recent reading
//! behind a mutex (not a queue — a fixed-cadence beacon never needs more
//! than "what's current right now"), and transmits it to an APRS-IS
//! server on a 5-minute ticker plus one beacon as soon as the first
//! reading arrives.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rw_config::AprsConfig;
use rw_core::Reading;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_APRS_IS_SERVER: &str = "noam.aprs2.net:14580";
const BEACON_INTERVAL: Duration = Duration::from_secs(5 * 60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

fn format_latitude(lat: f64) -> String {
    let hemisphere = if lat >= 0.0 { 'N' } else { 'S' };
    let lat = lat.abs();
    let degrees = lat.trunc() as u32;
    let minutes = (lat.fract()) * 60.0;
    format!("{degrees:02}{minutes:05.2}{hemisphere}")
}

fn format_longitude(lon: f64) -> String {
    let hemisphere = if lon >= 0.0 { 'E' } else { 'W' };
    let lon = lon.abs();
    let degrees = lon.trunc() as u32;
    let minutes = (lon.fract()) * 60.0;
    format!("{degrees:03}{minutes:05.2}{hemisphere}")
}

/// Builds the `!`-type (no-timestamp) APRS weather packet body (without
/// the `CALLSIGN>APRS,TCPIP*:` source header) for one reading.
fn format_weather_packet(config: &AprsConfig, reading: &Reading, _now: DateTime<Utc>) -> String {
    let lat = format_latitude(config.location.lat);
    let lon = format_longitude(config.location.lon);

    let wind_dir = reading.wind_dir.unwrap_or(0.0).round() as i64;
    let wind_dir = wind_dir.rem_euclid(360);
    let wind_speed = reading.wind_speed.unwrap_or(0.0).round() as i64;
    // No independent gust reading: use twice the sustained speed as a
    // conservative stand-in, matching what the upstream drivers already do
    // when only a single anemometer sample is available.
    let gust = reading
        .wind_gust
        .map(|g| g.round() as i64)
        .unwrap_or(wind_speed * 2);

    let temp_f = reading.temp_out.map(|t| t.round() as i64).unwrap_or(0);
    let temp_field = if temp_f < 0 {
        format!("-{:02}", -temp_f)
    } else {
        format!("{temp_f:03}")
    };

    let rain_24h_hundredths = (reading.rain_day.unwrap_or(0.0) * 100.0).round() as i64 % 1000;
    let humidity_raw = reading.humidity_out.map(|h| h.round() as i64).unwrap_or(0);
    let humidity = if humidity_raw >= 100 { 0 } else { humidity_raw.max(0) };
    // inHg -> tenths of a millibar.
    let barometer_tenths_mb = reading
        .barometer
        .map(|b| (b * 33.8639 * 10.0).round() as i64 % 100_000)
        .unwrap_or(0);

    format!(
        "!{lat}/{lon}_{wdir:03}/{wspeed:03}g{gust:03}t{temp}P{rain:03}h{hum:02}b{baro:05}remoteweather-{version}",
        wdir = wind_dir,
        wspeed = wind_speed,
        gust = gust,
        temp = temp_field,
        rain = rain_24h_hundredths,
        hum = humidity,
        baro = barometer_tenths_mb,
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Connects to the APRS-IS server, performs the banner/login handshake,
/// and sends one packet, per the documented CWOP ingest protocol. Any
/// step failing aborts the cycle; the caller's next tick starts fresh.
#[instrument(skip(config, packet))]
async fn send_to_aprs_is(config: &AprsConfig, packet: &str) -> StorageResult<()> {
    let server = config.server.clone().unwrap_or_else(|| DEFAULT_APRS_IS_SERVER.to_string());
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(server.as_str()))
        .await
        .map_err(|_| StorageError::Protocol(format!("connecting to {server} timed out")))??;

    let banner = read_line(&mut stream).await?;
    if !banner.starts_with('#') {
        return Err(StorageError::Protocol(format!("unexpected APRS-IS banner: {banner:?}")));
    }

    let login = format!(
        "user {} pass {} vers remoteweather-{}\r\n",
        config.callsign,
        config.passcode,
        env!("CARGO_PKG_VERSION")
    );
    stream.write_all(login.as_bytes()).await?;

    let reply = read_line(&mut stream).await?;
    if !reply.starts_with('#') || !reply.contains("verified") {
        return Err(StorageError::Protocol(format!("APRS-IS login rejected: {reply:?}")));
    }

    let line = format!("{}>APRS,TCPIP*:{}\r\n", config.callsign, packet);
    stream.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn read_line(stream: &mut TcpStream) -> StorageResult<String> {
    let mut buf = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&buf).trim_end_matches('\r').to_string())
}

struct LatestReading {
    reading: Mutex<Option<Reading>>,
}

/// Beacon engine: a bus sink that remembers only the most recent reading
/// and transmits it on a fixed cadence, independent of how often readings
/// actually arrive.
#[derive(Clone)]
pub struct AprsEngine {
    config: Arc<AprsConfig>,
    latest: Arc<LatestReading>,
}

impl AprsEngine {
    pub fn new(config: AprsConfig) -> Self {
        Self {
            config: Arc::new(config),
            latest: Arc::new(LatestReading { reading: Mutex::new(None) }),
        }
    }

    /// Consumes the bus, updating the held reading; fires an immediate
    /// beacon for the very first reading received, then leaves further
    /// cadence entirely to [`AprsEngine::run_ticker`].
    pub async fn run(self, mut rx: mpsc::Receiver<Reading>, cancel: CancellationToken) {
        let mut beaconed_once = false;
        loop {
            let reading = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                reading = rx.recv() => reading,
            };
            let Some(reading) = reading else { return };

            *self.latest.reading.lock().await = Some(reading.clone());
            if !beaconed_once {
                beaconed_once = true;
                self.beacon_once(&reading).await;
            }
        }
    }

    /// Runs the 5-minute beacon cadence. Separate task from [`Self::run`]
    /// so the ticker's period is driven by wall-clock time, not by
    /// reading arrival.
    pub async fn run_ticker(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(BEACON_INTERVAL);
        interval.tick().await; // first tick fires immediately; consume it
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }
            let reading = self.latest.reading.lock().await.clone();
            if let Some(reading) = reading {
                self.beacon_once(&reading).await;
            }
        }
    }

    async fn beacon_once(&self, reading: &Reading) {
        let packet = format_weather_packet(&self.config, reading, Utc::now());
        if let Err(err) = send_to_aprs_is(&self.config, &packet).await {
            tracing::warn!(error = %err, "APRS-IS beacon failed, will retry next cycle");
        } else {
            tracing::debug!(station = %reading.station_name, "APRS-IS beacon sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rw_config::LatLon;

    fn sample_config() -> AprsConfig {
        AprsConfig {
            callsign: "N0CALL-13".to_string(),
            passcode: "12345".to_string(),
            is_server: false,
            location: LatLon { lat: 40.0, lon: -105.25 },
            server: None,
        }
    }

    #[test]
    fn latitude_formats_with_hemisphere() {
        assert_eq!(format_latitude(40.5), "4030.00N");
        assert_eq!(format_latitude(-5.25), "0515.00S");
    }

    #[test]
    fn longitude_formats_with_three_digit_degrees() {
        assert_eq!(format_longitude(-105.25), "10515.00W");
        assert_eq!(format_longitude(7.5), "00730.00E");
    }

    #[test]
    fn packet_uses_no_timestamp_prefix_and_uppercase_rain_marker() {
        let config = sample_config();
        let reading = Reading::empty(Utc::now(), "s1", rw_core::StationKind::Davis);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let packet = format_weather_packet(&config, &reading, now);
        assert!(packet.starts_with('!'), "packet: {packet}");
        assert!(packet.contains('P'), "packet: {packet}");
        assert!(!packet.contains('p'), "packet: {packet}");
    }

    #[test]
    fn humidity_of_100_encodes_as_00() {
        let config = sample_config();
        let mut reading = Reading::empty(Utc::now(), "s1", rw_core::StationKind::Davis);
        reading.humidity_out = Some(100.0);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let packet = format_weather_packet(&config, &reading, now);
        assert!(packet.contains("h00b"), "packet: {packet}");
    }

    #[test]
    fn missing_gust_falls_back_to_double_wind_speed() {
        let config = sample_config();
        let mut reading = Reading::empty(Utc::now(), "s1", rw_core::StationKind::Davis);
        reading.wind_speed = Some(10.0);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let packet = format_weather_packet(&config, &reading, now);
        assert!(packet.contains("010g020"), "packet: {packet}");
    }

    #[test]
    fn negative_temperature_uses_sign_prefix() {
        let config = sample_config();
        let mut reading = Reading::empty(Utc::now(), "s1", rw_core::StationKind::Davis);
        reading.temp_out = Some(-5.0);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let packet = format_weather_packet(&config, &reading, now);
        assert!(packet.contains("t-05"), "packet: {packet}");
    }

    #[tokio::test]
    async fn beacon_fires_immediately_on_first_reading_and_not_again_on_run() {
        // Point at a local port nothing is listening on so the connect
        // attempt fails fast with ECONNREFUSED instead of depending on
        // internet access from the test environment.
        let mut config = sample_config();
        config.server = Some("127.0.0.1:1".to_string());
        let engine = AprsEngine::new(config);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let reading = Reading::empty(Utc::now(), "s1", rw_core::StationKind::Davis);
        tx.send(reading).await.unwrap();
        drop(tx);

        // `run` attempts one beacon for the first reading, it fails, and
        // the loop then exits cleanly once the channel closes.
        engine.run(rx, cancel).await;
    }
}
