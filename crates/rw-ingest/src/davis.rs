//! Davis Vantage Pro2/Vue LOOP packet adapter.
//!
//! Talks to the console over a serial line or a TCP-bridged serial port
//! (WeatherLinkIP and similar), issuing the classic wake handshake
//! followed by `LOOP n` batches of fixed-size, CRC-checked frames.

use crate::backoff::Backoff;
use crate::common::StationAdapter;
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use chrono::Utc;
use rw_bus::BusProducer;
use rw_config::{DeviceConfig, Transport as TransportConfig};
use rw_core::{meteorology, Reading, StationKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

/// Whole-frame size: 97-byte body (which itself ends with a 2-byte EOF
/// sentinel) plus a 2-byte big-endian CRC-16/CCITT trailer.
const FRAME_LEN: usize = 99;
const BODY_LEN: usize = 97;
const EOF_SENTINEL: [u8; 2] = [0x0A, 0x0D];

/// How many LOOP frames to request per batch.
const LOOP_BATCH_SIZE: u32 = 20;
/// Per-frame retry budget before the batch is abandoned and the adapter
/// reconnects.
const MAX_FRAME_RETRIES: u32 = 3;

const U8_ABSENT: u8 = 0xFF;
const I16_ABSENT: i16 = 0x7FFF;
const U16_ABSENT: u16 = 0x7FFF;

/// CRC-16/CCITT (poly 0x1021, init 0x0000, MSB-first, no reflection, no
/// final XOR). A frame is valid iff the CRC computed over the whole
/// `FRAME_LEN` bytes (body plus the trailing big-endian CRC) is zero.
fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn frame_crc_is_valid(frame: &[u8]) -> bool {
    frame.len() == FRAME_LEN && crc16_ccitt(frame) == 0
}

/// Stamps a valid big-endian CRC trailer onto a `BODY_LEN`-byte body,
/// producing a full `FRAME_LEN`-byte frame. Used by tests to construct
/// fixtures and is the mirror of what a real console does in hardware.
fn encode_frame(body: [u8; BODY_LEN]) -> [u8; FRAME_LEN] {
    let mut partial = [0u8; FRAME_LEN];
    partial[..BODY_LEN].copy_from_slice(&body);
    // Two zero bytes stand in for the not-yet-known CRC while we compute it.
    let crc = crc16_ccitt(&partial[..BODY_LEN + 2]);
    partial[BODY_LEN] = (crc >> 8) as u8;
    partial[BODY_LEN + 1] = (crc & 0xFF) as u8;
    partial
}

fn u16_le(frame: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

fn i16_le(frame: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([frame[offset], frame[offset + 1]])
}

fn opt_u8(raw: u8, scale: f64) -> Option<f64> {
    (raw != U8_ABSENT).then(|| raw as f64 * scale)
}

fn opt_i8_with_bias(raw: u8, bias: f64) -> Option<f64> {
    (raw != U8_ABSENT).then(|| raw as i8 as f64 - bias)
}

fn opt_i16(raw: i16, scale: f64) -> Option<f64> {
    (raw != I16_ABSENT).then(|| raw as f64 * scale)
}

fn opt_u16(raw: u16, scale: f64) -> Option<f64> {
    (raw != U16_ABSENT).then(|| raw as f64 * scale)
}

/// Barometer uses a dedicated absent sentinel: a raw reading of zero,
/// not the general 16-bit `0x7FFF` convention.
fn opt_barometer(raw: u16, scale: f64) -> Option<f64> {
    (raw != 0).then(|| raw as f64 * scale)
}

/// Derives the incremental rain for this frame from the change in the
/// console's running day-total counter. `previous_rain_day` is the
/// `rain_day` value decoded from the prior frame in this session; absent
/// on the first frame of a session, so no incremental value can be
/// derived yet. A day total lower than the previous frame's means the
/// console's counter reset at local midnight, so the new total itself is
/// the incremental amount rather than a negative delta.
fn derive_rain_incremental(rain_day: Option<f64>, previous_rain_day: Option<f64>) -> Option<f64> {
    match (rain_day, previous_rain_day) {
        (Some(day), Some(prev)) if day >= prev => Some(day - prev),
        (Some(day), Some(_)) => Some(day),
        _ => None,
    }
}

/// Decode a validated `FRAME_LEN`-byte frame into a `Reading`. Callers
/// must have already checked [`frame_crc_is_valid`] and the EOF sentinel.
/// `previous_rain_day` carries the prior frame's `rain_day` reading so
/// `rain_incremental` can be derived from its delta.
fn decode_frame(
    frame: &[u8],
    station_name: &str,
    wind_direction_correction: f64,
    previous_rain_day: Option<f64>,
) -> Reading {
    let mut r = Reading::empty(Utc::now(), station_name, StationKind::Davis);

    // Flavor A frames carry the literal 'P' of "LOOP" at byte 3; Flavor B
    // frames use that byte for a signed 3-hour barometer trend instead.
    if frame[3] != b'P' {
        r.barometer_trend = Some(frame[3] as i8 as f64);
    }

    r.barometer = opt_barometer(u16_le(frame, 4), 1.0 / 1000.0);
    r.temp_in = opt_i16(i16_le(frame, 6), 0.1);
    r.humidity_in = opt_u8(frame[8], 1.0);
    r.temp_out = opt_i16(i16_le(frame, 9), 0.1);
    r.wind_speed = opt_u8(frame[11], 1.0);
    r.wind_speed_10min_avg = opt_u8(frame[12], 1.0);
    r.wind_dir = opt_u16(u16_le(frame, 13), 1.0).map(|d| (d + wind_direction_correction).rem_euclid(360.0));
    r.humidity_out = opt_u8(frame[15], 1.0);
    r.rain_rate = opt_u16(u16_le(frame, 16), 0.01);
    r.solar_watts = opt_u16(u16_le(frame, 18), 1.0);
    r.uv_index = opt_u16(u16_le(frame, 20), 0.1);
    r.rain_day = opt_u16(u16_le(frame, 22), 0.01);
    r.rain_incremental = derive_rain_incremental(r.rain_day, previous_rain_day);
    r.rain_month = opt_u16(u16_le(frame, 24), 0.01);
    r.rain_year = opt_u16(u16_le(frame, 26), 0.01);
    r.rain_storm = opt_u16(u16_le(frame, 28), 0.01);
    r.battery_voltage_console = opt_u8(frame[30], 0.1);
    r.battery_voltage_transmitter = opt_u8(frame[31], 0.1);
    r.soil_temp_1 = opt_i8_with_bias(frame[32], 90.0);
    r.soil_temp_2 = opt_i8_with_bias(frame[33], 90.0);
    r.soil_temp_3 = opt_i8_with_bias(frame[34], 90.0);
    r.soil_temp_4 = opt_i8_with_bias(frame[35], 90.0);
    r.soil_moisture_1 = opt_u8(frame[36], 1.0);
    r.soil_moisture_2 = opt_u8(frame[37], 1.0);
    r.soil_moisture_3 = opt_u8(frame[38], 1.0);
    r.soil_moisture_4 = opt_u8(frame[39], 1.0);
    r.leaf_temp_1 = opt_i8_with_bias(frame[40], 90.0);
    r.leaf_temp_2 = opt_i8_with_bias(frame[41], 90.0);
    r.leaf_wetness_1 = opt_u8(frame[42], 1.0);
    r.leaf_wetness_2 = opt_u8(frame[43], 1.0);
    r.wind_gust = opt_u8(frame[44], 1.0);
    r.radiation = opt_u16(u16_le(frame, 45), 1.0);

    if let (Some(temp), Some(wind)) = (r.temp_out, r.wind_speed) {
        r.wind_chill = meteorology::wind_chill(temp, wind);
    }
    if let (Some(temp), Some(humidity)) = (r.temp_out, r.humidity_out) {
        r.heat_index = Some(meteorology::heat_index(temp, humidity));
    }

    r
}

trait DavisTransport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DavisTransport for T {}

async fn open_transport(transport: &TransportConfig) -> IngestResult<Box<dyn DavisTransport>> {
    match transport {
        TransportConfig::Serial { path, baud } => {
            let port = tokio_serial::new(path.clone(), *baud)
                .open_native_async()
                .map_err(|e| IngestError::Protocol(format!("opening serial port {path}: {e}")))?;
            Ok(Box::new(port))
        }
        TransportConfig::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            Ok(Box::new(stream))
        }
    }
}

/// Wakes a sleeping console: send `\n`, expect `\n\r` back within the
/// read timeout, retrying until it answers or the adapter is cancelled.
async fn wake_console(
    transport: &mut (dyn DavisTransport),
    cancel: &CancellationToken,
) -> IngestResult<()> {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(IngestError::Protocol("cancelled during wake handshake".into()));
        }
        transport.write_all(b"\n").await?;

        let mut buf = [0u8; 2];
        let read = tokio::time::timeout(std::time::Duration::from_millis(500), transport.read_exact(&mut buf)).await;
        if matches!(read, Ok(Ok(_)) if buf == EOF_SENTINEL) {
            return Ok(());
        }

        attempt += 1;
        if attempt > 10 {
            return Err(IngestError::Protocol("console did not wake after 10 attempts".into()));
        }
    }
}

pub struct DavisAdapter {
    device: DeviceConfig,
    /// The previous frame's `rain_day` total, used to derive
    /// `rain_incremental`. Reset at the start of each `run_once` session
    /// since a freshly (re)connected console carries no known prior state.
    last_rain_day: Option<f64>,
}

impl DavisAdapter {
    pub fn new(device: DeviceConfig) -> Self {
        Self { device, last_rain_day: None }
    }
}

#[async_trait]
impl StationAdapter for DavisAdapter {
    fn device_name(&self) -> &str {
        &self.device.name
    }

    async fn run_once(&mut self, bus: &BusProducer, cancel: &CancellationToken) -> IngestResult<()> {
        let mut transport = open_transport(&self.device.transport).await?;
        wake_console(transport.as_mut(), cancel).await?;
        self.last_rain_day = None;

        let correction = self.device.wind_direction_correction.unwrap_or(0.0);

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            transport
                .write_all(format!("LOOP {LOOP_BATCH_SIZE}\n").as_bytes())
                .await?;
            let mut ack = [0u8; 1];
            transport.read_exact(&mut ack).await?;
            if ack[0] != 0x06 {
                return Err(IngestError::Protocol(format!("console rejected LOOP request: {ack:?}")));
            }

            for _ in 0..LOOP_BATCH_SIZE {
                if cancel.is_cancelled() {
                    return Ok(());
                }

                let reading = self.read_one_frame(transport.as_mut(), correction).await?;
                if let Some(reading) = reading {
                    if reading.rain_day.is_some() {
                        self.last_rain_day = reading.rain_day;
                    }
                    if rw_bus::publish(bus, reading).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl DavisAdapter {
    /// Reads one LOOP frame, retrying on CRC/EOF failure up to
    /// `MAX_FRAME_RETRIES` times before surfacing a protocol error that
    /// forces the adapter to reconnect. A dropped frame produces `None`,
    /// never an emitted `Reading`.
    async fn read_one_frame(
        &self,
        transport: &mut (dyn DavisTransport),
        correction: f64,
    ) -> IngestResult<Option<Reading>> {
        for attempt in 1..=MAX_FRAME_RETRIES {
            let mut frame = [0u8; FRAME_LEN];
            transport.read_exact(&mut frame).await?;

            let eof_ok = frame[BODY_LEN - 2..BODY_LEN] == EOF_SENTINEL;
            if eof_ok && frame_crc_is_valid(&frame) {
                return Ok(Some(decode_frame(
                    &frame,
                    &self.device.name,
                    correction,
                    self.last_rain_day,
                )));
            }

            tracing::warn!(
                device = %self.device.name,
                attempt,
                "dropped malformed LOOP frame (crc or eof sentinel mismatch)"
            );
        }
        Ok(None)
    }
}

/// Builds the default backoff for Davis reconnects.
pub fn default_backoff() -> Backoff {
    Backoff::network()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> [u8; BODY_LEN] {
        let mut body = [0u8; BODY_LEN];
        body[0..3].copy_from_slice(b"LOO");
        body[3] = b'P';
        // barometer 30000 (raw) -> 30.000 inHg (little-endian at offset 4-5)
        body[4] = 0x30;
        body[5] = 0x75;
        // outside temp 0x02CB = 715 -> 71.5F (little-endian at offset 9-10)
        body[9] = 0xCB;
        body[10] = 0x02;
        body[11] = 5; // wind speed 5 mph
        body[15] = 0xFF; // humidity out absent
        body[BODY_LEN - 2] = EOF_SENTINEL[0];
        body[BODY_LEN - 1] = EOF_SENTINEL[1];
        body
    }

    #[test]
    fn crc_of_encoded_frame_is_zero() {
        let frame = encode_frame(sample_body());
        assert_eq!(crc16_ccitt(&frame), 0);
        assert!(frame_crc_is_valid(&frame));
    }

    #[test]
    fn decodes_outside_temperature_from_a_valid_loop_frame() {
        let frame = encode_frame(sample_body());
        let reading = decode_frame(&frame, "vantage-1", 0.0, None);
        assert_eq!(reading.temp_out, Some(71.5));
        assert_eq!(reading.wind_speed, Some(5.0));
        assert_eq!(reading.humidity_out, None);
        assert_eq!(reading.barometer, Some(30.0));
    }

    #[test]
    fn corrupted_frame_fails_crc_check() {
        let mut frame = encode_frame(sample_body());
        frame[9] ^= 0xFF; // flip a body byte after the CRC was computed
        assert!(!frame_crc_is_valid(&frame));
    }

    #[test]
    fn wind_direction_correction_wraps_around_360() {
        let mut body = sample_body();
        body[13] = 350;
        body[14] = 0;
        let frame = encode_frame(body);
        let reading = decode_frame(&frame, "vantage-1", 20.0, None);
        assert_eq!(reading.wind_dir, Some(10.0));
    }

    #[test]
    fn absent_sentinel_round_trips_as_none() {
        let mut body = sample_body();
        body[4] = 0x00;
        body[5] = 0x00; // barometer absent: raw zero, not the general 0x7FFF convention
        let frame = encode_frame(body);
        let reading = decode_frame(&frame, "vantage-1", 0.0, None);
        assert_eq!(reading.barometer, None);
    }

    #[test]
    fn flavor_a_frame_has_no_barometer_trend() {
        let frame = encode_frame(sample_body());
        let reading = decode_frame(&frame, "vantage-1", 0.0, None);
        assert_eq!(reading.barometer_trend, None);
    }

    #[test]
    fn flavor_b_frame_decodes_signed_barometer_trend() {
        let mut body = sample_body();
        body[3] = (-20i8) as u8; // falling slowly
        let frame = encode_frame(body);
        let reading = decode_frame(&frame, "vantage-1", 0.0, None);
        assert_eq!(reading.barometer_trend, Some(-20.0));
    }

    #[test]
    fn rain_incremental_is_none_without_a_previous_rain_day() {
        let mut body = sample_body();
        body[22] = 50; // rain_day raw 50 -> 0.50 in
        body[23] = 0;
        let frame = encode_frame(body);
        let reading = decode_frame(&frame, "vantage-1", 0.0, None);
        assert_eq!(reading.rain_incremental, None);
    }

    #[test]
    fn rain_incremental_is_the_delta_from_the_previous_frame() {
        let mut body = sample_body();
        body[22] = 100; // rain_day raw 100 -> 1.00 in
        body[23] = 0;
        let frame = encode_frame(body);
        let reading = decode_frame(&frame, "vantage-1", 0.0, Some(0.50));
        assert_eq!(reading.rain_incremental, Some(0.5));
    }

    #[test]
    fn rain_incremental_uses_the_new_total_after_a_midnight_rollover() {
        let mut body = sample_body();
        body[22] = 25; // rain_day raw 25 -> 0.25 in, lower than the previous frame
        body[23] = 0;
        let frame = encode_frame(body);
        let reading = decode_frame(&frame, "vantage-1", 0.0, Some(1.20));
        assert_eq!(reading.rain_incremental, Some(0.25));
    }
}
