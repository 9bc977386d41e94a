//! Campbell Scientific datalogger adapter: newline-delimited JSON over a
//! serial line or TCP, one object per observation. Field names and types
//! match the logger's CRBasic output program: `batt_volt`, `airtemp_f`,
//! `rh`, `baro`, `baro_temp_f`, `solar_w`, `solar_j`, `rain_in`, `wind_s`,
//! `wind_d`. All fields are optional; the wire format carries no
//! timestamp, so each decoded record is stamped with receipt time.

use crate::backoff::Backoff;
use crate::common::StationAdapter;
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use chrono::Utc;
use rw_bus::BusProducer;
use rw_config::{DeviceConfig, Transport as TransportConfig};
use rw_core::{Reading, StationKind};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

trait CampbellTransport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> CampbellTransport for T {}

async fn open_transport(transport: &TransportConfig) -> IngestResult<Box<dyn CampbellTransport>> {
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

#[derive(Debug, Deserialize)]
struct CampbellPacket {
    #[serde(default)]
    batt_volt: Option<f32>,
    #[serde(default)]
    airtemp_f: Option<f32>,
    #[serde(default)]
    rh: Option<f32>,
    #[serde(default)]
    baro: Option<f32>,
    #[serde(default)]
    baro_temp_f: Option<f32>,
    #[serde(default)]
    solar_w: Option<f32>,
    #[serde(default)]
    solar_j: Option<f32>,
    #[serde(default)]
    rain_in: Option<f32>,
    #[serde(default)]
    wind_s: Option<f32>,
    #[serde(default)]
    wind_d: Option<u16>,
}

fn decode_line(line: &str, station_name: &str) -> IngestResult<Reading> {
    let packet: CampbellPacket = serde_json::from_str(line)
        .map_err(|e| IngestError::Protocol(format!("malformed campbell json line: {e}")))?;

    let mut r = Reading::empty(Utc::now(), station_name, StationKind::Campbell);
    r.battery_voltage_console = packet.batt_volt.map(f64::from);
    r.temp_out = packet.airtemp_f.map(f64::from);
    r.humidity_out = packet.rh.map(f64::from);
    r.barometer = packet.baro.map(f64::from);
    r.temp_in = packet.baro_temp_f.map(f64::from);
    r.solar_watts = packet.solar_w.map(f64::from);
    r.solar_joules = packet.solar_j.map(f64::from);
    r.rain_incremental = packet.rain_in.map(f64::from);
    r.wind_speed = packet.wind_s.map(f64::from);
    r.wind_dir = packet.wind_d.map(f64::from);
    Ok(r)
}

pub struct CampbellAdapter {
    device: DeviceConfig,
}

impl CampbellAdapter {
    pub fn new(device: DeviceConfig) -> Self {
        Self { device }
    }
}

#[async_trait]
impl StationAdapter for CampbellAdapter {
    fn device_name(&self) -> &str {
        &self.device.name
    }

    async fn run_once(&mut self, bus: &BusProducer, cancel: &CancellationToken) -> IngestResult<()> {
        let transport = open_transport(&self.device.transport).await?;
        let mut lines = BufReader::new(transport).lines();
        let mut seen_first_packet = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let line = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                return Ok(()); // connection closed cleanly
            };
            if line.trim().is_empty() {
                continue;
            }

            match decode_line(&line, &self.device.name) {
                Ok(reading) => {
                    if !seen_first_packet {
                        seen_first_packet = true;
                        tracing::info!(device = %self.device.name, "campbell logger is alive, first packet decoded");
                    }
                    if rw_bus::publish(bus, reading).await.is_err() {
                        return Ok(());
                    }
                }
                Err(err) => {
                    tracing::warn!(device = %self.device.name, error = %err, "dropped malformed campbell line");
                }
            }
        }
    }
}

pub fn default_backoff() -> Backoff {
    Backoff::network()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_well_formed_line() {
        let line = r#"{"airtemp_f":54.2,"rh":61.0,"wind_s":4.5,"wind_d":270}"#;
        let reading = decode_line(line, "campbell-1").unwrap();
        assert_eq!(reading.temp_out, Some(54.2));
        assert_eq!(reading.humidity_out, Some(61.0));
        assert_eq!(reading.wind_dir, Some(270.0));
        assert_eq!(reading.station_kind, StationKind::Campbell);
    }

    #[test]
    fn rejects_malformed_json() {
        let result = decode_line("not json", "campbell-1");
        assert!(result.is_err());
    }

    #[test]
    fn missing_optional_fields_decode_as_none() {
        let reading = decode_line("{}", "campbell-1").unwrap();
        assert_eq!(reading.temp_out, None);
        assert_eq!(reading.wind_speed, None);
    }
}
