use crate::metrics::ApiMetrics;
use rw_config::{DeviceConfig, WeatherSiteConfig};
use rw_storage::TimescaleEngine;
use std::sync::Arc;

pub struct AppState {
    pub storage: Arc<TimescaleEngine>,
    pub devices: Vec<DeviceConfig>,
    pub weather_site: WeatherSiteConfig,
    pub metrics: ApiMetrics,
}

impl AppState {
    pub fn base_snow_distance(&self, device_name: &str) -> Option<f64> {
        self.devices.iter().find(|d| d.name == device_name)?.base_snow_distance
    }
}
