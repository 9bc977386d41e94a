//! Prometheus exposition, following `weewx-cli::lib`'s `/metrics` handler
//! shape (a `Registry` gathered through `TextEncoder` on every scrape) but
//! built directly on the `prometheus` crate's own counter/gauge types
//! rather than through an OpenTelemetry meter.

use axum::http::HeaderValue;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct ApiMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    ready: IntGauge,
}

impl ApiMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("remoteweather_http_requests_total", "Total HTTP requests served by the read API"),
            &["path", "method", "status"],
        )
        .expect("static metric descriptor is valid");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("requests_total registered exactly once");

        let ready = IntGauge::new("remoteweather_ready", "1 when the last readiness check succeeded, 0 otherwise")
            .expect("static metric descriptor is valid");
        registry.register(Box::new(ready.clone())).expect("ready registered exactly once");

        Self { registry, requests_total, ready }
    }

    pub fn record_request(&self, path: &str, method: &str, status: u16) {
        self.requests_total.with_label_values(&[path, method, &status.to_string()]).inc();
    }

    pub fn set_ready(&self, is_ready: bool) {
        self.ready.set(if is_ready { 1 } else { 0 });
    }

    pub fn encode(&self) -> (HeaderValue, String) {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        if let Err(err) = encoder.encode(&metric_families, &mut buf) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        let body = String::from_utf8(buf).unwrap_or_default();
        let content_type = HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8");
        (content_type, body)
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_requests_surface_in_the_encoded_output() {
        let metrics = ApiMetrics::new();
        metrics.record_request("/healthz", "GET", 200);
        let (_, body) = metrics.encode();
        assert!(body.contains("remoteweather_http_requests_total"));
    }

    #[test]
    fn readiness_gauge_reflects_the_last_check() {
        let metrics = ApiMetrics::new();
        metrics.set_ready(true);
        let (_, body) = metrics.encode();
        assert!(body.contains("remoteweather_ready 1"));
        metrics.set_ready(false);
        let (_, body) = metrics.encode();
        assert!(body.contains("remoteweather_ready 0"));
    }
}
