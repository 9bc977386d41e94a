//! The read API: a small axum service exposing the latest reading,
//! historical spans, snow depth, and cached forecasts, plus the embedded
//! weather-site pages.
//!
//! Router assembly follows `weewx-cli::build_app`'s shape (a `Router`
//! built once around a shared `Arc<AppState>`); TLS binding follows
//! `axum-server`'s rustls integration, the only TLS-for-axum precedent in
//! the corpus, mirrored from the gRPC engine's cert/key-path convention.

mod assets;
mod error;
mod metrics;
mod routes;
mod state;
mod templates;

pub use error::ApiError;
pub use metrics::ApiMetrics;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rw_config::RestControllerConfig;
use rw_storage::StorageError;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(metrics_endpoint))
        .route("/latest", get(routes::latest))
        .route("/span/:duration", get(routes::span))
        .route("/snow", get(routes::snow))
        .route("/forecast/:span_hours", get(routes::forecast))
        .route("/", get(index_page))
        .route("/dashboard", get(dashboard_page))
        .route("/static/*path", get(assets::serve_static))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), count_request))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Records one request against `remoteweather_http_requests_total`, labeled
/// by the route's path pattern (not the raw URI, which would blow up
/// cardinality with one label per station/duration/location) so every
/// other route's counter still benefits from the same middleware.
async fn count_request(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().to_string();
    let response = next.run(req).await;
    state.metrics.record_request(&path, &method, response.status().as_u16());
    response
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (content_type, body) = state.metrics.encode();
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn index_page(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> Html<String> {
    Html(templates::render_index(&state))
}

async fn dashboard_page(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Html<String> {
    Html(templates::render_dashboard(&state))
}

/// Binds and serves the read API, applying TLS when both a cert and key
/// path are configured. Runs until `cancel` fires.
pub async fn serve(
    config: &RestControllerConfig,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<(), StorageError> {
    let addr: SocketAddr = format!("{}:{}", config.listen, config.port)
        .parse()
        .map_err(|e| StorageError::Config(format!("invalid rest listen address: {e}")))?;
    let app = build_app(state);

    tracing::info!(%addr, tls = config.tls.is_some(), "read API listening");

    match &config.tls {
        Some(tls) => {
            let rustls_config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .await
                    .map_err(|e| StorageError::Config(format!("invalid TLS cert/key: {e}")))?;
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                shutdown_handle.graceful_shutdown(None);
            });
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .map_err(|e| StorageError::Io(e))?;
        }
        None => {
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                shutdown_handle.graceful_shutdown(None);
            });
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .map_err(|e| StorageError::Io(e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rw_config::WeatherSiteConfig;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            storage: rw_storage::TimescaleEngine::lazy_for_tests(),
            devices: Vec::new(),
            weather_site: WeatherSiteConfig {
                title: "Test Site".to_string(),
                pull_from_device: "vantage-1".to_string(),
                snow_enabled: Some(false),
                snow_device: None,
            },
            metrics: ApiMetrics::new(),
        })
    }

    #[tokio::test]
    async fn healthz_returns_200() {
        let app = build_app(test_state());
        let res = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn index_page_embeds_configured_title() {
        let app = build_app(test_state());
        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Test Site"));
    }

    #[tokio::test]
    async fn metrics_endpoint_reports_requests_made_through_the_router() {
        let app = build_app(test_state());
        let _ = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let res = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("remoteweather_http_requests_total"));
        assert!(text.contains("/healthz"));
    }

    #[tokio::test]
    async fn static_css_is_served() {
        let app = build_app(test_state());
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/static/style.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
