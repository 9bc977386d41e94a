use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise tracing for the daemon. `RUST_LOG` takes precedence over
/// `debug` when set, respecting the environment first and falling back
/// to a sane default.
///
/// `debug` corresponds to the CLI `-debug` flag / `REMOTEWEATHER_DEBUG=true`.
pub fn init(service_name: &str, debug: bool) {
    let default_filter = if debug {
        "debug,remoteweather=trace"
    } else {
        "info,remoteweather=debug"
    };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(service = %service_name, %debug, "observability initialized");
}
