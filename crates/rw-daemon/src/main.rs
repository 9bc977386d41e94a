//! RemoteWeather daemon entry point: parses CLI flags (with environment
//! fallback), loads and validates configuration, then hands off to
//! `rw_supervisor::run` until a shutdown signal arrives.
//!
//! CLI surface follows the `-config`/`-config-backend`/`-debug` flags of
//! the original daemon this workspace replaces, expressed with `clap`'s
//! derive API (the other multi-binary workspace in this corpus,
//! `rusty-timer`, reaches for `clap` too, just via its builder API);
//! logging setup is `rw_obs::init`, matching `weex-daemon::main`'s
//! init-logging-first shape.

use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "remoteweatherd", version, about = "RemoteWeather ingest and distribution daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long = "config", env = "REMOTEWEATHER_CONFIG")]
    config: String,

    /// Configuration backend. Only "file" is implemented; present for
    /// forward compatibility with a future remote config store.
    #[arg(long = "config-backend", default_value = "file")]
    config_backend: String,

    /// Enable verbose logging.
    #[arg(long = "debug", env = "REMOTEWEATHER_DEBUG", default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rw_obs::init("remoteweather-daemon", cli.debug);

    if cli.config_backend != "file" {
        anyhow::bail!(
            "unsupported config backend {:?}; only \"file\" is implemented",
            cli.config_backend
        );
    }

    let config = rw_config::AppConfig::load_from_path(&cli.config)?;
    tracing::info!(
        devices = config.devices.len(),
        controllers = config.controllers.len(),
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let supervisor = tokio::spawn(async move { rw_supervisor::run(config, run_cancel).await });

    rw_supervisor::shutdown_signal().await;
    cancel.cancel();

    supervisor.await??;
    tracing::info!("remoteweather daemon stopped");
    Ok(())
}
