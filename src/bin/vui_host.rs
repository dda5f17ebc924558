//! Headless runtime host speaking newline-delimited JSON on stdin/stdout.
//!
//! Reads `InboundEvent` messages from stdin and writes `RuntimeEvent`
//! messages to stdout. Installed apps are discovered from the configured app
//! directories; `process` apps are launched as child processes.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use std::sync::Arc;
use yoda_vui::host::run_stdio_bridge;
use yoda_vui::scheduler::ProcessLauncher;
use yoda_vui::{AppType, LauncherRegistry, ManifestRegistry, Runtime, RuntimeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = RuntimeConfig::default_config_path();
    let config = if config_path.is_file() {
        RuntimeConfig::from_file(&config_path)?
    } else {
        tracing::info!(path = %config_path.display(), "no config file, using defaults");
        RuntimeConfig::default()
    };

    let registry = ManifestRegistry::scan(&config.apps.scan_dirs());
    let launchers = LauncherRegistry::new().with(AppType::Process, ProcessLauncher::new());
    let runtime = Arc::new(Runtime::new(config, Arc::new(registry), launchers));

    tracing::info!("vui-host starting");
    let failed = runtime.start().await;
    if !failed.is_empty() {
        tracing::warn!(apps = ?failed, "daemons failed to start");
    }

    let bridge = run_stdio_bridge(Arc::clone(&runtime)).await;
    runtime.shutdown().await;

    bridge.map_err(|e| {
        tracing::error!(error = %e, "vui-host exited with error");
        anyhow::anyhow!("vui-host failed: {e}")
    })?;

    tracing::info!("vui-host shut down cleanly");
    Ok(())
}
