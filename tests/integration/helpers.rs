//! Shared helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use yoda_vui::config::SchedulerConfig;
use yoda_vui::test_utils::ScriptedLauncher;
use yoda_vui::{
    AppManifest, AppNotice, AppType, LauncherRegistry, ManifestRegistry, Runtime, RuntimeConfig,
    RuntimeEvent,
};

/// Millisecond-scale supervision settings for paused-clock tests.
pub(crate) fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        scheduler: SchedulerConfig {
            anr_timeout_ms: 1_000,
            anr_check_interval_ms: 200,
            suspend_timeout_ms: 500,
            daemon_restart_delay_ms: 300,
            probe_liveness: false,
        },
        ..RuntimeConfig::default()
    }
}

/// Build a runtime over in-process scripted workers. Not started.
pub(crate) fn scripted_runtime(manifests: Vec<AppManifest>, launcher: ScriptedLauncher) -> Runtime {
    Runtime::new(
        fast_config(),
        Arc::new(ManifestRegistry::from_manifests(manifests)),
        LauncherRegistry::new().with(AppType::Light, launcher),
    )
}

/// Light manifests for the given ids.
pub(crate) fn light_apps(ids: &[&str]) -> Vec<AppManifest> {
    ids.iter().map(|id| AppManifest::light(*id)).collect()
}

/// Let spawned tasks run on the paused clock.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Drain all pending events from the broadcast receiver into a Vec.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<RuntimeEvent>) -> Vec<RuntimeEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

/// Notices addressed to `app_id`, in order.
pub(crate) fn notices_for(events: &[RuntimeEvent], app_id: &str) -> Vec<AppNotice> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::Notice {
                app_id: to, notice, ..
            } if to == app_id => Some(notice.clone()),
            _ => None,
        })
        .collect()
}

/// Payloads published on `channel`, in order.
pub(crate) fn broadcasts_on(events: &[RuntimeEvent], channel: &str) -> Vec<serde_json::Value> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::Broadcast {
                channel: on,
                payload,
            } if on == channel => Some(payload.clone()),
            _ => None,
        })
        .collect()
}
