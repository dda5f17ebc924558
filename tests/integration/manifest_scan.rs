//! Apps discovered from manifest directories and run as child processes.

use std::path::Path;
use std::sync::Arc;
use yoda_vui::scheduler::ProcessLauncher;
use yoda_vui::{
    AppLoader, AppStatus, AppType, InboundEvent, LauncherRegistry, ManifestRegistry, Runtime,
    RuntimeConfig, StackSlot,
};

const WORKER_SCRIPT: &str = r#"#!/bin/sh
echo '{"type":"ready"}'
while read -r line; do
  case "$line" in
    *'"type":"exit"'*) exit 0 ;;
    *'"type":"ping"'*) echo '{"type":"alive"}' ;;
  esac
done
"#;

fn install(root: &Path, dir: &str, manifest: &str, script: Option<&str>) {
    let home = root.join(dir);
    std::fs::create_dir_all(&home).expect("create app home");
    std::fs::write(home.join("manifest.toml"), manifest).expect("write manifest");
    if let Some(script) = script {
        std::fs::write(home.join("app.sh"), script).expect("write script");
    }
}

fn sample_apps(root: &Path) {
    install(
        root,
        "weather",
        "id = \"weather\"\nexec = \"/bin/sh\"\nargs = [\"app.sh\"]\nskill_ids = [\"forecast\"]\n",
        Some(WORKER_SCRIPT),
    );
    install(root, "timer", "id = \"timer\"\ntype = \"light\"\n", None);
    install(root, "broken", "id = \"broken\"\n", None);
    std::fs::create_dir_all(root.join("not-an-app")).expect("create stray dir");
}

#[test]
fn scan_keeps_valid_manifests() {
    let root = tempfile::tempdir().unwrap();
    sample_apps(root.path());

    let registry = ManifestRegistry::scan(&[root.path()]);
    let mut ids = registry.app_ids();
    ids.sort();
    assert_eq!(ids, vec!["timer".to_owned(), "weather".to_owned()]);
    assert_eq!(registry.app_id_for_skill("forecast").as_deref(), Some("weather"));

    let weather = registry.manifest("weather").unwrap();
    assert_eq!(weather.app_type, AppType::Process);
    assert_eq!(weather.home, root.path().join("weather"));
}

#[cfg(unix)]
#[tokio::test]
async fn process_app_runs_and_suspends_gracefully() {
    let root = tempfile::tempdir().unwrap();
    sample_apps(root.path());

    let mut config = RuntimeConfig::default();
    config.apps.dirs = vec![root.path().to_path_buf()];
    config.scheduler.suspend_timeout_ms = 2_000;
    let registry = ManifestRegistry::scan(&config.apps.scan_dirs());
    let rt = Runtime::new(
        config,
        Arc::new(registry),
        LauncherRegistry::new().with(AppType::Process, ProcessLauncher::new()),
    );
    rt.start().await;

    rt.dispatch(InboundEvent::VoiceCommand {
        skill_id: "forecast".to_owned(),
        intent: None,
        form: StackSlot::Cut,
        payload: serde_json::json!({"city": "Hangzhou"}),
    })
    .await;
    assert_eq!(rt.lifetime().current_app_id().as_deref(), Some("weather"));
    let stat = rt.scheduler().get_app_stat("weather").unwrap();
    assert_eq!(stat.status, AppStatus::Running);
    assert!(stat.pid.is_some());

    rt.lifetime().destroy_app_by_id("weather", false).await.unwrap();
    assert_eq!(rt.scheduler().status("weather"), Some(AppStatus::Exited));
    assert_eq!(rt.lifetime().current_app_id(), None);
    rt.shutdown().await;
}

#[tokio::test]
async fn light_app_without_launcher_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    sample_apps(root.path());
    let rt = Runtime::new(
        RuntimeConfig::default(),
        Arc::new(ManifestRegistry::scan(&[root.path()])),
        LauncherRegistry::new().with(AppType::Process, ProcessLauncher::new()),
    );

    let err = rt.scheduler().create_app("timer", None).await.unwrap_err();
    assert!(matches!(err, yoda_vui::AppError::NoLauncher { .. }));
    assert_eq!(rt.scheduler().status("timer"), None);
}
