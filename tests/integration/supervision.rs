//! Process supervision: hang sentinel, suspend timeouts, daemon relaunch.

use crate::helpers::{drain_events, fast_config, light_apps, scripted_runtime, settle};
use std::sync::Arc;
use std::time::Duration;
use yoda_vui::scheduler::ExitReason;
use yoda_vui::test_utils::{ScriptedLauncher, WorkerScript};
use yoda_vui::{
    AppError, AppManifest, AppStatus, AppType, LauncherRegistry, LifetimeError, ManifestRegistry,
    Runtime, RuntimeEvent, StackSlot,
};

fn statuses_of(events: &[RuntimeEvent], app_id: &str) -> Vec<AppStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::AppStatus { app_id: id, status } if id == app_id => Some(*status),
            _ => None,
        })
        .collect()
}

fn exits_of(events: &[RuntimeEvent], app_id: &str) -> Vec<ExitReason> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::AppExited { app_id: id, reason } if id == app_id => Some(*reason),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn app_that_never_becomes_ready_is_terminated() {
    let launcher = ScriptedLauncher::new().script("stuck", WorkerScript::NeverReady);
    let rt = scripted_runtime(light_apps(&["stuck"]), launcher);
    rt.start().await;
    let mut events = rt.subscribe();

    let err = rt
        .lifetime()
        .activate_app_by_id("stuck", StackSlot::Cut, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifetimeError::Scheduler(AppError::Hung { .. })));
    assert_eq!(rt.scheduler().status("stuck"), Some(AppStatus::Exited));
    assert_eq!(rt.lifetime().current_app_id(), None);

    settle().await;
    let events = drain_events(&mut events);
    assert_eq!(exits_of(&events, "stuck"), vec![ExitReason::Hung]);
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unresponsive_app_is_killed_when_probed() {
    let mut config = fast_config();
    config.scheduler.probe_liveness = true;
    let launcher = ScriptedLauncher::new().script("silent", WorkerScript::Silent);
    let rt = Runtime::new(
        config,
        Arc::new(ManifestRegistry::from_manifests(light_apps(&["silent", "chatty"]))),
        LauncherRegistry::new().with(AppType::Light, launcher),
    );
    rt.start().await;
    let mut events = rt.subscribe();

    rt.scheduler().create_app("silent", None).await.unwrap();
    rt.scheduler().create_app("chatty", None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(rt.scheduler().status("silent"), Some(AppStatus::Exited));
    assert!(rt.scheduler().is_running("chatty"));
    let events = drain_events(&mut events);
    assert_eq!(exits_of(&events, "silent"), vec![ExitReason::Hung]);
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn suspend_timeout_then_force() {
    let launcher = ScriptedLauncher::new().script("stubborn", WorkerScript::IgnoreExit);
    let rt = scripted_runtime(light_apps(&["stubborn"]), launcher);
    rt.scheduler().create_app("stubborn", None).await.unwrap();

    let err = rt.scheduler().suspend_app("stubborn", false).await.unwrap_err();
    assert_eq!(
        err,
        AppError::SuspendTimeout {
            app_id: "stubborn".to_owned(),
            timeout_ms: 500
        }
    );
    assert_eq!(rt.scheduler().status("stubborn"), Some(AppStatus::Error));

    rt.scheduler().suspend_app("stubborn", true).await.unwrap();
    assert_eq!(rt.scheduler().status("stubborn"), Some(AppStatus::Exited));
}

#[tokio::test(start_paused = true)]
async fn daemon_comes_back_after_suspend() {
    let launcher = ScriptedLauncher::new();
    let rt = scripted_runtime(
        vec![AppManifest::light("sys").with_daemon(true)],
        launcher.clone(),
    );
    assert!(rt.start().await.is_empty());
    assert!(rt.scheduler().is_running("sys"));
    settle().await;
    let mut events = rt.subscribe();

    rt.scheduler().suspend_app("sys", false).await.unwrap();
    assert_eq!(rt.scheduler().status("sys"), Some(AppStatus::Exited));

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(rt.scheduler().is_running("sys"));
    assert_eq!(launcher.launch_count("sys"), 2);
    let events = drain_events(&mut events);
    assert_eq!(
        statuses_of(&events, "sys"),
        vec![
            AppStatus::Suspending,
            AppStatus::Exited,
            AppStatus::Creating,
            AppStatus::Running
        ]
    );
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn crashed_daemon_is_relaunched() {
    let launcher = ScriptedLauncher::new().script("sys", WorkerScript::CrashAfter(50));
    let rt = scripted_runtime(
        vec![AppManifest::light("sys").with_daemon(true)],
        launcher.clone(),
    );
    rt.start().await;
    let mut events = rt.subscribe();
    launcher.set_script("sys", WorkerScript::Cooperative);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(rt.scheduler().is_running("sys"));
    assert_eq!(launcher.launch_count("sys"), 2);
    let events = drain_events(&mut events);
    assert_eq!(exits_of(&events, "sys"), vec![ExitReason::Crashed]);
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cleared_daemon_flag_stays_down() {
    let launcher = ScriptedLauncher::new();
    let rt = scripted_runtime(
        vec![AppManifest::light("sys").with_daemon(true)],
        launcher.clone(),
    );
    rt.start().await;

    assert!(rt.scheduler().set_daemon("sys", false));
    rt.scheduler().suspend_app("sys", false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(rt.scheduler().status("sys"), Some(AppStatus::Exited));
    assert_eq!(launcher.launch_count("sys"), 1);
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_stats_pick_suspend_candidates() {
    let rt = scripted_runtime(light_apps(&["old", "new"]), ScriptedLauncher::new());
    rt.scheduler().create_app("old", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    rt.scheduler().create_app("new", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stat = rt.scheduler().get_app_stat("old").unwrap();
    assert_eq!(stat.status, AppStatus::Running);
    assert!(stat.idle >= Duration::from_millis(400));
    assert_eq!(
        rt.scheduler().suspend_candidates(),
        vec!["old".to_owned(), "new".to_owned()]
    );

    rt.scheduler().refresh_anr("old");
    assert_eq!(
        rt.scheduler().suspend_candidates(),
        vec!["new".to_owned(), "old".to_owned()]
    );
}
