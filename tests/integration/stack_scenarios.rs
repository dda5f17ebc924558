//! Foreground stack behavior driven through the assembled runtime.

use crate::helpers::{drain_events, light_apps, notices_for, scripted_runtime};
use std::time::Duration;
use yoda_vui::lifetime::ContextOptions;
use yoda_vui::test_utils::{ScriptedLauncher, WorkerScript};
use yoda_vui::{AppNotice, AppStatus, LifecycleEvent, LifetimeError, StackSlot};

fn lifecycle(event: LifecycleEvent) -> AppNotice {
    AppNotice::lifecycle(event)
}

#[tokio::test(start_paused = true)]
async fn scene_activation_evicts_cut_app() {
    let rt = scripted_runtime(light_apps(&["0", "1"]), ScriptedLauncher::new());
    rt.start().await;
    let mut events = rt.subscribe();
    let lifetime = rt.lifetime();

    lifetime
        .activate_app_by_id("0", StackSlot::Cut, None)
        .await
        .unwrap();
    lifetime
        .activate_app_by_id("1", StackSlot::Scene, None)
        .await
        .unwrap();

    assert_eq!(lifetime.current_app_id().as_deref(), Some("1"));
    assert_eq!(lifetime.cut_app_id(), None);
    assert!(!lifetime.is_app_in_stack("0"));
    assert_eq!(rt.scheduler().status("0"), Some(AppStatus::Exited));

    let events = drain_events(&mut events);
    assert_eq!(
        notices_for(&events, "0"),
        vec![
            lifecycle(LifecycleEvent::Resume),
            AppNotice::Preemption,
            AppNotice::Eviction
        ]
    );
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scene_app_survives_cut_preemption() {
    let rt = scripted_runtime(light_apps(&["0", "1"]), ScriptedLauncher::new());
    rt.start().await;
    let mut events = rt.subscribe();
    let lifetime = rt.lifetime();

    lifetime
        .activate_app_by_id("0", StackSlot::Scene, None)
        .await
        .unwrap();
    lifetime
        .activate_app_by_id("1", StackSlot::Cut, None)
        .await
        .unwrap();
    assert_eq!(lifetime.current_app_id().as_deref(), Some("1"));
    assert_eq!(lifetime.scene_app_id().as_deref(), Some("0"));

    lifetime.deactivate_app_by_id("1").await;

    assert_eq!(lifetime.current_app_id().as_deref(), Some("0"));
    assert!(rt.scheduler().is_running("0"));
    assert_eq!(rt.scheduler().status("1"), Some(AppStatus::Exited));

    let events = drain_events(&mut events);
    assert_eq!(
        notices_for(&events, "0"),
        vec![
            lifecycle(LifecycleEvent::Resume),
            lifecycle(LifecycleEvent::Pause),
            lifecycle(LifecycleEvent::Resume)
        ]
    );
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn keep_alive_app_goes_background_and_returns() {
    let rt = scripted_runtime(light_apps(&["music", "weather"]), ScriptedLauncher::new());
    rt.start().await;
    let lifetime = rt.lifetime();

    lifetime
        .activate_app_by_id("music", StackSlot::Cut, None)
        .await
        .unwrap();
    assert!(lifetime.set_context_options_by_id(
        "music",
        ContextOptions {
            keep_alive: true,
            ..ContextOptions::default()
        }
    ));
    lifetime
        .activate_app_by_id("weather", StackSlot::Cut, None)
        .await
        .unwrap();

    assert!(lifetime.is_background("music"));
    assert!(rt.scheduler().is_running("music"));
    assert_eq!(lifetime.background_app_ids(), vec!["music".to_owned()]);

    lifetime
        .set_foreground_by_id("music", StackSlot::Cut)
        .await
        .unwrap();
    assert_eq!(lifetime.current_app_id().as_deref(), Some("music"));
    assert!(!lifetime.is_app_in_stack("weather"));
    assert!(!rt.scheduler().is_running("weather"));
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn carrier_is_recovered_when_stack_empties() {
    let launcher = ScriptedLauncher::new();
    let rt = scripted_runtime(light_apps(&["home", "timer"]), launcher.clone());
    rt.start().await;
    let lifetime = rt.lifetime();

    lifetime
        .activate_app_by_id("timer", StackSlot::Cut, Some("home".to_owned()))
        .await
        .unwrap();
    assert!(!rt.scheduler().is_running("home"));

    lifetime.deactivate_app_by_id("timer").await;

    assert_eq!(lifetime.current_app_id().as_deref(), Some("home"));
    assert!(rt.scheduler().is_running("home"));
    assert_eq!(launcher.launch_count("home"), 1);
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn crashed_cut_app_leaves_stack_and_scene_resumes() {
    let launcher = ScriptedLauncher::new().script("alert", WorkerScript::CrashAfter(50));
    let rt = scripted_runtime(light_apps(&["player", "alert"]), launcher);
    rt.start().await;
    let lifetime = rt.lifetime();

    lifetime
        .activate_app_by_id("player", StackSlot::Scene, None)
        .await
        .unwrap();
    lifetime
        .activate_app_by_id("alert", StackSlot::Cut, None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(lifetime.current_app_id().as_deref(), Some("player"));
    assert!(!lifetime.is_app_in_stack("alert"));
    assert_eq!(rt.scheduler().status("alert"), Some(AppStatus::Exited));
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scene_monologue_yields_to_cut_only() {
    let rt = scripted_runtime(
        light_apps(&["player", "alert", "video"]),
        ScriptedLauncher::new(),
    );
    rt.start().await;
    let lifetime = rt.lifetime();

    lifetime
        .activate_app_by_id("player", StackSlot::Scene, None)
        .await
        .unwrap();
    lifetime.start_monologue("player").unwrap();
    assert!(lifetime.is_monopolized());

    let err = lifetime
        .activate_app_by_id("video", StackSlot::Scene, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifetimeError::Monopolized {
            app_id: "video".to_owned(),
            monopolist: "player".to_owned()
        }
    );
    assert!(!rt.scheduler().is_running("video"));

    lifetime
        .activate_app_by_id("alert", StackSlot::Cut, None)
        .await
        .unwrap();
    assert!(!lifetime.is_monopolized());
    lifetime.deactivate_app_by_id("alert").await;

    assert_eq!(lifetime.current_app_id().as_deref(), Some("player"));
    assert!(lifetime.is_monopolized());
    lifetime.stop_monologue();
    assert!(!lifetime.is_monopolized());
    rt.shutdown().await;
}
