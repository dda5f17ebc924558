//! Inbound events routed end to end through the runtime.

use crate::helpers::{drain_events, notices_for, scripted_runtime};
use yoda_vui::test_utils::ScriptedLauncher;
use yoda_vui::{AppManifest, AppNotice, DispatchOutcome, InboundEvent, RuntimeEvent, StackSlot};

fn apps() -> Vec<AppManifest> {
    vec![
        AppManifest::light("player").with_skill("music"),
        AppManifest::light("weather").with_skill("forecast"),
    ]
}

fn voice(skill_id: &str) -> InboundEvent {
    InboundEvent::VoiceCommand {
        skill_id: skill_id.to_owned(),
        intent: Some("ask".to_owned()),
        form: StackSlot::Cut,
        payload: serde_json::json!({"text": "hello"}),
    }
}

fn outcomes(events: &[RuntimeEvent]) -> Vec<DispatchOutcome> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::Dispatched { outcome } => Some(outcome.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn voice_command_reaches_worker() {
    let launcher = ScriptedLauncher::new();
    let rt = scripted_runtime(apps(), launcher.clone());
    rt.start().await;

    rt.dispatch(voice("forecast")).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    assert_eq!(rt.lifetime().current_app_id().as_deref(), Some("weather"));
    let received = launcher.notices("weather");
    let request = received
        .iter()
        .find_map(|notice| match notice {
            AppNotice::Request { payload } => Some(payload.clone()),
            _ => None,
        })
        .expect("request delivered to worker");
    assert_eq!(request["skill_id"], "forecast");
    assert_eq!(request["payload"]["text"], "hello");
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn monologue_oppresses_competing_voice_command() {
    let rt = scripted_runtime(apps(), ScriptedLauncher::new());
    rt.start().await;
    rt.dispatch(voice("music")).await;
    rt.lifetime().start_monologue("player").unwrap();
    let mut events = rt.subscribe();

    rt.dispatch(voice("forecast")).await;

    let events = drain_events(&mut events);
    assert_eq!(
        outcomes(&events),
        vec![DispatchOutcome::Oppressed {
            app_id: "weather".to_owned(),
            monopolist: "player".to_owned()
        }]
    );
    assert_eq!(
        notices_for(&events, "player"),
        vec![AppNotice::Oppressing {
            by: "weather".to_owned()
        }]
    );
    assert!(!rt.scheduler().is_running("weather"));
    assert_eq!(rt.lifetime().current_app_id().as_deref(), Some("player"));
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn switched_off_dispatcher_drops_events() {
    let rt = scripted_runtime(apps(), ScriptedLauncher::new());
    rt.dispatcher().set_enabled(false);
    let mut events = rt.subscribe();

    rt.dispatch(voice("music")).await;

    let events = drain_events(&mut events);
    assert_eq!(
        events,
        vec![RuntimeEvent::DispatchFailed {
            error: "dispatcher is disabled".to_owned()
        }]
    );
    assert_eq!(rt.lifetime().current_app_id(), None);

    rt.dispatcher().set_enabled(true);
    rt.dispatch(voice("music")).await;
    assert_eq!(rt.lifetime().current_app_id().as_deref(), Some("player"));
}

#[tokio::test(start_paused = true)]
async fn launch_event_records_carrier() {
    let rt = scripted_runtime(apps(), ScriptedLauncher::new());
    rt.start().await;

    rt.dispatch(InboundEvent::Launch {
        app_id: "weather".to_owned(),
        form: StackSlot::Scene,
        carrier_id: Some("player".to_owned()),
    })
    .await;

    let context = rt.lifetime().get_context_options_by_id("weather").unwrap();
    assert_eq!(context.form, StackSlot::Scene);
    assert_eq!(context.carrier_id.as_deref(), Some("player"));

    rt.lifetime().deactivate_app_by_id("weather").await;
    assert_eq!(rt.lifetime().current_app_id().as_deref(), Some("player"));
    assert_eq!(rt.lifetime().cut_app_id().as_deref(), Some("player"));
    rt.shutdown().await;
}
