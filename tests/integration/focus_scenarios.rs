//! Audio focus arbitration observed through the runtime event stream.

use crate::helpers::{broadcasts_on, drain_events, light_apps, notices_for, scripted_runtime};
use yoda_vui::notice::FOCUS_SHIFT_CHANNEL;
use yoda_vui::test_utils::ScriptedLauncher;
use yoda_vui::{AppNotice, FocusGain, FocusRequest, FocusResult};

fn gain(id: i32) -> AppNotice {
    AppNotice::FocusGain { id }
}

fn loss(id: i32, transient: bool, may_duck: bool) -> AppNotice {
    AppNotice::FocusLoss {
        id,
        transient,
        may_duck,
    }
}

#[tokio::test]
async fn lasting_then_transient_then_abandon() {
    let rt = scripted_runtime(light_apps(&["test"]), ScriptedLauncher::new());
    let mut events = rt.subscribe();
    let focus = rt.focus();

    assert_eq!(
        focus.request(FocusRequest::new(1, "test", FocusGain::Default)),
        FocusResult::Granted
    );
    assert_eq!(
        focus.request(FocusRequest::new(2, "test", FocusGain::Transient)),
        FocusResult::Granted
    );
    assert!(focus.abandon("test", 2));

    let events = drain_events(&mut events);
    assert_eq!(
        notices_for(&events, "test"),
        vec![gain(1), gain(2), loss(1, true, false), loss(2, false, false), gain(1)]
    );
    assert_eq!(focus.current().map(|r| r.id), Some(1));
}

#[tokio::test]
async fn exclusive_transient_blocks_until_abandoned() {
    let rt = scripted_runtime(light_apps(&["test-b", "test-c"]), ScriptedLauncher::new());
    let focus = rt.focus();

    assert_eq!(
        focus.request(FocusRequest::new(1, "test-b", FocusGain::TransientExclusive)),
        FocusResult::Granted
    );
    let contender = FocusRequest::new(1, "test-c", FocusGain::Transient);
    assert_eq!(focus.request(contender.clone()), FocusResult::Failed);
    assert_eq!(focus.transient().map(|r| r.app_id), Some("test-b".to_owned()));

    assert!(focus.abandon("test-b", 1));
    assert_eq!(focus.request(contender), FocusResult::Granted);
    assert_eq!(
        rt.visibility().key_and_visible_app_id().as_deref(),
        Some("test-c")
    );
}

#[tokio::test]
async fn repeated_request_notifies_once() {
    let rt = scripted_runtime(light_apps(&["music"]), ScriptedLauncher::new());
    let mut events = rt.subscribe();
    let req = FocusRequest::new(7, "music", FocusGain::Default);

    assert_eq!(rt.focus().request(req.clone()), FocusResult::Granted);
    assert_eq!(rt.focus().request(req), FocusResult::Granted);

    let events = drain_events(&mut events);
    assert_eq!(notices_for(&events, "music"), vec![gain(7)]);
    assert_eq!(broadcasts_on(&events, FOCUS_SHIFT_CHANNEL).len(), 1);
}

#[tokio::test]
async fn request_then_abandon_restores_registers() {
    let rt = scripted_runtime(light_apps(&["music", "tts"]), ScriptedLauncher::new());
    let focus = rt.focus();
    focus.request(FocusRequest::new(1, "music", FocusGain::Default));
    let (lasting, transient) = (focus.lasting(), focus.transient());
    let mut events = rt.subscribe();

    focus.request(FocusRequest::new(3, "tts", FocusGain::TransientMayDuck));
    assert_eq!(
        rt.visibility().audible_app_ids(),
        vec!["tts".to_owned(), "music".to_owned()]
    );
    assert!(focus.abandon("tts", 3));

    assert_eq!(focus.lasting(), lasting);
    assert_eq!(focus.transient(), transient);

    let events = drain_events(&mut events);
    assert_eq!(notices_for(&events, "tts"), vec![gain(3), loss(3, false, false)]);
    assert_eq!(
        notices_for(&events, "music"),
        vec![loss(1, true, true), gain(1)]
    );

    let shifts = broadcasts_on(&events, FOCUS_SHIFT_CHANNEL);
    assert_eq!(shifts.len(), 2);
    assert_eq!(shifts[0][0]["appId"], "tts");
    assert_eq!(shifts[0][1]["appId"], "music");
    assert_eq!(shifts[1][0]["appId"], "music");
    assert_eq!(shifts[1][1]["appId"], "tts");
}

#[tokio::test]
async fn same_request_with_other_flags_is_rejected() {
    let rt = scripted_runtime(light_apps(&["music"]), ScriptedLauncher::new());
    let focus = rt.focus();
    focus.request(FocusRequest::new(1, "music", FocusGain::Transient));
    assert_eq!(
        focus.request(FocusRequest::new(1, "music", FocusGain::TransientMayDuck)),
        FocusResult::Rejected
    );
    assert_eq!(FocusResult::Rejected.code(), -3);
    assert!(!focus.transient().unwrap().may_duck);
}

#[tokio::test]
async fn abandon_all_notifies_current_holder_only() {
    let rt = scripted_runtime(light_apps(&["music", "alarm"]), ScriptedLauncher::new());
    let focus = rt.focus();
    focus.request(FocusRequest::new(1, "music", FocusGain::Default));
    focus.request(FocusRequest::new(2, "alarm", FocusGain::Transient));
    let mut events = rt.subscribe();

    rt.visibility().abandon_all_visibilities();

    let events = drain_events(&mut events);
    assert_eq!(notices_for(&events, "alarm"), vec![loss(2, false, false)]);
    assert!(notices_for(&events, "music").is_empty());
    let shifts = broadcasts_on(&events, FOCUS_SHIFT_CHANNEL);
    assert_eq!(shifts.len(), 1);
    assert!(shifts[0][0].is_null());
    assert_eq!(focus.current(), None);
}
