//! Dispatcher behavior against scripted inbound frames.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use phonebar_core::{
    AgentConfig, AgentState, DeviceState, IdentityConfig, MessageId, PhoneBarConfig,
    PhoneBarError, PhoneBarEvent, Result, MESSAGE_ID_FIELD,
};
use phonebar_cti::{AgentApi, CtiSession, OutboundSink, SessionCore, TransportEvent};

fn identity() -> IdentityConfig {
    IdentityConfig {
        tid: "100003".to_string(),
        this_dn: "100003001".to_string(),
        pstn_dn: None,
        agent_id: "100003001".to_string(),
        this_queues: vec!["100018000".to_string()],
        default_queue: "100018000".to_string(),
    }
}

fn core() -> SessionCore {
    SessionCore::new(Arc::new(identity()), AgentConfig::default())
}

fn core_with(agent: AgentConfig) -> SessionCore {
    SessionCore::new(Arc::new(identity()), agent)
}

fn session() -> (CtiSession, mpsc::Receiver<PhoneBarEvent>) {
    let config = PhoneBarConfig {
        identity: identity(),
        ..PhoneBarConfig::default()
    };
    let session = CtiSession::new(config);
    let rx = session.subscribe_channel(64).unwrap();
    (session, rx)
}

fn drain(rx: &mut mpsc::Receiver<PhoneBarEvent>) -> Vec<PhoneBarEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn frame(id: MessageId, extra: Value) -> Value {
    let mut value = json!({ MESSAGE_ID_FIELD: id.code() });
    if let (Some(obj), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    value
}

fn command_id(command: &Value) -> i64 {
    command[MESSAGE_ID_FIELD].as_i64().unwrap()
}

fn login(core: &mut SessionCore) {
    core.apply_frame(&frame(MessageId::EventAgentLogin, json!({})));
    core.apply_frame(&frame(MessageId::EventAgentReady, json!({})));
}

fn ringing_frame(call_id: &str, other_dn: &str) -> Value {
    frame(
        MessageId::EventRinging,
        json!({
            "callID": call_id,
            "callType": 2,
            "otherDN": other_dn,
            "partyState": 1,
        }),
    )
}

fn established_frame(call_id: &str, call_type: i64, other_dn: &str, extra: Value) -> Value {
    let mut f = frame(
        MessageId::EventEstablished,
        json!({
            "callID": call_id,
            "callType": call_type,
            "otherDN": other_dn,
            "partyState": 2,
        }),
    );
    if let (Some(obj), Some(extra)) = (f.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    f
}

fn released_frame(call_id: &str, call_type: i64, other_dn: &str, extra: Value) -> Value {
    let mut f = frame(
        MessageId::EventReleased,
        json!({
            "callID": call_id,
            "callType": call_type,
            "otherDN": other_dn,
            "partyState": 4,
        }),
    );
    if let (Some(obj), Some(extra)) = (f.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    f
}

#[test]
fn test_login_then_ready() {
    let mut core = core();
    let (events, commands) = core.apply_frame(&frame(MessageId::EventAgentLogin, json!({})));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::AgentStateChanged { .. })));
    // Auto-idle-when-login pushes the ready request
    assert_eq!(commands.len(), 1);
    assert_eq!(command_id(&commands[0]), MessageId::RequestAgentReady.code());

    let (events, _) = core.apply_frame(&frame(MessageId::EventAgentReady, json!({})));
    assert!(matches!(
        events[0],
        PhoneBarEvent::AgentStateChanged {
            new_state: AgentState::Ready,
            ..
        }
    ));
    assert_eq!(core.agent_state(), AgentState::Ready);
    assert_eq!(core.state_name(), "Ready");
}

#[test]
fn test_not_ready_reason_maps_to_local_state() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&frame(MessageId::EventAgentNotReady, json!({ "reason": 5 })));
    assert_eq!(core.agent_state(), AgentState::Rest);
    core.apply_frame(&frame(MessageId::EventAgentNotReady, json!({ "reason": 11 })));
    assert_eq!(core.agent_state(), AgentState::Reason1);
    // Unmapped reason falls back to Busy
    core.apply_frame(&frame(MessageId::EventAgentNotReady, json!({ "reason": 99 })));
    assert_eq!(core.agent_state(), AgentState::Busy);
}

#[test]
fn test_logout_returns_to_offline() {
    let mut core = core();
    login(&mut core);
    let (events, _) = core.apply_frame(&frame(MessageId::EventAgentLogout, json!({})));
    assert!(matches!(
        events[0],
        PhoneBarEvent::AgentStateChanged {
            new_state: AgentState::Offline,
            ..
        }
    ));
}

#[test]
fn test_device_unregistered_advisory_every_time() {
    let mut core = core();
    let (events, _) = core.apply_frame(&frame(MessageId::EventUnregistered, json!({})));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::DeviceStateChanged(DeviceState::Unregistered))));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
    // Repeat: advisory again, change suppressed
    let (events, _) = core.apply_frame(&frame(MessageId::EventUnregistered, json!({})));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::DeviceStateChanged(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
}

#[test]
fn test_ringing_drives_presence_and_screen_pop() {
    let mut core = core();
    login(&mut core);
    let (events, _) = core.apply_frame(&ringing_frame("call-1", "13800138000"));
    assert_eq!(core.agent_state(), AgentState::Ringing);
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Ringing { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ScreenPop { .. })));
}

#[test]
fn test_dialing_out_also_rings_presence() {
    let mut core = core();
    login(&mut core);
    let f = frame(
        MessageId::EventDialing,
        json!({ "callID": "out-1", "callType": 3, "otherDN": "13800138000" }),
    );
    let (events, _) = core.apply_frame(&f);
    assert_eq!(core.agent_state(), AgentState::Ringing);
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Ringing { .. })));
}

#[test]
fn test_screen_pop_suppressed_for_supervisor_role() {
    let mut core = core();
    login(&mut core);
    let f = frame(
        MessageId::EventRinging,
        json!({
            "callID": "call-1",
            "callType": 2,
            "otherDN": "13800138000",
            "thisRole": 5,
        }),
    );
    let (events, _) = core.apply_frame(&f);
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Ringing { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ScreenPop { .. })));
}

#[test]
fn test_screen_pop_suppressed_for_internal_call() {
    let mut core = core();
    login(&mut core);
    let f = frame(
        MessageId::EventRinging,
        json!({ "callID": "call-1", "callType": 1, "otherDN": "100003002" }),
    );
    let (events, _) = core.apply_frame(&f);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ScreenPop { .. })));
}

#[test]
fn test_screen_pop_suppressed_for_third_party_role() {
    let mut core = core();
    login(&mut core);
    let f = frame(
        MessageId::EventRinging,
        json!({
            "callID": "call-1",
            "callType": 2,
            "otherDN": "13800138000",
            "attachDatas": { "variable_thirdPartyRole": 2 },
        }),
    );
    let (events, _) = core.apply_frame(&f);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ScreenPop { .. })));
}

#[test]
fn test_screen_pop_on_answer() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&ringing_frame("call-1", "13800138000"));
    let (events, _) = core.apply_frame(&established_frame("call-1", 2, "13800138000", json!({})));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, PhoneBarEvent::ScreenPop { .. })),
        "every applied transition pops, not just ringing"
    );
}

#[test]
fn test_screen_pop_on_secondary_line() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("call-a", 2, "13800138000", json!({})));
    // A leg that is not the current line still pops
    let (events, _) = core.apply_frame(&established_frame("call-b", 2, "13800138001", json!({})));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ScreenPop { .. })));
    assert_eq!(core.current_line_id().as_deref(), Some("call-a"));
}

#[test]
fn test_only_current_line_drives_presence() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&ringing_frame("call-a", "13800138000"));
    core.apply_frame(&established_frame("call-a", 2, "13800138000", json!({})));
    assert_eq!(core.agent_state(), AgentState::Talking);

    // A second leg appearing must not move presence or notify
    let (events, _) =
        core.apply_frame(&established_frame("call-b", 4, "100003002", json!({})));
    assert_eq!(core.agent_state(), AgentState::Talking);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Talking { .. })));
    assert_eq!(core.line_count(), 2);
    assert_eq!(core.current_line_id().as_deref(), Some("call-a"));
}

#[test]
fn test_hangup_emits_event_and_after_work_command() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&ringing_frame("call-1", "13800138000"));
    core.apply_frame(&established_frame("call-1", 2, "13800138000", json!({})));

    let (events, commands) = core.apply_frame(&released_frame(
        "call-1",
        2,
        "13800138000",
        json!({ "sendBy": "13800138000" }),
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Hangup { .. })));
    assert_eq!(commands.len(), 1);
    assert_eq!(
        command_id(&commands[0]),
        MessageId::RequestAgentNotReady.code()
    );
    assert_eq!(commands[0]["reason"], json!(0));
    assert_eq!(core.line_count(), 0);
}

#[test]
fn test_consult_answered_on_second_leg() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("cust", 2, "13800138000", json!({})));
    let (events, _) = core.apply_frame(&established_frame(
        "cons",
        4,
        "100003002",
        json!({ "thisRole": 1, "otherRole": 2 }),
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ConsultAnswered { .. })));
    // Presence untouched, the customer line is still current
    assert_eq!(core.current_line_id().as_deref(), Some("cust"));
}

#[test]
fn test_consult_called_on_receiving_side() {
    let mut core = core();
    login(&mut core);
    let (events, _) = core.apply_frame(&established_frame(
        "x",
        4,
        "100003005",
        json!({ "thisRole": 2, "otherRole": 1 }),
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ConsultCalled { .. })));
    // The consulted agent's only line is current, so it also talks
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Talking { .. })));
}

#[test]
fn test_consult_party_hangup_internal_extension() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("cust", 2, "13800138000", json!({})));
    core.apply_frame(&established_frame(
        "cons",
        4,
        "100003002",
        json!({ "thisRole": 1, "otherRole": 2 }),
    ));

    let (events, _) = core.apply_frame(&released_frame(
        "cons",
        4,
        "100003002",
        json!({ "sendBy": "100003002", "thirdDN": "100003002" }),
    ));
    let hangup = events.iter().find_map(|e| match e {
        PhoneBarEvent::ConsultPartyHangup { party, internal } => Some((party.clone(), *internal)),
        _ => None,
    });
    let (party, internal) = hangup.expect("consult party hangup");
    assert_eq!(party, "100003002");
    assert!(internal, "9-digit identifier is an internal extension");
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
    assert_eq!(core.line_count(), 1);
}

#[test]
fn test_consult_party_hangup_external_number() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("cust", 2, "13800138000", json!({})));
    core.apply_frame(&established_frame(
        "cons",
        4,
        "13900139000",
        json!({ "thisRole": 1, "otherRole": 2 }),
    ));

    let (events, _) = core.apply_frame(&released_frame(
        "cons",
        4,
        "13900139000",
        json!({ "sendBy": "13900139000", "thirdDN": "13900139000" }),
    ));
    let internal = events.iter().find_map(|e| match e {
        PhoneBarEvent::ConsultPartyHangup { internal, .. } => Some(*internal),
        _ => None,
    });
    assert_eq!(internal, Some(false));
}

#[test]
fn test_customer_hangup_promotes_consult_line() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("cust", 2, "13800138000", json!({})));
    core.apply_frame(&established_frame(
        "cons",
        4,
        "100003002",
        json!({ "thisRole": 1, "otherRole": 2 }),
    ));

    let (events, commands) = core.apply_frame(&released_frame(
        "cust",
        2,
        "13800138000",
        json!({ "sendBy": "13800138000", "thirdDN": "100003002" }),
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::CustomerHangupDuringConsult { .. })));
    // The current line went idle, so the hangup and the after-work request
    // fire alongside the promotion
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Hangup { .. })));
    assert_eq!(commands.len(), 1);
    assert_eq!(
        command_id(&commands[0]),
        MessageId::RequestAgentNotReady.code()
    );
    assert_eq!(commands[0]["reason"], json!(0));
    assert_eq!(core.current_line_id().as_deref(), Some("cons"));
    assert_eq!(core.line_count(), 1);
}

#[test]
fn test_consult_signals_require_consult_call_type() {
    let mut core = core();
    login(&mut core);
    // An inbound leg carrying consult-shaped roles is not a consult
    let (events, _) = core.apply_frame(&established_frame(
        "in-1",
        2,
        "13800138000",
        json!({ "thisRole": 2, "otherRole": 1 }),
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ConsultCalled { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ConsultAnswered { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Talking { .. })));
}

#[test]
fn test_double_disconnect_on_plain_call_is_plain_hangup() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("call-1", 2, "13800138000", json!({})));
    let (events, _) = core.apply_frame(&released_frame(
        "call-1",
        2,
        "13800138000",
        json!({ "sendBy": "13800138000", "thirdDN": "13800138000" }),
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::ConsultPartyHangup { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Hangup { .. })));
}

#[test]
fn test_unknown_message_id_single_event() {
    let mut core = core();
    let (events, commands) = core.apply_frame(&json!({ "messageId": 424242, "foo": "bar" }));
    assert_eq!(events.len(), 1);
    assert!(commands.is_empty());
    match &events[0] {
        PhoneBarEvent::Unrecognized {
            message_id,
            payload,
        } => {
            assert_eq!(*message_id, 424242);
            assert_eq!(payload["foo"], json!("bar"));
        }
        other => panic!("expected Unrecognized, got {other:?}"),
    }
}

#[test]
fn test_malformed_frames_never_panic() {
    let mut core = core();
    for f in [
        json!({}),
        json!({ "messageId": "not-a-number" }),
        json!(null),
        json!([1, 2, 3]),
        frame(MessageId::EventRinging, json!({})), // no callID
    ] {
        let (events, _) = core.apply_frame(&f);
        assert!(events
            .iter()
            .all(|e| matches!(e, PhoneBarEvent::ProtocolError(_))));
    }
}

#[test]
fn test_attached_data_merges_into_line() {
    let mut core = core();
    login(&mut core);
    core.apply_frame(&established_frame("call-1", 2, "13800138000", json!({})));
    core.apply_frame(&frame(
        MessageId::EventAttachedDataChanged,
        json!({ "callID": "call-1", "attachDatas": { "call_data": "order-77" } }),
    ));
    let info = core.current_call().unwrap();
    assert_eq!(info.attach_data["call_data"], json!("order-77"));
}

#[test]
fn test_connected_sends_login_and_auto_ready_request() {
    let mut core = core();
    let (events, commands) = core.apply_connected();
    assert!(matches!(events[0], PhoneBarEvent::Connected));
    assert_eq!(commands.len(), 2);
    assert_eq!(command_id(&commands[0]), MessageId::RequestAgentLogin.code());
    assert_eq!(commands[0]["thisDN"], json!("100003001"));
    assert_eq!(commands[0]["tid"], json!("100003"));
    assert_eq!(
        command_id(&commands[1]),
        MessageId::RequestAutoReadyConfig.code()
    );
}

#[test]
fn test_auto_ready_unset_preference_adopts_server() {
    let mut core = core();
    let (_, commands) = core.apply_frame(&frame(
        MessageId::EventAutoReadyConfig,
        json!({ "autoSavePopup": true, "maxAfterworkTime": 30 }),
    ));
    assert!(commands.is_empty());
    assert_eq!(core.agent_config().auto_idle_when_after_work, Some(true));
    assert_eq!(core.agent_config().max_after_work_secs, 30);
}

#[test]
fn test_auto_ready_differing_preference_pushed_back() {
    let mut config = AgentConfig::default();
    config.auto_idle_when_after_work = Some(true);
    let mut core = core_with(config);
    let (_, commands) = core.apply_frame(&frame(
        MessageId::EventAutoReadyConfig,
        json!({ "autoSavePopup": false, "maxAfterworkTime": 30 }),
    ));
    assert_eq!(commands.len(), 1);
    assert_eq!(
        command_id(&commands[0]),
        MessageId::RequestAutoReadyConfig.code()
    );
    assert_eq!(commands[0]["autoSavePopup"], json!(true));
    assert_eq!(core.agent_config().max_after_work_secs, 30);
}

#[test]
fn test_auto_ready_zero_window_advisory_once() {
    let mut config = AgentConfig::default();
    config.auto_idle_when_after_work = Some(true);
    let mut core = core_with(config);
    let f = frame(
        MessageId::EventAutoReadyConfig,
        json!({ "autoSavePopup": false, "maxAfterworkTime": 0 }),
    );
    let (events, commands) = core.apply_frame(&f);
    assert!(commands.is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
    // One-time only
    let (events, _) = core.apply_frame(&f);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
}

#[test]
fn test_auto_ready_adopted_enabled_with_zero_window_advisory() {
    // No local preference, server says enabled but never provisioned a
    // wrap-up window: adopt, then warn once
    let mut core = core();
    let f = frame(
        MessageId::EventAutoReadyConfig,
        json!({ "autoSavePopup": true, "maxAfterworkTime": 0 }),
    );
    let (events, commands) = core.apply_frame(&f);
    assert!(commands.is_empty());
    assert_eq!(core.agent_config().auto_idle_when_after_work, Some(true));
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
    let (events, _) = core.apply_frame(&f);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
}

#[test]
fn test_auto_ready_disabled_locally_clears_window() {
    let mut config = AgentConfig::default();
    config.auto_idle_when_after_work = Some(false);
    config.max_after_work_secs = 45;
    let mut core = core_with(config);
    core.apply_frame(&frame(
        MessageId::EventAutoReadyConfig,
        json!({ "autoSavePopup": false, "maxAfterworkTime": 30 }),
    ));
    // Disabled locally means no wrap-up deadline at all
    assert_eq!(core.agent_config().max_after_work_secs, 0);
}

#[test]
fn test_auto_ready_merges_remote_reason_names() {
    let mut core = core();
    core.apply_frame(&frame(
        MessageId::EventAutoReadyConfig,
        json!({
            "autoSavePopup": false,
            "maxAfterworkTime": 0,
            "agentStateExtList": [
                { "reasonCode": 11, "name": "Training" },
                { "reasonCode": 999, "name": "Lunch", "key": "rest" },
            ],
        }),
    ));
    assert_eq!(core.registry().state_name(AgentState::Reason1), "Training");
    assert_eq!(core.registry().state_name(AgentState::Rest), "Lunch");
}

#[test]
fn test_tick_tip_advisory_on_interval() {
    let mut config = AgentConfig::default();
    config.tip_time_minutes = 5;
    let mut core = core_with(config);
    login(&mut core);

    let (events, _) = core.tick_at(300);
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::Advisory(_))));
    let (events, _) = core.tick_at(301);
    assert!(events.is_empty());
}

#[test]
fn test_tick_tip_skips_busy() {
    let mut config = AgentConfig::default();
    config.tip_time_minutes = 5;
    let mut core = core_with(config);
    login(&mut core);
    core.apply_frame(&frame(MessageId::EventAgentNotReady, json!({ "reason": 3 })));
    let (events, _) = core.tick_at(300);
    assert!(events.is_empty());
}

#[test]
fn test_tick_auto_ready_after_wrap_up_deadline() {
    let mut config = AgentConfig::default();
    config.auto_idle_when_after_work = Some(true);
    config.max_after_work_secs = 30;
    let mut core = core_with(config);
    login(&mut core);
    core.apply_frame(&frame(MessageId::EventAgentNotReady, json!({ "reason": 0 })));
    assert_eq!(core.agent_state(), AgentState::Neatening);

    // Before the deadline: nothing
    let (_, commands) = core.tick_at(29);
    assert!(commands.is_empty());
    // Exactly at the deadline: go ready
    let (_, commands) = core.tick_at(30);
    assert_eq!(commands.len(), 1);
    assert_eq!(command_id(&commands[0]), MessageId::RequestAgentReady.code());
    // Past the deadline, off the 3 s throttle grid: nothing
    let (_, commands) = core.tick_at(31);
    assert!(commands.is_empty());
    // Back on the grid: retry
    let (_, commands) = core.tick_at(33);
    assert_eq!(commands.len(), 1);
    assert_eq!(command_id(&commands[0]), MessageId::RequestAgentReady.code());
}

#[test]
fn test_tick_auto_ready_waits_for_lines_to_clear() {
    let mut config = AgentConfig::default();
    config.auto_idle_when_after_work = Some(true);
    config.max_after_work_secs = 30;
    let mut core = core_with(config);
    login(&mut core);
    core.apply_frame(&established_frame("call-1", 2, "13800138000", json!({})));
    core.apply_frame(&frame(MessageId::EventAgentNotReady, json!({ "reason": 0 })));

    let (_, commands) = core.tick_at(33);
    assert!(commands.is_empty(), "line still working");
}

#[test]
fn test_garbled_wire_text_surfaces_protocol_error() {
    let mut core = core();
    let (events, commands) =
        core.apply_transport_event(TransportEvent::Malformed("expected value".to_string()));
    assert!(commands.is_empty());
    assert!(matches!(
        &events[0],
        PhoneBarEvent::ProtocolError(m) if m.contains("expected value")
    ));
}

#[test]
fn test_link_disconnected_passes_through() {
    let mut core = core();
    let (events, _) = core.apply_frame(&frame(MessageId::EventLinkDisconnected, json!({})));
    assert!(matches!(events[0], PhoneBarEvent::LinkDisconnected(_)));
}

#[test]
fn test_server_error_event_surfaces_message() {
    let mut core = core();
    let (events, _) = core.apply_frame(&frame(
        MessageId::EventError,
        json!({ "message": "no such queue" }),
    ));
    assert!(matches!(
        &events[0],
        PhoneBarEvent::ProtocolError(m) if m == "no such queue"
    ));
}

// ---- session wrapper ----

#[test]
fn test_session_handle_frame_publishes_events() {
    let (session, mut rx) = session();
    session
        .handle_frame(&frame(MessageId::EventAgentLogin, json!({})))
        .unwrap();
    session
        .handle_frame(&frame(MessageId::EventAgentReady, json!({})))
        .unwrap();
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, PhoneBarEvent::AgentStateChanged { new_state: AgentState::Ready, .. })));
    assert_eq!(session.agent_state().unwrap(), AgentState::Ready);
}

#[tokio::test]
async fn test_set_presence_rejected_while_offline() {
    let (session, _rx) = session();
    let err = session.set_presence(AgentState::Rest).await.unwrap_err();
    assert!(matches!(err, PhoneBarError::Rejected(_)));
}

#[tokio::test]
async fn test_set_presence_rejects_non_selectable_state() {
    let (session, _rx) = session();
    session
        .handle_frame(&frame(MessageId::EventAgentLogin, json!({})))
        .unwrap();
    let err = session.set_presence(AgentState::Talking).await.unwrap_err();
    assert!(matches!(err, PhoneBarError::InvalidState(_)));
}

#[tokio::test]
async fn test_set_presence_rejected_during_call() {
    let (session, _rx) = session();
    session
        .handle_frame(&frame(MessageId::EventAgentLogin, json!({})))
        .unwrap();
    session
        .handle_frame(&established_frame("call-1", 2, "13800138000", json!({})))
        .unwrap();
    let err = session.set_presence(AgentState::Rest).await.unwrap_err();
    assert!(matches!(err, PhoneBarError::Rejected(_)));
}

// ---- agent api against a recording sink ----

#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<Value>>,
}

#[async_trait]
impl OutboundSink for RecordingSink {
    async fn send(&self, message: Value) -> Result<()> {
        self.frames.lock().unwrap().push(message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

fn api() -> (AgentApi, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (AgentApi::new(Arc::new(identity()), sink.clone()), sink)
}

#[tokio::test]
async fn test_api_login_carries_identity() {
    let (api, sink) = api();
    api.agent_login().await.unwrap();
    let frames = sink.frames.lock().unwrap();
    assert_eq!(command_id(&frames[0]), MessageId::RequestAgentLogin.code());
    assert_eq!(frames[0]["thisDN"], json!("100003001"));
    assert_eq!(frames[0]["agentID"], json!("100003001"));
    assert_eq!(frames[0]["defaultQueue"], json!("100018000"));
}

#[tokio::test]
async fn test_api_make_call_defaults_to_sign_in_queue() {
    let (api, sink) = api();
    api.make_call("13800138000", phonebar_core::CallType::Outbound, None)
        .await
        .unwrap();
    let frames = sink.frames.lock().unwrap();
    assert_eq!(frames[0]["thisQueue"], json!("100018000"));
    assert_eq!(frames[0]["callType"], json!(3));
}

#[tokio::test]
async fn test_api_ivr_prefixes() {
    let (api, sink) = api();
    api.transfer_to_ivr("77").await.unwrap();
    api.transfer_to_satisfaction("88").await.unwrap();
    let frames = sink.frames.lock().unwrap();
    assert_eq!(frames[0]["otherDN"], json!("ivr_77"));
    assert_eq!(frames[1]["otherDN"], json!("icp_88"));
}
