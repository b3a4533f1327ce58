//! Session dispatcher: one agent's connection, presence, and lines.
//!
//! [`SessionCore`] is the synchronous heart: it consumes one inbound frame
//! at a time and returns the events to publish and the command frames to
//! send back. All presence and line mutation happens inside that turn, under
//! the session lock, so handlers observe a consistent snapshot. [`CtiSession`]
//! wraps the core with the transport, the frame pump, the 1 s policy tick,
//! and the keep-alive.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use phonebar_core::agent::{reason, AgentPresence, AgentState, DeviceState, RawAgentState};
use phonebar_core::line::{
    party_state, CallInfo, CallType, LineEventData, LineState, INTERNAL_EXTENSION_LEN,
    SUPERVISOR_ROLE,
};
use phonebar_core::{
    AgentConfig, CustomReason, EventHub, IdentityConfig, LinePool, MessageId, PhoneBarConfig,
    PhoneBarError, PhoneBarEvent, Result, StateRegistry, StateTimer, SubscriptionId,
    MESSAGE_ID_FIELD,
};

use crate::api::{ping_frame, request_frame, AgentApi};
use crate::transport::{CtiTransport, TransportEvent};

/// Pure dispatch state: presence, lines, registry, subscriptions.
///
/// Every entry point returns `(events, commands)` instead of performing IO,
/// which keeps the cross-cutting call rules testable without a socket.
pub struct SessionCore {
    identity: Arc<IdentityConfig>,
    agent_config: AgentConfig,
    presence: AgentPresence,
    lines: LinePool,
    registry: StateRegistry,
    pub(crate) hub: EventHub,
    auto_ready_advisory_shown: bool,
}

impl SessionCore {
    pub fn new(identity: Arc<IdentityConfig>, agent_config: AgentConfig) -> Self {
        let presence = AgentPresence::new(
            identity.tid.clone(),
            identity.this_dn.clone(),
            identity.pstn_dn.clone(),
            identity.agent_id.clone(),
            identity.this_queues.clone(),
            identity.default_queue.clone(),
        );
        let mut registry = StateRegistry::new();
        registry.apply_custom_reasons(&agent_config.custom_not_ready_reasons);
        Self {
            identity,
            agent_config,
            presence,
            lines: LinePool::new(),
            registry,
            hub: EventHub::new(),
            auto_ready_advisory_shown: false,
        }
    }

    pub fn agent_state(&self) -> AgentState {
        self.presence.state()
    }

    pub fn device_state(&self) -> DeviceState {
        self.presence.device_state()
    }

    pub fn state_name(&self) -> String {
        let name = self.registry.state_name(self.presence.state());
        if name.is_empty() {
            self.presence.state().to_string()
        } else {
            name.to_string()
        }
    }

    pub fn state_elapsed_secs(&self) -> u64 {
        self.presence.state_timer.elapsed_secs()
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn agent_config(&self) -> &AgentConfig {
        &self.agent_config
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn working_line_count(&self) -> usize {
        self.lines.working_line_count()
    }

    pub fn current_line_id(&self) -> Option<String> {
        self.lines.current_line_id().map(str::to_string)
    }

    pub fn current_call(&self) -> Option<CallInfo> {
        self.lines.current_line().map(|l| l.call_info().clone())
    }

    pub fn publish(&mut self, events: &[PhoneBarEvent]) {
        for event in events {
            self.hub.emit(event);
        }
    }

    /// Transport (re)connected: greet the server with a fresh login and ask
    /// for the auto-ready configuration.
    pub fn apply_connected(&mut self) -> (Vec<PhoneBarEvent>, Vec<Value>) {
        let login = request_frame(
            &self.identity,
            MessageId::RequestAgentLogin,
            json!({
                "tid": self.identity.tid,
                "pstnDN": self.identity.pstn_dn,
                "thisQueues": self.identity.this_queues,
                "defaultQueue": self.identity.default_queue,
            }),
        );
        let auto_ready = request_frame(&self.identity, MessageId::RequestAutoReadyConfig, json!({}));
        (vec![PhoneBarEvent::Connected], vec![login, auto_ready])
    }

    /// Dispatch one inbound frame.
    ///
    /// Malformed frames produce a protocol-error event, unknown ids produce
    /// exactly one unrecognized event; neither is ever fatal.
    pub fn apply_frame(&mut self, frame: &Value) -> (Vec<PhoneBarEvent>, Vec<Value>) {
        let mut events = Vec::new();
        let mut commands = Vec::new();

        let Some(code) = frame.get(MESSAGE_ID_FIELD).and_then(Value::as_i64) else {
            warn!("inbound frame without a message id");
            events.push(PhoneBarEvent::ProtocolError(
                "frame missing messageId".to_string(),
            ));
            return (events, commands);
        };
        let Some(id) = MessageId::from_code(code) else {
            debug!(code, "unrecognized message id");
            events.push(PhoneBarEvent::Unrecognized {
                message_id: code,
                payload: frame.clone(),
            });
            return (events, commands);
        };

        match id {
            MessageId::EventWelcome => {
                debug!("server welcome received");
            }
            MessageId::RequestPing => {
                // keep-alive echo
            }

            MessageId::EventAgentLogin => {
                self.transition(AgentState::Busy, &mut events);
                if self.agent_config.auto_idle_when_login {
                    commands.push(request_frame(
                        &self.identity,
                        MessageId::RequestAgentReady,
                        json!({}),
                    ));
                }
            }
            MessageId::EventAgentReady => {
                self.transition(AgentState::Ready, &mut events);
            }
            MessageId::EventAgentNotReady => {
                let reason_code = frame
                    .get("reason")
                    .and_then(Value::as_i64)
                    .unwrap_or(reason::UNKNOWN);
                let state = StateRegistry::local_state(RawAgentState::NotReady, reason_code);
                self.transition(state, &mut events);
            }
            MessageId::EventAgentLogout => {
                self.transition(AgentState::Offline, &mut events);
            }
            MessageId::EventAgentInfo => {
                // Server-side presence snapshot, wins over local state
                let raw = frame
                    .get("state")
                    .and_then(Value::as_i64)
                    .and_then(RawAgentState::from_code);
                if let Some(raw) = raw {
                    let reason_code = frame
                        .get("reason")
                        .and_then(Value::as_i64)
                        .unwrap_or(reason::UNKNOWN);
                    self.transition(StateRegistry::local_state(raw, reason_code), &mut events);
                }
            }

            MessageId::EventRegistered => self.device(DeviceState::Registered, &mut events),
            MessageId::EventUnregistered => self.device(DeviceState::Unregistered, &mut events),

            MessageId::EventDialing => {
                self.handle_line_event(LineState::Dialing, frame, &mut events, &mut commands);
            }
            MessageId::EventRinging => {
                self.handle_line_event(LineState::Ringing, frame, &mut events, &mut commands);
            }
            MessageId::EventEstablished | MessageId::EventRetrieved => {
                self.handle_line_event(LineState::Talking, frame, &mut events, &mut commands);
            }
            MessageId::EventHeld => {
                self.handle_line_event(LineState::Held, frame, &mut events, &mut commands);
            }
            MessageId::EventReleased | MessageId::EventAbandoned => {
                self.handle_line_event(LineState::Idle, frame, &mut events, &mut commands);
            }

            MessageId::EventAttachedDataChanged => {
                if let Some(call_id) = frame.get("callID").and_then(Value::as_str) {
                    let data: LineEventData =
                        serde_json::from_value(frame.clone()).unwrap_or_default();
                    if let Some(line) = self.lines.get_mut(call_id) {
                        line.merge_attach_data(&data.attach_datas);
                    }
                }
            }

            MessageId::EventThreeWayEstablished => {
                events.push(PhoneBarEvent::ThreeWayJoined {
                    other_dn: string_field(frame, "otherDN"),
                    call_id: string_field(frame, "callID"),
                });
            }
            MessageId::EventThreeWayReleased => {
                events.push(PhoneBarEvent::ThreeWayLeft {
                    other_dn: string_field(frame, "otherDN"),
                });
            }

            MessageId::EventAutoReadyConfig => {
                self.reconcile_auto_ready(frame, &mut events, &mut commands);
            }

            MessageId::EventQueued => events.push(PhoneBarEvent::QueueUpdate(frame.clone())),
            MessageId::EventResetQueue => events.push(PhoneBarEvent::ResetQueues(frame.clone())),
            MessageId::EventQueueList => {
                events.push(PhoneBarEvent::QueueListUpdate(frame.clone()));
            }
            MessageId::EventTransferAgentInfo => {
                events.push(PhoneBarEvent::TransferAgentListUpdate(frame.clone()));
            }
            MessageId::EventConferenceAgentInfo => {
                events.push(PhoneBarEvent::ConferenceInfoUpdate(frame.clone()));
            }
            MessageId::EventTransferMenuList => {
                events.push(PhoneBarEvent::TransferMenuList(frame.clone()));
            }
            MessageId::EventConferenceMenuList => {
                events.push(PhoneBarEvent::ConferenceMenuList(frame.clone()));
            }
            MessageId::EventDtmfSent => {
                events.push(PhoneBarEvent::UserInputCompleted(frame.clone()));
            }

            MessageId::EventLinkDisconnected => {
                events.push(PhoneBarEvent::LinkDisconnected(frame.clone()));
            }
            MessageId::EventError => {
                let description = frame
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.to_string());
                events.push(PhoneBarEvent::ProtocolError(description));
            }

            other => {
                debug!(id = other.name(), "event without a session-level effect");
            }
        }

        (events, commands)
    }

    /// Dispatch one transport notification.
    pub fn apply_transport_event(
        &mut self,
        event: TransportEvent,
    ) -> (Vec<PhoneBarEvent>, Vec<Value>) {
        match event {
            TransportEvent::Connected => self.apply_connected(),
            TransportEvent::Frame(frame) => self.apply_frame(&frame),
            TransportEvent::Malformed(error) => (
                vec![PhoneBarEvent::ProtocolError(format!(
                    "unparseable inbound frame: {error}"
                ))],
                Vec::new(),
            ),
            TransportEvent::Disconnected(reason) => {
                (vec![PhoneBarEvent::Disconnected(reason)], Vec::new())
            }
        }
    }

    /// Periodic 1 s policy tick: state tips and auto-ready after wrap-up.
    pub fn tick(&mut self) -> (Vec<PhoneBarEvent>, Vec<Value>) {
        let secs = self.presence.state_timer.elapsed_secs();
        self.tick_at(secs)
    }

    /// Policy evaluation for a given held-state duration.
    pub fn tick_at(&mut self, secs: u64) -> (Vec<PhoneBarEvent>, Vec<Value>) {
        let mut events = Vec::new();
        let mut commands = Vec::new();
        let state = self.presence.state();

        let tip_minutes = self.agent_config.tip_time_minutes;
        if tip_minutes > 0
            && secs > 0
            && secs % (tip_minutes * 60) == 0
            && state != AgentState::Busy
            && state != AgentState::Offline
        {
            events.push(PhoneBarEvent::Advisory(format!(
                "You have been {} for {}",
                self.state_name(),
                StateTimer::format_secs(secs)
            )));
        }

        if state == AgentState::Neatening
            && self.agent_config.auto_idle_when_after_work == Some(true)
        {
            let max = self.agent_config.max_after_work_secs;
            // Throttled to every third second past the deadline so a missed
            // acknowledgement does not flood the server
            if max > 0
                && secs >= max
                && (secs - max) % 3 == 0
                && self.lines.working_line_count() == 0
            {
                commands.push(request_frame(
                    &self.identity,
                    MessageId::RequestAgentReady,
                    json!({}),
                ));
            }
        }

        (events, commands)
    }

    fn transition(&mut self, state: AgentState, events: &mut Vec<PhoneBarEvent>) {
        if let Some(change) = self.presence.set_state(state) {
            events.push(PhoneBarEvent::AgentStateChanged {
                new_state: change.new_state,
                previous: change.previous,
            });
        }
    }

    fn device(&mut self, state: DeviceState, events: &mut Vec<PhoneBarEvent>) {
        let outcome = self.presence.set_device_state(state);
        if let Some(changed) = outcome.changed {
            events.push(PhoneBarEvent::DeviceStateChanged(changed));
        }
        if let Some(advisory) = outcome.advisory {
            events.push(PhoneBarEvent::Advisory(advisory));
        }
    }

    /// Apply one call-leg transition plus the cross-cutting rules: current-
    /// line-only presence, screen pops, two-step-transfer signals, consult
    /// promotion, and after-work on hangup.
    fn handle_line_event(
        &mut self,
        state: LineState,
        frame: &Value,
        events: &mut Vec<PhoneBarEvent>,
        commands: &mut Vec<Value>,
    ) {
        let Some(call_id) = frame.get("callID").and_then(Value::as_str) else {
            warn!("call event without a callID");
            events.push(PhoneBarEvent::ProtocolError(
                "call event missing callID".to_string(),
            ));
            return;
        };
        let call_id = call_id.to_string();
        let call_type = frame
            .get("callType")
            .and_then(Value::as_i64)
            .and_then(CallType::from_code)
            .unwrap_or(CallType::Outbound);
        let mut info = CallInfo::new(call_id.clone(), call_type);
        info.other_dn = string_field(frame, "otherDN");
        info.this_queue = string_field(frame, "thisQueue");
        let data: LineEventData = serde_json::from_value(frame.clone()).unwrap_or_default();

        // Pool shape before this leg is (possibly) created, for the
        // two-step-transfer rules
        let had_primary = self.lines.has_line_of_type(CallType::Inbound)
            || self.lines.has_line_of_type(CallType::Outbound);
        let consult = self
            .lines
            .consult_line()
            .filter(|l| l.id() != call_id)
            .map(|l| (l.id().to_string(), l.call_info().clone()));

        let change = self
            .lines
            .line_for_call(&info)
            .apply(state, info, data.clone());
        let is_current = self.lines.current_line_id() == Some(call_id.as_str());

        // Screen pop accompanies every applied transition, any line, any
        // state, unless one of the suppression predicates holds
        if !screen_pop_suppressed(call_type, &data) {
            events.push(PhoneBarEvent::ScreenPop {
                line_state: state,
                call_info: change.call_info.clone(),
            });
        }

        match state {
            LineState::Dialing | LineState::Ringing => {
                if is_current {
                    self.transition(AgentState::Ringing, events);
                    events.push(PhoneBarEvent::Ringing {
                        call_info: change.call_info.clone(),
                        data: data.clone(),
                    });
                }
            }
            LineState::Talking => {
                if call_type == CallType::Consult && data.party_state == Some(party_state::TALK) {
                    if data.this_role == Some(1)
                        && data.other_role == Some(2)
                        && had_primary
                        && !is_current
                    {
                        // The leg this agent consulted out on came up
                        events.push(PhoneBarEvent::ConsultAnswered {
                            call_info: change.call_info.clone(),
                        });
                    } else if data.this_role == Some(2) && data.other_role == Some(1) {
                        // This agent is the consulted side
                        events.push(PhoneBarEvent::ConsultCalled {
                            call_info: change.call_info.clone(),
                        });
                    }
                }
                if is_current {
                    self.transition(AgentState::Talking, events);
                    events.push(PhoneBarEvent::Talking {
                        call_info: change.call_info.clone(),
                        data: data.clone(),
                    });
                }
            }
            LineState::Held => {
                // Presence stays Talking while the current line is held
            }
            LineState::Idle => {
                let send_by = data.send_by.clone();
                let mut promote_to = None;

                if call_type == CallType::Consult
                    && !send_by.is_empty()
                    && change.call_info.other_dn == send_by
                    && data.third_dn == send_by
                {
                    // The consulted party hung up before the transfer
                    // completed
                    let internal = send_by.len() == INTERNAL_EXTENSION_LEN;
                    events.push(PhoneBarEvent::ConsultPartyHangup {
                        party: send_by.clone(),
                        internal,
                    });
                    let advisory = if internal {
                        format!("Consulted agent {send_by} hung up")
                    } else {
                        format!("Consulted party {send_by} hung up")
                    };
                    events.push(PhoneBarEvent::Advisory(advisory));
                } else if matches!(call_type, CallType::Inbound | CallType::Outbound)
                    && !send_by.is_empty()
                    && change.call_info.other_dn == send_by
                    && !data.third_dn.is_empty()
                {
                    if let Some((consult_id, consult_info)) = consult {
                        // Customer dropped while a consult leg is live; the
                        // consult leg takes over as current
                        events.push(PhoneBarEvent::CustomerHangupDuringConsult {
                            call_info: consult_info,
                        });
                        promote_to = Some(consult_id);
                    }
                }

                if is_current {
                    events.push(PhoneBarEvent::Hangup {
                        call_info: change.call_info.clone(),
                        data: data.clone(),
                    });
                    // Server echoes this back and the echo moves presence
                    // into wrap-up
                    commands.push(request_frame(
                        &self.identity,
                        MessageId::RequestAgentNotReady,
                        json!({ "reason": reason::NEATENING }),
                    ));
                }

                self.lines.remove(&call_id);
                if let Some(id) = promote_to {
                    self.lines.set_current_line(&id);
                }
            }
        }
    }

    /// Reconcile the server's auto-ready-after-work configuration (3103)
    /// against the local preference.
    fn reconcile_auto_ready(
        &mut self,
        frame: &Value,
        events: &mut Vec<PhoneBarEvent>,
        commands: &mut Vec<Value>,
    ) {
        let server_enabled = frame
            .get("autoSavePopup")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let server_max = frame
            .get("maxAfterworkTime")
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .max(0) as u64;

        let enabled = match self.agent_config.auto_idle_when_after_work {
            None => {
                self.agent_config.auto_idle_when_after_work = Some(server_enabled);
                server_enabled
            }
            Some(local) => {
                if local != server_enabled && server_max != 0 {
                    commands.push(request_frame(
                        &self.identity,
                        MessageId::RequestAutoReadyConfig,
                        json!({ "autoSavePopup": local }),
                    ));
                }
                local
            }
        };

        if enabled {
            if server_max == 0 {
                if !self.auto_ready_advisory_shown {
                    self.auto_ready_advisory_shown = true;
                    events.push(PhoneBarEvent::Advisory(
                        "Auto-ready after wrap-up is not provisioned for this tenant".to_string(),
                    ));
                }
            } else {
                self.agent_config.max_after_work_secs = server_max;
            }
        } else {
            self.agent_config.max_after_work_secs = 0;
        }

        if let Some(list) = frame.get("agentStateExtList") {
            match serde_json::from_value::<Vec<CustomReason>>(list.clone()) {
                Ok(reasons) => self.registry.merge_remote(&reasons),
                Err(e) => warn!("unreadable agentStateExtList: {}", e),
            }
        }
    }
}

fn string_field(frame: &Value, key: &str) -> String {
    frame
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn screen_pop_suppressed(call_type: CallType, data: &LineEventData) -> bool {
    data.this_role == Some(SUPERVISOR_ROLE)
        || call_type == CallType::Internal
        || data.has_third_party_role()
}

fn default_reason(state: AgentState) -> i64 {
    match state {
        AgentState::Busy => reason::BUSY,
        AgentState::Rest => reason::REST,
        AgentState::Neatening => reason::NEATENING,
        AgentState::Talking => reason::TALKING,
        AgentState::Ringing => reason::RINGING,
        AgentState::Reason1 => reason::REASON1,
        AgentState::Reason2 => reason::REASON2,
        AgentState::Reason3 => reason::REASON3,
        AgentState::Reason4 => reason::REASON4,
        AgentState::Reason5 => reason::REASON5,
        AgentState::Reason7 => reason::REASON7,
        AgentState::Offline | AgentState::Ready => reason::UNKNOWN,
    }
}

/// One agent session: transport, dispatcher, policy tick, keep-alive.
pub struct CtiSession {
    session_id: Uuid,
    core: Arc<Mutex<SessionCore>>,
    transport: Arc<CtiTransport>,
    api: AgentApi,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CtiSession {
    pub fn new(config: PhoneBarConfig) -> Self {
        let identity = Arc::new(config.identity);
        let transport = Arc::new(CtiTransport::new(config.connection));
        let api = AgentApi::new(identity.clone(), transport.clone());
        let core = Arc::new(Mutex::new(SessionCore::new(identity, config.agent)));
        Self {
            session_id: Uuid::new_v4(),
            core,
            transport,
            api,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn core(&self) -> Result<MutexGuard<'_, SessionCore>> {
        self.core
            .lock()
            .map_err(|_| PhoneBarError::Internal("session state lock poisoned".to_string()))
    }

    /// Open the CTI channel and start the frame pump and the 1 s policy
    /// tick. Returns the event stream for this session.
    pub fn open(&self) -> Result<mpsc::Receiver<PhoneBarEvent>> {
        info!(session = %self.session_id, "opening CTI session");
        let event_rx = self.core()?.hub.subscribe_channel(256);

        let (transport_tx, mut transport_rx) = mpsc::channel(64);
        self.transport.open(transport_tx)?;

        let core = self.core.clone();
        let transport = self.transport.clone();
        let pump = tokio::spawn(async move {
            while let Some(item) = transport_rx.recv().await {
                let reconnected = matches!(item, TransportEvent::Connected);
                let commands = {
                    let Ok(mut core) = core.lock() else { break };
                    let (events, commands) = core.apply_transport_event(item);
                    core.publish(&events);
                    commands
                };
                if reconnected {
                    let ping_transport = transport.clone();
                    transport.start_keep_alive(
                        false,
                        Arc::new(move || {
                            let t = ping_transport.clone();
                            tokio::spawn(async move {
                                if let Err(e) = t.send(&ping_frame()).await {
                                    debug!("keep-alive ping failed: {}", e);
                                }
                            });
                        }),
                    );
                }
                for command in commands {
                    if let Err(e) = transport.send(&command).await {
                        warn!("failed to send command frame: {}", e);
                    }
                }
            }
        });

        let core = self.core.clone();
        let transport = self.transport.clone();
        let tick = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let commands = {
                    let Ok(mut core) = core.lock() else { break };
                    let (events, commands) = core.tick();
                    core.publish(&events);
                    commands
                };
                for command in commands {
                    if let Err(e) = transport.send(&command).await {
                        debug!("tick command not sent: {}", e);
                    }
                }
            }
        });

        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| PhoneBarError::Internal("task list lock poisoned".to_string()))?;
        tasks.push(pump);
        tasks.push(tick);
        Ok(event_rx)
    }

    /// The outbound command surface, shareable across tasks.
    pub fn agent_api(&self) -> AgentApi {
        self.api.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    pub fn subscribe<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: FnMut(&PhoneBarEvent) + Send + 'static,
    {
        Ok(self.core()?.hub.subscribe(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.core()?.hub.unsubscribe(id);
        Ok(())
    }

    pub fn subscribe_channel(&self, buffer: usize) -> Result<mpsc::Receiver<PhoneBarEvent>> {
        Ok(self.core()?.hub.subscribe_channel(buffer))
    }

    pub fn agent_state(&self) -> Result<AgentState> {
        Ok(self.core()?.agent_state())
    }

    pub fn state_name(&self) -> Result<String> {
        Ok(self.core()?.state_name())
    }

    pub fn device_state(&self) -> Result<DeviceState> {
        Ok(self.core()?.device_state())
    }

    pub fn current_call(&self) -> Result<Option<CallInfo>> {
        Ok(self.core()?.current_call())
    }

    pub fn working_line_count(&self) -> Result<usize> {
        Ok(self.core()?.working_line_count())
    }

    /// Switch the agent's presence by hand.
    ///
    /// Validated locally before anything is sent: the agent must be logged
    /// in, the target state must be hand-selectable, and no line may be
    /// working.
    pub async fn set_presence(&self, state: AgentState) -> Result<()> {
        let reason_code = {
            let core = self.core()?;
            if core.agent_state() == AgentState::Offline {
                return Err(PhoneBarError::Rejected(
                    "agent is offline, log in first".to_string(),
                ));
            }
            if !state.is_selectable() {
                return Err(PhoneBarError::InvalidState(format!(
                    "{state} cannot be selected by hand"
                )));
            }
            if core.working_line_count() > 0 {
                return Err(PhoneBarError::Rejected(
                    "state change refused while a call is in progress".to_string(),
                ));
            }
            if state == AgentState::Ready {
                None
            } else {
                Some(
                    core.registry
                        .raw_state(state)
                        .map(|d| d.reason)
                        .unwrap_or_else(|| default_reason(state)),
                )
            }
        };
        match reason_code {
            None => self.api.agent_ready().await,
            Some(code) => self.api.agent_not_ready(code).await,
        }
    }

    /// Dispatch one frame directly, bypassing the transport. Returns the
    /// command frames the dispatcher produced.
    pub fn handle_frame(&self, frame: &Value) -> Result<Vec<Value>> {
        let mut core = self.core()?;
        let (events, commands) = core.apply_frame(frame);
        core.publish(&events);
        Ok(commands)
    }

    /// Log out and tear the session down. Safe to call multiple times.
    pub async fn close(&self) {
        if self.transport.is_open() {
            if let Err(e) = self.api.agent_logout().await {
                debug!("logout on close failed: {}", e);
            }
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.transport.stop_keep_alive();
        self.transport.close();
    }
}
