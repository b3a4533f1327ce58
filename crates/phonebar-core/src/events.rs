//! Typed event surface and the subscription hub.
//!
//! Stateful components never call consumers directly; the session fans every
//! change out through [`EventHub`]. Handlers run synchronously, to
//! completion, in dispatch order, so one inbound frame is fully handled
//! before the next is looked at. A channel bridge is provided for consumers
//! that prefer pulling from an `mpsc::Receiver`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::{AgentState, DeviceState};
use crate::line::{CallInfo, LineEventData, LineState};

/// Why the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Close code 1002: the server could not be reached.
    NetworkUnreachable,
    /// Close code 2000: the credential was rejected.
    CredentialRejected,
    Generic,
}

impl CloseReason {
    pub fn from_close_code(code: u16) -> Self {
        match code {
            1002 => CloseReason::NetworkUnreachable,
            2000 => CloseReason::CredentialRejected,
            _ => CloseReason::Generic,
        }
    }
}

/// Everything a consumer can observe from a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PhoneBarEvent {
    /// Transport connected (CTI login is sent right after).
    Connected,
    /// Transport closed; reconnection is automatic.
    Disconnected(CloseReason),
    /// Server dropped the CTI link.
    LinkDisconnected(Value),

    AgentStateChanged {
        new_state: AgentState,
        previous: AgentState,
    },
    DeviceStateChanged(DeviceState),
    /// Human-readable notice (device registration, state tips, consult
    /// hangups, configuration advisories).
    Advisory(String),

    Ringing {
        call_info: CallInfo,
        data: LineEventData,
    },
    Talking {
        call_info: CallInfo,
        data: LineEventData,
    },
    Hangup {
        call_info: CallInfo,
        data: LineEventData,
    },
    ScreenPop {
        line_state: LineState,
        call_info: CallInfo,
    },

    /// Two-step transfer: the consulted party answered; this agent
    /// initiated the consult.
    ConsultAnswered { call_info: CallInfo },
    /// Two-step transfer: the consulted party answered; this agent is the
    /// consulted side.
    ConsultCalled { call_info: CallInfo },
    /// Two-step transfer: the consulted party hung up before completion.
    ConsultPartyHangup {
        party: String,
        /// Whether the hung-up identifier is an internal extension.
        internal: bool,
    },
    /// The customer hung up while a consult line was still active; the
    /// consult line has been promoted to current.
    CustomerHangupDuringConsult { call_info: CallInfo },

    ThreeWayJoined { other_dn: String, call_id: String },
    ThreeWayLeft { other_dn: String },

    /// Queue position update for a queued call.
    QueueUpdate(Value),
    ResetQueues(Value),
    QueueListUpdate(Value),
    TransferAgentListUpdate(Value),
    ConferenceInfoUpdate(Value),
    TransferMenuList(Value),
    ConferenceMenuList(Value),
    UserInputCompleted(Value),

    /// Message id not present in the protocol table; payload preserved for
    /// forward compatibility.
    Unrecognized { message_id: i64, payload: Value },
    /// Malformed frame or server-side error event.
    ProtocolError(String),
}

/// Handle returned by [`EventHub::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&PhoneBarEvent) + Send>;

/// Register/unregister-style publish/subscribe with synchronous dispatch.
#[derive(Default)]
pub struct EventHub {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
    channels: Vec<mpsc::Sender<PhoneBarEvent>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every event. Handlers run to completion, in
    /// registration order, before the next event is dispatched.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&PhoneBarEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Unknown ids are a no-op.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.handlers.retain(|(h, _)| *h != id);
    }

    /// Channel-bridge subscription: events are cloned into the returned
    /// receiver. A full or dropped receiver never blocks dispatch.
    pub fn subscribe_channel(&mut self, buffer: usize) -> mpsc::Receiver<PhoneBarEvent> {
        let (tx, rx) = mpsc::channel(buffer);
        self.channels.push(tx);
        rx
    }

    pub fn emit(&mut self, event: &PhoneBarEvent) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
        self.channels
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("event channel full, dropping event for slow subscriber");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.handlers.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
