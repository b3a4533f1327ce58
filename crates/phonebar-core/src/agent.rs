//! Agent presence state machine and the custom-reason registry.
//!
//! The server's raw presence model is two-layered: a coarse raw state
//! (offline / ready / not-ready) plus a numeric not-ready reason code. The
//! local model flattens that into one closed enum so consumers deal with a
//! single value. Conversions between the two are total in both directions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::timer::StateTimer;

/// Raw presence state as reported by the CTI server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawAgentState {
    Offline,
    Ready,
    NotReady,
}

impl RawAgentState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RawAgentState::Offline),
            1 => Some(RawAgentState::Ready),
            2 => Some(RawAgentState::NotReady),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            RawAgentState::Offline => 0,
            RawAgentState::Ready => 1,
            RawAgentState::NotReady => 2,
        }
    }
}

/// Not-ready reason codes carried alongside [`RawAgentState::NotReady`].
pub mod reason {
    pub const UNKNOWN: i64 = -1;
    pub const NEATENING: i64 = 0;
    pub const TALKING: i64 = 1;
    pub const DEVICE_UNAVAILABLE: i64 = 2;
    pub const BUSY: i64 = 3;
    pub const WALK_AWAY: i64 = 4;
    pub const REST: i64 = 5;
    pub const RINGING: i64 = 6;
    pub const REASON1: i64 = 11;
    pub const REASON2: i64 = 12;
    pub const REASON3: i64 = 13;
    pub const REASON4: i64 = 14;
    pub const REASON5: i64 = 15;
    pub const REASON7: i64 = 17;

    /// Reason codes whose display names may be customized, locally or by a
    /// server push. Pushes must never extend this set.
    pub const CUSTOMIZABLE: [i64; 8] = [BUSY, REST, REASON1, REASON2, REASON3, REASON4, REASON5, REASON7];
}

/// Local agent presence state. `Offline` is the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Offline,
    Ready,
    Busy,
    Rest,
    /// After-call wrap-up work.
    Neatening,
    Talking,
    Ringing,
    Reason1,
    Reason2,
    Reason3,
    Reason4,
    Reason5,
    Reason7,
}

impl AgentState {
    /// States the agent may switch to by hand (everything driven by call
    /// activity or login lifecycle is excluded).
    pub fn is_selectable(self) -> bool {
        matches!(
            self,
            AgentState::Ready
                | AgentState::Busy
                | AgentState::Rest
                | AgentState::Reason1
                | AgentState::Reason2
                | AgentState::Reason3
                | AgentState::Reason4
                | AgentState::Reason5
                | AgentState::Reason7
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Offline => "offline",
            AgentState::Ready => "ready",
            AgentState::Busy => "busy",
            AgentState::Rest => "rest",
            AgentState::Neatening => "neatening",
            AgentState::Talking => "talking",
            AgentState::Ringing => "ringing",
            AgentState::Reason1 => "reason1",
            AgentState::Reason2 => "reason2",
            AgentState::Reason3 => "reason3",
            AgentState::Reason4 => "reason4",
            AgentState::Reason5 => "reason5",
            AgentState::Reason7 => "reason7",
        };
        write!(f, "{s}")
    }
}

/// SIP device registration state, independent of presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Registered,
    Unregistered,
}

/// Registry entry: how one local state maps back to the wire and how it is
/// displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDescriptor {
    pub name: String,
    pub raw_state: RawAgentState,
    pub reason: i64,
    #[serde(default)]
    pub color: Option<String>,
}

/// A locally or remotely supplied display-name override for a not-ready
/// reason code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomReason {
    #[serde(alias = "reasonCode")]
    pub code: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    /// Remote pushes may address an existing entry by its local state key
    /// instead of a reason code.
    #[serde(default)]
    pub key: Option<String>,
}

/// Per-session table of state descriptors.
///
/// Owned by the session and passed by reference to whoever needs display
/// names, so multiple sessions in one process never cross-contaminate
/// custom reason names.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    entries: HashMap<AgentState, StateDescriptor>,
}

impl StateRegistry {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        let mut seed = |state: AgentState, name: &str, raw: RawAgentState, reason_code: i64| {
            entries.insert(
                state,
                StateDescriptor {
                    name: name.to_string(),
                    raw_state: raw,
                    reason: reason_code,
                    color: None,
                },
            );
        };
        seed(AgentState::Offline, "Offline", RawAgentState::Offline, reason::UNKNOWN);
        seed(AgentState::Ready, "Ready", RawAgentState::Ready, reason::UNKNOWN);
        seed(AgentState::Busy, "Busy", RawAgentState::NotReady, reason::BUSY);
        seed(AgentState::Rest, "Rest", RawAgentState::NotReady, reason::REST);
        seed(AgentState::Neatening, "Wrap-up", RawAgentState::NotReady, reason::NEATENING);
        seed(AgentState::Talking, "Talking", RawAgentState::NotReady, reason::TALKING);
        seed(AgentState::Ringing, "Ringing", RawAgentState::NotReady, reason::RINGING);
        Self { entries }
    }

    /// Local state addressed by a customizable reason code.
    pub fn state_for_custom_code(code: i64) -> Option<AgentState> {
        match code {
            reason::BUSY => Some(AgentState::Busy),
            reason::REST => Some(AgentState::Rest),
            reason::REASON1 => Some(AgentState::Reason1),
            reason::REASON2 => Some(AgentState::Reason2),
            reason::REASON3 => Some(AgentState::Reason3),
            reason::REASON4 => Some(AgentState::Reason4),
            reason::REASON5 => Some(AgentState::Reason5),
            reason::REASON7 => Some(AgentState::Reason7),
            _ => None,
        }
    }

    /// Merge the static local override list, seeded at construction time.
    pub fn apply_custom_reasons(&mut self, reasons: &[CustomReason]) {
        for item in reasons {
            let Some(state) = Self::state_for_custom_code(item.code) else {
                tracing::warn!(code = item.code, "ignoring custom reason outside the fixed set");
                continue;
            };
            self.entries.insert(
                state,
                StateDescriptor {
                    name: item.name.clone(),
                    raw_state: RawAgentState::NotReady,
                    reason: item.code,
                    color: item.color.clone(),
                },
            );
        }
    }

    /// Merge a server-pushed override list. A push may rename an existing
    /// entry (addressed by key) but must never introduce a reason code
    /// outside the fixed set.
    pub fn merge_remote(&mut self, reasons: &[CustomReason]) {
        for item in reasons {
            match Self::state_for_custom_code(item.code) {
                Some(state) => {
                    self.entries.insert(
                        state,
                        StateDescriptor {
                            name: item.name.clone(),
                            raw_state: RawAgentState::NotReady,
                            reason: item.code,
                            color: item.color.clone(),
                        },
                    );
                }
                None => {
                    // Unknown code: rename-only, addressed by state key.
                    if let Some(state) = item.key.as_deref().and_then(state_from_key) {
                        if let Some(entry) = self.entries.get_mut(&state) {
                            entry.name = item.name.clone();
                        }
                    }
                }
            }
        }
    }

    /// Convert a raw server presence pair into the local state. Total:
    /// unrecognized reasons under `NotReady` default to `Busy`.
    pub fn local_state(raw: RawAgentState, reason_code: i64) -> AgentState {
        match raw {
            RawAgentState::Ready => AgentState::Ready,
            RawAgentState::Offline => AgentState::Offline,
            RawAgentState::NotReady => match reason_code {
                reason::NEATENING => AgentState::Neatening,
                reason::TALKING => AgentState::Talking,
                reason::BUSY => AgentState::Busy,
                reason::REST => AgentState::Rest,
                reason::RINGING => AgentState::Ringing,
                reason::REASON1 => AgentState::Reason1,
                reason::REASON2 => AgentState::Reason2,
                reason::REASON3 => AgentState::Reason3,
                reason::REASON4 => AgentState::Reason4,
                reason::REASON5 => AgentState::Reason5,
                reason::REASON7 => AgentState::Reason7,
                _ => AgentState::Busy,
            },
        }
    }

    /// Reverse lookup. Returns `None` for local states without a dictionary
    /// entry (custom reason states that were never configured); never panics.
    pub fn raw_state(&self, state: AgentState) -> Option<&StateDescriptor> {
        self.entries.get(&state)
    }

    /// Display name for a state, empty when the state has no entry.
    pub fn state_name(&self, state: AgentState) -> &str {
        self.entries
            .get(&state)
            .map(|d| d.name.as_str())
            .unwrap_or("")
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn state_from_key(key: &str) -> Option<AgentState> {
    serde_json::from_value(serde_json::Value::String(key.to_string())).ok()
}

/// An applied presence transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStateChange {
    pub new_state: AgentState,
    pub previous: AgentState,
}

/// Outcome of asserting a device state.
#[derive(Debug, Clone, Default)]
pub struct DeviceStateOutcome {
    /// Set when the device state actually changed.
    pub changed: Option<DeviceState>,
    /// Human advisory to surface, if any.
    pub advisory: Option<String>,
}

/// One agent's presence: identity, current state, device state, and the
/// elapsed-state timer.
///
/// Mutated only by the session dispatcher (inbound events) or explicit local
/// commands. Every applied transition restarts the timer; re-asserting the
/// current state is a no-op.
#[derive(Debug)]
pub struct AgentPresence {
    tenant_id: String,
    this_dn: String,
    pstn_dn: Option<String>,
    agent_id: String,
    queues: Vec<String>,
    default_queue: String,

    state: AgentState,
    device_state: DeviceState,
    pub state_timer: StateTimer,
}

impl AgentPresence {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: impl Into<String>,
        this_dn: impl Into<String>,
        pstn_dn: Option<String>,
        agent_id: impl Into<String>,
        queues: Vec<String>,
        default_queue: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            this_dn: this_dn.into(),
            pstn_dn,
            agent_id: agent_id.into(),
            queues,
            default_queue: default_queue.into(),
            state: AgentState::Offline,
            device_state: DeviceState::Registered,
            state_timer: StateTimer::start(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn this_dn(&self) -> &str {
        &self.this_dn
    }

    pub fn pstn_dn(&self) -> Option<&str> {
        self.pstn_dn.as_deref()
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub fn default_queue(&self) -> &str {
        &self.default_queue
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn device_state(&self) -> DeviceState {
        self.device_state
    }

    /// Apply a presence transition. Returns the change when the new state
    /// differs from the current one; a repeat assertion returns `None` and
    /// leaves the timer running.
    pub fn set_state(&mut self, state: AgentState) -> Option<AgentStateChange> {
        if self.state == state {
            return None;
        }
        let previous = self.state;
        self.state = state;
        self.state_timer.restart();
        tracing::debug!(%state, %previous, "agent state changed");
        Some(AgentStateChange {
            new_state: state,
            previous,
        })
    }

    /// Assert the device state. Unregistered always raises the log-in-your-
    /// device advisory; the change itself (and the registered advisory) only
    /// fire on an actual edge. Does not touch the presence timer.
    pub fn set_device_state(&mut self, device_state: DeviceState) -> DeviceStateOutcome {
        let mut outcome = DeviceStateOutcome::default();
        if device_state == DeviceState::Unregistered {
            outcome.advisory =
                Some("Please log in your SIP device and refresh the agent state".to_string());
        } else if self.device_state != device_state {
            outcome.advisory = Some("SIP device registered".to_string());
        }
        if self.device_state != device_state {
            self.device_state = device_state;
            outcome.changed = Some(device_state);
        }
        outcome
    }
}
