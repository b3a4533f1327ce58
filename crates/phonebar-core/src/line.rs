//! Per-line call state machine.
//!
//! A line is one concurrently tracked call leg. Its state machine is
//! `idle -> dialing -> ringing -> talking <-> held -> idle`, with hangup from
//! either party dropping any state straight to `idle`. Every transition
//! carries the previous call-info snapshot and the raw delta payload so
//! subscribers can tell "this call" from "other call" without re-deriving
//! roles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-line call state. `Idle` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineState {
    Idle,
    Dialing,
    Ringing,
    Talking,
    Held,
}

/// Call classification, numeric on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Internal,
    Inbound,
    Outbound,
    /// Second leg of a two-step transfer.
    Consult,
}

impl CallType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(CallType::Internal),
            2 => Some(CallType::Inbound),
            3 => Some(CallType::Outbound),
            4 => Some(CallType::Consult),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            CallType::Internal => 1,
            CallType::Inbound => 2,
            CallType::Outbound => 3,
            CallType::Consult => 4,
        }
    }
}

/// Party-state markers inside the delta payload.
pub mod party_state {
    pub const RING: i64 = 1;
    pub const TALK: i64 = 2;
    pub const HELD: i64 = 3;
    pub const DROPPED: i64 = 4;
}

/// The supervisory role marker that suppresses screen pops.
pub const SUPERVISOR_ROLE: i64 = 5;

/// Attach-data key flagging a third-party role on the call.
pub const THIRD_PARTY_ROLE_KEY: &str = "variable_thirdPartyRole";

/// Length of an internal extension identifier.
pub const INTERNAL_EXTENSION_LEN: usize = 9;

/// Call metadata carried by a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    #[serde(rename = "callID")]
    pub call_id: String,
    pub call_type: CallType,
    /// Far-end number.
    #[serde(rename = "otherDN", default)]
    pub other_dn: String,
    #[serde(rename = "thisQueue", default)]
    pub this_queue: String,
    /// Attached business data, key-value.
    #[serde(default)]
    pub attach_data: HashMap<String, Value>,
}

impl CallInfo {
    pub fn new(call_id: impl Into<String>, call_type: CallType) -> Self {
        Self {
            call_id: call_id.into(),
            call_type,
            other_dn: String::new(),
            this_queue: String::new(),
            attach_data: HashMap::new(),
        }
    }
}

/// Raw delta payload accompanying a line transition: role markers, which
/// party sent the event, and attached data. Forwarded verbatim to
/// subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineEventData {
    #[serde(rename = "partyState", default)]
    pub party_state: Option<i64>,
    #[serde(rename = "thisRole", default)]
    pub this_role: Option<i64>,
    #[serde(rename = "otherRole", default)]
    pub other_role: Option<i64>,
    /// Identifier of the party that sent the event.
    #[serde(rename = "sendBy", default)]
    pub send_by: String,
    #[serde(rename = "thirdDN", default)]
    pub third_dn: String,
    #[serde(rename = "attachDatas", default)]
    pub attach_datas: HashMap<String, Value>,
}

impl LineEventData {
    /// Whether the payload marks a third party on the call.
    pub fn has_third_party_role(&self) -> bool {
        self.attach_datas
            .get(THIRD_PARTY_ROLE_KEY)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }
}

/// An applied line transition, with the pre-transition call-info snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineChange {
    pub line_id: String,
    pub state: LineState,
    /// Call info as it was before this transition was applied.
    pub previous_info: CallInfo,
    /// Call info after the transition.
    pub call_info: CallInfo,
    pub data: LineEventData,
}

/// One tracked call leg.
#[derive(Debug, Clone)]
pub struct Line {
    id: String,
    state: LineState,
    call_info: CallInfo,
}

impl Line {
    pub fn new(call_info: CallInfo) -> Self {
        Self {
            id: call_info.call_id.clone(),
            state: LineState::Idle,
            call_info,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> LineState {
        self.state
    }

    pub fn call_info(&self) -> &CallInfo {
        &self.call_info
    }

    /// Apply a transition, merging updated call info and attach data, and
    /// return the change record (previous snapshot + delta included).
    pub fn apply(
        &mut self,
        state: LineState,
        info: CallInfo,
        data: LineEventData,
    ) -> LineChange {
        let previous_info = self.call_info.clone();
        self.state = state;
        self.call_info = info;
        for (k, v) in &data.attach_datas {
            self.call_info.attach_data.insert(k.clone(), v.clone());
        }
        LineChange {
            line_id: self.id.clone(),
            state,
            previous_info,
            call_info: self.call_info.clone(),
            data,
        }
    }

    /// Merge attach data without a state transition (attached-data-changed
    /// events).
    pub fn merge_attach_data(&mut self, data: &HashMap<String, Value>) {
        for (k, v) in data {
            self.call_info.attach_data.insert(k.clone(), v.clone());
        }
    }
}
