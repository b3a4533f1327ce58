//! PhoneBar Core - types and state machines for the CTI agent SDK
//!
//! This crate holds everything that does not touch the network: the message
//! protocol table, the agent presence state machine, the call-line pool, the
//! state timer, configuration, and the typed event surface. The transport and
//! dispatcher live in `phonebar-cti`.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod line;
pub mod message;
pub mod pool;
pub mod timer;

pub use agent::{
    AgentPresence, AgentState, AgentStateChange, CustomReason, DeviceState, RawAgentState,
    StateDescriptor, StateRegistry,
};
pub use config::{AgentConfig, ConnectionConfig, IdentityConfig, PhoneBarConfig};
pub use error::{PhoneBarError, Result};
pub use events::{CloseReason, EventHub, PhoneBarEvent, SubscriptionId};
pub use line::{CallInfo, CallType, Line, LineChange, LineEventData, LineState};
pub use message::{Direction, MessageId, MESSAGE_ID_FIELD};
pub use pool::LinePool;
pub use timer::StateTimer;
