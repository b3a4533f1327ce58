//! PhoneBar CTI - transport, session dispatcher and agent API
//!
//! Connects the pure state machines in `phonebar-core` to a CTI server:
//! a reconnecting WebSocket transport with keep-alive, the session
//! dispatcher that applies inbound frames to presence and lines, and the
//! fire-and-forget outbound command surface.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod session;
pub mod sink;
pub mod transport;

pub use api::AgentApi;
pub use session::{CtiSession, SessionCore};
pub use sink::OutboundSink;
pub use transport::{CtiTransport, KeepAlive, TransportEvent, TransportMode};

// Re-export the core surface so embedders depend on one crate.
pub use phonebar_core::{
    AgentState, CallInfo, CallType, CloseReason, DeviceState, LineState, MessageId, PhoneBarConfig,
    PhoneBarError, PhoneBarEvent, Result,
};
