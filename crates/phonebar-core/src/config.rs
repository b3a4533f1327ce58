//! Session configuration.
//!
//! Everything the transport and session need is passed in explicitly here;
//! there are no process-wide defaults baked into the components themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::CustomReason;

/// Connection-level settings for the CTI channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base server URL, e.g. `ws://cti.example.com:8787`.
    pub url: String,
    pub username: String,
    /// Bearer credential appended as `access_token`. Opening with an empty
    /// token is a configuration error and no connection is attempted.
    pub token: String,
    /// Open the channel at session construction.
    pub auto_connect: bool,
    /// Application-level keep-alive ping interval.
    #[serde(with = "duration_millis")]
    pub keep_alive_interval: Duration,
    /// Fixed delay between reconnection attempts.
    #[serde(with = "duration_millis")]
    pub reconnect_delay: Duration,
    /// Maximum inbound silence before the connection is treated as dead
    /// and reconnected.
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    /// Constrained mobile embedding: excludes the plain WebSocket upgrade
    /// from the transport fallback policy.
    pub mobile_client: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787".to_string(),
            username: String::new(),
            token: String::new(),
            auto_connect: true,
            keep_alive_interval: Duration::from_millis(20_000),
            reconnect_delay: Duration::from_millis(4_000),
            heartbeat_interval: Duration::from_millis(61_000),
            mobile_client: false,
        }
    }
}

/// Who the agent is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Tenant id.
    pub tid: String,
    /// Extension number.
    pub this_dn: String,
    pub pstn_dn: Option<String>,
    /// Agent id, matches the extension on this platform.
    pub agent_id: String,
    /// Assigned skill queues.
    pub this_queues: Vec<String>,
    /// Sign-in queue, one of `this_queues`.
    pub default_queue: String,
}

/// Behavior preferences for the agent state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tip every N minutes a state has been held; 0 disables.
    pub tip_time_minutes: u64,
    /// Auto-ready after wrap-up. `None` means "adopt the server's setting".
    pub auto_idle_when_after_work: Option<bool>,
    /// Maximum wrap-up duration in seconds before auto-ready; 0 disables.
    pub max_after_work_secs: u64,
    /// Go ready right after login.
    pub auto_idle_when_login: bool,
    /// Agent answers on a mobile phone instead of the SIP device.
    pub is_phone_take_along: bool,
    pub work_phone: String,
    pub auto_answer: bool,
    /// Local display-name overrides for not-ready reasons.
    pub custom_not_ready_reasons: Vec<CustomReason>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tip_time_minutes: 0,
            auto_idle_when_after_work: None,
            max_after_work_secs: 0,
            auto_idle_when_login: true,
            is_phone_take_along: false,
            work_phone: String::new(),
            auto_answer: false,
            custom_not_ready_reasons: Vec::new(),
        }
    }
}

/// Full session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhoneBarConfig {
    pub connection: ConnectionConfig,
    pub identity: IdentityConfig,
    pub agent: AgentConfig,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
