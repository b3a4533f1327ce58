//! Outbound sink seam between the agent API and the transport.

use async_trait::async_trait;
use serde_json::Value;

use phonebar_core::Result;

/// Where outbound request frames go. The production implementation is the
/// reconnecting transport; tests substitute a recording sink.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Publish one request frame. Must fail with an invalid-state error,
    /// not silently drop, when no connection is established.
    async fn send(&self, message: Value) -> Result<()>;

    /// Current connectivity.
    fn is_open(&self) -> bool;
}
