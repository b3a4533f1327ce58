//! Outbound command surface (the "Agent API").
//!
//! Every method builds a fixed-shape JSON request carrying the message id
//! and the session's identity fields, then hands it to the outbound sink.
//! Nothing here waits for a reply; server acknowledgements arrive later as
//! their own events and are handled by the dispatcher.

use std::sync::Arc;

use serde_json::{json, Value};

use phonebar_core::line::CallType;
use phonebar_core::{IdentityConfig, MessageId, Result, MESSAGE_ID_FIELD};

use crate::sink::OutboundSink;

/// Build a request frame: message id plus the agent's identity fields,
/// merged with command-specific fields.
pub(crate) fn request_frame(identity: &IdentityConfig, id: MessageId, extra: Value) -> Value {
    let mut frame = json!({
        MESSAGE_ID_FIELD: id.code(),
        "thisDN": identity.this_dn,
        "agentID": identity.agent_id,
    });
    if let (Some(obj), Some(extra)) = (frame.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    frame
}

/// Application-level keep-alive ping. The server echoes the same id back.
pub(crate) fn ping_frame() -> Value {
    json!({ MESSAGE_ID_FIELD: MessageId::RequestPing.code() })
}

/// Fire-and-forget command surface for one agent session.
#[derive(Clone)]
pub struct AgentApi {
    identity: Arc<IdentityConfig>,
    sink: Arc<dyn OutboundSink>,
}

impl AgentApi {
    pub fn new(identity: Arc<IdentityConfig>, sink: Arc<dyn OutboundSink>) -> Self {
        Self { identity, sink }
    }

    pub(crate) async fn send(&self, id: MessageId, extra: Value) -> Result<()> {
        self.sink
            .send(request_frame(&self.identity, id, extra))
            .await
    }

    /// Log the agent in to the CTI server. Sent automatically on every
    /// (re)connect.
    pub async fn agent_login(&self) -> Result<()> {
        let extra = json!({
            "tid": self.identity.tid,
            "pstnDN": self.identity.pstn_dn,
            "thisQueues": self.identity.this_queues,
            "defaultQueue": self.identity.default_queue,
        });
        self.send(MessageId::RequestAgentLogin, extra).await
    }

    pub async fn agent_logout(&self) -> Result<()> {
        self.send(MessageId::RequestAgentLogout, json!({})).await
    }

    pub async fn agent_ready(&self) -> Result<()> {
        self.send(MessageId::RequestAgentReady, json!({})).await
    }

    /// Switch to a not-ready state. `reason` is one of the
    /// [`phonebar_core::agent::reason`] codes.
    pub async fn agent_not_ready(&self, reason: i64) -> Result<()> {
        self.send(MessageId::RequestAgentNotReady, json!({ "reason": reason }))
            .await
    }

    /// Dial out. `queue` defaults to the sign-in queue.
    pub async fn make_call(
        &self,
        dest: &str,
        call_type: CallType,
        queue: Option<&str>,
    ) -> Result<()> {
        let extra = json!({
            "otherDN": dest,
            "callType": call_type.code(),
            "thisQueue": queue.unwrap_or(&self.identity.default_queue),
        });
        self.send(MessageId::RequestMakeCall, extra).await
    }

    pub async fn answer_call(&self) -> Result<()> {
        self.send(MessageId::RequestAnswerCall, json!({})).await
    }

    /// Answer a call still waiting in a queue.
    pub async fn answer_call_by_queue(&self, call_id: &str, queue: &str) -> Result<()> {
        let extra = json!({ "callID": call_id, "thisQueue": queue });
        self.send(MessageId::RequestBridgeCall, extra).await
    }

    pub async fn hold_call(&self) -> Result<()> {
        self.send(MessageId::RequestHoldCall, json!({})).await
    }

    pub async fn retrieve_call(&self) -> Result<()> {
        self.send(MessageId::RequestRetrieveCall, json!({})).await
    }

    /// Hang up. Without a line id the server releases the current line.
    pub async fn release_call(&self, line_id: Option<&str>) -> Result<()> {
        let extra = match line_id {
            Some(id) => json!({ "callID": id }),
            None => json!({}),
        };
        self.send(MessageId::RequestReleaseCall, extra).await
    }

    /// Two-step transfer, step one: consult the target.
    pub async fn consult(&self, target_dn: &str) -> Result<()> {
        let extra = json!({ "otherDN": target_dn });
        self.send(MessageId::RequestInitiateTransfer, extra).await
    }

    /// Two-step transfer, step two: hand the call over.
    pub async fn complete_transfer(&self) -> Result<()> {
        self.send(MessageId::RequestCompleteTransfer, json!({}))
            .await
    }

    /// One-step transfer to an agent, skill queue, or external number.
    pub async fn single_step_transfer(&self, target: &str) -> Result<()> {
        let extra = json!({ "otherDN": target });
        self.send(MessageId::RequestSingleStepTransfer, extra).await
    }

    /// One-step transfer into an IVR flow.
    pub async fn transfer_to_ivr(&self, ivr_id: &str) -> Result<()> {
        self.single_step_transfer(&format!("ivr_{ivr_id}")).await
    }

    /// One-step transfer into the satisfaction survey flow.
    pub async fn transfer_to_satisfaction(&self, ivr_id: &str) -> Result<()> {
        self.single_step_transfer(&format!("icp_{ivr_id}")).await
    }

    /// Transfer into a digit-collection IVR.
    pub async fn digit_collections(&self, ivr_id: &str) -> Result<()> {
        let extra = json!({ "ivrId": ivr_id });
        self.send(MessageId::RequestTransferToIvr, extra).await
    }

    /// Pull a third party into the call.
    pub async fn three_way_call(&self, phone_number: &str) -> Result<()> {
        let extra = json!({ "otherDN": phone_number });
        self.send(MessageId::RequestSingleStepConference, extra)
            .await
    }

    /// Drop one participant, or all non-moderators with the
    /// `"non_moderator"` marker.
    pub async fn release_three_way_call(&self, call_id: &str) -> Result<()> {
        let extra = json!({ "callID": call_id });
        self.send(MessageId::RequestDeleteFromConference, extra)
            .await
    }

    /// Send a DTMF digit. Without a line id the current line is used.
    pub async fn send_dtmf(&self, line_id: Option<&str>, digit: &str) -> Result<()> {
        let mut extra = json!({ "digit": digit });
        if let (Some(obj), Some(id)) = (extra.as_object_mut(), line_id) {
            obj.insert("callID".to_string(), json!(id));
        }
        self.send(MessageId::RequestSendDtmf, extra).await
    }

    pub async fn monitor_call(&self, call_id: &str, target_dn: &str) -> Result<()> {
        let extra = json!({ "callID": call_id, "otherDN": target_dn });
        self.send(MessageId::RequestMonitorCall, extra).await
    }

    /// Move a queued call forward; lower scores queue earlier.
    pub async fn jump_the_queue(&self, queue: &str, call_id: &str, score: i64) -> Result<()> {
        let extra = json!({ "thisQueue": queue, "callID": call_id, "score": score });
        self.send(MessageId::RequestJumpTheQueue, extra).await
    }

    /// Push the local auto-ready-after-work preference to the server.
    pub async fn set_auto_ready(&self, enabled: bool) -> Result<()> {
        let extra = json!({ "autoSavePopup": enabled });
        self.send(MessageId::RequestAutoReadyConfig, extra).await
    }

    /// Ask for the current auto-ready configuration.
    pub async fn request_auto_ready_config(&self) -> Result<()> {
        self.send(MessageId::RequestAutoReadyConfig, json!({}))
            .await
    }

    /// Ask for fresh queue position information.
    pub async fn send_queue_info_request(&self, queues: &[String]) -> Result<()> {
        let extra = json!({ "thisQueues": queues });
        self.send(MessageId::RequestQueueState, extra).await
    }

    /// Pull the transfer-target agent list.
    pub async fn request_transfer_agent_data(
        &self,
        limit_agent: &str,
        state: &str,
        queue_code: &str,
        grp_stream_number: &str,
    ) -> Result<()> {
        let extra = json!({
            "limitAgent": limit_agent,
            "state": state,
            "queueCode": queue_code,
            "grpStreamNumber": grp_stream_number,
        });
        self.send(MessageId::RequestTransferAgentData, extra).await
    }

    /// Pull the skill-queue list.
    pub async fn request_queue_list(&self) -> Result<()> {
        let extra = json!({ "thisQueues": self.identity.this_queues });
        self.send(MessageId::RequestQueueList, extra).await
    }

    /// Pull the conference participant data.
    pub async fn request_conference_data(
        &self,
        limit_agent: &str,
        state: &str,
        queue_code: &str,
        grp_stream_number: &str,
    ) -> Result<()> {
        let extra = json!({
            "limitAgent": limit_agent,
            "state": state,
            "queueCode": queue_code,
            "grpStreamNumber": grp_stream_number,
        });
        self.send(MessageId::RequestConferenceAgentData, extra)
            .await
    }

    pub async fn start_queue_monitoring(&self, queue_codes: &[String]) -> Result<()> {
        let extra = json!({ "queueCodes": queue_codes });
        self.send(MessageId::RequestStartQueueMonitoring, extra)
            .await
    }

    pub async fn stop_queue_monitoring(&self) -> Result<()> {
        self.send(MessageId::RequestStopQueueMonitoring, json!({}))
            .await
    }
}
