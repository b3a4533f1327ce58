//! Message protocol table for the CTI signaling channel.
//!
//! Every payload on the wire is a JSON object carrying an integer `messageId`
//! field. This module is the single place those integers are given names;
//! no other component may use a numeric id directly. The table is partitioned
//! by direction: `Request` ids originate at the agent, `Event` ids at the
//! server. Two ids sharing intent but differing in direction (e.g. asking for
//! a skill list vs. receiving one) are distinct entries.

use serde::{Deserialize, Serialize};

/// Direction of a message id on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Agent-originated command.
    Request,
    /// Server-originated notification.
    Event,
}

/// Wire field carrying the message discriminator.
pub const MESSAGE_ID_FIELD: &str = "messageId";

macro_rules! message_table {
    ($( $dir:ident $name:ident = $code:literal ),+ $(,)?) => {
        /// A known message identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum MessageId {
            $( $name, )+
        }

        impl MessageId {
            /// Look up a wire code. Unknown codes return `None`; callers must
            /// treat that as non-fatal (forward compatibility).
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $( $code => Some(MessageId::$name), )+
                    _ => None,
                }
            }

            /// The integer carried in the `messageId` field.
            pub fn code(self) -> i64 {
                match self {
                    $( MessageId::$name => $code, )+
                }
            }

            /// Symbolic name, used for event naming and logging.
            pub fn name(self) -> &'static str {
                match self {
                    $( MessageId::$name => stringify!($name), )+
                }
            }

            pub fn direction(self) -> Direction {
                match self {
                    $( MessageId::$name => Direction::$dir, )+
                }
            }
        }
    };
}

message_table! {
    // Keep-alive ping, echoed back by the server with the same id
    Request RequestPing = 3,
    // Agent presence commands
    Request RequestAgentLogin = 100,
    Request RequestAgentReady = 101,
    Request RequestAgentNotReady = 102,
    Request RequestAgentLogout = 103,
    // Call control commands
    Request RequestMakeCall = 200,
    Request RequestAnswerCall = 201,
    Request RequestBridgeCall = 202,
    Request RequestReleaseCall = 203,
    Request RequestHoldCall = 204,
    Request RequestRedirectCall = 212,
    Request RequestClearCall = 213,
    Request RequestSingleStepConference = 214,
    Request RequestSingleStepTransfer = 215,
    Request RequestDeleteFromConference = 216,
    Request RequestRetrieveCall = 217,
    Request RequestInitiateConference = 220,
    Request RequestInitiateTransfer = 221,
    Request RequestCompleteConference = 222,
    Request RequestCompleteTransfer = 223,
    Request RequestTransferToIvr = 224,
    Request RequestAttachUserData = 230,
    Request RequestDeleteUserData = 231,
    Request RequestUpdateUserData = 232,
    Request RequestSendDtmf = 250,
    Request RequestRegisterAddress = 261,
    Request RequestUnregisterAddress = 263,
    Request RequestMonitorCall = 265,
    Request RequestQueryAgentStatus = 266,
    Request RequestStartQueueMonitoring = 268,
    Request RequestStopQueueMonitoring = 269,
    Request RequestQueueState = 270,
    Request RequestSysSettingsUpdate = 300,
    Request RequestJumpTheQueue = 302,
    Request RequestRecordList = 3001,
    Request RequestMonitorAgentList = 3201,
    Request RequestQueueMonitorInfo = 3203,
    Request RequestTransferAgentData = 3501,
    Request RequestGroupList = 3505,
    Request RequestQueueList = 3507,
    Request RequestConferenceAgentData = 3509,
    Request RequestAutoReadyConfig = 3601,

    // Connection events
    Event EventWelcome = 2,
    // Agent presence events
    Event EventAgentLogin = 580,
    Event EventAgentLogout = 581,
    Event EventAgentNotReady = 582,
    Event EventAgentReady = 583,
    Event EventAgentInfo = 588,
    // Call control events
    Event EventQueued = 501,
    Event EventRinging = 503,
    Event EventAbandoned = 504,
    Event EventDialing = 505,
    Event EventEstablished = 506,
    Event EventAttachedDataChanged = 507,
    Event EventDtmfSent = 508,
    Event EventHeld = 509,
    Event EventPartyAdded = 510,
    Event EventPartyChanged = 511,
    Event EventPartyDeleted = 512,
    Event EventRetrieved = 513,
    Event EventReleased = 515,
    Event EventThreeWayReleased = 518,
    Event EventThreeWayEstablished = 519,
    Event EventPartyInfo = 520,
    Event EventOcbNumberInfo = 521,
    Event EventSysSettingsUpdate = 526,
    // Device registration events
    Event EventRegistered = 572,
    Event EventUnregistered = 574,
    Event EventLinkConnected = 590,
    Event EventLinkDisconnected = 4500,
    Event EventReportInfo = 2500,
    // Outbound campaign events
    Event EventCampaignLoaded = 1500,
    Event EventCampaignUnloaded = 1501,
    Event EventDialingStarted = 1502,
    Event EventDialingStopped = 1503,
    Event EventUpdateTenantIp = 1504,
    Event EventCampaignRatio = 1507,
    Event EventOutboundInfo = 1509,
    Event EventCampaignLoadByFileName = 1510,
    Event EventRetrieveCampaign = 1511,
    Event EventCallLoss = 1512,
    Event EventCallLossDownCsv = 1513,
    Event EventCampaignContactDownCsv = 1514,
    Event EventCampaignLoadByCid = 1515,
    // CRM data pulls (responses to the 35xx requests)
    Event EventTransferAgentInfo = 3502,
    Event EventGroupList = 3506,
    Event EventQueueList = 3508,
    Event EventConferenceAgentInfo = 3510,
    Event EventTransferMenuList = 3101,
    Event EventConferenceMenuList = 3102,
    Event EventAutoReadyConfig = 3103,
    Event EventResetQueue = 3302,
    // Queue monitoring events
    Event EventMonitorAgentList = 3202,
    Event EventQueueMonitorAttr = 3204,
    Event EventQueueStatisticA = 540,
    Event EventQueueStatisticB = 541,
    Event EventQueuedCustomerIn = 542,
    Event EventQueuedCustomerOut = 543,
    // Errors
    Event EventError = 9999,
}
