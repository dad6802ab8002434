//! Gateway opcodes, event types, and wire-format messages.

use chrono::{DateTime, Utc};
use gatehouse_common::time::wire_timestamp;
use gatehouse_common::Plate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_RECONNECT: u8 = 7;

// ---------------------------------------------------------------------------
// Close codes (4000-range for application-level)
// ---------------------------------------------------------------------------

pub const CLOSE_UNKNOWN_ERROR: u16 = 4000;
pub const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
pub const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
pub const CLOSE_AUTH_FAILED: u16 = 4004;
pub const CLOSE_DELIVERY_FAILED: u16 = 4008;
pub const CLOSE_SESSION_TIMEOUT: u16 = 4009;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default)]
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a RECONNECT message (op=7). The client should fetch a fresh
    /// ticket and IDENTIFY again.
    pub fn reconnect(reason: &str) -> Self {
        Self {
            op: OP_RECONNECT,
            t: None,
            s: None,
            d: serde_json::json!({ "reason": reason }),
        }
    }

    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub ticket: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const GUEST_ARRIVAL: &'static str = "GUEST_ARRIVAL";
}

/// A validated guest arrival, addressed to the resident who invited them.
///
/// Produced once per successful validation and never mutated; every channel
/// of the resident receives the same `Arc` of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestArrival {
    pub guest_id: i64,
    pub resident_id: i64,
    pub plate: Plate,
    pub occurred_at: DateTime<Utc>,
}

impl GuestArrival {
    pub fn notification(&self) -> NotificationPayload {
        NotificationPayload {
            guest_id: self.guest_id,
            plate: self.plate.to_string(),
            time: wire_timestamp(self.occurred_at),
        }
    }
}

/// `d` of a `GUEST_ARRIVAL` dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub guest_id: i64,
    pub plate: String,
    /// RFC 3339, UTC, whole seconds.
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub channel_id: String,
    pub resident_id: i64,
    pub heartbeat_interval: u64,
}
