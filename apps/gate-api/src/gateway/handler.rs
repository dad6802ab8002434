//! IDENTIFY: redeem a ticket and bind a new delivery channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::tokens;
use crate::models::user::Role;
use crate::AppState;

use super::channel::Channel;
use super::events::{
    EventName, GatewayMessage, GuestArrival, IdentifyPayload, ReadyPayload, CLOSE_AUTH_FAILED,
    CLOSE_NOT_AUTHENTICATED,
};
use super::registry::ChannelHandle;
use super::session::GatewaySession;
use super::transport::QueueSink;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyError {
    TicketLookup,
    InvalidTicket,
    NotResident,
}

impl IdentifyError {
    pub fn close_code(self) -> u16 {
        match self {
            IdentifyError::TicketLookup | IdentifyError::InvalidTicket => CLOSE_AUTH_FAILED,
            IdentifyError::NotResident => CLOSE_NOT_AUTHENTICATED,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            IdentifyError::TicketLookup => "Ticket lookup failed",
            IdentifyError::InvalidTicket => "Invalid or expired ticket",
            IdentifyError::NotResident => "Only residents receive notifications",
        }
    }
}

/// Everything a connection needs after a successful IDENTIFY.
pub struct Identified {
    pub session: GatewaySession,
    pub handle: ChannelHandle,
    pub queue: mpsc::Receiver<Arc<GuestArrival>>,
    pub ready: GatewayMessage,
}

/// Process an IDENTIFY opcode.
///
/// The ticket is consumed whether or not identification succeeds. On
/// success the channel is already registered and live.
pub async fn handle_identify(
    state: &AppState,
    payload: IdentifyPayload,
) -> Result<Identified, IdentifyError> {
    let ticket = tokens::consume_ws_ticket(state.kv.as_ref(), &payload.ticket)
        .await
        .map_err(|_| IdentifyError::TicketLookup)?
        .ok_or(IdentifyError::InvalidTicket)?;

    if ticket.role != Role::Resident {
        return Err(IdentifyError::NotResident);
    }
    let resident_id = ticket.user_id;

    let (sink, queue) = QueueSink::bounded(state.config.push_queue_capacity);
    let channel = Arc::new(Channel::open(resident_id, Arc::new(sink)));
    let handle = state.registry.register(channel.clone());

    let session = GatewaySession::new(channel.id().to_string(), resident_id);
    let ready_data = serde_json::to_value(ReadyPayload {
        channel_id: session.channel_id.clone(),
        resident_id,
        heartbeat_interval: HEARTBEAT_INTERVAL_MS,
    })
    .unwrap_or_default();
    let ready = GatewayMessage::dispatch(EventName::READY, session.next_seq(), ready_data);

    Ok(Identified {
        session,
        handle,
        queue,
        ready,
    })
}
