//! Session tokens and single-use gateway tickets.

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;
use crate::models::user::Role;

// ---------------------------------------------------------------------------
// Opaque token generation
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Identity stored alongside a session token or gateway ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: i64,
    pub role: Role,
}

fn encode(data: &SessionData) -> Result<String, ApiError> {
    serde_json::to_string(data).map_err(|_| ApiError::internal("serialization"))
}

fn decode(raw: &str) -> Result<SessionData, ApiError> {
    serde_json::from_str(raw).map_err(|_| ApiError::internal("corrupt token data"))
}

// ---------------------------------------------------------------------------
// Session token: lives for `Config::session_ttl_secs`, revoked on logout
// ---------------------------------------------------------------------------

pub fn generate_session_token() -> String {
    generate_opaque_token("ses", 32)
}

fn session_key(token: &str) -> String {
    format!("gate:ses:{}", token)
}

pub async fn store_session(
    kv: &dyn KeyValueStore,
    token: &str,
    data: &SessionData,
    ttl_secs: u64,
) -> Result<(), ApiError> {
    kv.set_ex(&session_key(token), &encode(data)?, ttl_secs).await
}

pub async fn lookup_session(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<SessionData>, ApiError> {
    kv.get(&session_key(token))
        .await?
        .map(|raw| decode(&raw))
        .transpose()
}

pub async fn revoke_session(kv: &dyn KeyValueStore, token: &str) -> Result<(), ApiError> {
    kv.del(&session_key(token)).await
}

// ---------------------------------------------------------------------------
// Gateway ticket: 30-second TTL, single-use
// ---------------------------------------------------------------------------

/// WS ticket TTL in seconds.
pub const WS_TICKET_TTL_SECS: u64 = 30;

pub fn generate_ws_ticket() -> String {
    generate_opaque_token("wst", 32)
}

fn ticket_key(ticket: &str) -> String {
    format!("gate:wst:{}", ticket)
}

pub async fn store_ws_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
    data: &SessionData,
) -> Result<(), ApiError> {
    kv.set_ex(&ticket_key(ticket), &encode(data)?, WS_TICKET_TTL_SECS)
        .await
}

/// Redeem a ticket. A second redemption of the same ticket yields `None`.
pub async fn consume_ws_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
) -> Result<Option<SessionData>, ApiError> {
    kv.take(&ticket_key(ticket))
        .await?
        .map(|raw| decode(&raw))
        .transpose()
}

/// Issue and store a fresh ticket for `data`.
pub async fn issue_ws_ticket(kv: &dyn KeyValueStore, data: &SessionData) -> Result<String, ApiError> {
    let ticket = generate_ws_ticket();
    store_ws_ticket(kv, &ticket, data).await?;
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryKv;

    const RESIDENT: SessionData = SessionData {
        user_id: 42,
        role: Role::Resident,
    };

    #[test]
    fn tokens_carry_prefixes() {
        assert!(generate_session_token().starts_with("ses_"));
        assert!(generate_ws_ticket().starts_with("wst_"));
        assert_ne!(generate_session_token(), generate_session_token());
    }

    #[tokio::test]
    async fn session_round_trip_and_revoke() {
        let kv = MemoryKv::new();
        let token = generate_session_token();
        store_session(&kv, &token, &RESIDENT, 60).await.unwrap();
        assert_eq!(lookup_session(&kv, &token).await.unwrap(), Some(RESIDENT));

        revoke_session(&kv, &token).await.unwrap();
        assert_eq!(lookup_session(&kv, &token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ticket_redeems_once() {
        let kv = MemoryKv::new();
        let ticket = issue_ws_ticket(&kv, &RESIDENT).await.unwrap();
        assert_eq!(consume_ws_ticket(&kv, &ticket).await.unwrap(), Some(RESIDENT));
        assert_eq!(consume_ws_ticket(&kv, &ticket).await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_token_is_not_a_ticket() {
        let kv = MemoryKv::new();
        let token = generate_session_token();
        store_session(&kv, &token, &RESIDENT, 60).await.unwrap();
        assert_eq!(consume_ws_ticket(&kv, &token).await.unwrap(), None);
    }
}
