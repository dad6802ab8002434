//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use crate::AppState;

use super::channel::Channel;
use super::events::{
    ClientMessage, EventName, GatewayMessage, GuestArrival, HeartbeatPayload, IdentifyPayload,
    CLOSE_AUTH_FAILED, CLOSE_DELIVERY_FAILED, CLOSE_NOT_AUTHENTICATED, CLOSE_SESSION_TIMEOUT,
    CLOSE_UNKNOWN_ERROR, CLOSE_UNKNOWN_OPCODE, OP_HEARTBEAT, OP_IDENTIFY,
};
use super::handler::{handle_identify, Identified, HEARTBEAT_INTERVAL_MS};
use super::session::GatewaySession;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Timeout for receiving IDENTIFY after connection (seconds).
const IDENTIFY_TIMEOUT_SECS: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: Wait for IDENTIFY within timeout.
    let identify = time::timeout(
        Duration::from_secs(IDENTIFY_TIMEOUT_SECS),
        read_identify(&mut ws_rx),
    )
    .await;

    let payload = match identify {
        Ok(Ok(payload)) => payload,
        Ok(Err((code, reason))) => {
            tracing::debug!(%reason, "gateway handshake failed");
            let _ = send_close(&mut ws_tx, code, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    // Step 2: Redeem the ticket and register the channel.
    let Identified {
        session,
        handle,
        queue,
        ready,
    } = match handle_identify(&state, payload).await {
        Ok(identified) => identified,
        Err(err) => {
            tracing::debug!(reason = err.reason(), "identify rejected");
            let _ = send_close(&mut ws_tx, err.close_code(), err.reason()).await;
            return;
        }
    };

    tracing::info!(
        channel_id = %session.channel_id,
        resident_id = session.resident_id,
        "gateway channel established"
    );

    if send_message(&mut ws_tx, &ready).await.is_err() {
        return;
    }

    // Step 3: Run until the client leaves, misses a heartbeat, or the
    // channel is closed from the registry side.
    let channel = handle.channel().clone();
    run_session(&session, &channel, ws_tx, ws_rx, queue).await;

    channel.begin_close();
    handle.close();

    tracing::info!(
        channel_id = %session.channel_id,
        resident_id = session.resident_id,
        "gateway channel ended"
    );
}

async fn read_identify(ws_rx: &mut WsStream) -> Result<IdentifyPayload, (u16, &'static str)> {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => return Err((CLOSE_UNKNOWN_ERROR, "Client closed")),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during identify");
                return Err((CLOSE_UNKNOWN_ERROR, "Read error"));
            }
        };

        let client_msg: ClientMessage = serde_json::from_str(&text)
            .map_err(|_| (CLOSE_UNKNOWN_ERROR, "Invalid JSON"))?;

        if client_msg.op != OP_IDENTIFY {
            return Err((CLOSE_NOT_AUTHENTICATED, "Expected IDENTIFY"));
        }
        return serde_json::from_value(client_msg.d)
            .map_err(|_| (CLOSE_AUTH_FAILED, "Invalid identify payload"));
    }
    Err((CLOSE_UNKNOWN_ERROR, "Connection closed before identify"))
}

/// Main session loop: answer heartbeats, drain the delivery queue, enforce
/// the heartbeat deadline.
async fn run_session(
    session: &GatewaySession,
    channel: &Arc<Channel>,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut queue: mpsc::Receiver<Arc<GuestArrival>>,
) {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, channel_id = %session.channel_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                };

                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(_) => {
                        let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                        break;
                    }
                };

                match client_msg.op {
                    OP_HEARTBEAT => {
                        got_heartbeat = true;
                        channel.touch();
                        let payload: HeartbeatPayload =
                            serde_json::from_value(client_msg.d).unwrap_or_default();
                        if send_message(&mut ws_tx, &GatewayMessage::heartbeat_ack(payload.seq)).await.is_err() {
                            break;
                        }
                    }
                    OP_IDENTIFY => {
                        let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Already identified").await;
                        break;
                    }
                    _ => {
                        let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                        break;
                    }
                }
            }

            event = queue.recv() => {
                let Some(event) = event else { break };
                // Events queued before a close are not delivered.
                if !channel.is_live() {
                    continue;
                }
                let data = serde_json::to_value(event.notification()).unwrap_or_default();
                let msg = GatewayMessage::dispatch(EventName::GUEST_ARRIVAL, session.next_seq(), data);
                if send_message(&mut ws_tx, &msg).await.is_err() {
                    tracing::debug!(channel_id = %session.channel_id, "write failed");
                    break;
                }
            }

            _ = channel.closed() => {
                tracing::debug!(channel_id = %session.channel_id, "channel closed by registry");
                let _ = send_message(&mut ws_tx, &GatewayMessage::reconnect("channel closed")).await;
                let _ = send_close(&mut ws_tx, CLOSE_DELIVERY_FAILED, "Channel closed").await;
                break;
            }

            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        channel_id = %session.channel_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

async fn send_message(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
