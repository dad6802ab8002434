mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gate_api::auth::tokens::{self, SessionData};
use gate_api::models::user::Role;
use gate_api::AppState;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start an actual TCP server for WebSocket testing.
async fn start_ws_server() -> (SocketAddr, AppState) {
    let state = common::test_state();
    let app = gate_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Helper: log a seeded user in over HTTP and return the login body.
async fn login(addr: SocketAddr, email: &str) -> serde_json::Value {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/auth/login"))
        .json(&serde_json::json!({ "email": email, "password": common::PASSWORD }))
        .send()
        .await
        .expect("login request")
        .json()
        .await
        .expect("parse login response")
}

async fn resident_ticket(addr: SocketAddr, email: &str) -> String {
    login(addr, email).await["ws_ticket"]
        .as_str()
        .expect("ws_ticket present")
        .to_string()
}

async fn send_json(ws: &mut Ws, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

/// Next text frame as JSON. Panics on close or timeout.
async fn next_json(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse frame")
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {other:?}"),
        }
    }
}

/// Skip text frames until a close frame arrives and return its code.
async fn expect_close(ws: &mut Ws) -> Option<CloseCode> {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close");
        match msg {
            Some(Ok(tungstenite::Message::Close(frame))) => return frame.map(|f| f.code),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Helper: connect to the gateway and IDENTIFY. Returns the socket and the
/// READY frame.
async fn connect_and_identify(addr: SocketAddr, ticket: &str) -> (Ws, serde_json::Value) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/gateway"))
        .await
        .expect("ws connect");
    send_json(&mut ws, serde_json::json!({ "op": 2, "d": { "ticket": ticket } })).await;
    let ready = next_json(&mut ws).await;
    (ws, ready)
}

async fn identify_expecting_close(addr: SocketAddr, ticket: &str) -> Option<CloseCode> {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/gateway"))
        .await
        .expect("ws connect");
    send_json(&mut ws, serde_json::json!({ "op": 2, "d": { "ticket": ticket } })).await;
    expect_close(&mut ws).await
}

/// Poll until the registry holds `expected` channels.
async fn wait_for_connections(state: &AppState, expected: usize) {
    for _ in 0..50 {
        if state.registry.connection_count() == expected {
            return;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {expected} connections, registry has {}",
        state.registry.connection_count()
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identify_returns_ready_and_registers_channel() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;

    let ticket = resident_ticket(addr, "res@example.com").await;
    let (_ws, ready) = connect_and_identify(addr, &ticket).await;

    assert_eq!(ready["op"], 0);
    assert_eq!(ready["t"], "READY");
    assert_eq!(ready["s"], 1);
    assert!(ready["d"]["channel_id"].as_str().unwrap().starts_with("ch_"));
    assert_eq!(ready["d"]["resident_id"], 42);
    assert_eq!(ready["d"]["heartbeat_interval"], 41250);

    assert_eq!(state.registry.connection_count(), 1);
    assert_eq!(state.registry.channels_for(42).len(), 1);
}

#[tokio::test]
async fn invalid_ticket_is_rejected() {
    let (addr, _state) = start_ws_server().await;
    let code = identify_expecting_close(addr, "wst_bogus").await;
    assert_eq!(code, Some(CloseCode::from(4004)));
}

#[tokio::test]
async fn ticket_is_single_use() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;

    let ticket = resident_ticket(addr, "res@example.com").await;
    let (ws, _ready) = connect_and_identify(addr, &ticket).await;
    drop(ws);

    let code = identify_expecting_close(addr, &ticket).await;
    assert_eq!(code, Some(CloseCode::from(4004)));
}

#[tokio::test]
async fn non_residents_cannot_open_a_channel() {
    let (addr, state) = start_ws_server().await;
    let ticket = tokens::issue_ws_ticket(
        state.kv.as_ref(),
        &SessionData {
            user_id: 9,
            role: Role::Gatekeeper,
        },
    )
    .await
    .unwrap();

    let code = identify_expecting_close(addr, &ticket).await;
    assert_eq!(code, Some(CloseCode::from(4003)));
    assert_eq!(state.registry.connection_count(), 0);
}

#[tokio::test]
async fn first_frame_must_be_identify() {
    let (addr, _state) = start_ws_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/gateway"))
        .await
        .expect("ws connect");

    send_json(&mut ws, serde_json::json!({ "op": 1, "d": { "seq": 0 } })).await;
    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4003)));
}

#[tokio::test]
async fn heartbeat_is_acknowledged() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;

    let ticket = resident_ticket(addr, "res@example.com").await;
    let (mut ws, _ready) = connect_and_identify(addr, &ticket).await;

    send_json(&mut ws, serde_json::json!({ "op": 1, "d": { "seq": 1 } })).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["op"], 6);
    assert_eq!(ack["d"]["ack"], 1);
}

#[tokio::test]
async fn unknown_opcode_closes_the_connection() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;

    let ticket = resident_ticket(addr, "res@example.com").await;
    let (mut ws, _ready) = connect_and_identify(addr, &ticket).await;

    send_json(&mut ws, serde_json::json!({ "op": 99, "d": {} })).await;
    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4001)));
    wait_for_connections(&state, 0).await;
}

#[tokio::test]
async fn disconnect_unregisters_the_channel() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;

    let ticket = resident_ticket(addr, "res@example.com").await;
    let (mut ws, _ready) = connect_and_identify(addr, &ticket).await;
    wait_for_connections(&state, 1).await;

    ws.close(None).await.expect("close");
    wait_for_connections(&state, 0).await;
    assert!(state.registry.channels_for(42).is_empty());
}

#[tokio::test]
async fn guest_arrival_is_dispatched_to_every_tab() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;
    common::seed_user(&state, 500, Role::Gatekeeper, "gate@example.com").await;
    let guest = common::seed_guest(&state, 42, "ABC123", None).await;

    let first = resident_ticket(addr, "res@example.com").await;
    let second = resident_ticket(addr, "res@example.com").await;
    let (mut tab1, _) = connect_and_identify(addr, &first).await;
    let (mut tab2, _) = connect_and_identify(addr, &second).await;

    let gate_token = login(addr, "gate@example.com").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();
    let resp: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/gatekeeper/validate"))
        .bearer_auth(&gate_token)
        .json(&serde_json::json!({
            "face_image": "",
            "plate_image": common::b64(b"ABC123"),
        }))
        .send()
        .await
        .expect("validate request")
        .json()
        .await
        .expect("parse validate response");
    assert_eq!(resp["status"], "granted");
    assert_eq!(resp["notified"], 2);

    for ws in [&mut tab1, &mut tab2] {
        let dispatch = next_json(ws).await;
        assert_eq!(dispatch["op"], 0);
        assert_eq!(dispatch["t"], "GUEST_ARRIVAL");
        assert_eq!(dispatch["s"], 2);
        assert_eq!(dispatch["d"]["guest_id"], guest.id);
        assert_eq!(dispatch["d"]["plate"], "ABC123");
        assert!(dispatch["d"]["time"].as_str().unwrap().ends_with('Z'));
    }
}

#[tokio::test]
async fn channel_closed_by_registry_gets_reconnect() {
    let (addr, state) = start_ws_server().await;
    common::seed_user(&state, 42, Role::Resident, "res@example.com").await;

    let ticket = resident_ticket(addr, "res@example.com").await;
    let (mut ws, ready) = connect_and_identify(addr, &ticket).await;
    let channel_id = ready["d"]["channel_id"].as_str().unwrap().to_string();

    assert!(state.registry.unregister(&channel_id));

    let reconnect = next_json(&mut ws).await;
    assert_eq!(reconnect["op"], 7);
    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4008)));
}
