//! WebSocket upgrade, per-connection handling and command dispatch.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use scanhub_core::types::Envelope;
use serde_json::{json, Value};
use tracing::warn;

use crate::hub::ClientTx;
use crate::state::AppState;

/// Applied when `get_logs` carries no usable limit.
const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    // Dedicated sender task: drains this client's queue so a slow peer
    // never stalls the registry.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Full current state is enqueued before registration, so it always
    // precedes the first periodic stats_update this client observes.
    send(&tx, "initial_stats", stats_view(&state));
    match state.aggregate().await {
        Ok(report) => send(&tx, "server_info", json!([report.host])),
        Err(err) => warn!(%err, "server info aggregation failed"),
    }
    let id = state.hub.register(tx.clone()).await;

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => dispatch(&state, &tx, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    // The read loop is the only place a client is removed.
    state.hub.unregister(id).await;
    drop(tx);
    let _ = writer.await;
}

/// Handle one inbound frame. A malformed envelope earns a structured error
/// reply on this connection only; the connection stays open.
async fn dispatch(state: &AppState, tx: &ClientTx, text: &str) {
    let inbound: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            send(tx, "error", json!({"message": "invalid message"}));
            return;
        }
    };

    match inbound.kind.as_str() {
        "ping" => send(tx, "pong", json!({})),
        "start_scanner" | "stop_scanner" => scanner_command(state, &inbound).await,
        "get_logs" => {
            let limit = inbound
                .data
                .get("limit")
                .and_then(Value::as_i64)
                .filter(|l| *l > 0)
                .map(|l| l as usize)
                .unwrap_or(DEFAULT_LOG_LIMIT)
                .min(MAX_LOG_LIMIT);
            match state.logs.fetch_page(1, limit).await {
                Ok((records, _total)) => send(
                    tx,
                    "logs_data",
                    serde_json::to_value(records).unwrap_or(Value::Null),
                ),
                Err(err) => {
                    warn!(%err, "log fetch failed");
                    send(tx, "logs_data", json!([]));
                }
            }
        }
        // Unrecognized commands are dropped.
        _ => {}
    }
}

/// Start/stop commands are fleet-visible operational events: the outcome
/// goes to every client, not only the requester.
async fn scanner_command(state: &AppState, inbound: &Envelope) {
    let vpn_type = inbound
        .data
        .get("vpn_type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let starting = inbound.kind == "start_scanner";

    let status = match &state.control {
        Some(control) if starting => control.start_scanner(&vpn_type).await,
        Some(control) => control.stop_scanner(&vpn_type).await,
        // Acknowledgement-only when no process control is wired in.
        None => "success".to_string(),
    };

    let event = if starting { "scanner_started" } else { "scanner_stopped" };
    if let Err(err) = state
        .logs
        .insert("info", &format!("{event}: {vpn_type} ({status})"), "control")
        .await
    {
        warn!(%err, "log insert failed");
    }
    state
        .hub
        .broadcast(&Envelope::new(
            event,
            json!({"vpn_type": vpn_type, "status": status}),
        ))
        .await;
}

fn stats_view(state: &AppState) -> Value {
    serde_json::to_value(state.stats.view()).unwrap_or(Value::Null)
}

/// Enqueue one envelope for this client; delivery is the sender task's
/// problem.
fn send(tx: &ClientTx, kind: &str, data: Value) {
    if let Ok(payload) = serde_json::to_string(&Envelope::new(kind, data)) {
        let _ = tx.send(Message::Text(payload));
    }
}
