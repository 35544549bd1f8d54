//! Control-plane daemon library: shared state, the broadcast hub and the
//! WebSocket endpoint, exported so integration tests can run the app
//! in-process on an ephemeral port.

pub mod hub;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use scanhub_core::types::Envelope;
use tokio::task::JoinHandle;

use crate::state::AppState;

pub const DEFAULT_PORT: u16 = 8080;

/// The live-channel application: a single WebSocket route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Periodically push a `stats_update` to every registered client. One
/// client's failure never blocks the others; the hub's per-client queues
/// absorb slow consumers.
pub fn spawn_broadcaster(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First broadcast lands one period after startup, not immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let view = serde_json::to_value(state.stats.view())
                .unwrap_or(serde_json::Value::Null);
            state.hub.broadcast(&Envelope::new("stats_update", view)).await;
        }
    })
}

/// Parse `--port N`, `-p N` or `--port=N` from process arguments, falling
/// back to `default_port`.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut port: Option<String> = None;
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--port" | "-p" => port = it.next(),
            _ if arg.starts_with("--port=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    port = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    port.and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}
