//! Client registry and fan-out. Each live client owns an unbounded
//! outbound queue drained by its own sender task, so the registry lock is
//! held only for membership changes and the enqueue loop — never across
//! network I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use scanhub_core::types::Envelope;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

pub type ClientTx = mpsc::UnboundedSender<Message>;

#[derive(Debug, Default)]
pub struct Hub {
    clients: Mutex<HashMap<u64, ClientTx>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, tx: ClientTx) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().await.insert(id, tx);
        debug!(client = id, "live client registered");
        id
    }

    /// Removal happens only from the client's own read loop; there is no
    /// proactive eviction on send failure.
    pub async fn unregister(&self, id: u64) {
        self.clients.lock().await.remove(&id);
        debug!(client = id, "live client removed");
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Deliver one envelope to every registered client. A closed queue is
    /// logged and skipped; it never blocks or fails the rest of the fleet.
    pub async fn broadcast(&self, envelope: &Envelope) {
        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, kind = %envelope.kind, "broadcast encoding failed");
                return;
            }
        };
        let clients = self.clients.lock().await;
        for (id, tx) in clients.iter() {
            if tx.send(Message::Text(payload.clone())).is_err() {
                debug!(client = id, "client queue closed, skipping");
            }
        }
    }
}
