//! Data types shared across the control plane.
//! Keep this module minimal and stable — it defines the wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Periodic persisted counter state for one worker process. Written as
/// `stats_<id>.json` into the shared snapshot directory and superseded by
/// the next tick from the same worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub goods: u64,
    pub bads: u64,
    pub errors: u64,
    pub offline: u64,
    pub ipblock: u64,
    pub processed: u64,
    pub rps: f64,
    pub avg_rps: f64,
    pub peak_rps: f64,
    pub threads: u64,
    pub uptime: u64,
    /// Epoch seconds of the last write; stale entries drop out of aggregation.
    pub timestamp: i64,
}

impl Snapshot {
    /// File name for the snapshot belonging to worker `id`.
    pub fn file_name(id: &str) -> String {
        format!("stats_{id}.json")
    }

    /// Whether `name` looks like a worker snapshot file.
    pub fn matches_name(name: &str) -> bool {
        name.starts_with("stats_") && name.ends_with(".json")
    }

    /// Counter invariant: processed equals the sum of all outcome buckets.
    pub fn is_consistent(&self) -> bool {
        self.processed == self.goods + self.bads + self.errors + self.offline + self.ipblock
    }
}

/// Field-wise sum of all currently readable snapshots. Derived, never
/// persisted; recomputed on each aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetTotals {
    pub goods: u64,
    pub bads: u64,
    pub errors: u64,
    pub offline: u64,
    pub ipblock: u64,
    pub processed: u64,
}

impl FleetTotals {
    pub fn absorb(&mut self, snap: &Snapshot) {
        self.goods += snap.goods;
        self.bads += snap.bads;
        self.errors += snap.errors;
        self.offline += snap.offline;
        self.ipblock += snap.ipblock;
        self.processed += snap.processed;
    }
}

/// One host entry of the `server_info` push: local host metrics combined
/// with the fleet totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub ip: String,
    pub status: String,
    pub uptime: String,
    pub cpu: u32,
    pub memory: u32,
    pub disk: u32,
    pub goods: u64,
    pub bads: u64,
    pub errors: u64,
    pub offline: u64,
    pub ipblock: u64,
    pub processed: u64,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    pub totals: FleetTotals,
    pub host: ServerInfo,
}

/// Live view of one stats recorder, pushed as `initial_stats` and
/// `stats_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub goods: u64,
    pub bads: u64,
    pub errors: u64,
    pub offline: u64,
    pub ipblock: u64,
    pub processed: u64,
    pub rps: f64,
    pub avg_rps: f64,
    pub peak_rps: f64,
    pub threads: u64,
    pub uptime: u64,
    pub success_rate: f64,
}

/// The uniform live-channel message: pushes, commands and replies all use
/// the same envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    /// Epoch milliseconds; inbound commands may omit it.
    #[serde(default)]
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
