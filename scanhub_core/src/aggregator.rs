//! Fleet aggregation: fold every readable worker snapshot in a directory
//! into fleet totals, then attach local host metrics as a single entry.
//! Partial failure is the normal case — a worker mid-restart or a corrupt
//! file must never abort the pass.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DEFAULT_SNAPSHOT_MAX_AGE;
use crate::types::{FleetReport, FleetTotals, ServerInfo, Snapshot};
use crate::Result;

/// Reads `stats_*.json` snapshots under one directory. Holds no cross-call
/// state: every [`Aggregator::collect`] is an independent pass, safe to run
/// concurrently and repeatedly.
#[derive(Debug, Clone)]
pub struct Aggregator {
    dir: PathBuf,
    max_age: Option<Duration>,
}

impl Aggregator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: Some(DEFAULT_SNAPSHOT_MAX_AGE),
        }
    }

    /// Exclude snapshots whose last write is older than `max_age`, so a
    /// dead worker's lingering file stops counting. Zero disables eviction.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = if max_age.is_zero() { None } else { Some(max_age) };
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One aggregation pass: walk the directory, fold every readable
    /// snapshot, then sample host metrics once. Read and decode failures of
    /// snapshot files contribute zero; walk errors on anything that is not
    /// a snapshot file propagate.
    pub fn collect(&self) -> Result<FleetReport> {
        let mut totals = FleetTotals::default();
        let now = chrono::Utc::now().timestamp();

        for entry in WalkDir::new(&self.dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let name = err
                        .path()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if Snapshot::matches_name(&name) {
                        warn!(file = %name, %err, "snapshot walk error");
                        continue;
                    }
                    return Err(err.into());
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !Snapshot::matches_name(&name) {
                continue;
            }
            let data = match fs::read(entry.path()) {
                Ok(data) => data,
                Err(err) => {
                    warn!(file = %name, %err, "snapshot read error");
                    continue;
                }
            };
            let snap: Snapshot = match serde_json::from_slice(&data) {
                Ok(snap) => snap,
                Err(err) => {
                    warn!(file = %name, %err, "snapshot parse error");
                    continue;
                }
            };
            if let Some(max_age) = self.max_age {
                if now.saturating_sub(snap.timestamp) > max_age.as_secs() as i64 {
                    debug!(file = %name, "skipping stale snapshot");
                    continue;
                }
            }
            totals.absorb(&snap);
        }

        Ok(FleetReport {
            totals,
            host: sample_host(&totals),
        })
    }
}

/// Sample local host metrics once and combine them with the fleet totals
/// into the "local host" entry of `server_info`.
fn sample_host(totals: &FleetTotals) -> ServerInfo {
    let mut sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything()),
    );
    // CPU usage needs two samples a minimum interval apart.
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();

    let cpu = sys.global_cpu_usage().round() as u32;

    let mem_total = sys.total_memory();
    let memory = if mem_total > 0 {
        let used = mem_total.saturating_sub(sys.available_memory());
        (used as f64 / mem_total as f64 * 100.0).round() as u32
    } else {
        0
    };

    ServerInfo {
        ip: "localhost".to_string(),
        status: "online".to_string(),
        uptime: format_uptime(System::uptime()),
        cpu,
        memory,
        disk: root_disk_usage(),
        goods: totals.goods,
        bads: totals.bads,
        errors: totals.errors,
        offline: totals.offline,
        ipblock: totals.ipblock,
        processed: totals.processed,
    }
}

/// Usage percentage of the filesystem mounted at `/`; zero when it cannot
/// be determined.
fn root_disk_usage() -> u32 {
    let mut disks = Disks::new();
    disks.refresh(true);
    disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .map(|d| {
            let total = d.total_space();
            if total == 0 {
                return 0;
            }
            let used = total.saturating_sub(d.available_space());
            (used as f64 / total as f64 * 100.0).round() as u32
        })
        .unwrap_or(0)
}

fn format_uptime(secs: u64) -> String {
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}
