//! Runtime configuration from `SCANHUB_*` environment variables.
//! Heavyweight config-file handling belongs to the embedding system; the
//! control plane itself only needs these few knobs.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator::Aggregator;

/// Default maximum snapshot age before a worker's file is considered stale.
pub const DEFAULT_SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(300);
/// Default period of the live-channel `stats_update` push.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory shared by all snapshot writers and the aggregator.
    pub stats_dir: PathBuf,
    /// Snapshots older than this are excluded from aggregation; zero disables.
    pub snapshot_max_age: Duration,
    /// Period of the live-channel broadcast tick.
    pub broadcast_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_dir: PathBuf::from("."),
            snapshot_max_age: DEFAULT_SNAPSHOT_MAX_AGE,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stats_dir: env::var("SCANHUB_STATS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.stats_dir),
            snapshot_max_age: secs_from_env(
                "SCANHUB_SNAPSHOT_MAX_AGE_SECS",
                defaults.snapshot_max_age,
            ),
            broadcast_interval: secs_from_env(
                "SCANHUB_BROADCAST_SECS",
                defaults.broadcast_interval,
            ),
        }
    }

    /// An aggregator over the configured snapshot directory.
    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(&self.stats_dir).with_max_age(self.snapshot_max_age)
    }
}

fn secs_from_env(var: &str, default: Duration) -> Duration {
    parse_secs(env::var(var).ok().as_deref(), default)
}

fn parse_secs(raw: Option<&str>, default: Duration) -> Duration {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
