//! Aggregation over a snapshot directory: partial failure tolerance,
//! staleness eviction, and walk-error discrimination.

use std::fs;
use std::path::Path;
use std::time::Duration;

use scanhub_core::aggregator::Aggregator;
use scanhub_core::types::Snapshot;

fn write_snapshot(dir: &Path, name: &str, processed: u64, timestamp: i64) {
    let snap = Snapshot {
        goods: processed,
        processed,
        timestamp,
        ..Snapshot::default()
    };
    fs::write(dir.join(name), serde_json::to_vec(&snap).unwrap()).unwrap();
}

#[test]
fn sums_all_readable_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    write_snapshot(dir.path(), "stats_a.json", 10, now);
    write_snapshot(dir.path(), "stats_b.json", 20, now);
    write_snapshot(dir.path(), "stats_c.json", 30, now);

    let report = Aggregator::new(dir.path()).collect().unwrap();
    assert_eq!(report.totals.processed, 60);
    assert_eq!(report.totals.goods, 60);
    assert_eq!(report.host.processed, 60);
    assert_eq!(report.host.status, "online");
    assert_eq!(report.host.ip, "localhost");
}

#[test]
fn corrupt_snapshot_contributes_zero() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    write_snapshot(dir.path(), "stats_a.json", 10, now);
    write_snapshot(dir.path(), "stats_b.json", 20, now);
    write_snapshot(dir.path(), "stats_c.json", 30, now);
    fs::write(dir.path().join("stats_broken.json"), b"{not json").unwrap();

    let report = Aggregator::new(dir.path()).collect().unwrap();
    assert_eq!(report.totals.processed, 60);
}

#[test]
fn unrelated_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    write_snapshot(dir.path(), "stats_a.json", 10, now);
    // Neither of these matches the snapshot pattern.
    fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    fs::write(dir.path().join("stats_a.json.tmp"), b"{partial").unwrap();

    let report = Aggregator::new(dir.path()).collect().unwrap();
    assert_eq!(report.totals.processed, 10);
}

#[test]
fn snapshots_in_subdirectories_count() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    let nested = dir.path().join("node1");
    fs::create_dir(&nested).unwrap();
    write_snapshot(dir.path(), "stats_a.json", 5, now);
    write_snapshot(&nested, "stats_b.json", 7, now);

    let report = Aggregator::new(dir.path()).collect().unwrap();
    assert_eq!(report.totals.processed, 12);
}

#[test]
fn stale_snapshots_drop_out() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    write_snapshot(dir.path(), "stats_live.json", 10, now);
    write_snapshot(dir.path(), "stats_dead.json", 90, now - 3600);

    let agg = Aggregator::new(dir.path()).with_max_age(Duration::from_secs(300));
    assert_eq!(agg.collect().unwrap().totals.processed, 10);

    // Zero max age disables eviction entirely.
    let agg = Aggregator::new(dir.path()).with_max_age(Duration::ZERO);
    assert_eq!(agg.collect().unwrap().totals.processed, 100);
}

#[test]
fn missing_directory_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never_created");
    assert!(Aggregator::new(&missing).collect().is_err());
}
