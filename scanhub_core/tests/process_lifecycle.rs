//! Process lifecycle against real OS processes: idempotent start, graceful
//! stop, and status over the shared snapshot directory.

#![cfg(unix)]

use std::time::Duration;

use scanhub_core::aggregator::Aggregator;
use scanhub_core::process::{ProcessManager, StartOutcome};
use scanhub_core::recipes::{Recipe, RecipeSet};

fn sleep_recipe(marker: &str) -> Recipe {
    Recipe {
        key: "probe".to_string(),
        target: "sleep".to_string(),
        process_pattern: format!("sleep {marker}"),
        creds_file: String::new(),
        extra_args: vec![marker.to_string()],
    }
}

fn manager(recipe: Recipe) -> (ProcessManager, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let manager = ProcessManager::new(
        RecipeSet::from_recipes([recipe]),
        Aggregator::new(dir.path()),
    );
    (manager, dir)
}

#[test]
fn start_twice_keeps_a_single_instance() {
    // The marker doubles as the sleep duration, long enough to outlive the
    // test and unusual enough not to collide with anything else running.
    let (manager, _dir) = manager(sleep_recipe("31622"));

    let first = manager.start("probe").unwrap();
    let pid = match first {
        StartOutcome::Started(pid) => pid,
        other => panic!("expected a fresh start, got {other:?}"),
    };
    std::thread::sleep(Duration::from_millis(300));

    match manager.start("probe").unwrap() {
        StartOutcome::AlreadyRunning(pids) => assert!(pids.contains(&pid)),
        other => panic!("expected idempotent start, got {other:?}"),
    }

    let status = manager.status().unwrap();
    assert!(status.scanners[0].is_running());

    let stopped = manager.stop("probe").unwrap();
    assert!(stopped.contains(&pid));
}

#[test]
fn stop_signals_externally_started_instances() {
    // An instance this manager never launched still gets stopped.
    let (manager, _dir) = manager(sleep_recipe("31623"));
    let mut child = std::process::Command::new("sleep")
        .arg("31623")
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(300));

    match manager.start("probe").unwrap() {
        StartOutcome::AlreadyRunning(pids) => assert!(pids.contains(&child.id())),
        other => panic!("expected the external instance to count, got {other:?}"),
    }

    let stopped = manager.stop("probe").unwrap();
    assert!(stopped.contains(&child.id()));

    let _ = child.kill();
    let _ = child.wait();
}
