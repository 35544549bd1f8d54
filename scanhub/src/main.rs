//! Fleet controller: start, stop and inspect scanner workers by recipe.

use std::env;

use scanhub::args::{parse_args, usage};
use scanhub_core::config::Config;
use scanhub_core::process::{ProcessManager, StartOutcome};
use scanhub_core::recipes::RecipeSet;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let parsed = match parse_args(env::args()) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let cfg = Config::from_env();
    let manager = ProcessManager::new(RecipeSet::builtin(), cfg.aggregator());

    if parsed.status {
        return print_status(&manager);
    }

    if parsed.stop {
        match parsed.vpn_type.as_deref() {
            // No explicit target stops the whole fleet.
            None | Some("all") => {
                let keys: Vec<String> =
                    manager.recipes().keys().map(str::to_string).collect();
                for key in keys {
                    stop_one(&manager, &key);
                }
            }
            Some(key) => stop_one(&manager, key),
        }
        return Ok(());
    }

    match parsed.vpn_type.as_deref() {
        None => eprintln!("{}", usage("scanhub")),
        Some("all") => {
            let keys: Vec<String> =
                manager.recipes().keys().map(str::to_string).collect();
            for key in keys {
                start_one(&manager, &key);
            }
        }
        Some(key) => start_one(&manager, key),
    }
    Ok(())
}

fn start_one(manager: &ProcessManager, key: &str) {
    match manager.start(key) {
        Ok(StartOutcome::Started(pid)) => println!("started {key} (PID {pid})"),
        Ok(StartOutcome::AlreadyRunning(pids)) => {
            println!("scanner {key} already running {pids:?}")
        }
        Err(err) => eprintln!("failed to start {key}: {err}"),
    }
}

fn stop_one(manager: &ProcessManager, key: &str) {
    match manager.stop(key) {
        Ok(pids) if pids.is_empty() => println!("{key} not running"),
        Ok(pids) => {
            for pid in pids {
                println!("stopped {key} (PID {pid})");
            }
        }
        Err(err) => eprintln!("failed to stop {key}: {err}"),
    }
}

fn print_status(manager: &ProcessManager) -> anyhow::Result<()> {
    let status = manager.status()?;
    println!("Scanner status:");
    for scanner in &status.scanners {
        if scanner.is_running() {
            println!("{:<12} running {:?}", scanner.key, scanner.pids);
        } else {
            println!("{:<12} stopped", scanner.key);
        }
    }
    let totals = status.report.totals;
    println!(
        "TOTAL goods:{} bads:{} errors:{} offline:{} ipblock:{} processed:{}",
        totals.goods, totals.bads, totals.errors, totals.offline, totals.ipblock, totals.processed
    );
    Ok(())
}
