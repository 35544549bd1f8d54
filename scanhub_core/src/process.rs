//! Lifecycle control over the OS processes implementing each recipe.
//! Running instances are found by querying the process table directly
//! rather than shelling out to a lookup utility.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::recipes::{Recipe, RecipeSet};
use crate::types::FleetReport;
use crate::{Error, Result};

/// Outcome of a start request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// A new instance was spawned with this PID.
    Started(u32),
    /// Instances already exist; start is idempotent and spawns nothing.
    AlreadyRunning(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScannerStatus {
    pub key: String,
    pub pids: Vec<u32>,
}

impl ScannerStatus {
    pub fn is_running(&self) -> bool {
        !self.pids.is_empty()
    }
}

/// Per-recipe state plus one fleet-wide totals entry; the totals are not
/// attributable to a single recipe since every scanner type writes into
/// the same snapshot directory.
#[derive(Debug, Clone)]
pub struct FleetStatus {
    pub scanners: Vec<ScannerStatus>,
    pub report: FleetReport,
}

/// Maps logical scanner identities to OS processes.
#[derive(Debug)]
pub struct ProcessManager {
    recipes: RecipeSet,
    aggregator: Aggregator,
}

impl ProcessManager {
    pub fn new(recipes: RecipeSet, aggregator: Aggregator) -> Self {
        Self { recipes, aggregator }
    }

    pub fn recipes(&self) -> &RecipeSet {
        &self.recipes
    }

    fn recipe(&self, key: &str) -> Result<&Recipe> {
        self.recipes
            .get(key)
            .ok_or_else(|| Error::UnknownScanner(key.to_string()))
    }

    /// Start one instance of `key` unless one is already running.
    pub fn start(&self, key: &str) -> Result<StartOutcome> {
        let recipe = self.recipe(key)?;
        let sys = process_table();
        let running = matching_pids(&sys, &recipe.process_pattern);
        if !running.is_empty() {
            info!(key, pids = ?running, "scanner already running");
            return Ok(StartOutcome::AlreadyRunning(running));
        }

        let mut cmd = build_command(recipe);
        let child = cmd.spawn().map_err(|source| Error::LaunchFailed {
            key: key.to_string(),
            source,
        })?;
        let pid = child.id();
        info!(key, pid, "scanner started");
        // Detached: the child outlives us and is never waited on here.
        drop(child);
        Ok(StartOutcome::Started(pid))
    }

    /// Deliver a graceful termination signal to every matching instance.
    /// Fire-and-forget: no exit confirmation, no forceful escalation, and
    /// zero matches is a successful no-op.
    pub fn stop(&self, key: &str) -> Result<Vec<u32>> {
        let recipe = self.recipe(key)?;
        let sys = process_table();
        let pids = matching_pids(&sys, &recipe.process_pattern);
        for pid in &pids {
            if let Some(process) = sys.process(Pid::from_u32(*pid)) {
                if process.kill_with(Signal::Term).is_none() {
                    // Platform without SIGTERM support; use the default.
                    process.kill();
                }
                info!(key, pid, "sent terminate signal");
            }
        }
        Ok(pids)
    }

    /// Running/stopped per recipe plus one aggregated totals entry over the
    /// shared snapshot directory.
    pub fn status(&self) -> Result<FleetStatus> {
        let sys = process_table();
        let scanners = self
            .recipes
            .iter()
            .map(|recipe| ScannerStatus {
                key: recipe.key.clone(),
                pids: matching_pids(&sys, &recipe.process_pattern),
            })
            .collect();
        let report = self.aggregator.collect()?;
        Ok(FleetStatus { scanners, report })
    }
}

/// Seam between the live channel's scanner commands and actual process
/// control. The hub works without it (acknowledgement-only); the agent
/// wires its [`ProcessManager`] in.
#[async_trait]
pub trait ScannerControl: Send + Sync {
    /// Returns the status string broadcast with the `scanner_started` event.
    async fn start_scanner(&self, key: &str) -> String;
    /// Returns the status string broadcast with the `scanner_stopped` event.
    async fn stop_scanner(&self, key: &str) -> String;
}

#[async_trait]
impl ScannerControl for ProcessManager {
    async fn start_scanner(&self, key: &str) -> String {
        match self.start(key) {
            Ok(StartOutcome::Started(_)) => "success".to_string(),
            Ok(StartOutcome::AlreadyRunning(_)) => "already_running".to_string(),
            Err(err) => {
                warn!(key, %err, "scanner start failed");
                "error".to_string()
            }
        }
    }

    async fn stop_scanner(&self, key: &str) -> String {
        match self.stop(key) {
            Ok(_) => "success".to_string(),
            Err(err) => {
                warn!(key, %err, "scanner stop failed");
                "error".to_string()
            }
        }
    }
}

/// A fresh view of the process table with command lines populated.
fn process_table() -> System {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    sys
}

/// PIDs whose full command line contains `pattern`, excluding ourselves.
fn matching_pids(sys: &System, pattern: &str) -> Vec<u32> {
    let own = std::process::id();
    let mut pids: Vec<u32> = sys
        .processes()
        .values()
        .filter(|p| {
            let pid = p.pid().as_u32();
            if pid == own || p.cmd().is_empty() {
                return false;
            }
            let cmdline = p
                .cmd()
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            cmdline.contains(pattern)
        })
        .map(|p| p.pid().as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

/// Build the launch command for a recipe: interpreter chosen from the
/// target's file type, then recipe arguments, then the credentials
/// reference, with stdio inherited.
fn build_command(recipe: &Recipe) -> Command {
    let target = Path::new(&recipe.target);
    let mut cmd = match target.extension().and_then(|e| e.to_str()) {
        Some("py") => {
            let mut cmd = Command::new("python3");
            cmd.arg(&recipe.target);
            cmd
        }
        Some("sh") => {
            let mut cmd = Command::new("sh");
            cmd.arg(&recipe.target);
            cmd
        }
        _ => Command::new(resolve_target(&recipe.target)),
    };
    cmd.args(&recipe.extra_args);
    if !recipe.creds_file.is_empty() {
        cmd.arg("--creds-file").arg(&recipe.creds_file);
    }
    cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    cmd
}

/// Bare executable names prefer a sibling of the current executable (the
/// usual install layout) before falling back to PATH lookup.
fn resolve_target(target: &str) -> PathBuf {
    let path = Path::new(target);
    if path.components().count() > 1 {
        return path.to_path_buf();
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(target);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::RecipeSet;

    fn recipe(target: &str, pattern: &str) -> Recipe {
        Recipe {
            key: "probe".to_string(),
            target: target.to_string(),
            process_pattern: pattern.to_string(),
            creds_file: "creds/probe.txt".to_string(),
            extra_args: vec!["--vpn-type".to_string(), "probe".to_string()],
        }
    }

    fn manager_with(recipes: RecipeSet) -> (ProcessManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProcessManager::new(recipes, Aggregator::new(dir.path()));
        (manager, dir)
    }

    #[test]
    fn unknown_key_is_an_error() {
        let (manager, _dir) = manager_with(RecipeSet::builtin());
        assert!(matches!(
            manager.start("openvpn"),
            Err(Error::UnknownScanner(key)) if key == "openvpn"
        ));
        assert!(matches!(
            manager.stop("openvpn"),
            Err(Error::UnknownScanner(_))
        ));
    }

    #[test]
    fn stop_with_no_instances_is_a_noop() {
        let set = RecipeSet::from_recipes([recipe(
            "/nonexistent/never_launched",
            "scanhub_no_such_process_pattern",
        )]);
        let (manager, _dir) = manager_with(set);
        assert_eq!(manager.stop("probe").unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn launch_failure_is_scoped_to_the_recipe() {
        let set = RecipeSet::from_recipes([recipe(
            "/nonexistent/no_such_binary_zz",
            "scanhub_no_such_process_pattern",
        )]);
        let (manager, _dir) = manager_with(set);
        assert!(matches!(
            manager.start("probe"),
            Err(Error::LaunchFailed { key, .. }) if key == "probe"
        ));
    }

    #[test]
    fn interpreter_follows_target_file_type() {
        let py = build_command(&recipe("workers/probe.py", "probe"));
        assert_eq!(py.get_program(), "python3");
        let args: Vec<_> = py.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["workers/probe.py", "--vpn-type", "probe", "--creds-file", "creds/probe.txt"]
        );

        let sh = build_command(&recipe("workers/probe.sh", "probe"));
        assert_eq!(sh.get_program(), "sh");

        let direct = build_command(&recipe("/usr/local/bin/probe_scanner", "probe"));
        assert_eq!(direct.get_program(), "/usr/local/bin/probe_scanner");
    }

    #[test]
    fn empty_creds_reference_is_omitted() {
        let mut bare = recipe("/usr/local/bin/probe_scanner", "probe");
        bare.creds_file = String::new();
        let cmd = build_command(&bare);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--vpn-type", "probe"]);
    }

    #[test]
    fn paths_resolve_verbatim() {
        assert_eq!(
            resolve_target("/usr/bin/probe"),
            PathBuf::from("/usr/bin/probe")
        );
    }

    #[test]
    fn status_reports_every_recipe() {
        let (manager, _dir) = manager_with(RecipeSet::builtin());
        let status = manager.status().unwrap();
        assert_eq!(status.scanners.len(), 6);
        assert_eq!(status.report.totals.processed, 0);
    }
}
