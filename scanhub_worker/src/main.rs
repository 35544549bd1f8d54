//! Synthetic scanner worker. Walks a credentials file at a fixed pace,
//! classifies each attempt with a deterministic outcome mix, and drives the
//! real stats pipeline: every hit lands in the output file, every tick
//! lands in `stats_<id>.json`. No actual scanning happens here.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use scanhub_core::config::Config;
use scanhub_core::stats::StatsRecorder;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
struct WorkerArgs {
    vpn_type: String,
    creds_file: Option<String>,
    output: String,
    delay: Duration,
    /// Passes over the credentials file; zero repeats until a signal.
    cycles: u64,
}

impl Default for WorkerArgs {
    fn default() -> Self {
        Self {
            vpn_type: "fortinet".to_string(),
            creds_file: None,
            output: "valid.txt".to_string(),
            delay: Duration::from_millis(250),
            cycles: 1,
        }
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<WorkerArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "scanhub_worker".into());
    let usage = format!(
        "Usage: {prog} [--vpn-type NAME] [--creds-file PATH] [--output PATH] [--delay-ms N] [--cycles N]"
    );
    let mut parsed = WorkerArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage),
            "--vpn-type" => {
                parsed.vpn_type = it.next().ok_or_else(|| usage.clone())?;
            }
            "--creds-file" => parsed.creds_file = it.next(),
            "--output" => {
                parsed.output = it.next().ok_or_else(|| usage.clone())?;
            }
            "--delay-ms" => {
                let raw = it.next().ok_or_else(|| usage.clone())?;
                let ms = raw.parse::<u64>().map_err(|_| usage.clone())?;
                parsed.delay = Duration::from_millis(ms);
            }
            "--cycles" => {
                let raw = it.next().ok_or_else(|| usage.clone())?;
                parsed.cycles = raw.parse::<u64>().map_err(|_| usage.clone())?;
            }
            _ => return Err(format!("Unexpected argument '{arg}'. {usage}")),
        }
    }
    Ok(parsed)
}

/// Non-empty, non-comment lines of the credentials file.
fn read_credentials(path: &Path) -> std::io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// Deterministic outcome mix: a thin trickle of hits in a sea of misses.
/// Returns whether the attempt was a hit.
fn record_outcome(recorder: &StatsRecorder, index: usize) -> bool {
    match index % 20 {
        0 => {
            recorder.record_good();
            true
        }
        1 | 2 => {
            recorder.record_error();
            false
        }
        3 => {
            recorder.record_offline();
            false
        }
        4 => {
            recorder.record_ipblock();
            false
        }
        _ => {
            recorder.record_bad();
            false
        }
    }
}

async fn run(
    recorder: &StatsRecorder,
    creds: &[String],
    output: &mut File,
    args: &WorkerArgs,
) -> anyhow::Result<()> {
    let mut cycle = 0u64;
    loop {
        for (i, line) in creds.iter().enumerate() {
            tokio::time::sleep(args.delay).await;
            if record_outcome(recorder, i) {
                writeln!(output, "{line}")?;
            }
        }
        cycle += 1;
        if args.cycles != 0 && cycle >= args.cycles {
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args(env::args()) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let cfg = Config::from_env();
    let creds_path = args
        .creds_file
        .clone()
        .unwrap_or_else(|| format!("creds/{}.txt", args.vpn_type));
    let creds = read_credentials(Path::new(&creds_path))
        .with_context(|| format!("credentials file not found: {creds_path}"))?;

    let mut output = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.output)
        .with_context(|| format!("cannot open output file {}", args.output))?;

    fs::create_dir_all(&cfg.stats_dir)?;
    let recorder = Arc::new(StatsRecorder::new(format!(
        "{}_{}",
        args.vpn_type,
        std::process::id()
    )));
    recorder.set_threads(1);
    let ticker = recorder.spawn(cfg.stats_dir.clone());
    info!(
        vpn_type = %args.vpn_type,
        credentials = creds.len(),
        stats_dir = ?cfg.stats_dir,
        "worker started"
    );

    #[cfg(unix)]
    let mut term =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminated = term.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        res = run(&recorder, &creds, &mut output, &args) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = terminated => info!("terminated"),
    }

    recorder.stop();
    let _ = ticker.await;
    // One last snapshot so the final counters survive the stop.
    recorder.write_snapshot(&cfg.stats_dir)?;
    info!(processed = recorder.processed(), goods = recorder.goods(), "worker finished");
    Ok(())
}
