//! Entry point for the control-plane daemon: bind the live channel, wire
//! the aggregator and process control into the hub, and serve until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use scanhub_core::config::Config;
use scanhub_core::process::ProcessManager;
use scanhub_core::recipes::RecipeSet;
use scanhub_core::stats::StatsRecorder;
use scanhub_core::store::{LogStore, MemoryLogStore};
use tracing::info;

use scanhub_agent::hub::Hub;
use scanhub_agent::state::AppState;
use scanhub_agent::{parse_port, router, spawn_broadcaster, DEFAULT_PORT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = parse_port(std::env::args(), DEFAULT_PORT);
    let cfg = Config::from_env();
    std::fs::create_dir_all(&cfg.stats_dir)
        .with_context(|| format!("failed to create stats dir {:?}", cfg.stats_dir))?;

    // Reaching the log-persistence collaborator is one of the two fatal
    // startup conditions.
    let logs: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
    logs.insert("info", "control plane started", "agent")
        .await
        .context("log store unavailable at startup")?;

    let stats = Arc::new(StatsRecorder::new(format!(
        "agent_{}",
        std::process::id()
    )));
    let manager = Arc::new(ProcessManager::new(
        RecipeSet::builtin(),
        cfg.aggregator(),
    ));
    let state = AppState {
        stats,
        aggregator: Arc::new(cfg.aggregator()),
        hub: Arc::new(Hub::new()),
        logs,
        control: Some(manager),
    };

    spawn_broadcaster(state.clone(), cfg.broadcast_interval);

    // The other fatal startup condition: the listening endpoint.
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind live channel on {addr}"))?;
    info!(%addr, stats_dir = ?cfg.stats_dir, "live channel listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
