//! Shared daemon state handed to every connection handler.

use std::sync::Arc;

use scanhub_core::aggregator::Aggregator;
use scanhub_core::process::ScannerControl;
use scanhub_core::stats::StatsRecorder;
use scanhub_core::store::LogStore;
use scanhub_core::types::FleetReport;
use scanhub_core::{Error, Result};

use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    /// The control plane's own counters, served as the live view.
    pub stats: Arc<StatsRecorder>,
    pub aggregator: Arc<Aggregator>,
    pub hub: Arc<Hub>,
    pub logs: Arc<dyn LogStore>,
    /// When wired, scanner commands drive real process control; when
    /// absent the hub acknowledges only.
    pub control: Option<Arc<dyn ScannerControl>>,
}

impl AppState {
    /// Run one aggregation pass off the async runtime's worker threads
    /// (the pass does blocking filesystem and host sampling work).
    pub async fn aggregate(&self) -> Result<FleetReport> {
        let aggregator = Arc::clone(&self.aggregator);
        match tokio::task::spawn_blocking(move || aggregator.collect()).await {
            Ok(report) => report,
            Err(err) => Err(Error::Aggregation(err.to_string())),
        }
    }
}
