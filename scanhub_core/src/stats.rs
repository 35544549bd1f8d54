//! Per-worker stats recording: lock-free outcome counters, rolling rate
//! metrics, and best-effort snapshot persistence once per second.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::types::{Snapshot, StatsView};
use crate::Result;

/// Tick period of the rate/persistence loop.
pub const TICK: Duration = Duration::from_secs(1);
/// Sliding-window capacity for the average rate, in ticks.
pub const WINDOW_SAMPLES: usize = 60;

/// Thread-safe counters for one worker process. Increments are atomic and
/// never fail; the tick loop computes rates and persists snapshots without
/// ever blocking the counters.
#[derive(Debug)]
pub struct StatsRecorder {
    id: String,
    goods: AtomicU64,
    bads: AtomicU64,
    errors: AtomicU64,
    offline: AtomicU64,
    ipblock: AtomicU64,
    processed: AtomicU64,
    rps: AtomicU64,
    avg_rps_bits: AtomicU64,
    peak_rps: AtomicU64,
    threads: AtomicU64,
    started: Instant,
    stop_tx: watch::Sender<bool>,
}

impl StatsRecorder {
    /// A recorder keyed by a logical worker id; snapshots land in
    /// `stats_<id>.json`.
    pub fn new(id: impl Into<String>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            id: id.into(),
            goods: AtomicU64::new(0),
            bads: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            offline: AtomicU64::new(0),
            ipblock: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            rps: AtomicU64::new(0),
            avg_rps_bits: AtomicU64::new(0),
            peak_rps: AtomicU64::new(0),
            threads: AtomicU64::new(0),
            started: Instant::now(),
            stop_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record_good(&self) {
        self.goods.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad(&self) {
        self.bads.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offline(&self) {
        self.offline.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ipblock(&self) {
        self.ipblock.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_threads(&self, threads: u64) {
        self.threads.store(threads, Ordering::Relaxed);
    }

    pub fn goods(&self) -> u64 {
        self.goods.load(Ordering::Relaxed)
    }

    pub fn bads(&self) -> u64 {
        self.bads.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn offline(&self) -> u64 {
        self.offline.load(Ordering::Relaxed)
    }

    pub fn ipblock(&self) -> u64 {
        self.ipblock.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn rps(&self) -> u64 {
        self.rps.load(Ordering::Relaxed)
    }

    pub fn avg_rps(&self) -> f64 {
        f64::from_bits(self.avg_rps_bits.load(Ordering::Relaxed))
    }

    pub fn peak_rps(&self) -> u64 {
        self.peak_rps.load(Ordering::Relaxed)
    }

    pub fn threads(&self) -> u64 {
        self.threads.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            return 0.0;
        }
        self.goods() as f64 / processed as f64 * 100.0
    }

    /// Current counters as pushed over the live channel.
    pub fn view(&self) -> StatsView {
        StatsView {
            goods: self.goods(),
            bads: self.bads(),
            errors: self.errors(),
            offline: self.offline(),
            ipblock: self.ipblock(),
            processed: self.processed(),
            rps: self.rps() as f64,
            avg_rps: self.avg_rps(),
            peak_rps: self.peak_rps() as f64,
            threads: self.threads(),
            uptime: self.uptime().as_secs(),
            success_rate: self.success_rate(),
        }
    }

    /// Current counters as persisted to the snapshot file.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            goods: self.goods(),
            bads: self.bads(),
            errors: self.errors(),
            offline: self.offline(),
            ipblock: self.ipblock(),
            processed: self.processed(),
            rps: self.rps() as f64,
            avg_rps: self.avg_rps(),
            peak_rps: self.peak_rps() as f64,
            threads: self.threads(),
            uptime: self.uptime().as_secs(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Write the snapshot atomically: serialize to a `.tmp` sibling, then
    /// rename over `stats_<id>.json`. The aggregator must never observe a
    /// partially written file.
    pub fn write_snapshot(&self, dir: &Path) -> Result<()> {
        let data = serde_json::to_vec(&self.snapshot())?;
        let path = dir.join(Snapshot::file_name(&self.id));
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Run the 1 s tick loop: compute the instantaneous rate, update the
    /// sliding average and running peak, persist a snapshot. Write failures
    /// are logged and never stop the loop. Stops cooperatively at the next
    /// tick boundary after [`StatsRecorder::stop`].
    pub fn spawn(self: &Arc<Self>, dir: impl Into<PathBuf>) -> JoinHandle<()> {
        let rec = Arc::clone(self);
        let dir = dir.into();
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The interval fires once immediately; the first real tick
            // should land one period after start.
            ticker.tick().await;

            // A stop issued before the task got to run.
            if *stop_rx.borrow_and_update() {
                return;
            }

            let mut window = RateWindow::new(WINDOW_SAMPLES);
            let mut last_processed = rec.processed();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let current = rec.processed();
                        let delta = current.saturating_sub(last_processed);
                        last_processed = current;

                        rec.rps.store(delta, Ordering::Relaxed);
                        window.push(delta);
                        rec.avg_rps_bits
                            .store(window.average().to_bits(), Ordering::Relaxed);
                        rec.peak_rps.fetch_max(delta, Ordering::Relaxed);

                        if let Err(err) = rec.write_snapshot(&dir) {
                            warn!(id = %rec.id, %err, "snapshot write failed");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        })
    }

    /// Signal the tick loop to exit after the current tick.
    pub fn stop(&self) {
        // send_replace stores the value even with no live receiver, so a
        // stop issued before spawn still takes effect.
        self.stop_tx.send_replace(true);
    }
}

/// Bounded sliding window of per-tick rate samples.
#[derive(Debug)]
struct RateWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl RateWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_keep_processed_consistent() {
        let rec = Arc::new(StatsRecorder::new("t"));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let rec = Arc::clone(&rec);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000 {
                    match i % 5 {
                        0 => rec.record_good(),
                        1 => rec.record_bad(),
                        2 => rec.record_error(),
                        3 => rec.record_offline(),
                        _ => rec.record_ipblock(),
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(rec.processed(), 4000);
        assert!(rec.snapshot().is_consistent());
    }

    #[test]
    fn window_evicts_oldest_and_averages() {
        let mut window = RateWindow::new(3);
        assert_eq!(window.average(), 0.0);
        window.push(3);
        assert_eq!(window.average(), 3.0);
        window.push(6);
        window.push(9);
        assert_eq!(window.average(), 6.0);
        // Capacity reached: the 3 falls out.
        window.push(12);
        assert_eq!(window.average(), 9.0);
    }

    #[test]
    fn sustained_rate_converges() {
        let mut window = RateWindow::new(WINDOW_SAMPLES);
        for _ in 0..WINDOW_SAMPLES + 10 {
            window.push(7);
        }
        assert_eq!(window.average(), 7.0);
    }

    #[test]
    fn success_rate_handles_zero_processed() {
        let rec = StatsRecorder::new("t");
        assert_eq!(rec.success_rate(), 0.0);
        rec.record_good();
        rec.record_bad();
        assert_eq!(rec.success_rate(), 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_loop_updates_rates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Arc::new(StatsRecorder::new("loop_test"));
        let handle = rec.spawn(dir.path());
        // Let the task start and consume the interval's immediate tick.
        tokio::task::yield_now().await;

        for _ in 0..5 {
            rec.record_good();
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;

        assert_eq!(rec.rps(), 5);
        assert_eq!(rec.peak_rps(), 5);
        assert_eq!(rec.avg_rps(), 5.0);

        // A quieter second tick: rate drops, peak stays.
        rec.record_bad();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(rec.rps(), 1);
        assert_eq!(rec.peak_rps(), 5);

        let path = dir.path().join(Snapshot::file_name("loop_test"));
        let snap: Snapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(snap.is_consistent());
        assert_eq!(snap.processed, 6);
        // No temp file left behind.
        assert!(!path.with_extension("json.tmp").exists());

        rec.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_cooperative() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Arc::new(StatsRecorder::new("stop_test"));
        let handle = rec.spawn(dir.path());
        rec.stop();
        // The loop exits at the next boundary without forced cancellation.
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
