//! Log-persistence collaborator consumed by the live channel. The
//! relational implementation lives outside this core; the in-memory store
//! backs the daemon default and the tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::Result;

/// One persisted log line as served to dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: u64,
    pub level: String,
    pub message: String,
    pub source: String,
    /// Epoch seconds.
    pub timestamp: i64,
}

/// Insert-and-page interface of the log-persistence collaborator.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert(&self, level: &str, message: &str, source: &str) -> Result<()>;

    /// Newest-first page (1-based) of log records plus the total count.
    async fn fetch_page(&self, page: usize, per_page: usize)
        -> Result<(Vec<LogRecord>, usize)>;
}

/// Bounded in-memory log store; oldest records are evicted at capacity.
#[derive(Debug)]
pub struct MemoryLogStore {
    entries: Mutex<VecDeque<LogRecord>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(&self, level: &str, message: &str, source: &str) -> Result<()> {
        let record = LogRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            level: level.to_string(),
            message: message.to_string(),
            source: source.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
        Ok(())
    }

    async fn fetch_page(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<(Vec<LogRecord>, usize)> {
        let entries = self.entries.lock().await;
        let total = entries.len();
        let page = page.max(1);
        let records = entries
            .iter()
            .rev()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();
        Ok((records, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_are_newest_first() {
        let store = MemoryLogStore::new();
        for i in 1..=5 {
            store
                .insert("info", &format!("event {i}"), "test")
                .await
                .unwrap();
        }

        let (first, total) = store.fetch_page(1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first[0].message, "event 5");
        assert_eq!(first[1].message, "event 4");

        let (second, _) = store.fetch_page(2, 2).await.unwrap();
        assert_eq!(second[0].message, "event 3");

        let (past_end, _) = store.fetch_page(9, 2).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let store = MemoryLogStore::with_capacity(3);
        for i in 1..=5 {
            store
                .insert("info", &format!("event {i}"), "test")
                .await
                .unwrap();
        }
        let (records, total) = store.fetch_page(1, 10).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(records.last().unwrap().message, "event 3");
    }
}
