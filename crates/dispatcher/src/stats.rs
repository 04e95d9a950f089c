//! Delivery counters shared by all workers of an engine

use std::sync::atomic::{AtomicU64, Ordering};

/// Success/failure tally
///
/// Each dequeued task bumps exactly one of the two counters, once.
#[derive(Debug, Default)]
pub struct StatsCollector {
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of both counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success_count: self.success_count(),
            failure_count: self.failure_count(),
        }
    }
}

/// Copy of the delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
}

impl StatsSnapshot {
    /// Tasks that reached a terminal outcome
    pub fn completed(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_updates_are_counted_once() {
        let stats = Arc::new(StatsCollector::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    if i % 2 == 0 {
                        stats.record_success();
                    } else {
                        stats.record_failure();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.success_count, 400);
        assert_eq!(snapshot.failure_count, 400);
        assert_eq!(snapshot.completed(), 800);
    }
}
