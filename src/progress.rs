//! Run-scoped progress counters
//!
//! A [`ProgressState`] is owned by one pipeline run and shared by `Arc` with
//! the input reader, worker threads and any external reporter. All updates are
//! atomic increments; readers take a [`ProgressSnapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ProgressState {
    records_seen: AtomicU64,
    records_matched: AtomicU64,
    records_skipped: AtomicU64,
    bytes_read: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub records_seen: u64,
    pub records_matched: u64,
    pub records_skipped: u64,
    pub bytes_read: u64,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seen(&self) {
        self.records_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matched(&self) {
        self.records_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen.load(Ordering::Relaxed)
    }

    /// Zero every counter; called at the start of each run
    pub fn reset(&self) {
        self.records_seen.store(0, Ordering::Relaxed);
        self.records_matched.store(0, Ordering::Relaxed);
        self.records_skipped.store(0, Ordering::Relaxed);
        self.bytes_read.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            records_seen: self.records_seen.load(Ordering::Relaxed),
            records_matched: self.records_matched.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_and_reset() {
        let progress = ProgressState::new();
        progress.record_seen();
        progress.record_seen();
        progress.record_matched();
        progress.add_bytes(128);

        let snap = progress.snapshot();
        assert_eq!(snap.records_seen, 2);
        assert_eq!(snap.records_matched, 1);
        assert_eq!(snap.bytes_read, 128);

        progress.reset();
        assert_eq!(progress.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn test_concurrent_increments() {
        let progress = Arc::new(ProgressState::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let progress = Arc::clone(&progress);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        progress.record_seen();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.records_seen(), 4000);
    }
}
