//! Tracks per-chunk retry state and computes exponential backoff delays,
//! escalating a chunk to fatal once it exhausts its retry budget.

use std::collections::HashMap;

use crate::transport::random_u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone)]
struct ChunkRecord {
    attempts: u32,
    last_error: Option<String>,
    last_attempt_ms: u64,
    backoff_delay_ms: u64,
}

pub struct ErrorRecoveryManager {
    max_retries: u32,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    records: HashMap<u32, ChunkRecord>,
    total_recoveries: u64,
}

impl ErrorRecoveryManager {
    pub fn new(max_retries: u32, base_backoff_ms: u64, max_backoff_ms: u64, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            base_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
            records: HashMap::new(),
            total_recoveries: 0,
        }
    }

    pub fn total_recoveries(&self) -> u64 {
        self.total_recoveries
    }

    /// Records a failed attempt and returns the backoff delay to wait
    /// before retrying, or `None` if the chunk is now fatal.
    pub fn record_failure(&mut self, chunk_index: u32, error: &str, now_ms: u64) -> Option<u64> {
        let record = self.records.entry(chunk_index).or_insert(ChunkRecord {
            attempts: 0,
            last_error: None,
            last_attempt_ms: now_ms,
            backoff_delay_ms: self.base_backoff_ms,
        });
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        record.last_attempt_ms = now_ms;

        if record.attempts >= self.max_retries {
            return None;
        }

        let exp = self.backoff_multiplier.powi(record.attempts as i32 - 1);
        let raw = (self.base_backoff_ms as f64 * exp) as u64;
        let jitter = (random_u32() as u64 % (raw.max(1) / 10 + 1)).min(raw / 10 + 1);
        let delay = (raw + jitter).min(self.max_backoff_ms);
        record.backoff_delay_ms = delay;
        Some(delay)
    }

    pub fn attempts(&self, chunk_index: u32) -> u32 {
        self.records.get(&chunk_index).map(|r| r.attempts).unwrap_or(0)
    }

    pub fn is_fatal(&self, chunk_index: u32) -> bool {
        self.attempts(chunk_index) >= self.max_retries
    }

    /// Called once a retried chunk is finally acknowledged.
    pub fn record_success(&mut self, chunk_index: u32) {
        if let Some(record) = self.records.remove(&chunk_index) {
            if record.attempts > 0 {
                self.total_recoveries += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Adjusts retry budget and base delay for the observed link quality.
    pub fn adapt_to_quality(&mut self, quality: NetworkQuality) {
        let (max_retries, base_backoff_ms) = match quality {
            NetworkQuality::Excellent => (3, 500),
            NetworkQuality::Good => (5, 1_000),
            NetworkQuality::Fair => (7, 2_000),
            NetworkQuality::Poor => (10, 4_000),
        };
        self.max_retries = max_retries;
        self.base_backoff_ms = base_backoff_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let mut mgr = ErrorRecoveryManager::new(10, 1_000, 30_000, 2.0);
        let d1 = mgr.record_failure(0, "timeout", 0).unwrap();
        let d2 = mgr.record_failure(0, "timeout", 0).unwrap();
        assert!(d2 > d1);
    }

    #[test]
    fn fatal_after_max_retries() {
        let mut mgr = ErrorRecoveryManager::new(3, 1_000, 30_000, 2.0);
        assert!(mgr.record_failure(0, "timeout", 0).is_some());
        assert!(mgr.record_failure(0, "timeout", 0).is_some());
        assert!(mgr.record_failure(0, "timeout", 0).is_none());
        assert!(mgr.is_fatal(0));
    }

    #[test]
    fn backoff_never_exceeds_max() {
        let mut mgr = ErrorRecoveryManager::new(20, 1_000, 5_000, 2.0);
        let mut last = 0;
        for _ in 0..15 {
            if let Some(delay) = mgr.record_failure(0, "timeout", 0) {
                last = delay;
            }
        }
        assert!(last <= 5_000);
    }

    #[test]
    fn success_clears_record_and_counts_recovery() {
        let mut mgr = ErrorRecoveryManager::new(5, 1_000, 30_000, 2.0);
        mgr.record_failure(0, "timeout", 0);
        mgr.record_success(0);
        assert_eq!(mgr.attempts(0), 0);
        assert_eq!(mgr.total_recoveries(), 1);
    }

    #[test]
    fn success_without_prior_failure_does_not_count() {
        let mut mgr = ErrorRecoveryManager::new(5, 1_000, 30_000, 2.0);
        mgr.record_success(0);
        assert_eq!(mgr.total_recoveries(), 0);
    }
}
