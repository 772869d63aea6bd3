//! Every tunable the transfer pipeline recognizes, with the documented
//! default values. `validate` rejects anything a transfer couldn't
//! actually run with, before a `Sender`/`Receiver` is ever constructed.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

pub const MIN_CHUNK_SIZE: u32 = 8 * 1024;
pub const MAX_CHUNK_SIZE: u32 = 256 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub chunk_size: u32,
    pub window_min: u32,
    pub window_max: u32,
    pub window_init: u32,
    pub ack_timeout_ms: u64,
    pub stall_timeout_ms: u64,
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    pub disk_threshold_bytes: u64,
    pub cache_capacity_bytes: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub hash_pool_min: usize,
    pub hash_pool_max: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            window_min: 5,
            window_max: 100,
            window_init: 10,
            ack_timeout_ms: 15_000,
            stall_timeout_ms: 5_000,
            batch_size: 50,
            batch_interval_ms: 100,
            disk_threshold_bytes: 100 * 1024 * 1024,
            cache_capacity_bytes: 64 * 1024 * 1024,
            max_retries: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            hash_pool_min: 2,
            hash_pool_max: 8,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < MIN_CHUNK_SIZE || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::Validation(format!(
                "chunkSize {} outside [{}, {}]",
                self.chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if self.window_min == 0 || self.window_min > self.window_max {
            return Err(TransferError::Validation(
                "windowMin must be > 0 and <= windowMax".into(),
            ));
        }
        if self.window_init < self.window_min || self.window_init > self.window_max {
            return Err(TransferError::Validation(
                "windowInit must lie within [windowMin, windowMax]".into(),
            ));
        }
        if self.hash_pool_min == 0 || self.hash_pool_min > self.hash_pool_max {
            return Err(TransferError::Validation(
                "hashPoolMin must be > 0 and <= hashPoolMax".into(),
            ));
        }
        if self.backoff_multiplier <= 1.0 {
            return Err(TransferError::Validation(
                "backoffMultiplier must be > 1.0".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(TransferError::Validation("maxRetries must be > 0".into()));
        }
        Ok(())
    }

    /// `min(8, max(2, hardwareConcurrency))`, clamped further into the
    /// configured hash pool bounds.
    pub fn hash_pool_size(&self) -> usize {
        let hw = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        hw.clamp(self.hash_pool_min, self.hash_pool_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TransferConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_chunk_size_out_of_range() {
        let mut cfg = TransferConfig::default();
        cfg.chunk_size = 4096;
        assert!(cfg.validate().is_err());

        cfg.chunk_size = 512 * 1024;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_window_bounds() {
        let mut cfg = TransferConfig::default();
        cfg.window_min = 50;
        cfg.window_max = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn hash_pool_size_is_clamped() {
        let cfg = TransferConfig {
            hash_pool_min: 2,
            hash_pool_max: 8,
            ..TransferConfig::default()
        };
        let size = cfg.hash_pool_size();
        assert!((2..=8).contains(&size));
    }
}
