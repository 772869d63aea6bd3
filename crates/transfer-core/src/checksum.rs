//! SHA-256 over arbitrary byte ranges.
//!
//! ```text
//! [caller] --submit--> [job queue] --> worker 1..N --> oneshot reply
//! ```
//! Whole-file hashing accumulates over consecutive 10 MiB reads on the
//! calling task (incremental mode); per-chunk hashing is fanned out to a
//! small fixed pool of native threads so many chunks can be hashed
//! concurrently without contending with the tokio runtime.

use std::sync::Arc;

use crossbeam_channel::{bounded, Sender as CbSender};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;

const INCREMENTAL_BLOCK: usize = 10 * 1024 * 1024;

/// One chunk hashing job, carrying its own reply channel.
struct Job {
    data: Vec<u8>,
    reply: oneshot::Sender<String>,
}

/// A bounded pool of native-thread hash workers, shared across all active
/// transfers in the process.
pub struct ChecksumEngine {
    queue: CbSender<Job>,
    _workers: Vec<std::thread::JoinHandle<()>>,
}

impl ChecksumEngine {
    /// Spawns `worker_count` hashing threads, clamped to `min(8, max(2, n))`
    /// by the caller (see `TransferConfig::hash_pool_size`).
    pub fn new(worker_count: usize) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let (tx, rx) = bounded::<Job>(worker_count * 4);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let rx = rx.clone();
            workers.push(std::thread::spawn(move || {
                while let Ok(job) = rx.recv() {
                    let digest = sha256_hex(&job.data);
                    let _ = job.reply.send(digest);
                }
            }));
        }
        Arc::new(Self {
            queue: tx,
            _workers: workers,
        })
    }

    /// One-shot hash of a single chunk's payload, computed on the worker
    /// pool. Ownership of `data` transfers into the worker and back as the
    /// digest string.
    pub async fn hash_chunk(&self, data: Vec<u8>) -> String {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            data,
            reply: reply_tx,
        };
        if self.queue.send(job).is_err() {
            return String::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Incremental whole-file hash: reads consecutive 10 MiB blocks from
    /// `read_at` until `total_len` bytes have been consumed.
    pub fn hash_whole_file(
        &self,
        total_len: u64,
        mut read_at: impl FnMut(u64, usize) -> std::io::Result<Vec<u8>>,
    ) -> std::io::Result<String> {
        let mut hasher = Sha256::new();
        let mut offset = 0u64;
        while offset < total_len {
            let remaining = (total_len - offset) as usize;
            let want = remaining.min(INCREMENTAL_BLOCK);
            let block = read_at(offset, want)?;
            hasher.update(&block);
            offset += block.len() as u64;
            if block.is_empty() {
                break;
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_chunk_matches_direct_hash() {
        let engine = ChecksumEngine::new(2);
        let data = b"hello world".to_vec();
        let expected = sha256_hex(&data);
        let got = engine.hash_chunk(data).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn many_concurrent_jobs_all_resolve() {
        let engine = ChecksumEngine::new(4);
        let mut handles = Vec::new();
        for i in 0..50u8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.hash_chunk(vec![i; 16]).await }));
        }
        for h in handles {
            let digest = h.await.unwrap();
            assert_eq!(digest.len(), 64);
        }
    }

    #[test]
    fn incremental_hash_matches_one_shot_for_small_input() {
        let engine = ChecksumEngine::new(1);
        let data = b"the quick brown fox".to_vec();
        let expected = sha256_hex(&data);
        let got = engine
            .hash_whole_file(data.len() as u64, |offset, len| {
                let start = offset as usize;
                Ok(data[start..start + len].to_vec())
            })
            .unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn incremental_hash_crosses_block_boundary() {
        let engine = ChecksumEngine::new(1);
        let data = vec![7u8; 25 * 1024 * 1024];
        let expected = sha256_hex(&data);
        let got = engine
            .hash_whole_file(data.len() as u64, |offset, len| {
                let start = offset as usize;
                Ok(data[start..start + len].to_vec())
            })
            .unwrap();
        assert_eq!(got, expected);
    }
}
