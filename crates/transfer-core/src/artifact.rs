//! Assembly strategies for receiver output: small transfers accumulate in
//! memory, large ones stream straight to disk through an `ArtifactSink`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::transport::ArtifactSink;

/// Holds assembled bytes in memory, keyed by chunk index until finalized.
pub struct MemoryArtifact {
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl MemoryArtifact {
    pub fn new() -> Self {
        Self {
            chunks: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, index: u32, data: Vec<u8>) {
        self.chunks.entry(index).or_insert(data);
    }

    pub fn contains(&self, index: u32) -> bool {
        self.chunks.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenates every chunk in ascending index order into one blob.
    pub fn finalize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for bytes in self.chunks.values() {
            out.extend_from_slice(bytes);
        }
        out
    }
}

impl Default for MemoryArtifact {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential, order-respecting writer for disk mode. Tracks
/// `next_expected_index` and holds out-of-order arrivals in a bounded
/// pending map until their predecessors land, so the final artifact is
/// written strictly in ascending index order regardless of arrival order.
pub struct DiskSequencer {
    sink: Arc<dyn ArtifactSink>,
    chunk_size: u64,
    next_expected_index: u32,
    pending: BTreeMap<u32, Vec<u8>>,
    pending_capacity: usize,
}

impl DiskSequencer {
    pub fn new(sink: Arc<dyn ArtifactSink>, chunk_size: u64, pending_capacity: usize) -> Self {
        Self {
            sink,
            chunk_size,
            next_expected_index: 0,
            pending: BTreeMap::new(),
            pending_capacity,
        }
    }

    pub fn next_expected_index(&self) -> u32 {
        self.next_expected_index
    }

    pub fn is_already_applied(&self, index: u32) -> bool {
        index < self.next_expected_index || self.pending.contains_key(&index)
    }

    /// Applies a chunk. If it's the next expected index, writes it and
    /// drains any queued successors; otherwise holds it in the pending map.
    /// Returns `false` when the pending map is already full and the chunk
    /// had to be discarded, so the caller knows not to treat it as received.
    pub async fn apply(&mut self, index: u32, data: Vec<u8>) -> Result<bool> {
        if index < self.next_expected_index {
            return Ok(true);
        }
        if index == self.next_expected_index {
            self.write_one(data).await?;
            while let Some(next) = self.pending.remove(&self.next_expected_index) {
                self.write_one(next).await?;
            }
        } else if self.pending.len() < self.pending_capacity {
            self.pending.insert(index, data);
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    async fn write_one(&mut self, data: Vec<u8>) -> Result<()> {
        let offset = self.next_expected_index as u64 * self.chunk_size;
        self.sink.write(offset, &data).await?;
        self.next_expected_index += 1;
        Ok(())
    }

    /// Flushes any residual pending chunks in ascending order, used once
    /// the last chunk is known to have arrived so holes caused by a
    /// still-missing predecessor don't silently drop data.
    pub async fn drain_residual(&mut self) -> Result<()> {
        while let Some(next) = self.pending.remove(&self.next_expected_index) {
            self.write_one(next).await?;
        }
        Ok(())
    }

    /// Flushes and hashes the written file, then closes the handle.
    pub async fn finalize(&self) -> Result<String> {
        self.sink.flush().await?;
        let hash = self.sink.sha256().await?;
        self.sink.close().await?;
        Ok(hash)
    }

    pub async fn remove(&self) -> Result<()> {
        self.sink.remove().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        written: Mutex<BTreeMap<u64, Vec<u8>>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                written: Mutex::new(BTreeMap::new()),
            }
        }

        fn concat(&self) -> Vec<u8> {
            self.written.lock().unwrap().values().flatten().copied().collect()
        }
    }

    #[async_trait]
    impl ArtifactSink for RecordingSink {
        async fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
            self.written.lock().unwrap().insert(offset, data.to_vec());
            Ok(())
        }
        async fn flush(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
        async fn remove(&self) -> Result<()> {
            Ok(())
        }
        async fn sha256(&self) -> Result<String> {
            Ok(crate::checksum::sha256_hex(&self.concat()))
        }
    }

    #[test]
    fn memory_artifact_concatenates_in_order() {
        let mut artifact = MemoryArtifact::new();
        artifact.insert(1, b"def".to_vec());
        artifact.insert(0, b"abc".to_vec());
        assert_eq!(artifact.finalize(), b"abcdef");
    }

    #[tokio::test]
    async fn disk_sequencer_reorders_out_of_order_chunks() {
        let sink = Arc::new(RecordingSink::new());
        let mut seq = DiskSequencer::new(sink.clone(), 3, 16);
        seq.apply(2, b"ghi".to_vec()).await.unwrap();
        seq.apply(0, b"abc".to_vec()).await.unwrap();
        seq.apply(1, b"def".to_vec()).await.unwrap();
        assert_eq!(sink.concat(), b"abcdefghi");
    }

    #[tokio::test]
    async fn duplicate_chunk_does_not_rewrite() {
        let sink = Arc::new(RecordingSink::new());
        let mut seq = DiskSequencer::new(sink.clone(), 3, 16);
        seq.apply(0, b"abc".to_vec()).await.unwrap();
        seq.apply(0, b"abc".to_vec()).await.unwrap();
        assert_eq!(seq.next_expected_index(), 1);
        assert_eq!(sink.concat(), b"abc");
    }

    #[tokio::test]
    async fn apply_reports_false_once_pending_map_is_full() {
        let sink = Arc::new(RecordingSink::new());
        let mut seq = DiskSequencer::new(sink.clone(), 3, 2);
        assert!(seq.apply(1, b"def".to_vec()).await.unwrap());
        assert!(seq.apply(2, b"ghi".to_vec()).await.unwrap());
        assert!(!seq.apply(3, b"jkl".to_vec()).await.unwrap());
    }

    #[tokio::test]
    async fn drain_residual_flushes_pending_tail() {
        let sink = Arc::new(RecordingSink::new());
        let mut seq = DiskSequencer::new(sink.clone(), 3, 16);
        seq.apply(1, b"def".to_vec()).await.unwrap();
        seq.apply(0, b"abc".to_vec()).await.unwrap();
        seq.drain_residual().await.unwrap();
        assert_eq!(sink.concat(), b"abcdef");
    }
}
