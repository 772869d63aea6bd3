//! Boundary traits that keep the pipeline host-agnostic: sending bytes to a
//! peer, writing assembled output somewhere, and reading the clock. Tests
//! swap in in-memory implementations; a real host wires these to its actual
//! data channel and filesystem.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::Result;

const HASH_BLOCK: usize = 10 * 1024 * 1024;

/// Delivers an encoded frame to the remote peer. The transport is assumed to
/// preserve message boundaries but not ordering, and may drop messages.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send_to_peer(&self, transfer_id: &str, frame: Vec<u8>) -> Result<()>;
}

/// Destination for assembled transfer output, in memory or on disk.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write(&self, offset: u64, data: &[u8]) -> Result<()>;
    async fn flush(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn remove(&self) -> Result<()>;
    /// SHA-256 of everything written so far, hex-encoded. Used to verify
    /// disk-mode assembly at finalization without holding the file in
    /// memory.
    async fn sha256(&self) -> Result<String>;
}

/// Disk-mode `ArtifactSink`: an append-capable file opened for positional
/// writes, used when a transfer crosses `diskThresholdBytes`.
pub struct FileArtifactSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileArtifactSink {
    pub async fn create(path: PathBuf) -> Result<Self> {
        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.file.lock().await.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }

    /// Hashes the file in fixed-size blocks read from a fresh handle,
    /// rather than loading it whole, so finalizing a disk-mode transfer
    /// doesn't defeat the bounded-memory reason disk mode was chosen.
    async fn sha256(&self) -> Result<String> {
        use sha2::{Digest, Sha256};

        self.file.lock().await.flush().await?;
        let mut reader = tokio::fs::File::open(&self.path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_BLOCK];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Wall-clock source, abstracted so tests can run deterministic time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Draws a random `u32`, used for jitter and sampling decisions.
pub fn random_u32() -> u32 {
    rand::random()
}

/// Number of hash workers to run concurrently, per the host's available
/// parallelism.
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

/// SHA-256 of a byte slice, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
