//! Owns the set of active transfers on one side of a peer connection,
//! routing inbound packets to the right receiver and fanning out the
//! shared checksum worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::checksum::ChecksumEngine;
use crate::config::TransferConfig;
use crate::error::Result;
use crate::events::TransferEvent;
use crate::logging::TransferLogger;
use crate::protocol::{decode, FileMetadata, Packet};
use crate::receiver::{ChunkOutcome, Receiver};
use crate::sender::Sender;
use crate::transport::ArtifactSink;

/// A read-only snapshot of one active transfer, for a host UI to poll
/// alongside the push-based event stream.
#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub transfer_id: String,
    pub role: &'static str,
    pub progress: f64,
}

pub struct TransferManager {
    config: TransferConfig,
    logger: Arc<dyn TransferLogger>,
    checksum_engine: Arc<ChecksumEngine>,
    senders: Mutex<HashMap<String, Sender>>,
    receivers: Mutex<HashMap<String, Receiver>>,
}

impl TransferManager {
    pub fn new(config: TransferConfig, logger: Arc<dyn TransferLogger>) -> Self {
        let pool_size = config.hash_pool_size();
        Self {
            config,
            logger,
            checksum_engine: ChecksumEngine::new(pool_size),
            senders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
        }
    }

    pub fn checksum_engine(&self) -> Arc<ChecksumEngine> {
        self.checksum_engine.clone()
    }

    pub async fn register_sender(&self, transfer_id: String, sender: Sender) {
        self.senders.lock().await.insert(transfer_id, sender);
    }

    pub async fn register_receiver(
        &self,
        transfer_id: String,
        metadata: FileMetadata,
        sink: Option<Arc<dyn ArtifactSink>>,
        now_ms: u64,
    ) {
        let receiver = Receiver::new(
            transfer_id.clone(),
            metadata,
            self.config.clone(),
            sink,
            self.logger.clone(),
            now_ms,
        );
        self.receivers.lock().await.insert(transfer_id, receiver);
    }

    pub async fn pause(&self, transfer_id: &str) {
        if let Some(sender) = self.senders.lock().await.get_mut(transfer_id) {
            sender.pause();
        }
    }

    pub async fn resume(&self, transfer_id: &str) {
        if let Some(sender) = self.senders.lock().await.get_mut(transfer_id) {
            sender.resume();
        }
    }

    pub async fn cancel(&self, transfer_id: &str) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        if let Some(sender) = self.senders.lock().await.get_mut(transfer_id) {
            events.push(sender.cancel());
        }
        if let Some(receiver) = self.receivers.lock().await.get_mut(transfer_id) {
            events.push(receiver.cancel());
        }
        events
    }

    /// Routes an inbound wire packet to the sender (ACK/BATCH_ACK) or
    /// receiver (DATA/END/META) it belongs to. Unknown transfer ids, and
    /// packets that fail to parse, are ignored.
    pub async fn on_packet(&self, bytes: &[u8], now_ms: u64) -> Result<Option<ChunkOutcome>> {
        let Some(packet) = decode(bytes) else {
            return Ok(None);
        };
        match packet {
            Packet::Ack {
                transfer_id,
                chunk_index,
            } => {
                if let Some(sender) = self.senders.lock().await.get_mut(&transfer_id) {
                    sender.on_ack(chunk_index, now_ms).await;
                }
                Ok(None)
            }
            Packet::BatchAck {
                transfer_id, body, ..
            } => {
                if let Some(sender) = self.senders.lock().await.get_mut(&transfer_id) {
                    sender.on_batch_ack(body, now_ms).await;
                }
                Ok(None)
            }
            Packet::Data { ref transfer_id, .. } => {
                if let Some(receiver) = self.receivers.lock().await.get_mut(transfer_id) {
                    let outcome = receiver.on_chunk(packet, now_ms).await?;
                    return Ok(Some(outcome));
                }
                Ok(None)
            }
            Packet::End { transfer_id } => {
                if let Some(receiver) = self.receivers.lock().await.get_mut(&transfer_id) {
                    receiver.on_end();
                }
                Ok(None)
            }
            Packet::Meta { .. } => Ok(None),
        }
    }

    /// Checks every active sender for timed-out in-flight chunks and drives
    /// its send loop forward.
    pub async fn tick(&self, now_ms: u64) -> Vec<Result<()>> {
        let mut results = Vec::new();
        let mut senders = self.senders.lock().await;
        for sender in senders.values_mut() {
            results.push(sender.check_timeouts(now_ms).await);
            if results.last().map(|r| r.is_ok()).unwrap_or(false) {
                let _ = sender.pump(now_ms).await;
            }
        }
        results
    }

    pub async fn snapshot(&self, now_ms: u64) -> Vec<TransferSnapshot> {
        let mut out = Vec::new();
        for (id, sender) in self.senders.lock().await.iter_mut() {
            if let TransferEvent::Progress { progress, .. } = sender.progress(now_ms) {
                out.push(TransferSnapshot {
                    transfer_id: id.clone(),
                    role: "sender",
                    progress,
                });
            }
        }
        for (id, receiver) in self.receivers.lock().await.iter() {
            let progress = if receiver.is_complete() { 1.0 } else { 0.0 };
            out.push(TransferSnapshot {
                transfer_id: id.clone(),
                role: "receiver",
                progress,
            });
        }
        out
    }

    /// Tears down the shared checksum worker pool once no transfers remain.
    /// A no-op here since the pool's threads exit naturally when the last
    /// `Arc<ChecksumEngine>` clone is dropped; kept as an explicit call site
    /// so callers don't need to know that detail.
    pub async fn teardown_if_idle(&self) {
        let senders = self.senders.lock().await;
        let receivers = self.receivers.lock().await;
        if senders.is_empty() && receivers.is_empty() {
            drop(senders);
            drop(receivers);
        }
    }
}
