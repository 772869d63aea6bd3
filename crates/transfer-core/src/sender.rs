//! Chunk sender: owns the send window, the retransmit cache, and the retry
//! engine for one outbound transfer.
//!
//! ```text
//! [StreamingReader] --chunk--> [send loop] --DATA--> [PeerTransport]
//!                                  ^                      |
//!                                  |                  ACK/BATCH_ACK
//!                                  +----------------------+
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::batch_ack::decode_indices;
use crate::cache::LruChunkCache;
use crate::checksum::ChecksumEngine;
use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::events::TransferEvent;
use crate::logging::{TransferLog, TransferLogger};
use crate::preflight::PreflightResult;
use crate::protocol::{BatchAckBody, FileMetadata, Packet};
use crate::reader::StreamingReader;
use crate::recovery::ErrorRecoveryManager;
use crate::sampler::select_sampled_indices;
use crate::smoother::ProgressSmoother;
use crate::transport::PeerTransport;
use crate::window::WindowManager;

/// `ProgressSmoother` tuning: a gentle pull toward the raw target each tick,
/// with no hard per-tick cap since progress/speed/eta share one smoother
/// despite living on very different scales.
const SMOOTHING_FACTOR: f64 = 0.2;
const SMOOTHING_MAX_CHANGE: f64 = f64::MAX;
const SMOOTHING_MIN_CHANGE: f64 = 1e-6;

struct PendingChunk {
    sent_at_ms: u64,
}

pub struct Sender {
    transfer_id: String,
    reader: StreamingReader,
    transport: Arc<dyn PeerTransport>,
    checksum_engine: Arc<ChecksumEngine>,
    logger: Arc<dyn TransferLogger>,
    config: TransferConfig,

    window: WindowManager,
    cache: LruChunkCache,
    recovery: ErrorRecoveryManager,
    sampled: HashSet<u32>,
    smoother: ProgressSmoother,

    next_to_send: u32,
    inflight: HashMap<u32, PendingChunk>,
    acked: HashSet<u32>,

    paused: bool,
    cancelled: bool,
    complete: bool,

    total_chunks: u32,
    bytes_total: u64,
    bytes_acked: u64,
    started_at_ms: u64,
}

impl Sender {
    pub fn new(
        transfer_id: String,
        reader: StreamingReader,
        transport: Arc<dyn PeerTransport>,
        checksum_engine: Arc<ChecksumEngine>,
        logger: Arc<dyn TransferLogger>,
        config: TransferConfig,
        file_size: u64,
        started_at_ms: u64,
    ) -> Self {
        let total_chunks = reader.total_chunks();
        let sampled = select_sampled_indices(total_chunks, file_size);
        let window = WindowManager::new(config.window_min, config.window_max, config.window_init);
        let cache = LruChunkCache::new(config.cache_capacity_bytes);
        let recovery = ErrorRecoveryManager::new(
            config.max_retries,
            config.base_backoff_ms,
            config.max_backoff_ms,
            config.backoff_multiplier,
        );
        Self {
            transfer_id,
            reader,
            transport,
            checksum_engine,
            logger,
            config,
            window,
            cache,
            recovery,
            sampled,
            smoother: ProgressSmoother::new(SMOOTHING_FACTOR, SMOOTHING_MAX_CHANGE, SMOOTHING_MIN_CHANGE),
            next_to_send: 0,
            inflight: HashMap::new(),
            acked: HashSet::new(),
            paused: false,
            cancelled: false,
            complete: false,
            total_chunks,
            bytes_total: file_size,
            bytes_acked: 0,
            started_at_ms,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn cwnd(&self) -> u32 {
        self.window.cwnd()
    }

    /// Builds and ships the META preflight packet. Must be called before
    /// the first `pump`.
    pub async fn start(&mut self, metadata: FileMetadata, preflight: PreflightResult, now_ms: u64) -> Result<TransferEvent> {
        let packet = Packet::Meta {
            transfer_id: self.transfer_id.clone(),
            metadata,
            first_chunk: Some(preflight.first_chunk),
            thumbnail: preflight.thumbnail,
            ts: now_ms,
        };
        let bytes = crate::protocol::encode(&packet);
        self.transport
            .send_to_peer(&self.transfer_id, bytes.clone())
            .await?;
        Ok(TransferEvent::PreflightReady {
            transfer_id: self.transfer_id.clone(),
            packet: bytes,
        })
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn cancel(&mut self) -> TransferEvent {
        self.cancelled = true;
        self.inflight.clear();
        self.cache.clear();
        self.log(crate::logging::TransferEvent::Cancelled);
        TransferEvent::Cancelled {
            transfer_id: self.transfer_id.clone(),
        }
    }

    /// Admits as many new chunks as the window allows.
    pub async fn pump(&mut self, now_ms: u64) -> Result<()> {
        if self.paused || self.cancelled || self.complete {
            return Ok(());
        }
        while self.inflight.len() < self.window.cwnd() as usize && self.next_to_send < self.total_chunks {
            let index = self.next_to_send;
            if self.acked.contains(&index) {
                self.next_to_send += 1;
                continue;
            }
            self.send_chunk(index, now_ms).await?;
            self.next_to_send += 1;
        }
        Ok(())
    }

    async fn send_chunk(&mut self, index: u32, now_ms: u64) -> Result<()> {
        let payload = self
            .reader
            .read_chunk(index)?
            .ok_or_else(|| TransferError::Resource(format!("chunk {index} out of range")))?;

        let checksum = if self.sampled.contains(&index) {
            Some(self.checksum_engine.hash_chunk(payload.clone()).await)
        } else {
            None
        };

        let packet = Packet::Data {
            transfer_id: self.transfer_id.clone(),
            chunk_index: index,
            payload: payload.clone(),
            checksum,
        };
        let bytes = crate::protocol::encode(&packet);
        self.transport.send_to_peer(&self.transfer_id, bytes).await?;

        self.cache.put(index, payload.clone());
        self.inflight.insert(index, PendingChunk { sent_at_ms: now_ms });
        self.log(crate::logging::TransferEvent::ChunkSent {
            chunk_index: index,
            size: payload.len(),
            sampled: self.sampled.contains(&index),
        });
        Ok(())
    }

    async fn retransmit(&mut self, index: u32, now_ms: u64) -> Result<()> {
        let payload = match self.cache.get(index) {
            Some(bytes) => bytes.to_vec(),
            None => self
                .reader
                .read_chunk(index)?
                .ok_or_else(|| TransferError::Resource(format!("chunk {index} out of range")))?,
        };
        let checksum = if self.sampled.contains(&index) {
            Some(self.checksum_engine.hash_chunk(payload.clone()).await)
        } else {
            None
        };
        let packet = Packet::Data {
            transfer_id: self.transfer_id.clone(),
            chunk_index: index,
            payload: payload.clone(),
            checksum,
        };
        let bytes = crate::protocol::encode(&packet);
        self.transport.send_to_peer(&self.transfer_id, bytes).await?;
        self.cache.put(index, payload);
        self.inflight.insert(index, PendingChunk { sent_at_ms: now_ms });
        Ok(())
    }

    /// Records a single ACK: frees its pending/cache entries, feeds RTT to
    /// the window manager, and accounts progress. Idempotent for an index
    /// already acked (L4).
    pub async fn on_ack(&mut self, chunk_index: u32, now_ms: u64) -> Option<u64> {
        if self.acked.contains(&chunk_index) {
            return None;
        }
        let rtt_ms = self
            .inflight
            .remove(&chunk_index)
            .map(|p| now_ms.saturating_sub(p.sent_at_ms))
            .unwrap_or(0);
        self.cache.evict(chunk_index);
        self.recovery.record_success(chunk_index);
        self.acked.insert(chunk_index);
        self.bytes_acked += self.reader.chunk_len(chunk_index);
        self.window.on_ack(rtt_ms);
        self.log(crate::logging::TransferEvent::ChunkAcked {
            chunk_index,
            rtt_ms,
        });

        if self.acked.len() as u32 == self.total_chunks {
            self.complete = true;
        }
        Some(rtt_ms)
    }

    pub async fn on_batch_ack(&mut self, body: BatchAckBody, now_ms: u64) {
        for index in decode_indices(&body) {
            self.on_ack(index, now_ms).await;
        }
    }

    /// Terminal success signaled by the receiver: emits COMPLETE.
    pub fn on_receiver_complete(
        &mut self,
        handle: String,
        name: String,
        size: u64,
        average_speed: f64,
        total_time_ms: u64,
    ) -> TransferEvent {
        self.complete = true;
        TransferEvent::Complete {
            transfer_id: self.transfer_id.clone(),
            handle,
            name,
            size,
            average_speed,
            total_time_ms,
        }
    }

    /// Scans in-flight chunks for ACK timeout, consulting the recovery
    /// engine for each and either retransmitting or declaring the transfer
    /// fatally failed.
    pub async fn check_timeouts(&mut self, now_ms: u64) -> Result<()> {
        let timed_out: Vec<u32> = self
            .inflight
            .iter()
            .filter(|(_, p)| now_ms.saturating_sub(p.sent_at_ms) >= self.config.ack_timeout_ms)
            .map(|(idx, _)| *idx)
            .collect();

        for index in timed_out {
            self.window.on_timeout();
            match self.recovery.record_failure(index, "ack timeout", now_ms) {
                Some(backoff_ms) => {
                    self.log(crate::logging::TransferEvent::ChunkRetried {
                        chunk_index: index,
                        attempt: self.recovery.attempts(index),
                        backoff_ms,
                    });
                    self.inflight.remove(&index);
                    self.retransmit(index, now_ms).await?;
                }
                None => {
                    let attempts = self.recovery.attempts(index);
                    self.log(crate::logging::TransferEvent::ChunkFatal {
                        chunk_index: index,
                        attempts,
                    });
                    return Err(TransferError::FatalChunk {
                        chunk_index: index,
                        attempts,
                    });
                }
            }
        }
        Ok(())
    }

    /// Computes the raw progress/speed/eta from acked bytes so far, runs one
    /// `ProgressSmoother` tick toward it, and reports the smoothed values —
    /// the display series a host UI should actually render.
    pub fn progress(&mut self, now_ms: u64) -> TransferEvent {
        let bytes_done = self.bytes_acked;
        let elapsed_s = ((now_ms.saturating_sub(self.started_at_ms)) as f64 / 1000.0).max(0.001);
        let raw_speed = bytes_done as f64 / elapsed_s;
        let remaining = self.bytes_total.saturating_sub(bytes_done) as f64;
        let raw_eta = if raw_speed > 0.0 { remaining / raw_speed } else { 0.0 };
        let raw_progress = if self.bytes_total == 0 {
            1.0
        } else {
            bytes_done as f64 / self.bytes_total as f64
        };

        self.smoother.set_target(raw_progress, raw_speed, raw_eta);
        self.smoother.tick();
        let smoothed = self.smoother.current();

        TransferEvent::Progress {
            transfer_id: self.transfer_id.clone(),
            progress: smoothed.progress,
            speed: smoothed.speed,
            eta: smoothed.eta,
            bytes_done,
            chunks_done: self.acked.len() as u32,
            total_chunks: self.total_chunks,
            window_size: self.window.cwnd(),
        }
    }

    fn log(&self, event: crate::logging::TransferEvent) {
        self.logger.log(TransferLog {
            component: "sender",
            transfer_id: self.transfer_id.clone(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;
    use crate::reader::MemorySource;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn send_to_peer(&self, _transfer_id: &str, frame: Vec<u8>) -> Result<()> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn make_sender(data: Vec<u8>, chunk_size: u32) -> (Sender, Arc<RecordingTransport>) {
        let reader = StreamingReader::new(Box::new(MemorySource::new(data.clone())), chunk_size);
        let transport = Arc::new(RecordingTransport::new());
        let engine = ChecksumEngine::new(1);
        let sender = Sender::new(
            "t1".into(),
            reader,
            transport.clone(),
            engine,
            Arc::new(NullLogger),
            TransferConfig::default(),
            data.len() as u64,
            0,
        );
        (sender, transport)
    }

    #[tokio::test]
    async fn pump_sends_up_to_window_size() {
        let (mut sender, transport) = make_sender(vec![0u8; 100], 4);
        sender.pump(0).await.unwrap();
        assert!(!transport.sent.lock().unwrap().is_empty());
        assert!(sender.inflight.len() <= sender.cwnd() as usize);
    }

    #[tokio::test]
    async fn duplicate_ack_is_idempotent() {
        let (mut sender, _t) = make_sender(vec![0u8; 20], 4);
        sender.pump(0).await.unwrap();
        sender.on_ack(0, 10).await;
        let cwnd_after_first = sender.cwnd();
        sender.on_ack(0, 10).await;
        assert_eq!(sender.cwnd(), cwnd_after_first);
    }

    #[tokio::test]
    async fn cancel_clears_inflight_state() {
        let (mut sender, _t) = make_sender(vec![0u8; 100], 4);
        sender.pump(0).await.unwrap();
        sender.cancel();
        assert!(sender.is_cancelled());
        assert!(sender.inflight.is_empty());
    }

    #[tokio::test]
    async fn all_chunks_acked_marks_complete() {
        let (mut sender, _t) = make_sender(b"abcdef".to_vec(), 4);
        sender.pump(0).await.unwrap();
        sender.on_ack(0, 10).await;
        sender.on_ack(1, 20).await;
        assert!(sender.is_complete());
    }

    #[tokio::test]
    async fn acked_bytes_accumulate_toward_file_size() {
        let (mut sender, _t) = make_sender(b"abcdef".to_vec(), 4);
        sender.pump(0).await.unwrap();
        assert_eq!(sender.bytes_acked, 0);
        sender.on_ack(0, 10).await;
        assert_eq!(sender.bytes_acked, 4);
        sender.on_ack(1, 20).await;
        assert_eq!(sender.bytes_acked, 6);
    }

    #[tokio::test]
    async fn progress_reflects_acked_bytes_and_moves_toward_complete() {
        let (mut sender, _t) = make_sender(b"abcdef".to_vec(), 4);
        sender.pump(0).await.unwrap();
        sender.on_ack(0, 10).await;
        sender.on_ack(1, 20).await;
        let event = sender.progress(30);
        match event {
            TransferEvent::Progress { progress, bytes_done, .. } => {
                assert_eq!(bytes_done, 6);
                assert!(progress > 0.0);
            }
            other => panic!("expected Progress, got {other:?}"),
        }
    }
}
