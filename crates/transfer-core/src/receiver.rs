//! Chunk receiver: validates inbound DATA packets, assembles them into the
//! final artifact in ascending order regardless of arrival order, and
//! verifies the whole-file hash at the end.
//!
//! ```text
//! [PeerTransport] --DATA--> [validate] --> [memory|disk assembly] --ACK-->
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::artifact::{DiskSequencer, MemoryArtifact};
use crate::batch_ack::BatchAckManager;
use crate::checksum::sha256_hex;
use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::events::TransferEvent;
use crate::logging::{TransferLog, TransferLogger};
use crate::protocol::{FileMetadata, Packet};
use crate::reader::expected_chunk_len;
use crate::transport::ArtifactSink;

enum Assembly {
    Memory(MemoryArtifact),
    Disk(DiskSequencer),
}

pub struct Receiver {
    transfer_id: String,
    metadata: FileMetadata,
    config: TransferConfig,
    logger: Arc<dyn TransferLogger>,

    assembly: Assembly,
    received: HashSet<u32>,
    batch_ack: BatchAckManager,

    cancelled: bool,
    finished: bool,
    drops: u64,
    started_at_ms: u64,
}

pub enum ChunkOutcome {
    Accepted { ack_index: u32 },
    Duplicate { ack_index: u32 },
    Dropped { reason: &'static str },
}

impl Receiver {
    /// Selects memory or disk assembly based on `diskThresholdBytes`.
    pub fn new(
        transfer_id: String,
        metadata: FileMetadata,
        config: TransferConfig,
        sink: Option<Arc<dyn ArtifactSink>>,
        logger: Arc<dyn TransferLogger>,
        started_at_ms: u64,
    ) -> Self {
        let assembly = if metadata.size >= config.disk_threshold_bytes {
            let sink = sink.expect("disk mode requires an ArtifactSink");
            Assembly::Disk(DiskSequencer::new(sink, metadata.chunk_size as u64, 4096))
        } else {
            Assembly::Memory(MemoryArtifact::new())
        };
        Self {
            transfer_id,
            metadata,
            config,
            logger,
            assembly,
            received: HashSet::new(),
            batch_ack: BatchAckManager::new(),
            cancelled: false,
            finished: false,
            drops: 0,
            started_at_ms,
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.drops
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Validates and applies one inbound DATA packet. Malformed, mismatched,
    /// or failed-integrity packets are dropped silently (no ACK effect); the
    /// caller should still not emit an ACK for those.
    pub async fn on_chunk(&mut self, packet: Packet, now_ms: u64) -> Result<ChunkOutcome> {
        let (chunk_index, payload, checksum) = match packet {
            Packet::Data {
                transfer_id,
                chunk_index,
                payload,
                checksum,
            } => {
                if transfer_id != self.transfer_id {
                    self.drops += 1;
                    self.log(crate::logging::TransferEvent::ChunkDropped {
                        reason: "transfer_id_mismatch",
                    });
                    return Ok(ChunkOutcome::Dropped {
                        reason: "transfer_id_mismatch",
                    });
                }
                (chunk_index, payload, checksum)
            }
            _ => {
                self.drops += 1;
                return Ok(ChunkOutcome::Dropped { reason: "wrong_type" });
            }
        };

        if chunk_index >= self.metadata.total_chunks {
            self.drops += 1;
            self.log(crate::logging::TransferEvent::ChunkDropped {
                reason: "index_out_of_range",
            });
            return Ok(ChunkOutcome::Dropped {
                reason: "index_out_of_range",
            });
        }

        let expected_len = expected_chunk_len(
            self.metadata.size,
            self.metadata.chunk_size,
            self.metadata.total_chunks,
            chunk_index,
        );
        if payload.len() as u64 != expected_len {
            self.drops += 1;
            self.log(crate::logging::TransferEvent::ChunkDropped {
                reason: "length_mismatch",
            });
            return Ok(ChunkOutcome::Dropped {
                reason: "length_mismatch",
            });
        }

        if let Some(expected) = &checksum {
            let actual = sha256_hex(&payload);
            if &actual != expected {
                self.drops += 1;
                self.log(crate::logging::TransferEvent::ChunkDropped {
                    reason: "integrity_mismatch",
                });
                return Ok(ChunkOutcome::Dropped {
                    reason: "integrity_mismatch",
                });
            }
        }

        let duplicate = self.received.contains(&chunk_index);
        self.log(crate::logging::TransferEvent::ChunkReceived {
            chunk_index,
            duplicate,
        });

        if !duplicate {
            let stored = match &mut self.assembly {
                Assembly::Memory(mem) => {
                    mem.insert(chunk_index, payload);
                    true
                }
                Assembly::Disk(seq) => seq.apply(chunk_index, payload).await?,
            };
            if !stored {
                // Bounded reorder window is full and this chunk's
                // predecessor still hasn't arrived. Drop without ACKing so
                // the sender retransmits instead of the receiver falsely
                // completing with a hole in the artifact.
                self.drops += 1;
                self.log(crate::logging::TransferEvent::ChunkDropped {
                    reason: "reorder_window_full",
                });
                return Ok(ChunkOutcome::Dropped {
                    reason: "reorder_window_full",
                });
            }

            self.received.insert(chunk_index);
            self.batch_ack.record(chunk_index, now_ms);

            if self.received.len() as u32 == self.metadata.total_chunks {
                if let Assembly::Disk(seq) = &mut self.assembly {
                    seq.drain_residual().await?;
                }
            }
        }

        if duplicate {
            Ok(ChunkOutcome::Duplicate { ack_index: chunk_index })
        } else {
            Ok(ChunkOutcome::Accepted { ack_index: chunk_index })
        }
    }

    /// Advisory: assembly is driven by `received_count == total_chunks`,
    /// never by this call.
    pub fn on_end(&self) {}

    pub fn should_flush_batch_ack(&self, now_ms: u64) -> bool {
        self.batch_ack.should_flush(now_ms)
    }

    pub fn flush_batch_ack(&mut self) -> Option<(crate::protocol::BatchAckBody, u32)> {
        let result = self.batch_ack.flush();
        if let Some((_, count)) = &result {
            self.log(crate::logging::TransferEvent::BatchAckFlushed {
                count: *count as usize,
                encoding: "auto",
            });
        }
        result
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() as u32 == self.metadata.total_chunks
    }

    /// Computes the final hash and compares it to the META checksum. On
    /// mismatch the artifact is removed and a fatal error returned.
    pub async fn finalize(&mut self) -> Result<TransferEvent> {
        self.log(crate::logging::TransferEvent::Assembling);
        let (handle, actual_hash) = match &self.assembly {
            Assembly::Memory(mem) => {
                let blob = mem.finalize();
                let hash = sha256_hex(&blob);
                (format!("memory:{}", self.transfer_id), hash)
            }
            Assembly::Disk(seq) => {
                let hash = seq.finalize().await?;
                (format!("disk:{}", self.transfer_id), hash)
            }
        };

        if actual_hash != self.metadata.file_checksum {
            self.finished = false;
            if let Assembly::Disk(seq) = &self.assembly {
                seq.remove().await?;
            }
            return Err(TransferError::IntegrityFinal {
                expected: self.metadata.file_checksum.clone(),
                actual: actual_hash,
            });
        }

        self.finished = true;
        Ok(TransferEvent::Complete {
            transfer_id: self.transfer_id.clone(),
            handle,
            name: self.metadata.name.clone(),
            size: self.metadata.size,
            average_speed: 0.0,
            total_time_ms: 0,
        })
    }

    pub fn cancel(&mut self) -> TransferEvent {
        self.cancelled = true;
        self.log(crate::logging::TransferEvent::Cancelled);
        TransferEvent::Cancelled {
            transfer_id: self.transfer_id.clone(),
        }
    }

    fn log(&self, event: crate::logging::TransferEvent) {
        self.logger.log(TransferLog {
            component: "receiver",
            transfer_id: self.transfer_id.clone(),
            event,
        });
    }
}
