//! Structured logging for the transfer pipeline, reported through a trait so
//! a host can route events to `tracing`, a remote debug channel, or nowhere.

use std::fmt;

/// One structured log entry emitted by the sender or receiver.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub transfer_id: String,
    pub event: TransferEvent,
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    ChunkSent { chunk_index: u32, size: usize, sampled: bool },
    ChunkAcked { chunk_index: u32, rtt_ms: u64 },
    ChunkRetried { chunk_index: u32, attempt: u32, backoff_ms: u64 },
    ChunkFatal { chunk_index: u32, attempts: u32 },
    WindowChanged { cwnd: u32, ssthresh: u32, phase: &'static str },
    BatchAckFlushed { count: usize, encoding: &'static str },
    ChunkReceived { chunk_index: u32, duplicate: bool },
    ChunkDropped { reason: &'static str },
    Assembling,
    TransferComplete { total_bytes: u64, duration_ms: u64, retransmits: u64 },
    Error { message: String },
    Cancelled,
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkSent { chunk_index, size, sampled } => {
                write!(f, "chunk_sent idx={chunk_index} size={size} sampled={sampled}")
            }
            Self::ChunkAcked { chunk_index, rtt_ms } => {
                write!(f, "chunk_acked idx={chunk_index} rtt_ms={rtt_ms}")
            }
            Self::ChunkRetried { chunk_index, attempt, backoff_ms } => {
                write!(f, "chunk_retried idx={chunk_index} attempt={attempt} backoff_ms={backoff_ms}")
            }
            Self::ChunkFatal { chunk_index, attempts } => {
                write!(f, "chunk_fatal idx={chunk_index} attempts={attempts}")
            }
            Self::WindowChanged { cwnd, ssthresh, phase } => {
                write!(f, "window_changed cwnd={cwnd} ssthresh={ssthresh} phase={phase}")
            }
            Self::BatchAckFlushed { count, encoding } => {
                write!(f, "batch_ack_flushed count={count} encoding={encoding}")
            }
            Self::ChunkReceived { chunk_index, duplicate } => {
                write!(f, "chunk_received idx={chunk_index} duplicate={duplicate}")
            }
            Self::ChunkDropped { reason } => write!(f, "chunk_dropped reason={reason}"),
            Self::Assembling => write!(f, "assembling"),
            Self::TransferComplete { total_bytes, duration_ms, retransmits } => write!(
                f,
                "transfer_complete bytes={total_bytes} duration_ms={duration_ms} retransmits={retransmits}"
            ),
            Self::Error { message } => write!(f, "error: {message}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Sink for structured transfer logs.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Routes log entries through `tracing`. Per-chunk spam logs at `debug`;
/// lifecycle events log at `info`.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        match &entry.event {
            TransferEvent::TransferComplete { .. }
            | TransferEvent::Error { .. }
            | TransferEvent::Cancelled
            | TransferEvent::Assembling
            | TransferEvent::ChunkFatal { .. } => {
                tracing::info!(component = entry.component, transfer_id = %entry.transfer_id, "{}", entry.event);
            }
            _ => {
                tracing::debug!(component = entry.component, transfer_id = %entry.transfer_id, "{}", entry.event);
            }
        }
    }
}

/// Discards every log entry. Used in tests to keep output quiet.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
