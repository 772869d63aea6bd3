//! Commands accepted by, and events emitted from, a running transfer —
//! the boundary vocabulary a host (UI, signaling layer) talks across.

use crate::protocol::{BatchAckBody, FileMetadata};

#[derive(Debug, Clone)]
pub enum TransferEvent {
    PreflightReady {
        transfer_id: String,
        packet: Vec<u8>,
    },
    Progress {
        transfer_id: String,
        progress: f64,
        speed: f64,
        eta: f64,
        bytes_done: u64,
        chunks_done: u32,
        total_chunks: u32,
        window_size: u32,
    },
    Assembling {
        transfer_id: String,
    },
    Complete {
        transfer_id: String,
        handle: String,
        name: String,
        size: u64,
        average_speed: f64,
        total_time_ms: u64,
    },
    Error {
        transfer_id: String,
        message: String,
    },
    Cancelled {
        transfer_id: String,
    },
}

#[derive(Debug, Clone)]
pub enum TransferCommand {
    Start {
        transfer_id: String,
        chunk_size: u32,
        name: String,
        mime: String,
    },
    Pause {
        transfer_id: String,
    },
    Resume {
        transfer_id: String,
    },
    Cancel {
        transfer_id: String,
    },
    OnPacket {
        bytes: Vec<u8>,
    },
    OnAck {
        transfer_id: String,
        chunk_index: u32,
    },
    OnBatchAck {
        transfer_id: String,
        body: BatchAckBody,
    },
    OnReceiverComplete {
        transfer_id: String,
    },
    InitTransfer {
        transfer_id: String,
        metadata: FileMetadata,
    },
}
