//! Typed errors for the transfer core, mirroring the error taxonomy: a chunk
//! can fail validation, fail its integrity check, hit a transport hiccup,
//! time out, go fatal after too many retries, fail the final whole-file
//! comparison, or hit a resource problem (e.g. can't open the output file).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransferError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("chunk {chunk_index} failed its integrity check")]
    Integrity { chunk_index: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("chunk {chunk_index} timed out waiting for ack")]
    Timeout { chunk_index: u32 },

    #[error("chunk {chunk_index} is fatal after {attempts} attempts")]
    FatalChunk { chunk_index: u32, attempts: u32 },

    #[error("file corrupted: checksum mismatch (expected {expected}, got {actual})")]
    IntegrityFinal { expected: String, actual: String },

    #[error("resource error: {0}")]
    Resource(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("transfer cancelled")]
    Cancelled,
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
