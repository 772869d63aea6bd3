//! Reliable, ordered, chunked file transfer over an unreliable but
//! message-boundary-preserving peer data channel.
//!
//! The pipeline fans a file out into fixed-size chunks, ships them under an
//! AIMD congestion window with selective per-chunk integrity sampling, and
//! reassembles them in strict ascending order at the receiver regardless of
//! arrival order, verifying the whole file's hash before declaring success.

pub mod artifact;
pub mod batch_ack;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod preflight;
pub mod protocol;
pub mod reader;
pub mod receiver;
pub mod recovery;
pub mod sampler;
pub mod sender;
pub mod smoother;
pub mod transport;
pub mod window;

pub use config::TransferConfig;
pub use error::{Result, TransferError};
pub use events::{TransferCommand, TransferEvent};
pub use manager::TransferManager;
pub use receiver::Receiver;
pub use sender::Sender;
