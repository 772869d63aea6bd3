//! Loopback smoke test: drives a `Sender` and `Receiver` over an in-process
//! `PeerTransport` so the whole pipeline can be exercised without a real
//! network peer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use transfer_core::checksum::ChecksumEngine;
use transfer_core::config::TransferConfig;
use transfer_core::error::Result;
use transfer_core::logging::TracingLogger;
use transfer_core::preflight::run_preflight;
use transfer_core::protocol::{decode, FileMetadata, Packet};
use transfer_core::reader::{MemorySource, StreamingReader};
use transfer_core::receiver::Receiver;
use transfer_core::sender::Sender;
use transfer_core::transport::{sha256_hex, PeerTransport};

/// Delivers bytes straight to the other side's inbox, simulating an
/// unreliable-but-ordered channel with no loss for this smoke test.
struct LoopbackTransport {
    inbox: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn send_to_peer(&self, _transfer_id: &str, frame: Vec<u8>) -> Result<()> {
        let _ = self.inbox.send(frame);
        Ok(())
    }
}

static CLOCK: AtomicU64 = AtomicU64::new(0);

fn tick_ms() -> u64 {
    CLOCK.fetch_add(10, Ordering::Relaxed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = TransferConfig::default();
    config.validate().expect("default config is always valid");

    let payload = b"the quick brown fox jumps over the lazy dog, repeated for bulk: ".repeat(200);
    let chunk_size = 64;
    let transfer_id = "demo-transfer-1".to_string();

    let (to_receiver_tx, mut to_receiver_rx) = mpsc::unbounded_channel();
    let (to_sender_tx, mut to_sender_rx) = mpsc::unbounded_channel();

    let sender_transport = Arc::new(LoopbackTransport {
        inbox: to_receiver_tx,
    });
    let engine = ChecksumEngine::new(config.hash_pool_size());

    let reader = StreamingReader::new(Box::new(MemorySource::new(payload.clone())), chunk_size);
    let preflight = run_preflight(&reader, "text/plain", engine.clone()).await?;
    let metadata = FileMetadata {
        name: "demo.txt".into(),
        mime: "text/plain".into(),
        size: payload.len() as u64,
        last_modified: 0,
        file_checksum: preflight.file_checksum.clone(),
        total_chunks: reader.total_chunks(),
        chunk_size,
    };

    let mut sender = Sender::new(
        transfer_id.clone(),
        reader,
        sender_transport,
        engine,
        Arc::new(TracingLogger),
        config.clone(),
        payload.len() as u64,
        0,
    );

    sender.start(metadata.clone(), preflight, 0).await?;
    sender.pump(0).await?;

    let mut receiver = Receiver::new(
        transfer_id.clone(),
        metadata,
        config,
        None,
        Arc::new(TracingLogger),
        0,
    );

    // Drain everything the sender already emitted, acking each chunk back
    // on a second loopback channel.
    while let Ok(bytes) = to_receiver_rx.try_recv() {
        if let Some(packet) = decode(&bytes) {
            if let Packet::Data { chunk_index, .. } = &packet {
                let chunk_index = *chunk_index;
                receiver.on_chunk(packet, tick_ms()).await?;
                let ack = Packet::Ack {
                    transfer_id: transfer_id.clone(),
                    chunk_index,
                };
                let _ = to_sender_tx.send(transfer_core::protocol::encode(&ack));
            }
        }
    }

    while let Ok(bytes) = to_sender_rx.try_recv() {
        if let Some(Packet::Ack { chunk_index, .. }) = decode(&bytes) {
            sender.on_ack(chunk_index, tick_ms()).await;
        }
    }

    let result = receiver.finalize().await?;
    info!(?result, "loopback transfer finished");
    println!(
        "assembled {} bytes, hash verified against {}",
        payload.len(),
        sha256_hex(&payload),
    );
    Ok(())
}
