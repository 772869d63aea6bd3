//! Exercises disk-mode assembly end to end against a real filesystem sink,
//! crossing `diskThresholdBytes` so the receiver takes the sequential-write
//! path instead of in-memory concatenation.

use std::sync::Arc;

use transfer_core::checksum::sha256_hex;
use transfer_core::config::TransferConfig;
use transfer_core::logging::NullLogger;
use transfer_core::protocol::{FileMetadata, Packet};
use transfer_core::receiver::Receiver;
use transfer_core::transport::{ArtifactSink, FileArtifactSink};

#[tokio::test]
async fn disk_mode_assembles_out_of_order_chunks_and_verifies_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.bin");
    let sink: Arc<dyn ArtifactSink> = Arc::new(FileArtifactSink::create(path.clone()).await.unwrap());

    let chunk_size = 16u32;
    let data: Vec<u8> = (0u8..=255).collect();
    let hash = sha256_hex(&data);
    let total_chunks = (data.len() as u32).div_ceil(chunk_size);

    let mut config = TransferConfig::default();
    config.disk_threshold_bytes = 1;

    let metadata = FileMetadata {
        name: "blob.bin".into(),
        mime: "application/octet-stream".into(),
        size: data.len() as u64,
        last_modified: 0,
        file_checksum: hash.clone(),
        total_chunks,
        chunk_size,
    };

    let mut receiver = Receiver::new(
        "t-disk".into(),
        metadata,
        config,
        Some(sink),
        Arc::new(NullLogger),
        0,
    );

    // Deliver every other chunk first, then backfill, to exercise the
    // pending map rather than always writing in order.
    let chunks: Vec<(u32, Vec<u8>)> = (0..total_chunks)
        .map(|i| {
            let start = (i * chunk_size) as usize;
            let end = (start + chunk_size as usize).min(data.len());
            (i, data[start..end].to_vec())
        })
        .collect();

    for (index, payload) in chunks.iter().filter(|(i, _)| i % 2 == 0) {
        receiver
            .on_chunk(
                Packet::Data {
                    transfer_id: "t-disk".into(),
                    chunk_index: *index,
                    payload: payload.clone(),
                    checksum: None,
                },
                0,
            )
            .await
            .unwrap();
    }
    for (index, payload) in chunks.iter().filter(|(i, _)| i % 2 == 1) {
        receiver
            .on_chunk(
                Packet::Data {
                    transfer_id: "t-disk".into(),
                    chunk_index: *index,
                    payload: payload.clone(),
                    checksum: None,
                },
                0,
            )
            .await
            .unwrap();
    }

    assert!(receiver.is_complete());
    let event = receiver.finalize().await.unwrap();
    assert!(matches!(event, transfer_core::events::TransferEvent::Complete { .. }));

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk, data);
}

#[tokio::test]
async fn disk_mode_removes_partial_artifact_on_hash_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.bin");
    let sink: Arc<dyn ArtifactSink> = Arc::new(FileArtifactSink::create(path.clone()).await.unwrap());

    let mut config = TransferConfig::default();
    config.disk_threshold_bytes = 1;

    let metadata = FileMetadata {
        name: "blob.bin".into(),
        mime: "application/octet-stream".into(),
        size: 4,
        last_modified: 0,
        file_checksum: "0".repeat(64),
        total_chunks: 1,
        chunk_size: 4,
    };

    let mut receiver = Receiver::new(
        "t-disk-bad".into(),
        metadata,
        config,
        Some(sink),
        Arc::new(NullLogger),
        0,
    );
    receiver
        .on_chunk(
            Packet::Data {
                transfer_id: "t-disk-bad".into(),
                chunk_index: 0,
                payload: b"abcd".to_vec(),
                checksum: None,
            },
            0,
        )
        .await
        .unwrap();

    let result = receiver.finalize().await;
    assert!(result.is_err());
    assert!(!path.exists());
}
