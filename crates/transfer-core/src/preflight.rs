//! Builds the META packet ahead of any DATA: whole-file hash, first-chunk
//! hash, and (for images) a small preview thumbnail.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{GenericImageView, Rgb, RgbImage};

use crate::checksum::{sha256_hex, ChecksumEngine};
use crate::reader::StreamingReader;

const THUMBNAIL_SIDE: u32 = 200;
const THUMBNAIL_QUALITY: u8 = 70;

pub struct PreflightResult {
    pub file_checksum: String,
    pub first_chunk: Vec<u8>,
    pub first_chunk_checksum: String,
    pub thumbnail: Option<Vec<u8>>,
}

/// Runs the preflight hashing/thumbnailing pass described for the META
/// packet. Thumbnail failures are swallowed; everything else propagates.
pub async fn run_preflight(
    reader: &StreamingReader,
    mime: &str,
    checksum_engine: Arc<ChecksumEngine>,
) -> std::io::Result<PreflightResult> {
    let first_chunk = reader.read_chunk(0)?.unwrap_or_default();
    let first_chunk_checksum = checksum_engine.hash_chunk(first_chunk.clone()).await;

    let file_size = reader.file_size();
    let file_checksum = if file_size == 0 {
        sha256_hex(&[])
    } else {
        checksum_engine.hash_whole_file(file_size, |offset, len| reader.read_range(offset, len))?
    };

    let thumbnail = if mime.starts_with("image/") {
        make_thumbnail(&first_chunk)
    } else {
        None
    };

    Ok(PreflightResult {
        file_checksum,
        first_chunk,
        first_chunk_checksum,
        thumbnail,
    })
}

/// Decodes the first chunk's bytes as an image to build a thumbnail. Any
/// decode/encode error is non-fatal: the META packet ships without a
/// thumbnail. Images that don't fit in the first chunk simply fail to
/// decode and fall into that same non-fatal path.
fn make_thumbnail(first_chunk: &[u8]) -> Option<Vec<u8>> {
    let img = image::load_from_memory(first_chunk).ok()?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let scale = (THUMBNAIL_SIDE as f64 / w as f64).min(THUMBNAIL_SIDE as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    let resized = img.resize(new_w, new_h, FilterType::Triangle).to_rgb8();

    let mut canvas = RgbImage::from_pixel(THUMBNAIL_SIDE, THUMBNAIL_SIDE, Rgb([32, 32, 32]));
    let x_off = (THUMBNAIL_SIDE - new_w) / 2;
    let y_off = (THUMBNAIL_SIDE - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, x_off as i64, y_off as i64);

    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, THUMBNAIL_QUALITY);
    encoder
        .encode_image(&image::DynamicImage::ImageRgb8(canvas))
        .ok()?;
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{MemorySource, StreamingReader};

    #[tokio::test]
    async fn non_image_mime_skips_thumbnail() {
        let reader = StreamingReader::new(Box::new(MemorySource::new(b"abcdef".to_vec())), 4);
        let engine = ChecksumEngine::new(1);
        let result = run_preflight(&reader, "application/octet-stream", engine).await.unwrap();
        assert!(result.thumbnail.is_none());
        assert_eq!(result.first_chunk, b"abcd");
    }

    #[tokio::test]
    async fn corrupt_image_bytes_do_not_fail_preflight() {
        let reader = StreamingReader::new(Box::new(MemorySource::new(b"not-a-real-image".to_vec())), 64);
        let engine = ChecksumEngine::new(1);
        let result = run_preflight(&reader, "image/png", engine).await.unwrap();
        assert!(result.thumbnail.is_none());
    }

    #[tokio::test]
    async fn file_checksum_matches_whole_file_hash() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let reader = StreamingReader::new(Box::new(MemorySource::new(data.clone())), 8);
        let engine = ChecksumEngine::new(1);
        let result = run_preflight(&reader, "text/plain", engine).await.unwrap();
        assert_eq!(result.file_checksum, sha256_hex(&data));
    }
}
