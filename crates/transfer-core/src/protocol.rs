//! Wire framing for the chunked transfer protocol.
//!
//! ```text
//! DATA:      u8=1 | u16 idLen | idBytes | u32 chunkIndex | u32 dataLen
//!                 | u16 ckLen | ckBytes | dataBytes
//! ACK:       u8=3 | u16 idLen | idBytes | u32 chunkIndex
//! BATCH_ACK: u8=4 | u16 idLen | idBytes | u8 encoding | u32 totalAcks | u64 ts | body
//! META:      u8=5 | u16 idLen | idBytes | u32 metaLen | metaJson
//!                 | u8 hasFirstChunk | [u32 len | bytes]
//!                 | u8 hasThumbnail  | [u32 len | bytes]
//!                 | u64 ts
//! END:       u8=2 | u16 idLen | idBytes
//! ```
//!
//! All multi-byte integers are big-endian. Any malformed packet (truncated
//! length prefix, a length that overruns the buffer, an unknown type byte) is
//! rejected by returning `None` from `decode` — callers drop it without
//! acknowledging, per the validation error kind.

use serde::{Deserialize, Serialize};

/// File-level metadata shipped eagerly in the META packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub last_modified: u64,
    pub file_checksum: String,
    pub total_chunks: u32,
    pub chunk_size: u32,
}

/// A single chunk of the transferred file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: u32,
    pub payload: Vec<u8>,
    pub checksum: Option<String>,
}

/// One contiguous run of acknowledged indices, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    pub start: u32,
    pub end: u32,
}

/// Body of a BATCH_ACK packet: either a compact range list or a raw bitmap.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchAckBody {
    Ranges(Vec<AckRange>),
    Bitmap { base: u32, bits: Vec<u8> },
}

/// The full packet vocabulary of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Data {
        transfer_id: String,
        chunk_index: u32,
        payload: Vec<u8>,
        checksum: Option<String>,
    },
    Ack {
        transfer_id: String,
        chunk_index: u32,
    },
    BatchAck {
        transfer_id: String,
        body: BatchAckBody,
        total_acks: u32,
        ts: u64,
    },
    Meta {
        transfer_id: String,
        metadata: FileMetadata,
        first_chunk: Option<Vec<u8>>,
        thumbnail: Option<Vec<u8>>,
        ts: u64,
    },
    End {
        transfer_id: String,
    },
}

const TYPE_DATA: u8 = 1;
const TYPE_END: u8 = 2;
const TYPE_ACK: u8 = 3;
const TYPE_BATCH_ACK: u8 = 4;
const TYPE_META: u8 = 5;

const ENCODING_RANGES: u8 = 0;
const ENCODING_BITMAP: u8 = 1;

/// Cursor over a byte slice that fails closed: any read past the end
/// short-circuits the whole decode instead of panicking.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn u16(&mut self) -> Option<u16> {
        Some(u16::from_be_bytes(self.take(2)?.try_into().ok()?))
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_be_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_be_bytes(self.take(8)?.try_into().ok()?))
    }

    fn string16(&mut self) -> Option<String> {
        let len = self.u16()? as usize;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }

    fn bytes16(&mut self) -> Option<Vec<u8>> {
        let len = self.u16()? as usize;
        Some(self.take(len)?.to_vec())
    }

    fn bytes32(&mut self) -> Option<Vec<u8>> {
        let len = self.u32()? as usize;
        Some(self.take(len)?.to_vec())
    }
}

fn put_string16(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn put_bytes16(buf: &mut Vec<u8>, b: &[u8]) {
    buf.extend_from_slice(&(b.len() as u16).to_be_bytes());
    buf.extend_from_slice(b);
}

fn put_bytes32(buf: &mut Vec<u8>, b: &[u8]) {
    buf.extend_from_slice(&(b.len() as u32).to_be_bytes());
    buf.extend_from_slice(b);
}

/// Encode any packet variant into its wire representation.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::new();
    match packet {
        Packet::Data {
            transfer_id,
            chunk_index,
            payload,
            checksum,
        } => {
            buf.push(TYPE_DATA);
            put_string16(&mut buf, transfer_id);
            buf.extend_from_slice(&chunk_index.to_be_bytes());
            buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            let ck = checksum.as_deref().unwrap_or("");
            put_bytes16(&mut buf, ck.as_bytes());
            buf.extend_from_slice(payload);
        }
        Packet::End { transfer_id } => {
            buf.push(TYPE_END);
            put_string16(&mut buf, transfer_id);
        }
        Packet::Ack {
            transfer_id,
            chunk_index,
        } => {
            buf.push(TYPE_ACK);
            put_string16(&mut buf, transfer_id);
            buf.extend_from_slice(&chunk_index.to_be_bytes());
        }
        Packet::BatchAck {
            transfer_id,
            body,
            total_acks,
            ts,
        } => {
            buf.push(TYPE_BATCH_ACK);
            put_string16(&mut buf, transfer_id);
            match body {
                BatchAckBody::Ranges(ranges) => {
                    buf.push(ENCODING_RANGES);
                    buf.extend_from_slice(&total_acks.to_be_bytes());
                    buf.extend_from_slice(&ts.to_be_bytes());
                    buf.extend_from_slice(&(ranges.len() as u32).to_be_bytes());
                    for r in ranges {
                        buf.extend_from_slice(&r.start.to_be_bytes());
                        buf.extend_from_slice(&r.end.to_be_bytes());
                    }
                }
                BatchAckBody::Bitmap { base, bits } => {
                    buf.push(ENCODING_BITMAP);
                    buf.extend_from_slice(&total_acks.to_be_bytes());
                    buf.extend_from_slice(&ts.to_be_bytes());
                    buf.extend_from_slice(&base.to_be_bytes());
                    put_bytes32(&mut buf, bits);
                }
            }
        }
        Packet::Meta {
            transfer_id,
            metadata,
            first_chunk,
            thumbnail,
            ts,
        } => {
            buf.push(TYPE_META);
            put_string16(&mut buf, transfer_id);
            let meta_json = serde_json::to_vec(metadata).unwrap_or_default();
            put_bytes32(&mut buf, &meta_json);
            match first_chunk {
                Some(data) => {
                    buf.push(1);
                    put_bytes32(&mut buf, data);
                }
                None => buf.push(0),
            }
            match thumbnail {
                Some(data) => {
                    buf.push(1);
                    put_bytes32(&mut buf, data);
                }
                None => buf.push(0),
            }
            buf.extend_from_slice(&ts.to_be_bytes());
        }
    }
    buf
}

/// Decode a single packet from `buf`. Returns `None` on any malformed input;
/// the caller is expected to drop the packet silently rather than error.
pub fn decode(buf: &[u8]) -> Option<Packet> {
    let mut c = Cursor::new(buf);
    let ty = c.u8()?;
    match ty {
        TYPE_DATA => {
            let transfer_id = c.string16()?;
            let chunk_index = c.u32()?;
            let data_len = c.u32()? as usize;
            let checksum_raw = c.bytes16()?;
            let payload = c.take(data_len)?.to_vec();
            let checksum = if checksum_raw.is_empty() {
                None
            } else {
                Some(String::from_utf8(checksum_raw).ok()?)
            };
            Some(Packet::Data {
                transfer_id,
                chunk_index,
                payload,
                checksum,
            })
        }
        TYPE_END => {
            let transfer_id = c.string16()?;
            Some(Packet::End { transfer_id })
        }
        TYPE_ACK => {
            let transfer_id = c.string16()?;
            let chunk_index = c.u32()?;
            Some(Packet::Ack {
                transfer_id,
                chunk_index,
            })
        }
        TYPE_BATCH_ACK => {
            let transfer_id = c.string16()?;
            let encoding = c.u8()?;
            let total_acks = c.u32()?;
            let ts = c.u64()?;
            let body = match encoding {
                ENCODING_RANGES => {
                    let count = c.u32()? as usize;
                    let mut ranges = Vec::with_capacity(count);
                    for _ in 0..count {
                        let start = c.u32()?;
                        let end = c.u32()?;
                        ranges.push(AckRange { start, end });
                    }
                    BatchAckBody::Ranges(ranges)
                }
                ENCODING_BITMAP => {
                    let base = c.u32()?;
                    let bits = c.bytes32()?;
                    BatchAckBody::Bitmap { base, bits }
                }
                _ => return None,
            };
            Some(Packet::BatchAck {
                transfer_id,
                body,
                total_acks,
                ts,
            })
        }
        TYPE_META => {
            let transfer_id = c.string16()?;
            let meta_json = c.bytes32()?;
            let metadata: FileMetadata = serde_json::from_slice(&meta_json).ok()?;
            let has_first = c.u8()?;
            let first_chunk = if has_first == 1 {
                Some(c.bytes32()?)
            } else {
                None
            };
            let has_thumb = c.u8()?;
            let thumbnail = if has_thumb == 1 {
                Some(c.bytes32()?)
            } else {
                None
            };
            let ts = c.u64()?;
            Some(Packet::Meta {
                transfer_id,
                metadata,
                first_chunk,
                thumbnail,
                ts,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_round_trips() {
        let p = Packet::Data {
            transfer_id: "abc".into(),
            chunk_index: 7,
            payload: vec![1, 2, 3, 4],
            checksum: Some("deadbeef".into()),
        };
        assert_eq!(decode(&encode(&p)), Some(p));
    }

    #[test]
    fn data_without_checksum_round_trips() {
        let p = Packet::Data {
            transfer_id: "x".into(),
            chunk_index: 0,
            payload: vec![],
            checksum: None,
        };
        assert_eq!(decode(&encode(&p)), Some(p));
    }

    #[test]
    fn meta_round_trips() {
        let p = Packet::Meta {
            transfer_id: "t1".into(),
            metadata: FileMetadata {
                name: "movie.mp4".into(),
                mime: "video/mp4".into(),
                size: 123456,
                last_modified: 1700000000000,
                file_checksum: "ff".repeat(32),
                total_chunks: 10,
                chunk_size: 65536,
            },
            first_chunk: Some(vec![9; 32]),
            thumbnail: None,
            ts: 42,
        };
        assert_eq!(decode(&encode(&p)), Some(p));
    }

    #[test]
    fn ack_and_end_round_trip() {
        let ack = Packet::Ack {
            transfer_id: "t".into(),
            chunk_index: 5,
        };
        assert_eq!(decode(&encode(&ack)), Some(ack));

        let end = Packet::End {
            transfer_id: "t".into(),
        };
        assert_eq!(decode(&encode(&end)), Some(end));
    }

    #[test]
    fn batch_ack_ranges_round_trip() {
        let p = Packet::BatchAck {
            transfer_id: "t".into(),
            body: BatchAckBody::Ranges(vec![
                AckRange { start: 0, end: 3 },
                AckRange { start: 10, end: 10 },
            ]),
            total_acks: 5,
            ts: 99,
        };
        assert_eq!(decode(&encode(&p)), Some(p));
    }

    #[test]
    fn truncated_data_is_rejected() {
        let p = Packet::Data {
            transfer_id: "abc".into(),
            chunk_index: 1,
            payload: vec![1, 2, 3],
            checksum: None,
        };
        let mut bytes = encode(&p);
        bytes.truncate(bytes.len() - 1);
        assert_eq!(decode(&bytes), None);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        assert_eq!(decode(&[0xff, 0, 0]), None);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert_eq!(decode(&[]), None);
    }
}
