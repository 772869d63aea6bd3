//! Reads chunk-sized slices out of a source file without ever holding the
//! whole file in memory.

/// Anything the reader can pull fixed-size slices from: a real file, or an
/// in-memory byte buffer in tests.
pub trait ChunkSource: Send + Sync {
    fn len(&self) -> u64;
    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>>;
}

/// An entirely in-memory source, used by tests and by small-file demos.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let start = offset as usize;
        let end = (start + len).min(self.data.len());
        Ok(self.data[start.min(end)..end].to_vec())
    }
}

/// A plain filesystem file, read with positional reads so chunks can be
/// served out of order without seeking shared state.
pub struct FileSource {
    file: std::fs::File,
    len: u64,
}

impl FileSource {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        use std::os::unix::fs::FileExt;
        let remaining = self.len.saturating_sub(offset);
        let want = (len as u64).min(remaining) as usize;
        let mut buf = vec![0u8; want];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

/// Deterministic expected length of the chunk at `index`: `chunk_size` for
/// every chunk except a shorter final one. Shared by the sender (byte
/// accounting) and the receiver (payload length validation) so both sides
/// agree on what a chunk "should" weigh without re-reading it.
pub fn expected_chunk_len(total_size: u64, chunk_size: u32, total_chunks: u32, index: u32) -> u64 {
    if total_chunks == 0 {
        return 0;
    }
    if index + 1 == total_chunks {
        total_size - (total_chunks - 1) as u64 * chunk_size as u64
    } else {
        chunk_size as u64
    }
}

/// Slices a `ChunkSource` into fixed-size chunks, computing chunk count and
/// the (unpadded) size of the final chunk from total file size.
pub struct StreamingReader {
    source: Box<dyn ChunkSource>,
    chunk_size: u32,
    total_chunks: u32,
}

impl StreamingReader {
    pub fn new(source: Box<dyn ChunkSource>, chunk_size: u32) -> Self {
        let size = source.len();
        let total_chunks = if size == 0 {
            0
        } else {
            ((size + chunk_size as u64 - 1) / chunk_size as u64) as u32
        };
        Self {
            source,
            chunk_size,
            total_chunks,
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn file_size(&self) -> u64 {
        self.source.len()
    }

    /// Expected byte length of the chunk at `index`, without reading it.
    pub fn chunk_len(&self, index: u32) -> u64 {
        expected_chunk_len(self.source.len(), self.chunk_size, self.total_chunks, index)
    }

    /// Random-access read of one chunk. `None` if `index` is out of range.
    pub fn read_chunk(&self, index: u32) -> std::io::Result<Option<Vec<u8>>> {
        if index >= self.total_chunks {
            return Ok(None);
        }
        let offset = index as u64 * self.chunk_size as u64;
        let data = self.source.read_at(offset, self.chunk_size as usize)?;
        Ok(Some(data))
    }

    /// Reads an arbitrary byte range directly from the source, ignoring
    /// chunk boundaries. Used for incremental whole-file hashing, which
    /// reads in its own block size rather than the protocol's chunk size.
    pub fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        self.source.read_at(offset, len)
    }

    /// Ordered iterator over every `(index, bytes, is_last)` triple.
    pub fn read_all(&self) -> impl Iterator<Item = std::io::Result<(u32, Vec<u8>, bool)>> + '_ {
        (0..self.total_chunks).map(move |i| {
            let is_last = i == self.total_chunks - 1;
            self.read_chunk(i).map(|data| (i, data.unwrap_or_default(), is_last))
        })
    }
}
