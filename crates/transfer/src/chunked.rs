use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// CRC-32 (IEEE) of `data`.
pub fn checksum_bytes(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// CRC-32 of `buffer[offset..offset + length]`.
///
/// Panics if the range is out of bounds, like slice indexing.
pub fn checksum(buffer: &[u8], offset: usize, length: usize) -> u32 {
    checksum_bytes(&buffer[offset..offset + length])
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads chunks at arbitrary offsets into a scratch buffer it owns.
///
/// The buffer is sized once to the maximum chunk length and reused for
/// every chunk; [`chunk`](Self::chunk) exposes the bytes of the last read.
pub struct ChunkReader {
    file: std::fs::File,
    buffer: Vec<u8>,
    filled: usize,
}

impl ChunkReader {
    /// Wraps an open file. `max_chunk` bounds every later read.
    pub fn new(file: std::fs::File, max_chunk: usize) -> Self {
        Self {
            file,
            buffer: vec![0u8; max_chunk],
            filled: 0,
        }
    }

    /// Opens `path` for chunked reading.
    pub fn open(path: &Path, max_chunk: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(file, max_chunk))
    }

    /// Reads exactly `len` bytes at `offset` and returns their CRC-32.
    ///
    /// A file shorter than expected is an error, never a partial chunk.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<u32, TransferError> {
        if len > self.buffer.len() {
            return Err(TransferError::InvalidLayout(format!(
                "chunk of {len} bytes exceeds buffer of {}",
                self.buffer.len()
            )));
        }
        self.filled = 0;
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(&mut self.buffer[..len]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(TransferError::ShortRead {
                    offset,
                    wanted: len,
                });
            }
            Err(e) => return Err(e.into()),
        }
        self.filled = len;
        Ok(checksum(&self.buffer, 0, len))
    }

    /// Bytes of the last successful [`read_at`](Self::read_at).
    pub fn chunk(&self) -> &[u8] {
        &self.buffer[..self.filled]
    }

    /// Capacity of the scratch buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}
