use crate::TransferError;

/// How a file of `size` bytes is partitioned into blocks and chunks.
///
/// Blocks are the server's bookkeeping unit; chunks are what travels in a
/// single request. `block_size` must be a multiple of `chunk_size` so a
/// chunk never straddles two blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    size: u64,
    block_size: u64,
    chunk_size: u64,
}

impl Layout {
    pub fn new(size: u64, block_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 || block_size == 0 {
            return Err(TransferError::InvalidLayout(
                "block and chunk sizes must be non-zero".into(),
            ));
        }
        if block_size % chunk_size != 0 {
            return Err(TransferError::InvalidLayout(format!(
                "block size {block_size} is not a multiple of chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            size,
            block_size,
            chunk_size,
        })
    }

    /// Total file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of blocks, the last one possibly short. Zero for an empty file.
    pub fn block_count(&self) -> usize {
        self.size.div_ceil(self.block_size) as usize
    }

    pub fn block_index(&self, offset: u64) -> usize {
        (offset / self.block_size) as usize
    }

    /// Start of the block containing `offset`.
    pub fn block_start(&self, offset: u64) -> u64 {
        (offset / self.block_size) * self.block_size
    }

    pub fn offset_in_block(&self, offset: u64) -> u64 {
        offset % self.block_size
    }

    pub fn is_block_start(&self, offset: u64) -> bool {
        offset % self.block_size == 0
    }

    /// Length of the chunk that starts at `offset`.
    ///
    /// Never crosses the end of the enclosing block, even for an offset that
    /// is not chunk aligned (a checkpoint written with another chunk size).
    pub fn chunk_size_at(&self, offset: u64) -> u64 {
        let to_block_end = self.block_size - self.offset_in_block(offset);
        self.chunk_size
            .min(self.size.saturating_sub(offset))
            .min(to_block_end)
    }

    /// Declared size of the block that starts at `offset`.
    pub fn block_size_at(&self, offset: u64) -> u64 {
        self.block_size.min(self.size.saturating_sub(offset))
    }

    /// Iterates every chunk of the file in upload order.
    pub fn chunks(&self) -> Chunks {
        Chunks {
            layout: *self,
            offset: 0,
        }
    }
}

/// One chunk of a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub offset: u64,
    pub len: u64,
    pub block_index: usize,
    pub offset_in_block: u64,
}

impl ChunkSpan {
    /// `true` for the first chunk of a block, which is sent with `mkblk`.
    pub fn starts_block(&self) -> bool {
        self.offset_in_block == 0
    }
}

/// Iterator returned by [`Layout::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    layout: Layout,
    offset: u64,
}

impl Iterator for Chunks {
    type Item = ChunkSpan;

    fn next(&mut self) -> Option<ChunkSpan> {
        if self.offset >= self.layout.size {
            return None;
        }
        let span = ChunkSpan {
            offset: self.offset,
            len: self.layout.chunk_size_at(self.offset),
            block_index: self.layout.block_index(self.offset),
            offset_in_block: self.layout.offset_in_block(self.offset),
        };
        self.offset += span.len;
        Some(span)
    }
}
