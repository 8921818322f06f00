//! Chunk planning over a borrowed payload.

use std::fmt;

/// A slice of the payload sent in one request.
#[derive(Clone, Copy)]
pub struct Chunk<'a> {
    /// Byte offset of the first byte in the payload.
    pub offset: u64,
    /// The chunk bytes.
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// The chunk starting at `offset`, at most `chunk_size` bytes long.
    ///
    /// Returns `None` once `offset` reaches the end of the payload.
    pub fn at(payload: &'a [u8], offset: u64, chunk_size: usize) -> Option<Self> {
        let start = usize::try_from(offset).ok()?;
        if start >= payload.len() || chunk_size == 0 {
            return None;
        }
        let end = start.saturating_add(chunk_size).min(payload.len());
        Some(Self {
            offset,
            data: &payload[start..end],
        })
    }

    /// Chunk length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset just past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.len()
    }
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Number of chunks needed for `total_size` bytes.
pub fn chunk_count(total_size: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size as u64)
}
