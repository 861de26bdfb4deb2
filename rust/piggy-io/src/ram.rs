//! Block-chunked in-memory staging buffer.
//!
//! [`RamWriter`] appends into fixed-size blocks of [`BLOCK_SIZE`] bytes. Sealing it
//! ([`RamWriter::blocks`]) yields shared, read-only [`Block`] views; the writer never
//! mutates storage that a view still references (a shared tail block is copied before
//! the next append), so sealed bytes stay stable for as long as the view lives.
//!
//! [`RamReader`] reads either a sealed block sequence or one contiguous buffer (sliced
//! into blocks of the same size) and supports absolute seeks.

use std::sync::Arc;

use piggy_common::{Result, error::Error, verify_arg};

use crate::{ByteSink, ByteSource};

pub const BLOCK_SIZE: usize = 4096;

/// Shared, immutable backing storage for one or more blocks.
pub type SharedBytes = Arc<dyn AsRef<[u8]> + Send + Sync>;

/// A read-only window into shared backing storage.
#[derive(Clone)]
pub struct Block {
    data: SharedBytes,
    start: usize,
    end: usize,
}

impl Block {
    pub fn new(data: SharedBytes) -> Block {
        let end = (*data).as_ref().len();
        Block {
            data,
            start: 0,
            end,
        }
    }

    fn slice(data: SharedBytes, start: usize, end: usize) -> Block {
        Block { data, start, end }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &(*self.data).as_ref()[self.start..self.end]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block").field("len", &self.len()).finish()
    }
}

/// Growable append-only staging buffer.
#[derive(Default)]
pub struct RamWriter {
    blocks: Vec<Arc<Vec<u8>>>,
    size: u64,
}

impl RamWriter {
    pub fn new() -> RamWriter {
        Default::default()
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Bytes of block storage currently held by this writer.
    pub fn ram_bytes_used(&self) -> u64 {
        (self.blocks.len() * BLOCK_SIZE) as u64
    }

    /// Seals the written bytes into an ordered sequence of read-only blocks.
    ///
    /// The writer stays usable: later appends never show through the returned views.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks
            .iter()
            .map(|block| Block::new(block.clone() as SharedBytes))
            .collect()
    }

    /// Seals the written bytes into a reader positioned at the start.
    pub fn to_reader(&self) -> RamReader {
        RamReader {
            size: self.size,
            blocks: self.blocks(),
            pos: 0,
        }
    }

    /// Writes every sealed byte, in order, to `sink`.
    pub fn copy_to<S: ByteSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        for block in &self.blocks {
            sink.write_bytes(block)?;
        }
        Ok(())
    }

    /// Drops this writer's references to its blocks and starts over at size zero.
    ///
    /// Storage still referenced by sealed views is released when those views are dropped.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.size = 0;
    }

    fn writable_block(&mut self) -> &mut Vec<u8> {
        if self.blocks.last().is_none_or(|b| b.len() == BLOCK_SIZE) {
            self.blocks.push(Arc::new(Vec::with_capacity(BLOCK_SIZE)));
        }
        let last = self.blocks.len() - 1;
        let block = Arc::make_mut(&mut self.blocks[last]);
        if block.capacity() < BLOCK_SIZE {
            block.reserve_exact(BLOCK_SIZE - block.len());
        }
        block
    }
}

impl ByteSink for RamWriter {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.writable_block().push(b);
        self.size += 1;
        Ok(())
    }

    fn write_bytes(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let block = self.writable_block();
            let n = (BLOCK_SIZE - block.len()).min(buf.len());
            block.extend_from_slice(&buf[..n]);
            buf = &buf[n..];
            self.size += n as u64;
        }
        Ok(())
    }
}

/// Random-access reader over a sealed block sequence.
///
/// Every block but the last holds exactly [`BLOCK_SIZE`] bytes, so a position maps to
/// `(pos / BLOCK_SIZE, pos % BLOCK_SIZE)`.
#[derive(Clone, Default)]
pub struct RamReader {
    blocks: Vec<Block>,
    size: u64,
    pos: u64,
}

impl RamReader {
    /// Creates a reader over an ordered block sequence, as produced by [`RamWriter::blocks`].
    pub fn from_blocks(blocks: Vec<Block>) -> Result<RamReader> {
        let mut blocks = blocks;
        while blocks.last().is_some_and(Block::is_empty) {
            blocks.pop();
        }
        if let Some((_, full)) = blocks.split_last() {
            verify_arg!(blocks, full.iter().all(|b| b.len() == BLOCK_SIZE));
        }
        let size = blocks.iter().map(|b| b.len() as u64).sum();
        Ok(RamReader {
            blocks,
            size,
            pos: 0,
        })
    }

    /// Creates a reader over one contiguous buffer, sliced into fixed-size blocks
    /// (the trailing partial block is kept as is).
    pub fn from_contiguous(data: SharedBytes) -> RamReader {
        let len = (*data).as_ref().len();
        let blocks = (0..len)
            .step_by(BLOCK_SIZE)
            .map(|start| Block::slice(data.clone(), start, (start + BLOCK_SIZE).min(len)))
            .collect();
        RamReader {
            blocks,
            size: len as u64,
            pos: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.size - self.pos
    }

    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.pos < self.size
    }

    /// Moves to an absolute position. Seeking exactly to the end is allowed.
    pub fn set_pos(&mut self, pos: u64) -> Result<()> {
        if pos > self.size {
            return Err(Error::invalid_arg(
                "pos",
                format!("position {pos} is beyond the end ({})", self.size),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    #[inline]
    fn block_index(&self) -> usize {
        (self.pos / BLOCK_SIZE as u64) as usize
    }

    #[inline]
    fn block_offset(&self) -> usize {
        (self.pos % BLOCK_SIZE as u64) as usize
    }
}

impl ByteSource for RamReader {
    fn read_byte(&mut self) -> Result<u8> {
        if !self.has_remaining() {
            return Err(Error::unexpected_eof("ram reader: read_byte"));
        }
        let b = self.blocks[self.block_index()].as_slice()[self.block_offset()];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if (buf.len() as u64) > self.remaining() {
            return Err(Error::unexpected_eof("ram reader: read_bytes"));
        }
        let mut filled = 0;
        while filled < buf.len() {
            let block = self.blocks[self.block_index()].as_slice();
            let offset = self.block_offset();
            let n = (block.len() - offset).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&block[offset..offset + n]);
            filled += n;
            self.pos += n as u64;
        }
        Ok(())
    }
}
