//! Persistent channel: an append-only write channel staged through a [`RamWriter`]
//! and a memory-mapped read channel exposing the [`RamReader`] interface.

use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    path::Path,
    sync::Arc,
};

use memmap2::Mmap;
use parking_lot::Mutex;
use piggy_common::{Result, error::Error};

use crate::{
    ByteSink, ByteSource,
    ram::{RamReader, RamWriter, SharedBytes},
    store::{InputChannel, OutputChannel},
};

/// Durable storage a [`ChannelWriter`] drains into.
pub trait ChannelBackend: Send {
    /// Appends `buf` at the current end. May apply a prefix before failing.
    fn append(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Cuts the storage back to `len` bytes and continues appending from there.
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;

    fn sync(&mut self) -> std::io::Result<()>;
}

impl ChannelBackend for File {
    fn append(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf)
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

/// In-memory backend sharing its buffer with the owning store.
///
/// With a write limit set, an append that would grow the buffer past the limit
/// stores the bytes that still fit and then fails.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<Vec<u8>>>,
    limit: Option<u64>,
}

impl MemoryBackend {
    pub fn new(data: Arc<Mutex<Vec<u8>>>, limit: Option<u64>) -> MemoryBackend {
        MemoryBackend { data, limit }
    }
}

impl ChannelBackend for MemoryBackend {
    fn append(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut data = self.data.lock();
        if let Some(limit) = self.limit {
            let room = limit.saturating_sub(data.len() as u64) as usize;
            if buf.len() > room {
                data.extend_from_slice(&buf[..room]);
                return Err(std::io::Error::other(format!(
                    "write limit of {limit} bytes reached"
                )));
            }
        }
        data.extend_from_slice(buf);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.data.lock().truncate(len as usize);
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sequential write channel.
///
/// Writes land in a staging buffer; [`ChannelWriter::commit`] drains them to the
/// backend, and [`ChannelWriter::flush`] commits and finalizes the channel. After a
/// failed commit the backend is cut back to the last committed length, so bytes of a
/// failed commit are never left behind.
pub struct ChannelWriter<B: ChannelBackend = File> {
    name: String,
    staging: RamWriter,
    committed: u64,
    backend: Option<B>,
}

impl ChannelWriter<File> {
    /// Creates a new file for exclusive writing. Fails if the file exists.
    pub fn create(path: impl AsRef<Path>) -> Result<ChannelWriter<File>> {
        let path = path.as_ref();
        let file = File::create_new(path)
            .map_err(|e| Error::io(format!("create {}", path.display()), e))?;
        Ok(ChannelWriter::new(path.display().to_string(), file))
    }
}

impl<B: ChannelBackend> ChannelWriter<B> {
    pub fn new(name: impl Into<String>, backend: B) -> ChannelWriter<B> {
        ChannelWriter {
            name: name.into(),
            staging: RamWriter::new(),
            committed: 0,
            backend: Some(backend),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Committed plus staged bytes.
    pub fn size(&self) -> u64 {
        self.committed + self.staging.size()
    }

    pub fn committed_size(&self) -> u64 {
        self.committed
    }

    pub fn is_finalized(&self) -> bool {
        self.backend.is_none()
    }

    /// Drains the staged bytes to the backend.
    pub fn commit(&mut self) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(self.finalized_error());
        };
        if self.staging.is_empty() {
            return Ok(());
        }
        let staged = self.staging.size();
        let result = self
            .staging
            .blocks()
            .iter()
            .try_for_each(|block| backend.append(block.as_slice()));
        self.staging.reset();
        match result {
            Ok(()) => {
                self.committed += staged;
                Ok(())
            }
            Err(e) => {
                if let Err(te) = backend.truncate(self.committed) {
                    tracing::warn!(
                        channel = %self.name,
                        committed = self.committed,
                        error = %te,
                        "failed to truncate channel after a failed commit"
                    );
                }
                Err(Error::io(format!("commit to {}", self.name), e))
            }
        }
    }

    /// Commits the staged bytes, optionally syncs them to durable storage, and
    /// finalizes the channel. No further writes are accepted afterwards.
    pub fn flush(&mut self, sync: bool) -> Result<()> {
        self.commit()?;
        let Some(mut backend) = self.backend.take() else {
            return Err(self.finalized_error());
        };
        if sync {
            backend
                .sync()
                .map_err(|e| Error::io(format!("sync {}", self.name), e))?;
        }
        tracing::debug!(channel = %self.name, size = self.committed, "channel finalized");
        Ok(())
    }

    fn finalized_error(&self) -> Error {
        Error::concurrency_violation(format!("channel {} is already finalized", self.name))
    }

    fn check_open(&self) -> Result<()> {
        if self.backend.is_none() {
            return Err(self.finalized_error());
        }
        Ok(())
    }
}

impl<B: ChannelBackend> ByteSink for ChannelWriter<B> {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.check_open()?;
        self.staging.write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.check_open()?;
        self.staging.write_bytes(buf)
    }
}

impl<B: ChannelBackend> OutputChannel for ChannelWriter<B> {
    fn name(&self) -> &str {
        ChannelWriter::name(self)
    }

    fn size(&self) -> u64 {
        ChannelWriter::size(self)
    }

    fn commit(&mut self) -> Result<()> {
        ChannelWriter::commit(self)
    }

    fn flush(&mut self, sync: bool) -> Result<()> {
        ChannelWriter::flush(self, sync)
    }
}

/// Random-access read channel over a whole file.
#[derive(Clone, Default)]
pub struct ChannelReader {
    reader: RamReader,
}

impl ChannelReader {
    /// Memory-maps `path` read-only. An empty file yields an empty reader.
    pub fn open(path: impl AsRef<Path>) -> Result<ChannelReader> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| Error::io(format!("open {}", path.display()), e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::io(format!("stat {}", path.display()), e))?
            .len();
        if len == 0 {
            return Ok(ChannelReader::default());
        }
        // SAFETY: the file is opened read-only and channel files are never modified
        // after they are finalized.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::io(format!("mmap {}", path.display()), e))?;
        Ok(ChannelReader::from_bytes(Arc::new(mmap)))
    }

    pub fn from_bytes(data: SharedBytes) -> ChannelReader {
        ChannelReader {
            reader: RamReader::from_contiguous(data),
        }
    }

    pub fn size(&self) -> u64 {
        self.reader.size()
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn remaining(&self) -> u64 {
        self.reader.remaining()
    }

    pub fn has_remaining(&self) -> bool {
        self.reader.has_remaining()
    }

    pub fn set_pos(&mut self, pos: u64) -> Result<()> {
        self.reader.set_pos(pos)
    }
}

impl ByteSource for ChannelReader {
    fn read_byte(&mut self) -> Result<u8> {
        self.reader.read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_bytes(buf)
    }
}

impl InputChannel for ChannelReader {
    fn size(&self) -> u64 {
        ChannelReader::size(self)
    }

    fn position(&self) -> u64 {
        ChannelReader::position(self)
    }

    fn set_pos(&mut self, pos: u64) -> Result<()> {
        ChannelReader::set_pos(self, pos)
    }
}
