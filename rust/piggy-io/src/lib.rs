//! I/O abstractions for the stored-field write path:
//! - `ByteSink`: sequential byte writer.
//! - `ByteSource`: sequential byte reader.
//!
//! All composite encodings (varints, zigzag, Z-float/Z-double, timestamps, strings) are free
//! functions in [`codec`] generic over these two capabilities. The RAM staging buffer
//! ([`ram`]) and the persistent channel ([`channel`]) implement them independently.

use piggy_common::{Result, error::Error};

pub mod channel;
pub mod codec;
pub mod ram;
pub mod store;

pub use channel::{ChannelReader, ChannelWriter};
pub use ram::{BLOCK_SIZE, Block, RamReader, RamWriter};
pub use store::{FileStore, InputChannel, LocalFsFileStore, MemoryFileStore, OutputChannel};

/// A sequential, append-only byte writer.
pub trait ByteSink {
    /// Appends a single byte.
    fn write_byte(&mut self, b: u8) -> Result<()>;

    /// Appends the entire buffer.
    ///
    /// Implementations either append all of `buf` or fail; there is no short write.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;
}

/// A sequential byte reader.
pub trait ByteSource {
    /// Reads a single byte, failing with an `UnexpectedEof` I/O error at the end of the data.
    fn read_byte(&mut self) -> Result<u8>;

    /// Fills the entire buffer, failing with an `UnexpectedEof` I/O error if fewer bytes remain.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl<T> ByteSink for &mut T
where
    T: ByteSink + ?Sized,
{
    fn write_byte(&mut self, b: u8) -> Result<()> {
        (**self).write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_bytes(buf)
    }
}

impl<T> ByteSink for Box<T>
where
    T: ByteSink + ?Sized,
{
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.as_mut().write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.as_mut().write_bytes(buf)
    }
}

impl<T> ByteSource for &mut T
where
    T: ByteSource + ?Sized,
{
    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_bytes(buf)
    }
}

impl<T> ByteSource for Box<T>
where
    T: ByteSource + ?Sized,
{
    fn read_byte(&mut self) -> Result<u8> {
        self.as_mut().read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.as_mut().read_bytes(buf)
    }
}

impl ByteSink for Vec<u8> {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.push(b);
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Result<u8> {
        let (&b, rest) = self
            .split_first()
            .ok_or_else(|| Error::unexpected_eof("read_byte"))?;
        *self = rest;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.len() < buf.len() {
            return Err(Error::unexpected_eof("read_bytes"));
        }
        let (head, rest) = self.split_at(buf.len());
        buf.copy_from_slice(head);
        *self = rest;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{ByteSink, ByteSource};

    #[test]
    fn test_vec_sink_and_slice_source() {
        let mut sink = Vec::<u8>::new();
        sink.write_bytes(b"abcd").unwrap();
        sink.write_byte(b'1').unwrap();
        assert_eq!(sink, b"abcd1");

        let mut source = &sink[..];
        assert_eq!(source.read_byte().unwrap(), b'a');
        let mut buf = [0u8; 3];
        source.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"bcd");
        assert_eq!(source.read_byte().unwrap(), b'1');
        let err = source.read_byte().unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::UnexpectedEof));
        assert!(source.read_bytes(&mut buf).is_err());
    }
}
