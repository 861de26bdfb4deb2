//! File-store abstraction: named output and input channels.

use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use piggy_common::{Result, error::Error};

use crate::{
    ByteSink, ByteSource,
    channel::{ChannelReader, ChannelWriter, MemoryBackend},
    ram::SharedBytes,
};

/// A sequential write channel handed out by a [`FileStore`].
pub trait OutputChannel: ByteSink + Send {
    fn name(&self) -> &str;

    /// Committed plus staged bytes.
    fn size(&self) -> u64;

    /// Publishes every staged byte, or none of them.
    fn commit(&mut self) -> Result<()>;

    /// Commits, optionally syncs, and finalizes the channel.
    fn flush(&mut self, sync: bool) -> Result<()>;
}

/// A random-access read channel handed out by a [`FileStore`].
pub trait InputChannel: ByteSource + Send {
    fn size(&self) -> u64;

    fn position(&self) -> u64;

    fn set_pos(&mut self, pos: u64) -> Result<()>;

    fn remaining(&self) -> u64 {
        self.size() - self.position()
    }

    fn has_remaining(&self) -> bool {
        self.position() < self.size()
    }
}

/// A flat namespace of files.
pub trait FileStore: Send + Sync + 'static {
    /// Creates a new file. Fails with an `AlreadyExists` I/O error if `name` exists.
    fn create_output(&self, name: &str) -> Result<Box<dyn OutputChannel>>;

    fn open_input(&self, name: &str) -> Result<Box<dyn InputChannel>>;

    fn file_exists(&self, name: &str) -> bool;
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::invalid_arg(
            "name",
            format!("'{name}' is not a plain file name"),
        ));
    }
    Ok(())
}

/// Files under a local directory.
pub struct LocalFsFileStore {
    root: PathBuf,
}

impl LocalFsFileStore {
    /// Opens a store rooted at `root`, creating the directory if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<LocalFsFileStore> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::io(format!("create directory {}", root.display()), e))?;
        Ok(LocalFsFileStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl FileStore for LocalFsFileStore {
    fn create_output(&self, name: &str) -> Result<Box<dyn OutputChannel>> {
        let path = self.path_of(name)?;
        let file = File::create_new(&path)
            .map_err(|e| Error::io(format!("create {}", path.display()), e))?;
        Ok(Box::new(ChannelWriter::new(name, file)))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn InputChannel>> {
        let path = self.path_of(name)?;
        Ok(Box::new(ChannelReader::open(path)?))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path_of(name).is_ok_and(|path| path.is_file())
    }
}

/// Files held in memory, shared between the store and its channels.
///
/// A write limit applies to files created after it is set: each such file accepts
/// at most that many bytes, and the append crossing it fails.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>,
    write_limit: Mutex<Option<u64>>,
}

impl MemoryFileStore {
    pub fn new() -> MemoryFileStore {
        Default::default()
    }

    pub fn set_write_limit(&self, limit: Option<u64>) {
        *self.write_limit.lock() = limit;
    }

    /// Snapshot of a file's committed bytes.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).map(|data| data.lock().clone())
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names = self.files.lock().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl FileStore for MemoryFileStore {
    fn create_output(&self, name: &str) -> Result<Box<dyn OutputChannel>> {
        validate_name(name)?;
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Err(Error::io(
                format!("create {name}"),
                std::io::ErrorKind::AlreadyExists.into(),
            ));
        }
        let data = Arc::new(Mutex::new(Vec::new()));
        files.insert(name.to_string(), data.clone());
        let backend = MemoryBackend::new(data, *self.write_limit.lock());
        Ok(Box::new(ChannelWriter::new(name, backend)))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn InputChannel>> {
        let data = self.contents(name).ok_or_else(|| {
            Error::io(format!("open {name}"), std::io::ErrorKind::NotFound.into())
        })?;
        Ok(Box::new(ChannelReader::from_bytes(
            Arc::new(data) as SharedBytes
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ByteSink, ByteSource,
        codec::{read_string, write_string},
    };

    use super::{FileStore, LocalFsFileStore, MemoryFileStore};

    fn exercise_store(store: &dyn FileStore) {
        assert!(!store.file_exists("_0.fdt"));
        let mut out = store.create_output("_0.fdt").unwrap();
        write_string(&mut out, "piggySearch").unwrap();
        out.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(out.size(), 15);
        out.flush(false).unwrap();
        assert!(store.file_exists("_0.fdt"));

        let err = store.create_output("_0.fdt").err().unwrap();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::AlreadyExists));

        let mut input = store.open_input("_0.fdt").unwrap();
        assert_eq!(input.size(), 15);
        assert_eq!(read_string(&mut input).unwrap(), "piggySearch");
        assert_eq!(input.remaining(), 3);
        input.set_pos(14).unwrap();
        assert_eq!(input.read_byte().unwrap(), 3);
        assert!(!input.has_remaining());

        assert!(store.open_input("_1.fdt").is_err());
        assert!(store.create_output("../escape").is_err());
        assert!(store.create_output("").is_err());
    }

    #[test]
    fn test_local_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsFileStore::new(dir.path().join("segments")).unwrap();
        exercise_store(&store);
        assert!(dir.path().join("segments").join("_0.fdt").is_file());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryFileStore::new();
        exercise_store(&store);
        assert_eq!(store.file_names(), vec!["_0.fdt".to_string()]);
        assert_eq!(store.contents("_0.fdt").unwrap().len(), 15);
    }

    #[test]
    fn test_memory_store_write_limit() {
        let store = MemoryFileStore::new();
        store.set_write_limit(Some(4));
        let mut out = store.create_output("limited").unwrap();
        out.write_bytes(b"abcdef").unwrap();
        assert!(out.commit().unwrap_err().is_io());
        assert_eq!(store.contents("limited").unwrap(), Vec::<u8>::new());

        store.set_write_limit(None);
        let mut out = store.create_output("unlimited").unwrap();
        out.write_bytes(b"abcdef").unwrap();
        out.commit().unwrap();
        assert_eq!(store.contents("unlimited").unwrap(), b"abcdef");
    }
}
