use piggy_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

/// Tuning knobs of the stored-field write path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWriterConfig {
    /// Number of buffered documents that triggers a chunk flush.
    pub max_docs_per_chunk: usize,
    /// Longest accepted stored string, in UTF-16 code units.
    pub max_stored_string_len: usize,
    /// Buffered bytes after which a writer is marked flush-pending.
    pub ram_per_writer_flush_bytes: u64,
    /// Whether segment files are synced to durable storage when a segment is finished.
    pub sync_on_finish: bool,
}

impl IndexWriterConfig {
    pub const DEFAULT_MAX_DOCS_PER_CHUNK: usize = 128;
    pub const DEFAULT_MAX_STORED_STRING_LEN: usize = 20_000;
    pub const DEFAULT_RAM_PER_WRITER_FLUSH_BYTES: u64 = 16 * 1024 * 1024;

    pub fn with_max_docs_per_chunk(mut self, max_docs_per_chunk: usize) -> Self {
        self.max_docs_per_chunk = max_docs_per_chunk;
        self
    }

    pub fn with_max_stored_string_len(mut self, max_stored_string_len: usize) -> Self {
        self.max_stored_string_len = max_stored_string_len;
        self
    }

    pub fn with_ram_per_writer_flush_bytes(mut self, bytes: u64) -> Self {
        self.ram_per_writer_flush_bytes = bytes;
        self
    }

    pub fn with_sync_on_finish(mut self, sync_on_finish: bool) -> Self {
        self.sync_on_finish = sync_on_finish;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_docs_per_chunk == 0 {
            return Err(Error::invalid_arg(
                "max_docs_per_chunk",
                "must be at least 1",
            ));
        }
        if self.max_stored_string_len == 0 {
            return Err(Error::invalid_arg(
                "max_stored_string_len",
                "must be at least 1",
            ));
        }
        if self.ram_per_writer_flush_bytes == 0 {
            return Err(Error::invalid_arg(
                "ram_per_writer_flush_bytes",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            max_docs_per_chunk: Self::DEFAULT_MAX_DOCS_PER_CHUNK,
            max_stored_string_len: Self::DEFAULT_MAX_STORED_STRING_LEN,
            ram_per_writer_flush_bytes: Self::DEFAULT_RAM_PER_WRITER_FLUSH_BYTES,
            sync_on_finish: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IndexWriterConfig;

    #[test]
    fn test_defaults() {
        let config = IndexWriterConfig::default();
        assert_eq!(config.max_docs_per_chunk, 128);
        assert_eq!(config.max_stored_string_len, 20_000);
        assert_eq!(config.ram_per_writer_flush_bytes, 16 * 1024 * 1024);
        assert!(config.sync_on_finish);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        assert!(
            IndexWriterConfig::default()
                .with_max_docs_per_chunk(0)
                .validate()
                .is_err()
        );
        assert!(
            IndexWriterConfig::default()
                .with_ram_per_writer_flush_bytes(0)
                .validate()
                .is_err()
        );
        IndexWriterConfig::default()
            .with_max_docs_per_chunk(1)
            .with_sync_on_finish(false)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_partial_json() {
        let config: IndexWriterConfig =
            serde_json::from_str(r#"{ "max_docs_per_chunk": 16 }"#).unwrap();
        assert_eq!(config.max_docs_per_chunk, 16);
        assert_eq!(config.max_stored_string_len, 20_000);

        let json = serde_json::to_string(&config).unwrap();
        let back: IndexWriterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
