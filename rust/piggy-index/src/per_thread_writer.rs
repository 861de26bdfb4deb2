//! A single-threaded document writer owning one in-progress segment.

use std::sync::Arc;

use piggy_common::{Result, error::Error};
use piggy_io::FileStore;

use crate::{
    config::IndexWriterConfig,
    delete_queue::DeleteQueue,
    document::IndexableField,
    field_infos::{FieldNumberCache, FieldNumbers},
    segment::segment_name,
    stored_fields::{StoredFieldsStats, StoredFieldsWriter, StoredValueRef, utf16_len_over},
};

/// A segment produced by flushing a [`PerThreadWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedSegment {
    pub writer_id: u64,
    pub delete_generation: u64,
    pub stats: StoredFieldsStats,
}

impl FlushedSegment {
    pub fn segment(&self) -> &str {
        &self.stats.segment
    }

    pub fn num_docs(&self) -> u32 {
        self.stats.num_docs
    }
}

/// Writes documents into one segment.
///
/// A writer is used by one thread at a time (the pool hands it out under an exclusive
/// lock). Any failure while adding documents aborts the writer: its buffered documents
/// are discarded and it must not be used again.
pub struct PerThreadWriter {
    id: u64,
    segment: String,
    stored_fields: Option<StoredFieldsWriter>,
    field_numbers: Arc<FieldNumbers>,
    field_cache: FieldNumberCache,
    delete_queue: Arc<DeleteQueue>,
    max_stored_string_len: usize,
    num_docs: u32,
    aborted: bool,
    flush_pending: bool,
    accounted_bytes: u64,
}

impl PerThreadWriter {
    pub fn new(
        id: u64,
        store: &dyn FileStore,
        field_numbers: Arc<FieldNumbers>,
        delete_queue: Arc<DeleteQueue>,
        config: &IndexWriterConfig,
    ) -> Result<PerThreadWriter> {
        let segment = segment_name(id);
        let stored_fields = StoredFieldsWriter::create(store, &segment, config)?;
        tracing::debug!(
            writer = id,
            segment = %segment,
            generation = delete_queue.generation(),
            "created per-thread writer"
        );
        Ok(PerThreadWriter {
            id,
            segment,
            stored_fields: Some(stored_fields),
            field_numbers,
            field_cache: FieldNumberCache::default(),
            delete_queue,
            max_stored_string_len: config.max_stored_string_len,
            num_docs: 0,
            aborted: false,
            flush_pending: false,
            accounted_bytes: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn delete_queue(&self) -> &Arc<DeleteQueue> {
        &self.delete_queue
    }

    /// Documents added to this writer since it was created.
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending
    }

    pub(crate) fn set_flush_pending(&mut self) {
        self.flush_pending = true;
    }

    pub(crate) fn accounted_bytes(&self) -> u64 {
        self.accounted_bytes
    }

    pub(crate) fn set_accounted_bytes(&mut self, bytes: u64) {
        self.accounted_bytes = bytes;
    }

    pub fn ram_bytes_used(&self) -> u64 {
        self.stored_fields
            .as_ref()
            .map_or(0, StoredFieldsWriter::ram_bytes_used)
    }

    /// Adds a batch of documents, calling `on_doc_buffered` once after each one.
    ///
    /// Returns the segment-local number of the first document. On failure the writer
    /// is aborted and the documents after the failing one are not processed.
    pub fn add_documents<D, F>(
        &mut self,
        docs: &[D],
        mut on_doc_buffered: impl FnMut(),
    ) -> Result<u32>
    where
        D: AsRef<[F]>,
        F: IndexableField,
    {
        if self.aborted || self.stored_fields.is_none() {
            return Err(Error::invalid_operation(format!(
                "add documents to closed writer {}",
                self.segment
            )));
        }
        let start = self.num_docs;
        for doc in docs {
            if let Err(e) = self.add_document(doc.as_ref()) {
                self.abort(&e);
                return Err(e);
            }
            on_doc_buffered();
        }
        Ok(start)
    }

    fn add_document<F: IndexableField>(&mut self, fields: &[F]) -> Result<()> {
        let mut resolved = Vec::with_capacity(fields.len());
        for field in fields.iter().filter(|f| f.stored()) {
            let value = StoredValueRef::from_field(field)?;
            if let StoredValueRef::String(s) = value {
                if let Some(len) = utf16_len_over(s, self.max_stored_string_len) {
                    return Err(Error::validation(
                        field.name(),
                        format!(
                            "stored string of {len} UTF-16 code units exceeds the limit of {}",
                            self.max_stored_string_len
                        ),
                    ));
                }
            }
            let number = self.field_cache.resolve(field.name(), &self.field_numbers);
            resolved.push((number, value));
        }

        let stored_fields = self
            .stored_fields
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("add document to a flushed writer"))?;
        for (number, value) in &resolved {
            stored_fields.write_field(*number, value)?;
        }
        stored_fields.finish_document()?;
        self.num_docs += 1;
        Ok(())
    }

    fn abort(&mut self, error: &Error) {
        tracing::warn!(
            writer = self.id,
            segment = %self.segment,
            num_docs = self.num_docs,
            error = %error,
            "aborting per-thread writer"
        );
        self.aborted = true;
        self.stored_fields = None;
    }

    /// Flushes the buffered documents and finalizes the segment files.
    ///
    /// The writer cannot accept documents afterwards.
    pub fn flush(&mut self) -> Result<FlushedSegment> {
        if self.aborted {
            return Err(Error::invalid_operation(format!(
                "flush aborted writer {}",
                self.segment
            )));
        }
        let stored_fields = self.stored_fields.take().ok_or_else(|| {
            Error::invalid_operation(format!("writer {} was already flushed", self.segment))
        })?;
        let stats = stored_fields.finish().inspect_err(|e| {
            tracing::warn!(segment = %self.segment, error = %e, "segment flush failed");
            self.aborted = true;
        })?;
        tracing::info!(
            writer = self.id,
            segment = %stats.segment,
            num_docs = stats.num_docs,
            num_chunks = stats.num_chunks,
            data_bytes = stats.data_bytes,
            "flushed segment"
        );
        Ok(FlushedSegment {
            writer_id: self.id,
            delete_generation: self.delete_queue.generation(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, sync::Arc};

    use piggy_io::MemoryFileStore;

    use crate::{
        config::IndexWriterConfig,
        delete_queue::DeleteQueue,
        document::{Document, Field},
        field_infos::FieldNumbers,
        stored_fields::{StoredFieldsReader, StoredValue},
    };

    use super::PerThreadWriter;

    fn new_writer(store: &MemoryFileStore, config: &IndexWriterConfig) -> PerThreadWriter {
        PerThreadWriter::new(
            0,
            store,
            Arc::new(FieldNumbers::new()),
            Arc::new(DeleteQueue::new(0)),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_add_and_flush() {
        let store = MemoryFileStore::new();
        let mut writer = new_writer(&store, &IndexWriterConfig::default());
        let docs = (0..3)
            .map(|i| {
                Document::new()
                    .with(Field::text("name", format!("n{i}")))
                    .with(Field::numeric("rank", i))
                    .with(Field::text("hidden", "x").not_stored())
            })
            .collect::<Vec<_>>();
        let buffered = Cell::new(0);
        let start = writer
            .add_documents(&docs, || buffered.set(buffered.get() + 1))
            .unwrap();
        assert_eq!(start, 0);
        assert_eq!(buffered.get(), 3);
        assert_eq!(writer.add_documents(&docs[..1], || ()).unwrap(), 3);
        assert_eq!(writer.num_docs(), 4);
        assert!(writer.ram_bytes_used() > 0);

        let flushed = writer.flush().unwrap();
        assert_eq!(flushed.segment(), "_0");
        assert_eq!(flushed.num_docs(), 4);
        assert!(writer.add_documents(&docs, || ()).is_err());
        assert!(writer.flush().is_err());

        let docs = StoredFieldsReader::open(&store, "_0").unwrap().read_all().unwrap();
        assert_eq!(docs.len(), 4);
        assert_eq!(
            docs[2].fields,
            vec![(1, StoredValue::String("n2".into())), (2, StoredValue::Int(2))]
        );
    }

    #[test]
    fn test_oversized_string_aborts_before_writing() {
        let store = MemoryFileStore::new();
        let config = IndexWriterConfig::default().with_max_stored_string_len(10);
        let mut writer = new_writer(&store, &config);
        let docs = vec![
            Document::new().with(Field::text("a", "short")),
            Document::new()
                .with(Field::numeric("b", 1))
                .with(Field::text("a", "far too long for the limit")),
            Document::new().with(Field::text("a", "never")),
        ];
        let buffered = Cell::new(0);
        let err = writer
            .add_documents(&docs, || buffered.set(buffered.get() + 1))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(buffered.get(), 1);
        assert!(writer.is_aborted());
        assert_eq!(writer.ram_bytes_used(), 0);
        assert!(writer.add_documents(&docs[..1], || ()).is_err());
        assert!(writer.flush().is_err());
    }

    #[test]
    fn test_utf16_limit_counts_code_units() {
        let store = MemoryFileStore::new();
        let config = IndexWriterConfig::default().with_max_stored_string_len(4);
        let mut writer = new_writer(&store, &config);
        // 4 UTF-16 code units, 12 UTF-8 bytes.
        let doc = Document::new().with(Field::text("cjk", "你好你好"));
        writer.add_documents(&[doc], || ()).unwrap();
        assert!(!writer.is_aborted());
    }

    #[test]
    fn test_io_failure_aborts() {
        let store = MemoryFileStore::new();
        store.set_write_limit(Some(64));
        let config = IndexWriterConfig::default().with_max_docs_per_chunk(2);
        let mut writer = new_writer(&store, &config);
        let docs = (0..4)
            .map(|_| Document::new().with(Field::binary("blob", vec![7u8; 40])))
            .collect::<Vec<_>>();
        let err = writer.add_documents(&docs, || ()).unwrap_err();
        assert!(err.is_io());
        assert!(writer.is_aborted());
        assert_eq!(store.contents("_0.fdt").unwrap().len(), 12);
    }
}
