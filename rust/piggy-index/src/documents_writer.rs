//! Entry point for concurrent document ingestion.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use piggy_common::{Result, error::Error};
use piggy_io::FileStore;

use crate::{
    config::IndexWriterConfig,
    delete_queue::{ActiveDeleteQueue, DeleteNode},
    document::IndexableField,
    field_infos::FieldNumbers,
    flush_control::{AfterDocument, FlushControl},
    per_thread_writer::{FlushedSegment, PerThreadWriter},
    writer_pool::{WriterLease, WriterPool},
};

/// Accepts documents from any number of threads and writes their stored fields into
/// per-writer segments.
///
/// Every successfully added batch receives a contiguous range of global document ids.
pub struct DocumentsWriter {
    config: Arc<IndexWriterConfig>,
    field_numbers: Arc<FieldNumbers>,
    flush_control: FlushControl,
    next_doc_id: AtomicU64,
    num_docs_in_ram: AtomicU64,
    flushed: Mutex<Vec<FlushedSegment>>,
}

impl DocumentsWriter {
    pub fn new(store: Arc<dyn FileStore>, config: IndexWriterConfig) -> Result<DocumentsWriter> {
        config.validate()?;
        let config = Arc::new(config);
        let field_numbers = Arc::new(FieldNumbers::new());
        let delete_queue = Arc::new(ActiveDeleteQueue::new());

        let pool = {
            let field_numbers = field_numbers.clone();
            let delete_queue = delete_queue.clone();
            let config = config.clone();
            WriterPool::new(Box::new(move |id| {
                PerThreadWriter::new(
                    id,
                    store.as_ref(),
                    field_numbers.clone(),
                    delete_queue.current(),
                    &config,
                )
            }))
        };
        let flush_control = FlushControl::new(pool, delete_queue, config.clone());

        Ok(DocumentsWriter {
            config,
            field_numbers,
            flush_control,
            next_doc_id: AtomicU64::new(0),
            num_docs_in_ram: AtomicU64::new(0),
            flushed: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }

    pub fn field_numbers(&self) -> &FieldNumbers {
        &self.field_numbers
    }

    pub fn flush_control(&self) -> &FlushControl {
        &self.flush_control
    }

    /// Documents added to writers that have not been flushed yet.
    pub fn num_docs_in_ram(&self) -> u64 {
        self.num_docs_in_ram.load(Ordering::Acquire)
    }

    /// Number of global document ids handed out so far.
    pub fn num_docs_added(&self) -> u64 {
        self.next_doc_id.load(Ordering::Acquire)
    }

    pub fn flushed_segments(&self) -> Vec<FlushedSegment> {
        self.flushed.lock().clone()
    }

    /// Adds one document and returns its global id.
    pub fn add_document<F: IndexableField>(&self, doc: &impl AsRef<[F]>) -> Result<u64> {
        self.update_documents(None, std::slice::from_ref(doc))
    }

    /// Adds a batch of documents through a single writer and returns the global id of
    /// the first one.
    pub fn add_documents<D, F>(&self, docs: &[D]) -> Result<u64>
    where
        D: AsRef<[F]>,
        F: IndexableField,
    {
        self.update_documents(None, docs)
    }

    /// Adds one document together with an update that applies to earlier documents.
    pub fn update_document<F: IndexableField>(
        &self,
        update: &dyn DeleteNode,
        doc: &impl AsRef<[F]>,
    ) -> Result<u64> {
        self.update_documents(Some(update), std::slice::from_ref(doc))
    }

    fn update_documents<D, F>(&self, update: Option<&dyn DeleteNode>, docs: &[D]) -> Result<u64>
    where
        D: AsRef<[F]>,
        F: IndexableField,
    {
        let mut lease = self.flush_control.obtain_writer()?;
        let added = lease.add_documents(docs, || {
            self.num_docs_in_ram.fetch_add(1, Ordering::AcqRel);
        });
        if let Err(e) = added {
            if lease.is_aborted() {
                self.num_docs_in_ram
                    .fetch_sub(lease.num_docs() as u64, Ordering::AcqRel);
                self.flush_control.abort_writer(lease);
            } else {
                self.flush_control.pool().release_writer(lease)?;
            }
            return Err(e);
        }

        let first_id = self.next_doc_id.fetch_add(docs.len() as u64, Ordering::AcqRel);
        match self.flush_control.after_document(lease, update)? {
            AfterDocument::Released => (),
            AfterDocument::FlushPending(lease) => {
                self.flush_writer(lease)?;
            }
        }
        Ok(first_id)
    }

    fn flush_writer(&self, mut lease: WriterLease) -> Result<FlushedSegment> {
        let bytes = lease.accounted_bytes();
        let num_docs = lease.num_docs() as u64;
        let flushed = lease.flush();
        self.flush_control.after_flush(bytes);
        self.num_docs_in_ram.fetch_sub(num_docs, Ordering::AcqRel);
        drop(lease);
        let segment = flushed?;
        self.flushed.lock().push(segment.clone());
        Ok(segment)
    }

    /// Flushes every writer of the current generation.
    ///
    /// Writers handed back by [`FlushControl::after_document`] are flushed by the
    /// threads that received them and are not part of the result.
    pub fn flush_all(&self) -> Result<Vec<FlushedSegment>> {
        let writers = self.flush_control.mark_for_full_flush()?;
        self.flush_writers(writers)
    }

    /// Rejects further documents, waits for batches in flight and flushes every
    /// registered writer, whatever its generation.
    pub fn close(&self) -> Result<Vec<FlushedSegment>> {
        let writers = self.flush_control.mark_for_close();
        let result = self.flush_writers(writers);
        tracing::info!(
            docs = self.num_docs_added(),
            fields = self.field_numbers.len(),
            "documents writer closed"
        );
        result
    }

    /// Flushes all given writers, keeping the first error.
    fn flush_writers(&self, writers: Vec<WriterLease>) -> Result<Vec<FlushedSegment>> {
        let mut segments = Vec::with_capacity(writers.len());
        let mut first_error: Option<Error> = None;
        for lease in writers {
            match self.flush_writer(lease) {
                Ok(segment) => segments.push(segment),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(segments),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use piggy_io::MemoryFileStore;

    use crate::{
        config::IndexWriterConfig,
        delete_queue::DeleteTerm,
        document::{Document, Field},
        stored_fields::{StoredFieldsReader, StoredValue},
    };

    use super::DocumentsWriter;

    #[test]
    fn test_add_and_flush_all() {
        let store = Arc::new(MemoryFileStore::new());
        let writer = DocumentsWriter::new(store.clone(), IndexWriterConfig::default()).unwrap();
        let doc = Document::new()
            .with(Field::text("title", "hello,world"))
            .with(Field::numeric("count", 42));
        assert_eq!(writer.add_document(&doc).unwrap(), 0);
        assert_eq!(writer.add_documents(&[doc.clone(), doc.clone()]).unwrap(), 1);
        assert_eq!(writer.num_docs_in_ram(), 3);
        assert_eq!(writer.num_docs_added(), 3);

        let segments = writer.flush_all().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].num_docs(), 3);
        assert_eq!(writer.num_docs_in_ram(), 0);

        let docs = StoredFieldsReader::open(store.as_ref(), segments[0].segment())
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(docs.len(), 3);
        let title = writer.field_numbers().get("title").unwrap();
        assert_eq!(
            docs[0].fields[0],
            (title, StoredValue::String("hello,world".into()))
        );
    }

    #[test]
    fn test_update_document_counts_deletes() {
        let store = Arc::new(MemoryFileStore::new());
        let writer = DocumentsWriter::new(store, IndexWriterConfig::default()).unwrap();
        let doc = Document::new().with(Field::text("id", "1"));
        writer.add_document(&doc).unwrap();
        writer
            .update_document(&DeleteTerm::new("id", "1"), &doc)
            .unwrap();
        assert_eq!(writer.flush_control().num_pending_deletes(), 1);
        writer.flush_all().unwrap();
        assert_eq!(writer.flush_control().num_pending_deletes(), 0);
    }

    #[test]
    fn test_failed_batch_reserves_no_ids() {
        let store = Arc::new(MemoryFileStore::new());
        let config = IndexWriterConfig::default().with_max_stored_string_len(8);
        let writer = DocumentsWriter::new(store, config).unwrap();
        writer
            .add_document(&Document::new().with(Field::text("s", "ok")))
            .unwrap();
        let bad = vec![
            Document::new().with(Field::text("s", "fine")),
            Document::new().with(Field::text("s", "much too long")),
        ];
        assert!(writer.add_documents(&bad).unwrap_err().is_validation());
        assert_eq!(writer.num_docs_added(), 1);
        assert_eq!(writer.num_docs_in_ram(), 0);
        assert_eq!(writer.flush_control().pool().size(), 0);

        let id = writer
            .add_document(&Document::new().with(Field::text("s", "again")))
            .unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_flush_pending_writer_is_flushed_inline() {
        let store = Arc::new(MemoryFileStore::new());
        let config = IndexWriterConfig::default().with_ram_per_writer_flush_bytes(8 * 1024);
        let writer = DocumentsWriter::new(store, config).unwrap();
        let doc = Document::new().with(Field::binary("b", vec![0u8; 10_000]));
        writer.add_document(&doc).unwrap();
        let flushed = writer.flushed_segments();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].num_docs(), 1);
        assert_eq!(writer.num_docs_in_ram(), 0);
        assert_eq!(writer.flush_control().flush_bytes(), 0);
    }

    #[test]
    fn test_close_rejects_documents() {
        let store = Arc::new(MemoryFileStore::new());
        let writer = DocumentsWriter::new(store, IndexWriterConfig::default()).unwrap();
        writer
            .add_document(&Document::new().with(Field::numeric("n", 1)))
            .unwrap();
        assert_eq!(writer.close().unwrap().len(), 1);
        assert!(
            writer
                .add_document(&Document::new().with(Field::numeric("n", 2)))
                .is_err()
        );
        assert!(DocumentsWriter::new(
            Arc::new(MemoryFileStore::new()),
            IndexWriterConfig::default().with_max_docs_per_chunk(0)
        )
        .is_err());
    }
}
