use piggy_common::{Result, error::Error};
use piggy_io::{
    FileStore, OutputChannel, RamWriter,
    codec::{write_string, write_vint, write_vlong},
};

use crate::{
    config::IndexWriterConfig,
    segment::{DATA_EXTENSION, META_EXTENSION, segment_file_name},
};

use super::{CODEC_FOOTER, CODEC_HEADER, StoredValueRef, make_tag};

/// Location of one flushed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub doc_base: u32,
    pub doc_count: u32,
    /// Offset of the chunk record in the data file.
    pub start_pointer: u64,
}

/// Summary of a finished stored-fields segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFieldsStats {
    pub segment: String,
    pub num_docs: u32,
    pub num_chunks: usize,
    pub data_bytes: u64,
    pub meta_bytes: u64,
}

/// Encodes stored fields of one segment into chunks.
///
/// Documents are buffered in memory until `max_docs_per_chunk` of them are complete;
/// the chunk header and payload are then staged in the data channel and published by
/// a single commit.
pub struct StoredFieldsWriter {
    segment: String,
    data: Box<dyn OutputChannel>,
    meta: Box<dyn OutputChannel>,
    buffer: RamWriter,
    num_stored_fields: Vec<u32>,
    end_offsets: Vec<u32>,
    num_stored_fields_in_doc: u32,
    doc_base: u32,
    chunks: Vec<ChunkInfo>,
    max_docs_per_chunk: usize,
    sync_on_finish: bool,
}

impl StoredFieldsWriter {
    /// Creates the segment's data and metadata files and publishes their headers.
    pub fn create(
        store: &dyn FileStore,
        segment: &str,
        config: &IndexWriterConfig,
    ) -> Result<StoredFieldsWriter> {
        let mut data = store.create_output(&segment_file_name(segment, DATA_EXTENSION))?;
        write_string(&mut data, CODEC_HEADER)?;
        data.commit()?;

        let mut meta = store.create_output(&segment_file_name(segment, META_EXTENSION))?;
        write_string(&mut meta, CODEC_HEADER)?;
        meta.commit()?;

        Ok(StoredFieldsWriter {
            segment: segment.to_string(),
            data,
            meta,
            buffer: RamWriter::new(),
            num_stored_fields: Vec::with_capacity(config.max_docs_per_chunk),
            end_offsets: Vec::with_capacity(config.max_docs_per_chunk),
            num_stored_fields_in_doc: 0,
            doc_base: 0,
            chunks: Vec::new(),
            max_docs_per_chunk: config.max_docs_per_chunk,
            sync_on_finish: config.sync_on_finish,
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Number of complete documents not yet flushed.
    pub fn num_buffered_docs(&self) -> usize {
        self.end_offsets.len()
    }

    /// Number of complete documents, flushed or buffered.
    pub fn num_docs(&self) -> u32 {
        self.doc_base + self.end_offsets.len() as u32
    }

    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    /// Bytes of the data file published so far.
    pub fn data_file_size(&self) -> u64 {
        self.data.size()
    }

    pub fn ram_bytes_used(&self) -> u64 {
        self.buffer.ram_bytes_used()
            + ((self.num_stored_fields.capacity() + self.end_offsets.capacity())
                * std::mem::size_of::<u32>()) as u64
    }

    /// Encodes one stored field of the current document.
    pub fn write_field(&mut self, field_number: u32, value: &StoredValueRef<'_>) -> Result<()> {
        let tag = make_tag(field_number, value.field_type());
        write_vlong(&mut self.buffer, tag)?;
        value.write_to(&mut self.buffer)?;
        self.num_stored_fields_in_doc += 1;
        Ok(())
    }

    /// Completes the current document, flushing the chunk once it is full.
    pub fn finish_document(&mut self) -> Result<()> {
        let end_offset = u32::try_from(self.buffer.size()).map_err(|_| {
            Error::encoding(
                "chunk",
                format!("chunk payload of {} bytes is too large", self.buffer.size()),
            )
        })?;
        self.num_stored_fields.push(self.num_stored_fields_in_doc);
        self.num_stored_fields_in_doc = 0;
        self.end_offsets.push(end_offset);
        if self.end_offsets.len() >= self.max_docs_per_chunk {
            self.flush_chunk()?;
        }
        Ok(())
    }

    /// Publishes the buffered documents as one chunk. Does nothing if none are buffered.
    pub fn flush_chunk(&mut self) -> Result<()> {
        if self.end_offsets.is_empty() {
            return Ok(());
        }
        let doc_count = self.end_offsets.len() as u32;
        let start_pointer = self.data.size();

        write_vint(&mut self.data, self.doc_base)?;
        write_vint(&mut self.data, doc_count)?;
        for &count in &self.num_stored_fields {
            write_vint(&mut self.data, count)?;
        }
        let mut prev = 0;
        for &end in &self.end_offsets {
            write_vint(&mut self.data, end - prev)?;
            prev = end;
        }
        self.buffer.copy_to(&mut self.data)?;
        self.data.commit()?;

        tracing::debug!(
            segment = %self.segment,
            doc_base = self.doc_base,
            doc_count,
            bytes = self.data.size() - start_pointer,
            "flushed stored-fields chunk"
        );
        self.chunks.push(ChunkInfo {
            doc_base: self.doc_base,
            doc_count,
            start_pointer,
        });
        self.doc_base += doc_count;
        self.buffer.reset();
        self.num_stored_fields.clear();
        self.end_offsets.clear();
        Ok(())
    }

    /// Flushes the last chunk, writes the metadata file and finalizes both files.
    pub fn finish(mut self) -> Result<StoredFieldsStats> {
        if self.num_stored_fields_in_doc != 0 {
            return Err(Error::invalid_operation(
                "finish with an incomplete document",
            ));
        }
        self.flush_chunk()?;

        write_vint(&mut self.meta, self.chunks.len() as u32)?;
        for chunk in &self.chunks {
            write_vint(&mut self.meta, chunk.doc_base)?;
            write_vint(&mut self.meta, chunk.doc_count)?;
            write_vlong(&mut self.meta, chunk.start_pointer)?;
        }
        write_vint(&mut self.meta, self.doc_base)?;
        write_string(&mut self.meta, CODEC_FOOTER)?;

        self.data.flush(self.sync_on_finish)?;
        self.meta.flush(self.sync_on_finish)?;

        Ok(StoredFieldsStats {
            segment: self.segment,
            num_docs: self.doc_base,
            num_chunks: self.chunks.len(),
            data_bytes: self.data.size(),
            meta_bytes: self.meta.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use piggy_io::{FileStore, MemoryFileStore};

    use crate::{
        config::IndexWriterConfig,
        stored_fields::{CODEC_HEADER, StoredFieldsMeta, StoredFieldsReader, StoredValueRef},
    };

    use super::StoredFieldsWriter;

    fn add_docs(writer: &mut StoredFieldsWriter, count: u32) {
        for i in 0..count {
            writer
                .write_field(1, &StoredValueRef::Int(i as i32))
                .unwrap();
            writer.finish_document().unwrap();
        }
    }

    fn header_len() -> usize {
        CODEC_HEADER.len() + 1
    }

    #[test]
    fn test_create_publishes_headers() {
        let store = MemoryFileStore::new();
        let writer = StoredFieldsWriter::create(&store, "_0", &IndexWriterConfig::default()).unwrap();
        assert_eq!(writer.segment(), "_0");
        assert_eq!(store.contents("_0.fdt").unwrap().len(), header_len());
        assert_eq!(store.contents("_0.fdm").unwrap().len(), header_len());
        assert!(StoredFieldsWriter::create(&store, "_0", &IndexWriterConfig::default()).is_err());
    }

    #[test]
    fn test_full_chunk_is_flushed() {
        let store = MemoryFileStore::new();
        let mut writer =
            StoredFieldsWriter::create(&store, "_0", &IndexWriterConfig::default()).unwrap();
        add_docs(&mut writer, 127);
        assert_eq!(writer.num_buffered_docs(), 127);
        assert!(writer.chunks().is_empty());
        assert_eq!(store.contents("_0.fdt").unwrap().len(), header_len());

        add_docs(&mut writer, 1);
        assert_eq!(writer.num_buffered_docs(), 0);
        assert_eq!(writer.chunks().len(), 1);
        assert_eq!(writer.chunks()[0].doc_count, 128);
        assert_eq!(writer.chunks()[0].start_pointer, header_len() as u64);

        add_docs(&mut writer, 1);
        assert_eq!(writer.num_buffered_docs(), 1);
        assert_eq!(writer.chunks().len(), 1);
        assert_eq!(writer.num_docs(), 129);
    }

    #[test]
    fn test_empty_flush_is_a_no_op() {
        let store = MemoryFileStore::new();
        let mut writer =
            StoredFieldsWriter::create(&store, "_0", &IndexWriterConfig::default()).unwrap();
        let before = store.contents("_0.fdt").unwrap();
        writer.flush_chunk().unwrap();
        writer.flush_chunk().unwrap();
        assert_eq!(store.contents("_0.fdt").unwrap(), before);
        assert!(writer.chunks().is_empty());
    }

    #[test]
    fn test_finish_writes_meta() {
        let store = MemoryFileStore::new();
        let config = IndexWriterConfig::default().with_max_docs_per_chunk(10);
        let mut writer = StoredFieldsWriter::create(&store, "_3", &config).unwrap();
        add_docs(&mut writer, 25);
        let stats = writer.finish().unwrap();
        assert_eq!(stats.num_docs, 25);
        assert_eq!(stats.num_chunks, 3);
        assert_eq!(stats.data_bytes, store.contents("_3.fdt").unwrap().len() as u64);

        let meta = StoredFieldsMeta::open(&store, "_3").unwrap();
        assert_eq!(meta.num_docs, 25);
        let counts = meta.chunks.iter().map(|c| c.doc_count).collect::<Vec<_>>();
        assert_eq!(counts, vec![10, 10, 5]);
        let bases = meta.chunks.iter().map(|c| c.doc_base).collect::<Vec<_>>();
        assert_eq!(bases, vec![0, 10, 20]);

        let mut reader = StoredFieldsReader::open(&store, "_3").unwrap();
        for info in &meta.chunks {
            let chunk = reader.next_chunk().unwrap().unwrap();
            assert_eq!(chunk.header.start_pointer, info.start_pointer);
            assert_eq!(chunk.header.doc_base, info.doc_base);
        }
        assert!(reader.next_chunk().unwrap().is_none());
        assert!(!reader.is_truncated());
        assert!(store.file_exists("_3.fdm"));
    }

    #[test]
    fn test_failed_chunk_commit_leaves_previous_chunks() {
        let store = MemoryFileStore::new();
        store.set_write_limit(Some(600));
        let config = IndexWriterConfig::default().with_max_docs_per_chunk(50);
        let mut writer = StoredFieldsWriter::create(&store, "_0", &config).unwrap();
        add_docs(&mut writer, 50);
        let published = store.contents("_0.fdt").unwrap();
        assert!(published.len() < 600);

        let mut result = Ok(());
        for i in 0..50 {
            writer
                .write_field(1, &StoredValueRef::String(&"x".repeat(20 + i)))
                .unwrap();
            result = writer.finish_document();
        }
        assert!(result.unwrap_err().is_io());
        assert_eq!(store.contents("_0.fdt").unwrap(), published);

        let mut reader = StoredFieldsReader::open(&store, "_0").unwrap();
        assert_eq!(reader.read_all().unwrap().len(), 50);
        assert!(!reader.is_truncated());
    }
}
