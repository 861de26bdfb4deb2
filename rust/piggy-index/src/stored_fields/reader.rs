use piggy_common::{Result, error::Error, verify_data};
use piggy_io::{
    ByteSource, FileStore, InputChannel,
    codec::{read_string, read_vint, read_vlong},
};

use crate::segment::{DATA_EXTENSION, META_EXTENSION, segment_file_name};

use super::{CODEC_FOOTER, CODEC_HEADER, StoredValue, split_tag, writer::ChunkInfo};

fn check_header(input: &mut dyn InputChannel, name: &str) -> Result<()> {
    let header = read_string(input)?;
    if header != CODEC_HEADER {
        return Err(Error::encoding(
            name,
            format!("unexpected header {header:?}"),
        ));
    }
    Ok(())
}

/// Header of one chunk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub doc_base: u32,
    pub doc_count: u32,
    pub field_counts: Vec<u32>,
    pub lengths: Vec<u32>,
    /// Offset of the record in the data file.
    pub start_pointer: u64,
}

impl ChunkHeader {
    pub fn payload_len(&self) -> u64 {
        self.lengths.iter().map(|&len| len as u64).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Segment-local document number.
    pub doc: u32,
    pub fields: Vec<(u32, StoredValue)>,
}

/// A chunk record read back from a data file.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn documents(&self) -> Result<Vec<StoredDocument>> {
        let mut source = &self.payload[..];
        let mut docs = Vec::with_capacity(self.header.field_counts.len());
        for (i, (&field_count, &len)) in self
            .header
            .field_counts
            .iter()
            .zip(&self.header.lengths)
            .enumerate()
        {
            verify_data!(len, len as usize <= source.len());
            let (mut doc_bytes, rest) = source.split_at(len as usize);
            source = rest;
            // Every field takes at least a tag byte and a value byte.
            let mut fields = Vec::with_capacity((field_count as usize).min(doc_bytes.len() / 2));
            for _ in 0..field_count {
                let (number, field_type) = split_tag(read_vlong(&mut doc_bytes)?)?;
                fields.push((number, StoredValue::read_from(&mut doc_bytes, field_type)?));
            }
            verify_data!(doc_bytes, doc_bytes.is_empty());
            let Some(doc) = self.header.doc_base.checked_add(i as u32) else {
                return Err(Error::encoding(
                    "doc_base",
                    format!(
                        "document {i} of the chunk at doc base {} overflows",
                        self.header.doc_base
                    ),
                ));
            };
            docs.push(StoredDocument { doc, fields });
        }
        Ok(docs)
    }
}

/// Sequential reader of a stored-fields data file.
///
/// Reading stops cleanly at a torn tail: a chunk whose header cannot be read in full,
/// or whose declared document lengths run past the end of the file, ends the
/// iteration and marks the reader as truncated.
pub struct StoredFieldsReader {
    input: Box<dyn InputChannel>,
    truncated: bool,
}

impl StoredFieldsReader {
    pub fn open(store: &dyn FileStore, segment: &str) -> Result<StoredFieldsReader> {
        let name = segment_file_name(segment, DATA_EXTENSION);
        let input = store.open_input(&name)?;
        StoredFieldsReader::from_input(input, &name)
    }

    pub fn from_input(mut input: Box<dyn InputChannel>, name: &str) -> Result<StoredFieldsReader> {
        check_header(input.as_mut(), name)?;
        Ok(StoredFieldsReader {
            input,
            truncated: false,
        })
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.truncated || !self.input.has_remaining() {
            return Ok(None);
        }
        let start_pointer = self.input.position();
        let header = match self.read_chunk_header(start_pointer) {
            Ok(header) => header,
            Err(e) if e.io_kind() == Some(std::io::ErrorKind::UnexpectedEof) => {
                return Ok(self.torn_tail(start_pointer));
            }
            Err(e) => return Err(e),
        };
        let payload_len = header.payload_len();
        if payload_len > self.input.remaining() {
            return Ok(self.torn_tail(start_pointer));
        }
        let mut payload = vec![0u8; payload_len as usize];
        self.input.read_bytes(&mut payload)?;
        Ok(Some(Chunk { header, payload }))
    }

    /// Decodes every document of every complete chunk.
    pub fn read_all(&mut self) -> Result<Vec<StoredDocument>> {
        let mut docs = Vec::new();
        while let Some(chunk) = self.next_chunk()? {
            docs.extend(chunk.documents()?);
        }
        Ok(docs)
    }

    fn read_chunk_header(&mut self, start_pointer: u64) -> Result<ChunkHeader> {
        let input = self.input.as_mut();
        let doc_base = read_vint(input)?;
        let doc_count = read_vint(input)?;
        verify_data!(
            doc_count,
            doc_base.checked_add(doc_count).is_some(),
            "chunk of {doc_count} documents at doc base {doc_base} overflows"
        );
        // Each entry takes at least one byte.
        if 2 * doc_count as u64 > input.remaining() {
            return Err(Error::unexpected_eof("chunk header"));
        }
        let field_counts = (0..doc_count)
            .map(|_| read_vint(input))
            .collect::<Result<Vec<_>>>()?;
        let lengths = (0..doc_count)
            .map(|_| read_vint(input))
            .collect::<Result<Vec<_>>>()?;
        Ok(ChunkHeader {
            doc_base,
            doc_count,
            field_counts,
            lengths,
            start_pointer,
        })
    }

    fn torn_tail(&mut self, start_pointer: u64) -> Option<Chunk> {
        tracing::warn!(
            offset = start_pointer,
            size = self.input.size(),
            "stored-fields data ends with an incomplete chunk"
        );
        self.truncated = true;
        None
    }
}

/// Parsed stored-fields metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFieldsMeta {
    pub chunks: Vec<ChunkInfo>,
    pub num_docs: u32,
}

impl StoredFieldsMeta {
    pub fn open(store: &dyn FileStore, segment: &str) -> Result<StoredFieldsMeta> {
        let name = segment_file_name(segment, META_EXTENSION);
        let mut input = store.open_input(&name)?;
        StoredFieldsMeta::read(input.as_mut(), &name)
    }

    pub fn read(input: &mut dyn InputChannel, name: &str) -> Result<StoredFieldsMeta> {
        check_header(input, name)?;
        let num_chunks = read_vint(input)?;
        let mut chunks = Vec::new();
        for _ in 0..num_chunks {
            chunks.push(ChunkInfo {
                doc_base: read_vint(input)?,
                doc_count: read_vint(input)?,
                start_pointer: read_vlong(input)?,
            });
        }
        let num_docs = read_vint(input)?;
        let footer = read_string(input)?;
        if footer != CODEC_FOOTER {
            return Err(Error::encoding(
                name,
                format!("unexpected trailer {footer:?}"),
            ));
        }
        let total = chunks
            .iter()
            .try_fold(0u32, |total, c| total.checked_add(c.doc_count));
        verify_data!(
            num_docs,
            total == Some(num_docs),
            "chunk document counts do not add up to {num_docs}"
        );
        Ok(StoredFieldsMeta { chunks, num_docs })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use piggy_common::error::ErrorKind;
    use piggy_io::{
        ChannelReader, MemoryFileStore,
        codec::{write_string, write_vint, write_vlong},
    };

    use crate::{
        config::IndexWriterConfig,
        stored_fields::{CODEC_FOOTER, CODEC_HEADER, StoredValue, StoredValueRef, StoredFieldsWriter},
    };

    use super::{Chunk, ChunkHeader, StoredFieldsMeta, StoredFieldsReader};

    fn is_encoding(err: piggy_common::error::Error) -> bool {
        matches!(err.into_kind(), ErrorKind::Encoding { .. })
    }

    fn write_segment(store: &MemoryFileStore, docs: u32, per_chunk: usize) {
        let config = IndexWriterConfig::default().with_max_docs_per_chunk(per_chunk);
        let mut writer = StoredFieldsWriter::create(store, "_0", &config).unwrap();
        for i in 0..docs {
            writer
                .write_field(1, &StoredValueRef::String(&format!("doc {i}")))
                .unwrap();
            writer.write_field(2, &StoredValueRef::Long(i as i64 * 1000)).unwrap();
            writer.finish_document().unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_read_all() {
        let store = MemoryFileStore::new();
        write_segment(&store, 30, 8);
        let mut reader = StoredFieldsReader::open(&store, "_0").unwrap();
        let docs = reader.read_all().unwrap();
        assert_eq!(docs.len(), 30);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(doc.doc, i as u32);
            assert_eq!(
                doc.fields,
                vec![
                    (1, StoredValue::String(format!("doc {i}"))),
                    (2, StoredValue::Long(i as i64 * 1000)),
                ]
            );
        }
    }

    #[test]
    fn test_torn_tail_stops_cleanly() {
        let store = MemoryFileStore::new();
        write_segment(&store, 20, 8);
        let data = store.contents("_0.fdt").unwrap();

        for cut in [data.len() - 1, data.len() - 30, data.len() - 60] {
            let input = ChannelReader::from_bytes(std::sync::Arc::new(data[..cut].to_vec()));
            let mut reader = StoredFieldsReader::from_input(Box::new(input), "_0.fdt").unwrap();
            let docs = reader.read_all().unwrap();
            assert!(reader.is_truncated());
            assert!(docs.len() == 16 || docs.len() == 8);
            assert!(reader.next_chunk().unwrap().is_none());
        }
    }

    #[test]
    fn test_bad_header() {
        let input = ChannelReader::from_bytes(std::sync::Arc::new(b"\x03abc".to_vec()));
        assert!(StoredFieldsReader::from_input(Box::new(input), "x.fdt").is_err());
    }

    #[test]
    fn test_chunk_past_the_last_document_number() {
        let mut data = Vec::new();
        write_string(&mut data, CODEC_HEADER).unwrap();
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 2, 0, 0, 0, 0]);
        let input = ChannelReader::from_bytes(Arc::new(data));
        let mut reader = StoredFieldsReader::from_input(Box::new(input), "_0.fdt").unwrap();
        assert!(is_encoding(reader.read_all().unwrap_err()));
        assert!(!reader.is_truncated());

        let chunk = Chunk {
            header: ChunkHeader {
                doc_base: u32::MAX,
                doc_count: 2,
                field_counts: vec![0, 0],
                lengths: vec![0, 0],
                start_pointer: 12,
            },
            payload: Vec::new(),
        };
        assert!(is_encoding(chunk.documents().unwrap_err()));
    }

    #[test]
    fn test_field_count_larger_than_document() {
        // One string field, then nothing for the remaining declared fields.
        let chunk = Chunk {
            header: ChunkHeader {
                doc_base: 0,
                doc_count: 1,
                field_counts: vec![u32::MAX],
                lengths: vec![2],
                start_pointer: 12,
            },
            payload: vec![8, 0],
        };
        let err = chunk.documents().unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_meta_doc_counts_must_add_up() {
        let meta = |counts: &[u32], num_docs: u32| {
            let mut data = Vec::new();
            write_string(&mut data, CODEC_HEADER).unwrap();
            write_vint(&mut data, counts.len() as u32).unwrap();
            let mut doc_base = 0u32;
            for &count in counts {
                write_vint(&mut data, doc_base).unwrap();
                write_vint(&mut data, count).unwrap();
                write_vlong(&mut data, 12).unwrap();
                doc_base = doc_base.wrapping_add(count);
            }
            write_vint(&mut data, num_docs).unwrap();
            write_string(&mut data, CODEC_FOOTER).unwrap();
            let mut input = ChannelReader::from_bytes(Arc::new(data));
            StoredFieldsMeta::read(&mut input, "_0.fdm")
        };

        let ok = meta(&[128, 5], 133).unwrap();
        assert_eq!(ok.num_docs, 133);
        assert_eq!(ok.chunks.len(), 2);
        assert!(is_encoding(meta(&[128, 5], 132).unwrap_err()));
        assert!(is_encoding(meta(&[u32::MAX, 2], 1).unwrap_err()));
    }
}
