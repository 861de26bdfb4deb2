use std::path::Path;

use anyhow::{Context, Result};
use piggy_index::stored_fields::{StoredFieldsMeta, StoredFieldsReader};
use piggy_io::{FileStore, LocalFsFileStore};
use serde::Serialize;

use crate::utils::format_size;

#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    pub segment: String,
    pub documents: u32,
    pub data_size: String,
    pub truncated: bool,
    pub chunks: Vec<ChunkSummary>,
}

#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub doc_base: u32,
    pub doc_count: u32,
    pub start_pointer: u64,
    pub payload_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<DocumentSummary>>,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub doc: u32,
    /// `(field number, value)` pairs, values rendered with their type suffix.
    pub fields: Vec<(u32, String)>,
}

pub fn run(verbose: u8, dir: String, segment: String) -> Result<()> {
    let info = inspect(Path::new(&dir), &segment, verbose > 0)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub fn inspect(dir: &Path, segment: &str, with_documents: bool) -> Result<SegmentInfo> {
    anyhow::ensure!(dir.is_dir(), "Not a directory: {}", dir.display());
    let store = LocalFsFileStore::new(dir)?;
    let meta = StoredFieldsMeta::open(&store, segment)
        .with_context(|| format!("Failed to read metadata of segment {segment}"))?;
    let mut reader = StoredFieldsReader::open(&store, segment)
        .with_context(|| format!("Failed to open data of segment {segment}"))?;

    let mut chunks = Vec::with_capacity(meta.chunks.len());
    while let Some(chunk) = reader.next_chunk()? {
        let documents = with_documents
            .then(|| {
                chunk.documents().map(|docs| {
                    docs.into_iter()
                        .map(|d| DocumentSummary {
                            doc: d.doc,
                            fields: d
                                .fields
                                .iter()
                                .map(|(number, value)| (*number, value.to_string()))
                                .collect(),
                        })
                        .collect::<Vec<_>>()
                })
            })
            .transpose()?;
        let header = &chunk.header;
        chunks.push(ChunkSummary {
            doc_base: header.doc_base,
            doc_count: header.doc_count,
            start_pointer: header.start_pointer,
            payload_size: chunk.payload.len() as u64,
            documents,
        });
    }

    if chunks.len() != meta.chunks.len() {
        tracing::warn!(
            data_chunks = chunks.len(),
            meta_chunks = meta.chunks.len(),
            "chunk count differs between data and metadata"
        );
    }
    let data_size = store.open_input(&format!("{segment}.fdt"))?.size();

    Ok(SegmentInfo {
        segment: segment.to_string(),
        documents: meta.num_docs,
        data_size: format_size(data_size),
        truncated: reader.is_truncated(),
        chunks,
    })
}
