//! Ingests newline-delimited JSON into stored-field segments.

use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use piggy_index::{Document, DocumentsWriter, Field};
use piggy_io::LocalFsFileStore;
use serde::Serialize;
use serde_json::{Number, Value};

use crate::utils::{format_size, load_config, validate_file_exists};

const LINES_PER_BATCH: usize = 64;

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub documents: u64,
    pub segments: Vec<SegmentSummary>,
}

#[derive(Debug, Serialize)]
pub struct SegmentSummary {
    pub name: String,
    pub documents: u32,
    pub chunks: usize,
    pub data_size: String,
    pub meta_size: String,
}

pub fn run(config: Option<String>, files: Vec<String>, threads: usize, dir: String) -> Result<()> {
    let summary = ingest(config.as_deref(), &files, threads, Path::new(&dir))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn ingest(
    config: Option<&str>,
    files: &[String],
    threads: usize,
    dir: &Path,
) -> Result<IngestSummary> {
    anyhow::ensure!(threads > 0, "At least one ingesting thread is required");
    for file in files {
        validate_file_exists(file)?;
    }
    let config = load_config(config)?;
    let store = Arc::new(
        LocalFsFileStore::new(dir)
            .with_context(|| format!("Failed to open output directory: {}", dir.display()))?,
    );
    let writer = DocumentsWriter::new(store, config)?;

    let source = Mutex::new(LineSource::new(files.to_vec()));
    let failed = AtomicBool::new(false);
    let results = std::thread::scope(|s| {
        let handles = (0..threads)
            .map(|_| s.spawn(|| ingest_worker(&writer, &source, &failed)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("Ingesting thread panicked")))
            })
            .collect::<Vec<_>>()
    });
    let closed = writer.close();
    results.into_iter().collect::<Result<Vec<()>>>()?;
    let segments = closed?;

    tracing::info!(
        documents = writer.num_docs_added(),
        segments = segments.len(),
        "ingest complete"
    );
    Ok(IngestSummary {
        documents: writer.num_docs_added(),
        segments: segments
            .iter()
            .map(|s| SegmentSummary {
                name: s.segment().to_string(),
                documents: s.num_docs(),
                chunks: s.stats.num_chunks,
                data_size: format_size(s.stats.data_bytes),
                meta_size: format_size(s.stats.meta_bytes),
            })
            .collect(),
    })
}

fn ingest_worker(
    writer: &DocumentsWriter,
    source: &Mutex<LineSource>,
    failed: &AtomicBool,
) -> Result<()> {
    let result = (|| {
        while !failed.load(Ordering::Relaxed) {
            let batch = source.lock().next_batch(LINES_PER_BATCH)?;
            if batch.is_empty() {
                break;
            }
            let docs = batch
                .iter()
                .map(|line| {
                    let value: Value = serde_json::from_str(&line.text)
                        .with_context(|| format!("{}:{}: invalid JSON", line.file, line.number))?;
                    json_to_document(&value)
                        .with_context(|| format!("{}:{}", line.file, line.number))
                })
                .collect::<Result<Vec<_>>>()?;
            writer.add_documents(&docs)?;
        }
        Ok(())
    })();
    if result.is_err() {
        failed.store(true, Ordering::Relaxed);
    }
    result
}

struct SourceLine {
    file: String,
    number: usize,
    text: String,
}

/// Non-empty lines of several files, read in order.
struct LineSource {
    pending: std::vec::IntoIter<String>,
    current: Option<(String, Lines<BufReader<File>>)>,
    line_number: usize,
}

impl LineSource {
    fn new(files: Vec<String>) -> LineSource {
        LineSource {
            pending: files.into_iter(),
            current: None,
            line_number: 0,
        }
    }

    fn next_batch(&mut self, max_lines: usize) -> Result<Vec<SourceLine>> {
        let mut batch = Vec::with_capacity(max_lines);
        while batch.len() < max_lines {
            let Some((name, lines)) = &mut self.current else {
                let Some(name) = self.pending.next() else {
                    break;
                };
                let file =
                    File::open(&name).with_context(|| format!("Failed to open file: {name}"))?;
                self.current = Some((name, BufReader::new(file).lines()));
                self.line_number = 0;
                continue;
            };
            match lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    let text = line.with_context(|| format!("Failed to read file: {name}"))?;
                    if !text.trim().is_empty() {
                        batch.push(SourceLine {
                            file: name.clone(),
                            number: self.line_number,
                            text,
                        });
                    }
                }
                None => self.current = None,
            }
        }
        Ok(batch)
    }
}

/// Converts one JSON object into a document.
///
/// Integers become 32-bit values when they fit and 64-bit values otherwise. Booleans
/// become 0 or 1. Nested arrays and objects are stored as their JSON text. Nulls are
/// skipped.
pub fn json_to_document(value: &Value) -> Result<Document> {
    let Value::Object(map) = value else {
        anyhow::bail!("Expected a JSON object, found: {value}");
    };
    let mut doc = Document::new();
    for (name, value) in map {
        let field = match value {
            Value::Null => continue,
            Value::Bool(b) => Field::numeric(name.as_str(), i32::from(*b)),
            Value::String(s) => Field::text(name.as_str(), s.as_str()),
            Value::Number(n) => number_field(name, n),
            Value::Array(_) | Value::Object(_) => Field::text(name.as_str(), value.to_string()),
        };
        doc.add(field);
    }
    Ok(doc)
}

fn number_field(name: &str, n: &Number) -> Field {
    match (n.as_i64(), n.as_f64()) {
        (Some(v), _) => match i32::try_from(v) {
            Ok(v) => Field::numeric(name, v),
            Err(_) => Field::numeric(name, v),
        },
        (None, Some(v)) => Field::numeric(name, v),
        (None, None) => Field::text(name, n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use piggy_index::{FieldValue, IndexableField, NumericValue};
    use serde_json::json;

    use super::{ingest, json_to_document};

    fn value_of(doc: &piggy_index::Document, name: &str) -> Option<FieldValue> {
        doc.fields()
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.value().clone())
    }

    #[test]
    fn test_json_to_document() {
        let doc = json_to_document(&json!({
            "s": "text",
            "small": 7,
            "big": 1i64 << 40,
            "huge": u64::MAX,
            "f": 1.5,
            "yes": true,
            "no": false,
            "arr": [1, "a"],
            "obj": {"k": null},
            "nothing": null,
        }))
        .unwrap();
        assert_eq!(doc.len(), 9);
        assert_eq!(value_of(&doc, "s"), Some(FieldValue::Text("text".into())));
        assert_eq!(
            value_of(&doc, "small"),
            Some(FieldValue::Numeric(NumericValue::Int(7)))
        );
        assert_eq!(
            value_of(&doc, "big"),
            Some(FieldValue::Numeric(NumericValue::Long(1 << 40)))
        );
        assert_eq!(
            value_of(&doc, "huge"),
            Some(FieldValue::Numeric(NumericValue::Double(u64::MAX as f64)))
        );
        assert_eq!(
            value_of(&doc, "f"),
            Some(FieldValue::Numeric(NumericValue::Double(1.5)))
        );
        assert_eq!(
            value_of(&doc, "yes"),
            Some(FieldValue::Numeric(NumericValue::Int(1)))
        );
        assert_eq!(
            value_of(&doc, "no"),
            Some(FieldValue::Numeric(NumericValue::Int(0)))
        );
        assert_eq!(
            value_of(&doc, "arr"),
            Some(FieldValue::Text(r#"[1,"a"]"#.into()))
        );
        assert_eq!(
            value_of(&doc, "obj"),
            Some(FieldValue::Text(r#"{"k":null}"#.into()))
        );
        assert_eq!(value_of(&doc, "nothing"), None);
        assert!(doc.fields().iter().all(|f| f.stored()));

        assert!(json_to_document(&json!([1, 2])).is_err());
        assert!(json_to_document(&json!("x")).is_err());
    }

    #[test]
    fn test_ingest_generated_file() {
        let file = piggy_testkit::data_gen::generate_ndjson(1000, 3).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let summary = ingest(None, &[path], 4, dir.path()).unwrap();
        assert_eq!(summary.documents, 1000);
        assert!(!summary.segments.is_empty() && summary.segments.len() <= 4);
        assert_eq!(
            summary.segments.iter().map(|s| s.documents).sum::<u32>(),
            1000
        );
        for segment in &summary.segments {
            assert!(dir.path().join(format!("{}.fdt", segment.name)).is_file());
            assert!(dir.path().join(format!("{}.fdm", segment.name)).is_file());
        }
    }

    #[test]
    fn test_ingest_reports_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"a": 1}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "[1, 2]").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = ingest(None, &[path.clone()], 1, dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(&format!("{path}:3")));
        assert!(ingest(None, &[path], 0, dir.path()).is_err());
    }
}
