//! Stored-field write path of the piggy document store.
//!
//! Documents enter through [`documents_writer::DocumentsWriter`], which leases a
//! [`per_thread_writer::PerThreadWriter`] from the [`writer_pool::WriterPool`] via
//! [`flush_control::FlushControl`]. Each writer encodes stored fields into chunks
//! ([`stored_fields`]) and publishes complete chunks to its segment's data file.

pub mod config;
pub mod delete_queue;
pub mod document;
pub mod documents_writer;
pub mod field_infos;
pub mod flush_control;
pub mod per_thread_writer;
pub mod segment;
pub mod stored_fields;
pub mod writer_pool;

pub use config::IndexWriterConfig;
pub use document::{Document, Field, FieldValue, IndexableField, NumericValue};
pub use documents_writer::DocumentsWriter;
