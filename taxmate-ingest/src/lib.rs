//! taxmate-ingest: loading inbound statement documents and splitting them
//! into page ranges for extraction.

pub mod document;
pub mod partition;

pub use document::{count_pages, structural_page_estimate, Document, IngestError, PageCountSource};
pub use partition::{partition, DEFAULT_CHUNK_SIZE};
