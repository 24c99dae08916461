//! The two operator-facing flows: ingesting a template and generating a
//! document from it.

pub mod generate;
pub mod ingest;

pub use generate::{generate_document, GenerateOutcome};
pub use ingest::{ingest_template, IngestOutcome};
