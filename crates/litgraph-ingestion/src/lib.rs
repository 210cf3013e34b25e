//! litgraph-ingestion: BioC XML to citation graph.
//! - Streaming BioC record extraction
//! - Fixed-size batching
//! - Two-pass ingestion (nodes, then spooled references)
//! - Flat-file export of full text and references

pub mod batch;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod sources;
pub mod spool;

pub use batch::{BatchIterator, Batched, DEFAULT_BATCH_SIZE};
pub use error::{IngestError, Result};
pub use export::{
    export_full_text, export_references, export_to_files, full_text_line, parse_full_text_line,
    parse_reference_line, reference_line, ExportJob, ExportResult,
};
pub use pipeline::{ingest_file, run_ingestion, IngestionJob, IngestionProgress, IngestionResult};
pub use sources::{ExtractStats, RecordExtractor};
