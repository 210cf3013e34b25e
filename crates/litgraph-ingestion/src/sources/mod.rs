//! Corpus readers.

pub mod bioc;

pub use bioc::{ExtractStats, RecordExtractor};
