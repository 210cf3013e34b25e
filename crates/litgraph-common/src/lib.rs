//! litgraph-common: Data model shared by the extractor, the graph store
//! backends and the exporters.

pub mod models;

pub use models::{
    full_text, DocumentRecord, FullTextRow, GraphStats, NodeUpsert, ReferenceRow,
    ReferenceUpsert,
};
