//! Graph store collaborator used by the ingestion and export pipelines.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use litgraph_common::{FullTextRow, GraphStats, NodeUpsert, ReferenceRow, ReferenceUpsert};

use crate::error::Result;

/// Rows streamed back out of the store, ordered by ascending id.
pub type RowStream<'a, T> = BoxStream<'a, Result<T>>;

/// Document graph: nodes keyed by id, directed `REFERENCES` edges.
///
/// Every write is an idempotent merge: re-running a call with the same
/// payload leaves the store unchanged.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;

    /// Establish the uniqueness constraint on node ids. Safe to repeat.
    async fn ensure_constraints(&self) -> Result<()>;

    /// Merge nodes by id and overwrite `title`, `abstract` and `full_text`.
    async fn upsert_documents(&self, docs: &[NodeUpsert]) -> Result<()>;

    /// Merge `source -> target` edges, creating bare placeholder targets.
    /// Sources that do not exist produce no edges.
    async fn upsert_references(&self, refs: &[ReferenceUpsert]) -> Result<()>;

    /// Nodes carrying a `full_text`, ascending by id.
    async fn full_text_rows(&self) -> Result<RowStream<'_, FullTextRow>>;

    /// Every node with its outgoing reference targets, ascending by id.
    async fn reference_rows(&self) -> Result<RowStream<'_, ReferenceRow>>;

    /// Aggregate counts for the run summary.
    async fn statistics(&self) -> Result<GraphStats>;
}
