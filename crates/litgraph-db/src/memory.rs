//! In-process graph store.
//!
//! Backs `memory://` URIs for dry runs and the pipeline tests. Semantics
//! mirror the database backends: merge by id, edges created once, rows
//! returned in ascending id order.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use litgraph_common::{FullTextRow, GraphStats, NodeUpsert, ReferenceRow, ReferenceUpsert};
use tokio::sync::RwLock;

use crate::error::{DbError, Result};
use crate::repository::{GraphStore, RowStream};

/// A node as held by the memory store. Placeholders only carry an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredNode {
    pub id: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub full_text: Option<String>,
}

impl StoredNode {
    fn placeholder(id: &str) -> Self {
        Self { id: id.to_string(), ..Default::default() }
    }

    pub fn is_placeholder(&self) -> bool {
        self.full_text.is_none()
    }
}

#[derive(Default)]
struct MemoryGraph {
    constrained: bool,
    nodes: BTreeMap<String, StoredNode>,
    /// Insertion order is the natural collection order of targets.
    edges: Vec<(String, String)>,
    edge_index: HashSet<(String, String)>,
}

impl MemoryGraph {
    fn check_ready(&self) -> Result<()> {
        if self.constrained {
            Ok(())
        } else {
            Err(DbError::NotInitialized)
        }
    }

    fn outgoing(&self) -> HashMap<&str, Vec<&str>> {
        let mut out: HashMap<&str, Vec<&str>> = HashMap::new();
        for (source, target) in &self.edges {
            out.entry(source.as_str()).or_default().push(target.as_str());
        }
        out
    }
}

/// Memory-backed [`GraphStore`].
#[derive(Default)]
pub struct MemoryGraphStore {
    graph: RwLock<MemoryGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node(&self, id: &str) -> Option<StoredNode> {
        self.graph.read().await.nodes.get(id).cloned()
    }

    pub async fn node_count(&self) -> usize {
        self.graph.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.graph.read().await.edges.len()
    }

    /// All edges in creation order.
    pub async fn edges(&self) -> Vec<(String, String)> {
        self.graph.read().await.edges.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_constraints(&self) -> Result<()> {
        self.graph.write().await.constrained = true;
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[NodeUpsert]) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph.check_ready()?;
        for doc in docs {
            let node = graph
                .nodes
                .entry(doc.id.clone())
                .or_insert_with(|| StoredNode::placeholder(&doc.id));
            node.title = Some(doc.title.clone());
            node.abstract_text = Some(doc.abstract_text.clone());
            node.full_text = Some(doc.full_text());
        }
        Ok(())
    }

    async fn upsert_references(&self, refs: &[ReferenceUpsert]) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph.check_ready()?;
        for item in refs {
            if !graph.nodes.contains_key(&item.source_id) {
                continue;
            }
            for (source, target) in item.pairs() {
                if !graph.nodes.contains_key(target) {
                    graph.nodes.insert(target.to_string(), StoredNode::placeholder(target));
                }
                let edge = (source.to_string(), target.to_string());
                if graph.edge_index.insert(edge.clone()) {
                    graph.edges.push(edge);
                }
            }
        }
        Ok(())
    }

    async fn full_text_rows(&self) -> Result<RowStream<'_, FullTextRow>> {
        let graph = self.graph.read().await;
        let rows: Vec<Result<FullTextRow>> = graph
            .nodes
            .values()
            .filter_map(|node| {
                node.full_text.as_ref().map(|text| {
                    Ok(FullTextRow { id: node.id.clone(), full_text: text.clone() })
                })
            })
            .collect();
        Ok(stream::iter(rows).boxed())
    }

    async fn reference_rows(&self) -> Result<RowStream<'_, ReferenceRow>> {
        let graph = self.graph.read().await;
        let outgoing = graph.outgoing();
        let rows: Vec<Result<ReferenceRow>> = graph
            .nodes
            .keys()
            .map(|id| {
                let targets = outgoing
                    .get(id.as_str())
                    .map(|t| t.iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default();
                Ok(ReferenceRow { id: id.clone(), targets })
            })
            .collect();
        Ok(stream::iter(rows).boxed())
    }

    async fn statistics(&self) -> Result<GraphStats> {
        let graph = self.graph.read().await;
        let outgoing = graph.outgoing();
        let total = graph.nodes.len() as u64;
        let with_abstract = graph
            .nodes
            .values()
            .filter(|n| n.abstract_text.as_deref().is_some_and(|a| !a.is_empty()))
            .count() as u64;
        let counts: Vec<u64> = graph
            .nodes
            .keys()
            .map(|id| outgoing.get(id.as_str()).map_or(0, |t| t.len() as u64))
            .collect();
        let avg = if counts.is_empty() {
            0.0
        } else {
            counts.iter().sum::<u64>() as f64 / counts.len() as f64
        };

        Ok(GraphStats {
            total_documents: total,
            documents_with_abstract: with_abstract,
            avg_references: avg,
            max_references: counts.into_iter().max().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn node(id: &str, title: &str, abstract_text: &str) -> NodeUpsert {
        NodeUpsert {
            id: id.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
        }
    }

    fn refs(source: &str, targets: &[&str]) -> ReferenceUpsert {
        ReferenceUpsert {
            source_id: source.to_string(),
            target_ids: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    async fn ready_store() -> MemoryGraphStore {
        let store = MemoryGraphStore::new();
        store.ensure_constraints().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_writes_require_constraints() {
        let store = MemoryGraphStore::new();
        let err = store.upsert_documents(&[node("1", "t", "a")]).await.unwrap_err();
        assert!(matches!(err, DbError::NotInitialized));
    }

    #[tokio::test]
    async fn test_constraint_setup_is_repeatable() {
        let store = ready_store().await;
        store.ensure_constraints().await.unwrap();
        store.upsert_documents(&[node("1", "t", "a")]).await.unwrap();
        assert_eq!(store.node_count().await, 1);
    }

    #[tokio::test]
    async fn test_node_upsert_is_idempotent() {
        let store = ready_store().await;
        let batch = vec![node("100", "A Study", "Results here.")];
        store.upsert_documents(&batch).await.unwrap();
        let first = store.node("100").await.unwrap();
        store.upsert_documents(&batch).await.unwrap();

        assert_eq!(store.node_count().await, 1);
        assert_eq!(store.node("100").await.unwrap(), first);
        assert_eq!(first.full_text.as_deref(), Some("A Study Results here."));
    }

    #[tokio::test]
    async fn test_upsert_fills_placeholder_without_duplicate() {
        let store = ready_store().await;
        store.upsert_documents(&[node("1", "Source", "")]).await.unwrap();
        store.upsert_references(&[refs("1", &["2"])]).await.unwrap();
        assert!(store.node("2").await.unwrap().is_placeholder());

        store.upsert_documents(&[node("2", "Late", "arrival")]).await.unwrap();
        let filled = store.node("2").await.unwrap();
        assert_eq!(filled.title.as_deref(), Some("Late"));
        assert_eq!(store.node_count().await, 2);
        assert_eq!(store.edge_count().await, 1);
    }

    #[tokio::test]
    async fn test_edges_are_created_once() {
        let store = ready_store().await;
        store.upsert_documents(&[node("1", "t", "a")]).await.unwrap();
        let batch = vec![refs("1", &["2", "3", "2"])];
        store.upsert_references(&batch).await.unwrap();
        store.upsert_references(&batch).await.unwrap();

        assert_eq!(
            store.edges().await,
            vec![("1".to_string(), "2".to_string()), ("1".to_string(), "3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_source_creates_nothing() {
        let store = ready_store().await;
        store.upsert_references(&[refs("ghost", &["2"])]).await.unwrap();
        assert_eq!(store.node_count().await, 0);
        assert_eq!(store.edge_count().await, 0);
    }

    #[tokio::test]
    async fn test_rows_are_ordered_by_id() {
        let store = ready_store().await;
        store
            .upsert_documents(&[node("b", "B", ""), node("a", "A", "")])
            .await
            .unwrap();
        store.upsert_references(&[refs("b", &["c", "a"])]).await.unwrap();

        let text: Vec<FullTextRow> = store.full_text_rows().await.unwrap().try_collect().await.unwrap();
        let ids: Vec<&str> = text.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let refs: Vec<ReferenceRow> = store.reference_rows().await.unwrap().try_collect().await.unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[1].id, "b");
        assert_eq!(refs[1].targets, vec!["c".to_string(), "a".to_string()]);
        assert!(refs[2].targets.is_empty());
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = ready_store().await;
        store
            .upsert_documents(&[node("1", "t", "abstract"), node("2", "t", "")])
            .await
            .unwrap();
        store.upsert_references(&[refs("1", &["2", "3", "4"])]).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_documents, 4);
        assert_eq!(stats.documents_with_abstract, 1);
        assert_eq!(stats.max_references, 3);
        assert!((stats.avg_references - 0.75).abs() < f64::EPSILON);
    }
}
