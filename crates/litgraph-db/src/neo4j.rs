//! Neo4j graph store over the Bolt protocol.
//!
//! Batches are sent as a single `UNWIND` statement each, with `MERGE`
//! providing the merge-on-key semantics.

use async_trait::async_trait;
use futures_util::stream::{StreamExt, TryStream, TryStreamExt};
use litgraph_common::{FullTextRow, GraphStats, NodeUpsert, ReferenceRow, ReferenceUpsert};
use neo4rs::{query, BoltMap, BoltString, BoltType, ConfigBuilder, Graph, Row};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::database::StoreConfig;
use crate::error::{DbError, Result};
use crate::repository::{GraphStore, RowStream};
use crate::schema::cypher;

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    #[instrument(skip(config), fields(uri = %config.uri, user = %config.user))]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.expose_secret())
            .max_connections(config.max_connections)
            .build()?;
        let graph = Graph::connect(neo_config).await?;
        info!("Connected to Neo4j");
        Ok(Self { graph })
    }

    async fn single_row(&self, cypher: &str) -> Result<Row> {
        let mut rows = self.graph.execute(query(cypher)).await?;
        rows.next()
            .await?
            .ok_or_else(|| DbError::Decode(format!("no row returned for: {}", cypher.trim())))
    }

    fn rows<S, T, F>(rows: S, decode: F) -> RowStream<'static, T>
    where
        S: TryStream<Ok = Row, Error = neo4rs::Error> + Send + 'static,
        T: Send + 'static,
        F: Fn(&Row) -> Result<T> + Send + Sync + Copy + 'static,
    {
        rows.map_err(DbError::from)
            .and_then(move |row| async move { decode(&row) })
            .boxed()
    }
}

fn doc_param(doc: &NodeUpsert) -> BoltType {
    let mut map = BoltMap::new();
    map.put(BoltString::from("pmid"), BoltType::from(doc.id.clone()));
    map.put(BoltString::from("title"), BoltType::from(doc.title.clone()));
    map.put(BoltString::from("abstract"), BoltType::from(doc.abstract_text.clone()));
    BoltType::Map(map)
}

fn refs_param(item: &ReferenceUpsert) -> BoltType {
    let mut map = BoltMap::new();
    map.put(BoltString::from("pmid"), BoltType::from(item.source_id.clone()));
    map.put(BoltString::from("refs"), BoltType::from(item.target_ids.clone()));
    BoltType::Map(map)
}

fn get<'r, T: Deserialize<'r>>(row: &'r Row, key: &str) -> Result<T> {
    row.get::<T>(key)
        .map_err(|e| DbError::Decode(format!("column {key}: {e}")))
}

fn full_text_row(row: &Row) -> Result<FullTextRow> {
    Ok(FullTextRow { id: get(row, "pmid")?, full_text: get(row, "text")? })
}

fn reference_row(row: &Row) -> Result<ReferenceRow> {
    Ok(ReferenceRow { id: get(row, "pmid")?, targets: get(row, "refs")? })
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn ensure_constraints(&self) -> Result<()> {
        self.graph.run(query(cypher::CREATE_CONSTRAINT)).await?;
        info!("Uniqueness constraint on Document.pmid ensured");
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[NodeUpsert]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let params: Vec<BoltType> = docs.iter().map(doc_param).collect();
        self.graph
            .run(query(cypher::UPSERT_DOCUMENTS).param("docs", params))
            .await?;
        debug!(n = docs.len(), "Neo4j document batch merged");
        Ok(())
    }

    async fn upsert_references(&self, refs: &[ReferenceUpsert]) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let params: Vec<BoltType> = refs.iter().map(refs_param).collect();
        self.graph
            .run(query(cypher::UPSERT_REFERENCES).param("data", params))
            .await?;
        debug!(n = refs.len(), "Neo4j reference batch merged");
        Ok(())
    }

    async fn full_text_rows(&self) -> Result<RowStream<'_, FullTextRow>> {
        let rows = self.graph.execute(query(cypher::FULL_TEXT_ROWS)).await?;
        Ok(Self::rows(rows.into_stream(), full_text_row))
    }

    async fn reference_rows(&self) -> Result<RowStream<'_, ReferenceRow>> {
        let rows = self.graph.execute(query(cypher::REFERENCE_ROWS)).await?;
        Ok(Self::rows(rows.into_stream(), reference_row))
    }

    async fn statistics(&self) -> Result<GraphStats> {
        let total: i64 = get(&self.single_row(cypher::COUNT_DOCUMENTS).await?, "count")?;
        let with_abstract: i64 =
            get(&self.single_row(cypher::COUNT_WITH_ABSTRACT).await?, "count")?;
        let refs = self.single_row(cypher::REFERENCE_STATS).await?;
        let avg: Option<f64> = get(&refs, "avg_refs")?;
        let max: Option<i64> = get(&refs, "max_refs")?;

        Ok(GraphStats {
            total_documents: total.max(0) as u64,
            documents_with_abstract: with_abstract.max(0) as u64,
            avg_references: avg.unwrap_or(0.0),
            max_references: max.unwrap_or(0).max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_empty_result_decodes_to_empty_stream() {
        let rows = stream::empty::<std::result::Result<Row, neo4rs::Error>>();
        let decoded: Vec<FullTextRow> =
            Neo4jGraphStore::rows(rows, full_text_row).try_collect().await.unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_reference_param_carries_source_and_targets() {
        let item = ReferenceUpsert {
            source_id: "100".to_string(),
            target_ids: vec!["200".to_string(), "300".to_string()],
        };
        let BoltType::Map(map) = refs_param(&item) else {
            panic!("expected a map parameter");
        };
        assert_eq!(map.value.len(), 2);
        assert!(map.value.contains_key(&BoltString::from("pmid")));
        assert!(map.value.contains_key(&BoltString::from("refs")));
    }
}
