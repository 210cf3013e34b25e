//! PostgreSQL graph store.
//!
//! Nodes live in `documents`, edges in `document_references`. Merge
//! semantics come from `INSERT ... ON CONFLICT` on the primary keys; each
//! batch is one statement (nodes) or one transaction (edges).

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use deadpool_postgres::{Manager, Object, Pool};
use futures_util::{StreamExt, TryStreamExt};
use litgraph_common::{FullTextRow, GraphStats, NodeUpsert, ReferenceRow, ReferenceUpsert};
use secrecy::ExposeSecret;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info, instrument};

use crate::database::StoreConfig;
use crate::error::{DbError, Result};
use crate::repository::{GraphStore, RowStream};
use crate::schema::sql;

/// PostgreSQL-backed graph store over a connection pool.
pub struct PgGraphStore {
    pool: Pool,
}

/// Connection parameters from the URI. The configured user and password
/// only fill in what the URI leaves out.
fn pg_config(config: &StoreConfig) -> Result<tokio_postgres::Config> {
    let mut pg_config = tokio_postgres::Config::from_str(&config.uri)?;
    if pg_config.get_user().is_none() {
        pg_config.user(&config.user);
    }
    if pg_config.get_password().is_none() {
        pg_config.password(config.password.expose_secret());
    }
    Ok(pg_config)
}

/// Pool sized by `max_connections`. No connection is opened here.
fn build_pool(config: &StoreConfig) -> Result<Pool> {
    let manager = Manager::new(pg_config(config)?, NoTls);
    Pool::builder(manager)
        .max_size(config.max_connections)
        .build()
        .map_err(|e| DbError::Pool(e.to_string()))
}

impl PgGraphStore {
    #[instrument(skip(config), fields(uri = %config.uri, max_connections = config.max_connections))]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = build_pool(config)?;

        // Fail fast on bad credentials or an unreachable server.
        drop(pool.get().await?);
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }

    async fn count(&self, statement: &str) -> Result<u64> {
        let row = self.client().await?.query_one(statement, &[]).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn query_rows(&self, statement: &str) -> Result<tokio_postgres::RowStream> {
        let client = self.client().await?;
        Ok(client.query_raw(statement, std::iter::empty::<&str>()).await?)
    }
}

/// Collapse repeated ids inside one batch, keeping the last payload.
/// A single `ON CONFLICT DO UPDATE` may not touch the same row twice.
fn last_wins(docs: &[NodeUpsert]) -> Vec<&NodeUpsert> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(docs.len());
    let mut unique: Vec<&NodeUpsert> = Vec::with_capacity(docs.len());
    for doc in docs {
        match position.get(doc.id.as_str()) {
            Some(&i) => unique[i] = doc,
            None => {
                position.insert(doc.id.as_str(), unique.len());
                unique.push(doc);
            }
        }
    }
    unique
}

fn full_text_row(row: Row) -> Result<FullTextRow> {
    Ok(FullTextRow { id: row.try_get(0)?, full_text: row.try_get(1)? })
}

fn reference_row(row: Row) -> Result<ReferenceRow> {
    Ok(ReferenceRow { id: row.try_get(0)?, targets: row.try_get(1)? })
}

#[async_trait]
impl GraphStore for PgGraphStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_constraints(&self) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(sql::CREATE_DOCUMENTS).await?;
        client.batch_execute(sql::CREATE_REFERENCES).await?;
        info!("documents / document_references tables ensured");
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[NodeUpsert]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let unique = last_wins(docs);
        let ids: Vec<&str> = unique.iter().map(|d| d.id.as_str()).collect();
        let titles: Vec<&str> = unique.iter().map(|d| d.title.as_str()).collect();
        let abstracts: Vec<&str> = unique.iter().map(|d| d.abstract_text.as_str()).collect();

        let n = self
            .client()
            .await?
            .execute(sql::UPSERT_DOCUMENTS, &[&ids, &titles, &abstracts])
            .await?;
        debug!(n, "PostgreSQL document batch upserted");
        Ok(())
    }

    async fn upsert_references(&self, refs: &[ReferenceUpsert]) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let (sources, targets): (Vec<&str>, Vec<&str>) =
            refs.iter().flat_map(|r| r.pairs()).unzip();

        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        tx.execute(sql::INSERT_PLACEHOLDERS, &[&sources, &targets]).await?;
        let n = tx.execute(sql::INSERT_REFERENCES, &[&sources, &targets]).await?;
        tx.commit().await?;
        debug!(n, "PostgreSQL reference batch upserted");
        Ok(())
    }

    async fn full_text_rows(&self) -> Result<RowStream<'_, FullTextRow>> {
        let rows = self.query_rows(sql::FULL_TEXT_ROWS).await?;
        Ok(rows
            .map_err(DbError::from)
            .and_then(|row| async move { full_text_row(row) })
            .boxed())
    }

    async fn reference_rows(&self) -> Result<RowStream<'_, ReferenceRow>> {
        let rows = self.query_rows(sql::REFERENCE_ROWS).await?;
        Ok(rows
            .map_err(DbError::from)
            .and_then(|row| async move { reference_row(row) })
            .boxed())
    }

    async fn statistics(&self) -> Result<GraphStats> {
        let total = self.count(sql::COUNT_DOCUMENTS).await?;
        let with_abstract = self.count(sql::COUNT_WITH_ABSTRACT).await?;
        let row = self.client().await?.query_one(sql::REFERENCE_STATS, &[]).await?;
        let avg: Option<f64> = row.try_get(0)?;
        let max: Option<i64> = row.try_get(1)?;

        Ok(GraphStats {
            total_documents: total,
            documents_with_abstract: with_abstract,
            avg_references: avg.unwrap_or(0.0),
            max_references: max.unwrap_or(0).max(0) as u64,
        })
    }
}
