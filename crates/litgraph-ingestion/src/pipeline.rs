//! Two-pass graph ingestion pipeline.
//!
//! Orchestrates one run:
//!   1. Ensure the uniqueness constraint on document ids
//!   2. Stream BioC XML on a blocking worker, assembling record batches
//!      and spooling reference payloads to disk
//!   3. Upsert every node batch as it arrives (bounded channel, so
//!      extraction overlaps with store round trips)
//!   4. Once the extractor finished cleanly and every node batch is
//!      acknowledged, replay the spool as batched edge upserts
//!   5. Emit progress events via broadcast channel
//!
//! Every store call is an idempotent merge, so a failed run can be
//! repeated from scratch.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use litgraph_common::{DocumentRecord, NodeUpsert};
use litgraph_db::GraphStore;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::batch::{Batched, DEFAULT_BATCH_SIZE};
use crate::error::{IngestError, Result};
use crate::sources::bioc::{ExtractStats, RecordExtractor};
use crate::spool::ReferenceSpool;

// ── Job config ────────────────────────────────────────────────────────────────

/// Tuning knobs for a single ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    /// Records per node batch and citing records per edge batch.
    pub batch_size: usize,
    /// Node batches allowed in flight between extractor and writer.
    pub channel_capacity: usize,
    /// Read buffer for the XML file.
    pub read_buffer_bytes: usize,
}

impl Default for IngestionJob {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: 4,
            read_buffer_bytes: 1 << 20,
        }
    }
}

impl IngestionJob {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch_size must be at least 1".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(IngestError::Config("channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted during a pipeline run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct IngestionProgress {
    pub job_id: Uuid,
    pub stage: String,
    pub message: String,
    pub records_extracted: u64,
    pub node_batches: u64,
    pub edge_batches: u64,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionResult {
    pub job_id: Uuid,
    pub documents_seen: u64,
    pub records_extracted: u64,
    pub documents_without_id: u64,
    pub node_batches: u64,
    pub nodes_upserted: u64,
    pub reference_sources: u64,
    pub references_requested: u64,
    pub edge_batches: u64,
    pub duration_ms: u64,
}

impl IngestionResult {
    fn progress(&self, stage: &str, message: String) -> IngestionProgress {
        IngestionProgress {
            job_id: self.job_id,
            stage: stage.to_string(),
            message,
            records_extracted: self.records_extracted,
            node_batches: self.node_batches,
            edge_batches: self.edge_batches,
        }
    }
}

fn emit(progress_tx: &Option<broadcast::Sender<IngestionProgress>>, progress: IngestionProgress) {
    if let Some(tx) = progress_tx {
        let _ = tx.send(progress);
    }
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

/// Ingest a BioC XML file.
#[instrument(skip(store, job, progress_tx), fields(backend = store.backend()))]
pub async fn ingest_file(
    path: &Path,
    store: &dyn GraphStore,
    job: &IngestionJob,
    progress_tx: Option<broadcast::Sender<IngestionProgress>>,
) -> Result<IngestionResult> {
    job.validate()?;
    let file = File::open(path)?;
    info!(path = %path.display(), "Reading BioC XML");
    let reader = BufReader::with_capacity(job.read_buffer_bytes.max(8 * 1024), file);
    run_ingestion(reader, store, job, progress_tx).await
}

/// Runs both ingestion passes over any buffered XML source.
///
/// Fails on the first structural XML error or store error. Node batches
/// written before a failure stay in the store; edges are only written
/// after the whole stream was read without error.
pub async fn run_ingestion<R>(
    reader: R,
    store: &dyn GraphStore,
    job: &IngestionJob,
    progress_tx: Option<broadcast::Sender<IngestionProgress>>,
) -> Result<IngestionResult>
where
    R: BufRead + Send + 'static,
{
    job.validate()?;
    let t0 = Instant::now();
    let mut result = IngestionResult { job_id: Uuid::new_v4(), ..Default::default() };
    info!(job_id = %result.job_id, batch_size = job.batch_size, "Starting ingestion pipeline");

    // ── 1. Constraint ─────────────────────────────────────────────────────────
    store.ensure_constraints().await?;
    emit(
        &progress_tx,
        result.progress("constraints", "Uniqueness constraint ready".to_string()),
    );

    // ── 2. Extraction worker ──────────────────────────────────────────────────
    let (tx, mut rx) = mpsc::channel::<Vec<DocumentRecord>>(job.channel_capacity);
    let batch_size = job.batch_size;
    let extractor = tokio::task::spawn_blocking(move || -> Result<(ExtractStats, ReferenceSpool)> {
        let mut spool = ReferenceSpool::new()?;
        let mut batches = RecordExtractor::new(reader).batched(batch_size);
        for batch in batches.by_ref() {
            let batch = batch?;
            spool.append_batch(&batch)?;
            if tx.blocking_send(batch).is_err() {
                return Err(IngestError::Pipeline("node writer stopped".to_string()));
            }
        }
        Ok((batches.get_ref().stats(), spool))
    });

    // ── 3. Node pass ──────────────────────────────────────────────────────────
    while let Some(batch) = rx.recv().await {
        let nodes: Vec<NodeUpsert> = batch.iter().map(DocumentRecord::to_node).collect();
        store.upsert_documents(&nodes).await?;

        result.node_batches += 1;
        result.nodes_upserted += nodes.len() as u64;
        result.records_extracted += batch.len() as u64;
        debug!(batch = result.node_batches, n = nodes.len(), "Node batch upserted");
        emit(
            &progress_tx,
            result.progress("nodes", format!("{} documents loaded", result.nodes_upserted)),
        );
    }

    let (stats, spool) = extractor
        .await
        .map_err(|e| IngestError::Pipeline(format!("extraction worker failed: {e}")))??;
    result.documents_seen = stats.documents_seen;
    result.documents_without_id = stats.documents_without_id;
    result.reference_sources = spool.sources();
    result.references_requested = spool.pairs();
    info!(
        documents = stats.documents_seen,
        records = stats.records_emitted,
        without_id = stats.documents_without_id,
        node_batches = result.node_batches,
        "Node pass complete"
    );

    // ── 4. Edge pass ──────────────────────────────────────────────────────────
    emit(
        &progress_tx,
        result.progress(
            "edges",
            format!("Creating references for {} documents", result.reference_sources),
        ),
    );
    for batch in spool.into_reader()?.batched(job.batch_size) {
        let batch = batch?;
        store.upsert_references(&batch).await?;
        result.edge_batches += 1;
        debug!(batch = result.edge_batches, n = batch.len(), "Reference batch upserted");
        emit(
            &progress_tx,
            result.progress("edges", format!("Reference batch {} written", result.edge_batches)),
        );
    }

    result.duration_ms = t0.elapsed().as_millis() as u64;

    info!(
        job_id        = %result.job_id,
        documents     = result.documents_seen,
        records       = result.records_extracted,
        without_id    = result.documents_without_id,
        ref_sources   = result.reference_sources,
        references    = result.references_requested,
        node_batches  = result.node_batches,
        edge_batches  = result.edge_batches,
        duration_ms   = result.duration_ms,
        "Ingestion pipeline complete"
    );
    emit(
        &progress_tx,
        result.progress(
            "complete",
            format!(
                "Done. {} documents, {} reference pairs, {} documents without identifier skipped.",
                result.records_extracted, result.references_requested, result.documents_without_id
            ),
        ),
    );

    Ok(result)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_job() {
        let job = IngestionJob::default();
        assert_eq!(job.batch_size, 1000);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let job = IngestionJob { batch_size: 0, ..Default::default() };
        assert!(matches!(job.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_zero_channel_capacity_is_rejected() {
        let job = IngestionJob { channel_capacity: 0, ..Default::default() };
        assert!(matches!(job.validate(), Err(IngestError::Config(_))));
    }
}
