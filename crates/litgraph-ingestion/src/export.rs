//! Flat-file export of the graph.
//!
//! Two line formats, one record per line, newline terminated:
//!
//! ```text
//! <id>/<full_text>
//! <id>/<target_1>/<target_2>/...
//! ```
//!
//! Rows come from the store in ascending id order. A document without
//! outgoing references is written as its bare id.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::TryStreamExt;
use litgraph_common::{FullTextRow, ReferenceRow};
use litgraph_db::GraphStore;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{info, instrument};

use crate::error::Result;

pub const DEFAULT_TEXT_PATH: &str = "resultat_3_1.txt";
pub const DEFAULT_REFERENCES_PATH: &str = "resultat_3_2.txt";
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

// ── Line formats ──────────────────────────────────────────────────────────────

pub fn full_text_line(row: &FullTextRow) -> String {
    format!("{}/{}\n", row.id, row.full_text)
}

/// Empty target ids are dropped so the line never contains `//`.
pub fn reference_line(row: &ReferenceRow) -> String {
    let mut line = row.id.clone();
    for target in row.targets.iter().filter(|t| !t.is_empty()) {
        line.push('/');
        line.push_str(target);
    }
    line.push('\n');
    line
}

/// Splits on the first `/` only; the text itself may contain slashes.
pub fn parse_full_text_line(line: &str) -> Option<FullTextRow> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (id, text) = line.split_once('/')?;
    Some(FullTextRow { id: id.to_string(), full_text: text.to_string() })
}

pub fn parse_reference_line(line: &str) -> ReferenceRow {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let mut parts = line.split('/');
    let id = parts.next().unwrap_or_default().to_string();
    ReferenceRow { id, targets: parts.map(str::to_string).collect() }
}

// ── Writers ───────────────────────────────────────────────────────────────────

/// Write one full-text line per non-placeholder document. Returns the
/// number of lines written.
pub async fn export_full_text<W>(store: &dyn GraphStore, out: W, progress_every: u64) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(out);
    let mut rows = store.full_text_rows().await?;
    let mut lines = 0u64;
    while let Some(row) = rows.try_next().await? {
        out.write_all(full_text_line(&row).as_bytes()).await?;
        lines += 1;
        if progress_every > 0 && lines % progress_every == 0 {
            info!(lines, "Full-text lines written");
        }
    }
    out.flush().await?;
    Ok(lines)
}

/// Write one reference line per document, placeholders included.
pub async fn export_references<W>(store: &dyn GraphStore, out: W, progress_every: u64) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(out);
    let mut rows = store.reference_rows().await?;
    let mut lines = 0u64;
    while let Some(row) = rows.try_next().await? {
        out.write_all(reference_line(&row).as_bytes()).await?;
        lines += 1;
        if progress_every > 0 && lines % progress_every == 0 {
            info!(lines, "Reference lines written");
        }
    }
    out.flush().await?;
    Ok(lines)
}

// ── File export ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub text_path: PathBuf,
    pub references_path: PathBuf,
    /// Log a progress line every N rows; 0 disables progress logging.
    pub progress_every: u64,
}

impl Default for ExportJob {
    fn default() -> Self {
        Self {
            text_path: PathBuf::from(DEFAULT_TEXT_PATH),
            references_path: PathBuf::from(DEFAULT_REFERENCES_PATH),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportResult {
    pub full_text_lines: u64,
    pub full_text_ms: u64,
    pub reference_lines: u64,
    pub reference_ms: u64,
}

/// Run both exports, each into a freshly truncated file.
#[instrument(skip(store, job), fields(backend = store.backend()))]
pub async fn export_to_files(store: &dyn GraphStore, job: &ExportJob) -> Result<ExportResult> {
    let mut result = ExportResult::default();

    let t0 = Instant::now();
    info!(path = %job.text_path.display(), "Exporting full text");
    result.full_text_lines =
        export_full_text(store, create(&job.text_path).await?, job.progress_every).await?;
    result.full_text_ms = t0.elapsed().as_millis() as u64;
    info!(lines = result.full_text_lines, ms = result.full_text_ms, "Full-text export finished");

    let t1 = Instant::now();
    info!(path = %job.references_path.display(), "Exporting references");
    result.reference_lines =
        export_references(store, create(&job.references_path).await?, job.progress_every).await?;
    result.reference_ms = t1.elapsed().as_millis() as u64;
    info!(lines = result.reference_lines, ms = result.reference_ms, "Reference export finished");

    Ok(result)
}

async fn create(path: &Path) -> Result<File> {
    Ok(File::create(path).await?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
