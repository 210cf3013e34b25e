//! Disk spool for the reference pass.
//!
//! Node batches are written as records stream in, but edges may only be
//! created once every node batch is acknowledged. The `(source, targets)`
//! payloads are parked here as JSON lines in an anonymous temporary file
//! so the edge pass never needs the whole corpus in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};

use litgraph_common::{DocumentRecord, ReferenceUpsert};

use crate::error::Result;

pub struct ReferenceSpool {
    writer: BufWriter<File>,
    sources: u64,
    pairs: u64,
}

impl ReferenceSpool {
    /// Create a spool backed by a temporary file that is removed on drop.
    pub fn new() -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(tempfile::tempfile()?),
            sources: 0,
            pairs: 0,
        })
    }

    /// Park the references of every record that cites something.
    pub fn append_batch(&mut self, batch: &[DocumentRecord]) -> Result<()> {
        for refs in batch.iter().filter_map(DocumentRecord::to_references) {
            serde_json::to_writer(&mut self.writer, &refs)?;
            self.writer.write_all(b"\n")?;
            self.sources += 1;
            self.pairs += refs.target_ids.len() as u64;
        }
        Ok(())
    }

    /// Records with at least one reference spooled so far.
    pub fn sources(&self) -> u64 {
        self.sources
    }

    /// `(source, target)` pairs spooled so far, duplicates included.
    pub fn pairs(&self) -> u64 {
        self.pairs
    }

    /// Flush and rewind for reading.
    pub fn into_reader(self) -> Result<SpoolReader> {
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        Ok(SpoolReader { lines: BufReader::new(file), line: String::new() })
    }
}

/// Replays spooled [`ReferenceUpsert`]s in the order they were written.
pub struct SpoolReader {
    lines: BufReader<File>,
    line: String,
}

impl Iterator for SpoolReader {
    type Item = Result<ReferenceUpsert>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line.clear();
        match self.lines.read_line(&mut self.line) {
            Ok(0) => None,
            Ok(_) => Some(serde_json::from_str(self.line.trim_end()).map_err(Into::into)),
            Err(e) => Some(Err(e.into())),
        }
    }
}
