//! Records flowing through the ingestion and export pipelines.

use serde::{Deserialize, Serialize};

/// One article extracted from the corpus.
///
/// `references` keeps cited identifiers in document order, duplicates
/// included; the cited documents may never appear as records themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub references: Vec<String>,
}

impl DocumentRecord {
    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }

    /// Node attributes for the first ingestion pass.
    pub fn to_node(&self) -> NodeUpsert {
        NodeUpsert {
            id: self.id.clone(),
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
        }
    }

    /// Outgoing references for the second ingestion pass, `None` when the
    /// document cites nothing.
    pub fn to_references(&self) -> Option<ReferenceUpsert> {
        if !self.has_references() {
            return None;
        }
        Some(ReferenceUpsert {
            source_id: self.id.clone(),
            target_ids: self.references.clone(),
        })
    }
}

/// Create-or-update payload for a document node, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpsert {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

impl NodeUpsert {
    pub fn full_text(&self) -> String {
        full_text(&self.title, &self.abstract_text)
    }
}

/// Edge payload: `source_id -> target_id` for every target, targets are
/// created as placeholder nodes when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceUpsert {
    pub source_id: String,
    pub target_ids: Vec<String>,
}

impl ReferenceUpsert {
    /// Flatten into `(source, target)` pairs in citation order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.target_ids
            .iter()
            .map(move |target| (self.source_id.as_str(), target.as_str()))
    }
}

/// Derived `full_text` attribute stored on every fully ingested node.
/// Always `title + " " + abstract`, even when either side is empty.
pub fn full_text(title: &str, abstract_text: &str) -> String {
    let mut text = String::with_capacity(title.len() + abstract_text.len() + 1);
    text.push_str(title);
    text.push(' ');
    text.push_str(abstract_text);
    text
}

/// Row of the `<id>/<full_text>` export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextRow {
    pub id: String,
    pub full_text: String,
}

/// Row of the `<id>/<ref>/<ref>...` export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub id: String,
    pub targets: Vec<String>,
}

/// Aggregate figures reported before an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_documents: u64,
    pub documents_with_abstract: u64,
    /// Mean number of distinct outgoing references per document.
    pub avg_references: f64,
    pub max_references: u64,
}
