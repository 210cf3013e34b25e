//! Streaming BioC XML record extractor.
//!
//! Handles the `<collection><document><passage>` structure used by the
//! LitCovid dump. The reader is forward-only: one document's working state
//! is held at a time and the event buffer is reused, so memory stays
//! bounded by the largest single document.
//!
//! Only `infon` and `text` elements that are direct children of a passage
//! are read; the ones nested inside `annotation` or `sentence` are skipped.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::BufRead;
use std::mem;

use litgraph_common::DocumentRecord;
use quick_xml::events::{BytesStart, Event};
use quick_xml::encoding::Decoder;
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

const DOCUMENT_TAG: &[u8] = b"document";
const PASSAGE_TAG: &[u8] = b"passage";
const INFON_TAG: &[u8] = b"infon";
const TEXT_TAG: &[u8] = b"text";

pub const KEY_ARTICLE_ID: &str = "article-id_pmid";
pub const KEY_SECTION_TYPE: &str = "section_type";
pub const KEY_SUBTYPE: &str = "type";
pub const KEY_CITED_ID: &str = "pub-id_pmid";

const SECTION_TITLE: &str = "TITLE";
const SECTION_ABSTRACT: &str = "ABSTRACT";
const SECTION_REF: &str = "REF";
const SUBTYPE_ABSTRACT: &str = "abstract";

/// Counters kept while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub documents_seen: u64,
    pub records_emitted: u64,
    /// Documents dropped because no passage carried an article identifier.
    pub documents_without_id: u64,
}

/// Working state of the document currently being read.
#[derive(Debug, Default)]
struct DocumentState {
    pending_id: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    references: Vec<String>,
}

impl DocumentState {
    fn apply(&mut self, passage: PassageState) {
        let PassageState { infons, text, .. } = passage;
        let infon = |key: &str| infons.get(key).map(String::as_str);

        if self.pending_id.is_none() {
            if let Some(id) = infon(KEY_ARTICLE_ID).filter(|id| !id.is_empty()) {
                self.pending_id = Some(id.to_string());
            }
        }

        let text = text.filter(|t| !t.is_empty());
        match infon(KEY_SECTION_TYPE) {
            Some(SECTION_TITLE) => {
                if let Some(text) = text {
                    self.title = text.trim().to_string();
                }
            }
            Some(SECTION_ABSTRACT) if infon(KEY_SUBTYPE) == Some(SUBTYPE_ABSTRACT) => {
                if let Some(text) = text {
                    self.abstract_parts.push(text.trim().to_string());
                }
            }
            Some(SECTION_REF) => {
                if let Some(cited) = infon(KEY_CITED_ID).filter(|c| !c.is_empty()) {
                    self.references.push(cited.to_string());
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Option<DocumentRecord> {
        let id = self.pending_id?;
        Some(DocumentRecord {
            id,
            title: self.title,
            abstract_text: self.abstract_parts.join(" "),
            references: self.references,
        })
    }
}

/// Child element of a passage whose content is being captured.
#[derive(Debug)]
enum Field {
    Infon { key: Option<String>, value: String },
    Text(String),
}

#[derive(Debug)]
struct PassageState {
    depth: usize,
    infons: HashMap<String, String>,
    text: Option<String>,
    field: Option<Field>,
}

impl PassageState {
    fn new(depth: usize) -> Self {
        Self { depth, infons: HashMap::new(), text: None, field: None }
    }

    fn commit(&mut self) {
        match self.field.take() {
            Some(Field::Infon { key: Some(key), value }) => {
                self.infons.insert(key, value);
            }
            Some(Field::Text(text)) => {
                if self.text.is_none() {
                    self.text = Some(text);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InDocument { depth: usize, doc: DocumentState },
    InPassage { doc_depth: usize, doc: DocumentState, passage: PassageState },
}

/// Event-driven core, kept apart from the reader so the event buffer and
/// the state can be borrowed independently.
#[derive(Debug, Default)]
struct Machine {
    depth: usize,
    state: State,
    stats: ExtractStats,
}

impl Machine {
    fn start(&mut self, e: &BytesStart<'_>) -> std::result::Result<(), String> {
        self.depth += 1;
        let depth = self.depth;
        let name = e.name();
        let name = name.as_ref();

        match &mut self.state {
            State::Idle if name == DOCUMENT_TAG => {
                self.stats.documents_seen += 1;
                self.state = State::InDocument { depth, doc: DocumentState::default() };
            }
            State::InDocument { .. } if name == PASSAGE_TAG => {
                if let State::InDocument { depth: doc_depth, doc } = mem::take(&mut self.state) {
                    self.state = State::InPassage { doc_depth, doc, passage: PassageState::new(depth) };
                }
            }
            State::InPassage { passage, .. } if depth == passage.depth + 1 => {
                if name == INFON_TAG {
                    let key = match e.try_get_attribute("key").map_err(|err| err.to_string())? {
                        Some(attr) => Some(
                            attr.unescape_value().map_err(|err| err.to_string())?.into_owned(),
                        ),
                        None => None,
                    };
                    passage.field = Some(Field::Infon { key, value: String::new() });
                } else if name == TEXT_TAG {
                    passage.field = Some(Field::Text(String::new()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// True when text at the current depth belongs to a captured field.
    fn capturing(&self) -> bool {
        matches!(
            &self.state,
            State::InPassage { passage, .. }
                if passage.field.is_some() && self.depth == passage.depth + 1
        )
    }

    fn text(&mut self, chunk: &str) {
        if !self.capturing() {
            return;
        }
        if let State::InPassage { passage, .. } = &mut self.state {
            match &mut passage.field {
                Some(Field::Infon { value, .. }) => value.push_str(chunk),
                Some(Field::Text(text)) => text.push_str(chunk),
                None => {}
            }
        }
    }

    fn end(&mut self, name: &[u8]) -> Option<DocumentRecord> {
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        match &mut self.state {
            State::InPassage { passage, .. } if depth == passage.depth + 1 => {
                if name == INFON_TAG || name == TEXT_TAG {
                    passage.commit();
                }
                None
            }
            State::InPassage { passage, .. } if depth == passage.depth => {
                if let State::InPassage { doc_depth, mut doc, passage } = mem::take(&mut self.state) {
                    doc.apply(passage);
                    self.state = State::InDocument { depth: doc_depth, doc };
                }
                None
            }
            State::InDocument { depth: doc_depth, .. } if depth == *doc_depth => {
                let State::InDocument { doc, .. } = mem::take(&mut self.state) else {
                    return None;
                };
                match doc.finish() {
                    Some(record) => {
                        self.stats.records_emitted += 1;
                        Some(record)
                    }
                    None => {
                        self.stats.documents_without_id += 1;
                        debug!(
                            document = self.stats.documents_seen,
                            "Skipping document without article identifier"
                        );
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

/// Lazy, forward-only sequence of [`DocumentRecord`]s read from BioC XML.
///
/// Yields at most one error; the sequence ends after it.
pub struct RecordExtractor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    machine: Machine,
    done: bool,
}

impl<R: BufRead> RecordExtractor<R> {
    pub fn new(reader: R) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::with_capacity(16 * 1024),
            machine: Machine::default(),
            done: false,
        }
    }

    pub fn stats(&self) -> ExtractStats {
        self.machine.stats
    }

    fn next_record(&mut self) -> Result<Option<DocumentRecord>> {
        loop {
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    validate_start(self.reader.decoder(), &e).map_err(|m| malformed(position, m))?;
                    self.machine.start(&e).map_err(|m| malformed(position, m))?;
                }
                Ok(Event::Empty(e)) => {
                    validate_start(self.reader.decoder(), &e).map_err(|m| malformed(position, m))?;
                    self.machine.start(&e).map_err(|m| malformed(position, m))?;
                    if let Some(record) = self.machine.end(e.name().as_ref()) {
                        return Ok(Some(record));
                    }
                }
                Ok(Event::End(e)) => {
                    self.reader
                        .decoder()
                        .decode(e.name().as_ref())
                        .map_err(|err| malformed(position, err))?;
                    if let Some(record) = self.machine.end(e.name().as_ref()) {
                        return Ok(Some(record));
                    }
                }
                // Every text node is decoded, captured or not: bad bytes or
                // entities anywhere in the stream are fatal.
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| malformed(position, err))?;
                    self.machine.text(&text);
                }
                Ok(Event::CData(e)) => {
                    let text = std::str::from_utf8(&e).map_err(|err| malformed(position, err))?;
                    self.machine.text(text);
                }
                Ok(Event::Eof) => {
                    if self.machine.depth > 0 {
                        return Err(malformed(
                            self.reader.buffer_position() as u64,
                            format!(
                                "unexpected end of input with {} unclosed element(s)",
                                self.machine.depth
                            ),
                        ));
                    }
                    return Ok(None);
                }
                Ok(_) => {}
                Err(err) => {
                    return Err(malformed(self.reader.buffer_position() as u64, err));
                }
            }
        }
    }
}

/// Element name, attribute names and attribute values must decode and
/// unescape cleanly.
fn validate_start(decoder: Decoder, e: &BytesStart<'_>) -> std::result::Result<(), String> {
    decoder.decode(e.name().as_ref()).map_err(|err| err.to_string())?;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        decoder.decode(attr.key.as_ref()).map_err(|err| err.to_string())?;
        attr.decode_and_unescape_value(decoder).map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn malformed(position: u64, message: impl Display) -> IngestError {
    IngestError::Xml { position, message: message.to_string() }
}

impl<R: BufRead> Iterator for RecordExtractor<R> {
    type Item = Result<DocumentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                warn!("BioC extraction aborted: {e}");
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(xml: &str) -> Vec<DocumentRecord> {
        RecordExtractor::new(xml.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn passage(infons: &[(&str, &str)], text: Option<&str>) -> String {
        let mut out = String::from("<passage>");
        for (k, v) in infons {
            out.push_str(&format!(r#"<infon key="{k}">{v}</infon>"#));
        }
        out.push_str("<offset>0</offset>");
        if let Some(t) = text {
            out.push_str(&format!("<text>{t}</text>"));
        }
        out.push_str("</passage>");
        out
    }

    fn collection(documents: &[String]) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><collection><source>PMC</source>"#);
        for d in documents {
            out.push_str(&format!("<document><id>x</id>{d}</document>"));
        }
        out.push_str("</collection>");
        out
    }

    #[test]
    fn test_extracts_example_document() {
        let doc = [
            passage(&[("article-id_pmid", "100"), ("section_type", "TITLE"), ("type", "front")], Some("A Study")),
            passage(&[("section_type", "ABSTRACT"), ("type", "abstract")], Some("Results here.")),
            passage(&[("section_type", "REF"), ("type", "ref"), ("pub-id_pmid", "200")], Some("Ref one")),
            passage(&[("section_type", "REF"), ("type", "ref"), ("pub-id_pmid", "300")], None),
        ]
        .concat();

        let records = extract(&collection(&[doc]));
        assert_eq!(
            records,
            vec![DocumentRecord {
                id: "100".to_string(),
                title: "A Study".to_string(),
                abstract_text: "Results here.".to_string(),
                references: vec!["200".to_string(), "300".to_string()],
            }]
        );
    }

    #[test]
    fn test_document_without_identifier_is_dropped_and_counted() {
        let with_id = passage(&[("article-id_pmid", "1"), ("section_type", "TITLE")], Some("Kept"));
        let without_id = passage(&[("section_type", "TITLE")], Some("Dropped"));
        let xml = collection(&[without_id, with_id]);

        let mut extractor = RecordExtractor::new(xml.as_bytes());
        let records: Vec<_> = extractor.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept");
        assert_eq!(
            extractor.stats(),
            ExtractStats { documents_seen: 2, records_emitted: 1, documents_without_id: 1 }
        );
    }

    #[test]
    fn test_last_title_wins_and_is_trimmed() {
        let doc = [
            passage(&[("article-id_pmid", "1"), ("section_type", "TITLE")], Some("First")),
            passage(&[("section_type", "TITLE")], Some("  Second title \n")),
        ]
        .concat();
        assert_eq!(extract(&collection(&[doc]))[0].title, "Second title");
    }

    #[test]
    fn test_title_passage_without_text_keeps_previous_title() {
        let doc = [
            passage(&[("article-id_pmid", "1"), ("section_type", "TITLE")], Some("Kept")),
            passage(&[("section_type", "TITLE")], None),
            passage(&[("section_type", "TITLE")], Some("")),
        ]
        .concat();
        assert_eq!(extract(&collection(&[doc]))[0].title, "Kept");
    }

    #[test]
    fn test_abstract_parts_joined_in_order_and_filtered_by_subtype() {
        let doc = [
            passage(&[("article-id_pmid", "1"), ("section_type", "ABSTRACT"), ("type", "abstract")], Some(" Background. ")),
            passage(&[("section_type", "ABSTRACT"), ("type", "abstract_title_1")], Some("Methods")),
            passage(&[("section_type", "ABSTRACT"), ("type", "abstract")], Some("Methods text.")),
            passage(&[("section_type", "INTRO"), ("type", "abstract")], Some("Not abstract.")),
        ]
        .concat();
        assert_eq!(extract(&collection(&[doc]))[0].abstract_text, "Background. Methods text.");
    }

    #[test]
    fn test_first_identifier_wins() {
        let doc = [
            passage(&[("article-id_pmid", "111")], None),
            passage(&[("article-id_pmid", "222")], None),
        ]
        .concat();
        assert_eq!(extract(&collection(&[doc]))[0].id, "111");
    }

    #[test]
    fn test_empty_identifier_counts_as_absent() {
        let doc = [
            passage(&[("article-id_pmid", "")], None),
            "<passage><infon key=\"article-id_pmid\"/></passage>".to_string(),
        ]
        .concat();
        assert!(extract(&collection(&[doc])).is_empty());
    }

    #[test]
    fn test_references_keep_order_and_duplicates() {
        let doc = [
            passage(&[("article-id_pmid", "1")], None),
            passage(&[("section_type", "REF"), ("pub-id_pmid", "9")], None),
            passage(&[("section_type", "REF")], Some("no pmid")),
            passage(&[("section_type", "REF"), ("pub-id_pmid", "8")], None),
            passage(&[("section_type", "REF"), ("pub-id_pmid", "9")], None),
        ]
        .concat();
        assert_eq!(extract(&collection(&[doc]))[0].references, vec!["9", "8", "9"]);
    }

    #[test]
    fn test_annotation_children_are_ignored() {
        let doc = r#"<passage>
            <infon key="article-id_pmid">5</infon>
            <infon key="section_type">TITLE</infon>
            <text>Real title</text>
            <annotation id="T1">
              <infon key="section_type">REF</infon>
              <infon key="pub-id_pmid">999</infon>
              <text>Gene</text>
            </annotation>
        </passage>"#;
        let records = extract(&collection(&[doc.to_string()]));
        assert_eq!(records[0].title, "Real title");
        assert!(records[0].references.is_empty());
    }

    #[test]
    fn test_entities_and_cdata_are_decoded() {
        let doc = [
            passage(&[("article-id_pmid", "1"), ("section_type", "TITLE")], Some("Cats &amp; dogs &#x3B1;")),
            passage(&[("section_type", "ABSTRACT"), ("type", "abstract")], Some("<![CDATA[a < b]]>")),
        ]
        .concat();
        let record = &extract(&collection(&[doc]))[0];
        assert_eq!(record.title, "Cats & dogs α");
        assert_eq!(record.abstract_text, "a < b");
    }

    #[test]
    fn test_passages_outside_documents_are_ignored() {
        let xml = format!(
            "<collection>{}<document>{}</document></collection>",
            passage(&[("article-id_pmid", "stray")], None),
            passage(&[("article-id_pmid", "2")], None),
        );
        let records = extract(&xml);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2");
    }

    #[test]
    fn test_empty_document_element() {
        let mut extractor = RecordExtractor::new("<collection><document/></collection>".as_bytes());
        assert!(extractor.next().is_none());
        assert_eq!(extractor.stats().documents_without_id, 1);
    }

    #[test]
    fn test_mismatched_end_tag_is_fatal() {
        let xml = "<collection><document><passage></document></collection>";
        let results: Vec<_> = RecordExtractor::new(xml.as_bytes()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn test_unclosed_document_is_fatal() {
        let xml = format!(
            "<collection><document>{}",
            passage(&[("article-id_pmid", "1")], None)
        );
        let results: Vec<_> = RecordExtractor::new(xml.as_bytes()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn test_records_before_error_are_still_yielded() {
        let good = passage(&[("article-id_pmid", "1")], None);
        let xml = format!("<collection><document>{good}</document><document></passage>");
        let mut extractor = RecordExtractor::new(xml.as_bytes());
        assert_eq!(extractor.next().unwrap().unwrap().id, "1");
        assert!(extractor.next().unwrap().is_err());
        assert!(extractor.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let mut bytes = b"<collection><document><passage><infon key=\"article-id_pmid\">".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"</infon></passage></document></collection>");
        let results: Vec<_> = RecordExtractor::new(bytes.as_slice()).collect();
        assert!(results.iter().any(|r| r.is_err()));
    }

    fn extract_bytes(bytes: &[u8]) -> Vec<Result<DocumentRecord>> {
        RecordExtractor::new(bytes).collect()
    }

    fn wrap_in_passage(inner: &[u8]) -> Vec<u8> {
        let mut bytes =
            b"<collection><document><passage><infon key=\"article-id_pmid\">1</infon>".to_vec();
        bytes.extend_from_slice(inner);
        bytes.extend_from_slice(b"</passage></document></collection>");
        bytes
    }

    #[test]
    fn test_invalid_utf8_in_skipped_element_is_fatal() {
        let results = extract_bytes(&wrap_in_passage(b"<offset>\xff\xfe</offset>"));
        assert!(matches!(results.last(), Some(Err(IngestError::Xml { .. }))));
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[test]
    fn test_undefined_entity_in_skipped_element_is_fatal() {
        let results = extract_bytes(&wrap_in_passage(b"<offset>&bogus;</offset>"));
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn test_bad_content_inside_annotation_is_fatal() {
        let bad_bytes = wrap_in_passage(
            b"<annotation id=\"1\"><infon key=\"type\">Gene</infon><text>\xff</text></annotation>",
        );
        assert!(matches!(extract_bytes(&bad_bytes)[0], Err(IngestError::Xml { .. })));

        let bad_entity = wrap_in_passage(
            b"<annotation id=\"1\"><infon key=\"type\">&bogus;</infon></annotation>",
        );
        assert!(matches!(extract_bytes(&bad_entity)[0], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn test_bad_attribute_value_is_fatal() {
        let results = extract_bytes(&wrap_in_passage(b"<annotation id=\"&bogus;\"></annotation>"));
        assert!(matches!(results[0], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn test_invalid_utf8_in_element_name_is_fatal() {
        let results = extract_bytes(&wrap_in_passage(b"<off\xffset>0</off\xffset>"));
        assert!(matches!(results[0], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn test_escaped_text_outside_fields_is_accepted() {
        let records = extract_bytes(&wrap_in_passage(b"<offset>&lt;0&gt;</offset>"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().id, "1");
    }
}
