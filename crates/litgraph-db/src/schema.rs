//! Names and statements shared by the database-backed stores.
//!
//! Neo4j uses label `Document`, key property `pmid` and relationship
//! `REFERENCES`. PostgreSQL uses `documents` and `document_references`.

pub mod cypher {
    pub const CREATE_CONSTRAINT: &str =
        "CREATE CONSTRAINT IF NOT EXISTS FOR (d:Document) REQUIRE d.pmid IS UNIQUE";

    pub const UPSERT_DOCUMENTS: &str = r#"
        UNWIND $docs AS doc
        MERGE (d:Document {pmid: doc.pmid})
        SET d.title = doc.title,
            d.abstract = doc.abstract,
            d.full_text = doc.title + ' ' + doc.abstract
    "#;

    pub const UPSERT_REFERENCES: &str = r#"
        UNWIND $data AS item
        MATCH (d:Document {pmid: item.pmid})
        UNWIND item.refs AS ref_pmid
        MERGE (r:Document {pmid: ref_pmid})
        MERGE (d)-[:REFERENCES]->(r)
    "#;

    pub const FULL_TEXT_ROWS: &str = r#"
        MATCH (d:Document)
        WHERE d.pmid IS NOT NULL AND d.full_text IS NOT NULL
        RETURN d.pmid AS pmid, d.full_text AS text
        ORDER BY d.pmid
    "#;

    pub const REFERENCE_ROWS: &str = r#"
        MATCH (d:Document)
        WHERE d.pmid IS NOT NULL
        OPTIONAL MATCH (d)-[:REFERENCES]->(r:Document)
        WITH d.pmid AS pmid, collect(r.pmid) AS refs
        ORDER BY pmid
        RETURN pmid, refs
    "#;

    pub const COUNT_DOCUMENTS: &str = "MATCH (d:Document) RETURN count(d) AS count";

    pub const COUNT_WITH_ABSTRACT: &str = r#"
        MATCH (d:Document)
        WHERE d.abstract IS NOT NULL AND d.abstract <> ''
        RETURN count(d) AS count
    "#;

    pub const REFERENCE_STATS: &str = r#"
        MATCH (d:Document)
        OPTIONAL MATCH (d)-[:REFERENCES]->(out:Document)
        WITH d, count(DISTINCT out) AS ref_count
        RETURN avg(ref_count) AS avg_refs, max(ref_count) AS max_refs
    "#;
}

pub mod sql {
    pub const CREATE_DOCUMENTS: &str = r#"
        CREATE TABLE IF NOT EXISTS documents (
            id        TEXT PRIMARY KEY,
            title     TEXT,
            abstract  TEXT,
            full_text TEXT
        )
    "#;

    pub const CREATE_REFERENCES: &str = r#"
        CREATE TABLE IF NOT EXISTS document_references (
            seq       BIGSERIAL,
            source_id TEXT NOT NULL REFERENCES documents (id),
            target_id TEXT NOT NULL REFERENCES documents (id),
            PRIMARY KEY (source_id, target_id)
        )
    "#;

    pub const UPSERT_DOCUMENTS: &str = r#"
        INSERT INTO documents (id, title, abstract, full_text)
        SELECT t.id, t.title, t.abstract, t.title || ' ' || t.abstract
        FROM UNNEST($1::text[], $2::text[], $3::text[]) AS t (id, title, abstract)
        ON CONFLICT (id) DO UPDATE
            SET title     = EXCLUDED.title,
                abstract  = EXCLUDED.abstract,
                full_text = EXCLUDED.full_text
    "#;

    /// Placeholder targets, only for sources that exist.
    pub const INSERT_PLACEHOLDERS: &str = r#"
        INSERT INTO documents (id)
        SELECT DISTINCT e.target_id
        FROM UNNEST($1::text[], $2::text[]) AS e (source_id, target_id)
        JOIN documents s ON s.id = e.source_id
        ON CONFLICT (id) DO NOTHING
    "#;

    pub const INSERT_REFERENCES: &str = r#"
        INSERT INTO document_references (source_id, target_id)
        SELECT e.source_id, e.target_id
        FROM UNNEST($1::text[], $2::text[]) WITH ORDINALITY AS e (source_id, target_id, ord)
        JOIN documents s ON s.id = e.source_id
        ORDER BY e.ord
        ON CONFLICT (source_id, target_id) DO NOTHING
    "#;

    pub const FULL_TEXT_ROWS: &str = r#"
        SELECT id, full_text
        FROM documents
        WHERE full_text IS NOT NULL
        ORDER BY id COLLATE "C"
    "#;

    pub const REFERENCE_ROWS: &str = r#"
        SELECT d.id,
               COALESCE(
                   array_agg(r.target_id ORDER BY r.seq) FILTER (WHERE r.target_id IS NOT NULL),
                   '{}'
               ) AS refs
        FROM documents d
        LEFT JOIN document_references r ON r.source_id = d.id
        GROUP BY d.id
        ORDER BY d.id COLLATE "C"
    "#;

    pub const COUNT_DOCUMENTS: &str = "SELECT COUNT(*) FROM documents";

    pub const COUNT_WITH_ABSTRACT: &str =
        "SELECT COUNT(*) FROM documents WHERE abstract IS NOT NULL AND abstract <> ''";

    pub const REFERENCE_STATS: &str = r#"
        SELECT AVG(c.n)::float8, MAX(c.n)
        FROM (
            SELECT d.id, COUNT(r.target_id) AS n
            FROM documents d
            LEFT JOIN document_references r ON r.source_id = d.id
            GROUP BY d.id
        ) c
    "#;
}
