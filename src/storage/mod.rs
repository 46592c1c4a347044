use crate::models::{Filter, StatusFilter, StockPatch, StockRecord, StoredOption};
use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::{params, Connection};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_filter_id START 1;

CREATE TABLE IF NOT EXISTS stocks (
    code        VARCHAR PRIMARY KEY,
    title       VARCHAR NOT NULL DEFAULT '',
    -- Mirrors of the document flags, for the status pre-filter
    starred     BOOLEAN NOT NULL DEFAULT FALSE,
    owned       BOOLEAN NOT NULL DEFAULT FALSE,
    doubtful    BOOLEAN NOT NULL DEFAULT FALSE,
    -- Full schema-loose document as JSON text
    doc         VARCHAR NOT NULL,
    updated_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS filters (
    id          BIGINT PRIMARY KEY DEFAULT nextval('seq_filter_id'),
    name        VARCHAR NOT NULL,
    options     VARCHAR NOT NULL DEFAULT '[]',
    created_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

fn status_clause(status: StatusFilter) -> &'static str {
    match status {
        StatusFilter::All | StatusFilter::Bad => "",
        StatusFilter::Starred => "WHERE starred",
        StatusFilter::Owned => "WHERE owned",
        StatusFilter::StarredOrOwned => "WHERE starred OR owned",
        StatusFilter::Doubtful => "WHERE doubtful",
    }
}

fn parse_doc(code: &str, doc: &str) -> Result<StockRecord> {
    let value: Value = serde_json::from_str(doc).with_context(|| format!("corrupt document for {}", code))?;
    StockRecord::from_value(value).with_context(|| format!("unreadable document for {}", code))
}

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB-backed document store for stocks and saved filters.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    pub fn schema_version(&self) -> Result<Option<i32>> {
        let mut s = self.conn.prepare("SELECT MAX(version) FROM schema_version")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Stocks ────────────────────────────────────────────────────────────────

    /// Documents passing the coarse status pre-filter, ordered by code.
    pub fn find_all(&self, status: StatusFilter) -> Result<Vec<StockRecord>> {
        let sql = format!("SELECT code, doc FROM stocks {} ORDER BY code", status_clause(status));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.iter().map(|(code, doc)| parse_doc(code, doc)).collect()
    }

    pub fn find_one_by_code(&self, code: &str) -> Result<Option<StockRecord>> {
        let Some(doc) = self.find_doc(code)? else {
            return Ok(None);
        };
        let record = StockRecord::from_value(Value::Object(doc))
            .with_context(|| format!("unreadable document for {}", code))?;
        Ok(Some(record))
    }

    fn find_doc(&self, code: &str) -> Result<Option<Map<String, Value>>> {
        let mut stmt = self.conn.prepare("SELECT doc FROM stocks WHERE code = ?")?;
        let mut rows = stmt.query(params![code])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let doc: String = row.get(0)?;
        match serde_json::from_str::<Value>(&doc).with_context(|| format!("corrupt document for {}", code))? {
            Value::Object(map) => Ok(Some(map)),
            _ => anyhow::bail!("document for {} is not an object", code),
        }
    }

    /// Merge `patch` into the stored document, inserting it when new.
    ///
    /// Only the keys carried by the patch change; every other key of the
    /// stored document is kept. Returns the merged record.
    pub fn upsert_by_code(&self, patch: &StockPatch) -> Result<StockRecord> {
        let code = patch.code();
        let mut doc = self.find_doc(code)?.unwrap_or_default();
        patch.merge_into(&mut doc);

        let text = serde_json::to_string(&doc)?;
        let record = StockRecord::from_value(Value::Object(doc))
            .with_context(|| format!("patch for {} does not yield a valid document", code))?;

        self.conn
            .execute(
                r#"INSERT INTO stocks (code, title, starred, owned, doubtful, doc, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (code) DO UPDATE SET
                       title      = excluded.title,
                       starred    = excluded.starred,
                       owned      = excluded.owned,
                       doubtful   = excluded.doubtful,
                       doc        = excluded.doc,
                       updated_at = excluded.updated_at"#,
                params![
                    record.code,
                    record.title,
                    record.starred,
                    record.owned,
                    record.doubtful,
                    text,
                    Utc::now().naive_utc(),
                ],
            )
            .with_context(|| format!("upsert stock {}", code))?;

        debug!("Upserted {} ({} fields)", code, patch.field_count());
        Ok(record)
    }

    /// Apply many patches in one transaction.
    pub fn upsert_many(&self, patches: &[StockPatch]) -> Result<usize> {
        if patches.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        for patch in patches {
            self.upsert_by_code(patch)?;
        }
        tx.commit()?;
        Ok(patches.len())
    }

    /// Hard delete. Returns false when the code was not stored.
    pub fn delete_by_code(&self, code: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM stocks WHERE code = ?", params![code])?;
        Ok(n > 0)
    }

    pub fn list_codes(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT code FROM stocks ORDER BY code")?;
        let codes = stmt
            .query_map([], |r| r.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(codes)
    }

    pub fn stock_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM stocks")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Filters ───────────────────────────────────────────────────────────────

    /// Create an empty filter and return it with its new id.
    pub fn insert_filter(&self, name: &str) -> Result<Filter> {
        let id: i64 = self
            .conn
            .query_row(
                "INSERT INTO filters (name, options, created_at) VALUES (?, '[]', ?) RETURNING id",
                params![name, Utc::now().naive_utc()],
                |r| r.get(0),
            )
            .with_context(|| format!("insert filter {}", name))?;
        Ok(Filter { id, name: name.to_string(), options: Vec::new() })
    }

    pub fn find_filter(&self, id: i64) -> Result<Option<Filter>> {
        let mut stmt = self.conn.prepare("SELECT id, name, options FROM filters WHERE id = ?")?;
        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(Self::filter_from_parts(row.get(0)?, row.get(1)?, row.get(2)?)?))
    }

    pub fn all_filters(&self) -> Result<Vec<Filter>> {
        let mut stmt = self.conn.prepare("SELECT id, name, options FROM filters ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<duckdb::Result<Vec<(i64, String, String)>>>()?;
        rows.into_iter()
            .map(|(id, name, options)| Self::filter_from_parts(id, name, options))
            .collect()
    }

    fn filter_from_parts(id: i64, name: String, options: String) -> Result<Filter> {
        let options: Vec<StoredOption> =
            serde_json::from_str(&options).with_context(|| format!("corrupt options for filter {}", id))?;
        Ok(Filter { id, name, options })
    }

    /// Replace name and options of an existing filter. Returns false when
    /// no filter carries `filter.id`.
    pub fn save_filter(&self, filter: &Filter) -> Result<bool> {
        let options = serde_json::to_string(&filter.options)?;
        let n = self
            .conn
            .execute(
                "UPDATE filters SET name = ?, options = ? WHERE id = ?",
                params![filter.name, options, filter.id],
            )
            .with_context(|| format!("save filter {}", filter.id))?;
        Ok(n > 0)
    }

    pub fn delete_filter(&self, id: i64) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM filters WHERE id = ?", params![id])?;
        Ok(n > 0)
    }

    pub fn filter_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM filters")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }
}
