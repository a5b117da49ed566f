//! SQLite-backed catalog of agent records.
//!
//! Rows are kept in insertion (rowid) order; `name` is the natural key but is
//! not enforced unique at insert time. `dedup` reconciles duplicates by
//! keeping the earliest row per name. The `enriched` flag column is added
//! lazily so databases written by older importers open unchanged.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use agentdex_core::error::{Error, Result};
use agentdex_core::types::AgentRecord;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

const TABLE: &str = "agents";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS agents (
    name TEXT NOT NULL,
    provider TEXT NOT NULL DEFAULT '',
    use_case TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    input_price TEXT NOT NULL DEFAULT '',
    output_price TEXT NOT NULL DEFAULT '',
    integration TEXT NOT NULL DEFAULT '',
    free_tier TEXT NOT NULL DEFAULT '',
    latency TEXT NOT NULL DEFAULT '',
    website TEXT NOT NULL DEFAULT '',
    alternatives TEXT NOT NULL DEFAULT ''
)";

const SELECT_COLUMNS: &str = "SELECT name, provider, use_case, category, input_price, output_price, \
     integration, free_tier, latency, website, alternatives, enriched FROM agents";

const INSERT: &str = "INSERT INTO agents (name, provider, use_case, category, input_price, \
     output_price, integration, free_tier, latency, website, alternatives, enriched) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

// `enriched` may be raised but never cleared.
const UPDATE: &str = "UPDATE agents SET provider = ?2, use_case = ?3, category = ?4, \
     input_price = ?5, output_price = ?6, integration = ?7, free_tier = ?8, latency = ?9, \
     website = ?10, alternatives = ?11, \
     enriched = CASE WHEN COALESCE(enriched, 0) <> 0 THEN 1 ELSE ?12 END \
     WHERE name = ?1";

fn storage(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE).map_err(storage)?;
        ensure_enriched_column(&conn).map_err(storage)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("catalog connection lock poisoned".to_string()))
    }

    /// Append rows as-is; duplicates are allowed until `dedup` runs.
    pub fn insert_many(&self, records: &[AgentRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        {
            let mut stmt = tx.prepare(INSERT).map_err(storage)?;
            for r in records {
                stmt.execute(params![
                    r.name,
                    r.provider,
                    r.use_case,
                    r.category,
                    r.input_price,
                    r.output_price,
                    r.integration,
                    r.free_tier,
                    r.latency,
                    r.website,
                    r.alternatives,
                    r.enriched,
                ])
                .map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)?;
        debug!(count = records.len(), "inserted catalog rows");
        Ok(records.len())
    }

    pub fn scan_all(&self) -> Result<Vec<AgentRecord>> {
        self.select(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
    }

    pub fn scan_unenriched(&self) -> Result<Vec<AgentRecord>> {
        self.select(&format!("{SELECT_COLUMNS} WHERE COALESCE(enriched, 0) = 0 ORDER BY rowid"))
    }

    fn select(&self, sql: &str) -> Result<Vec<AgentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(storage)?;
        let rows = stmt.query_map([], record_from_row).map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    /// Earliest row carrying `name`, or `Error::NotFound`.
    pub fn lookup_by_name(&self, name: &str) -> Result<AgentRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE name = ?1 ORDER BY rowid LIMIT 1"),
            params![name],
            record_from_row,
        )
        .optional()
        .map_err(storage)?
        .ok_or_else(|| Error::NotFound(format!("agent '{name}'")))
    }

    /// Replace every column except `name` for the rows keyed by `record.name`.
    pub fn update(&self, record: &AgentRecord) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(UPDATE, &update_params(record)).map_err(storage)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("agent '{}'", record.name)));
        }
        Ok(())
    }

    /// Apply many updates in one transaction. Names that no longer exist are
    /// skipped; returns how many records were written.
    pub fn update_many(&self, records: &[AgentRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(UPDATE).map_err(storage)?;
            for r in records {
                match stmt.execute(&update_params(r)).map_err(storage)? {
                    0 => warn!(name = %r.name, "record vanished before write-back"),
                    _ => written += 1,
                }
            }
        }
        tx.commit().map_err(storage)?;
        Ok(written)
    }

    /// Rewrite only the two price fields.
    pub fn update_prices(&self, name: &str, input_price: &str, output_price: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE agents SET input_price = ?2, output_price = ?3 WHERE name = ?1",
                params![name, input_price, output_price],
            )
            .map_err(storage)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("agent '{name}'")));
        }
        Ok(())
    }

    /// Keep the earliest row per name and delete the rest. Returns rows deleted.
    pub fn dedup(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM agents WHERE rowid NOT IN (SELECT MIN(rowid) FROM agents GROUP BY name)",
                [],
            )
            .map_err(storage)?;
        debug!(deleted, "deduplicated catalog");
        Ok(deleted)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))
            .map_err(storage)?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

fn update_params(r: &AgentRecord) -> [&dyn rusqlite::ToSql; 12] {
    [
        &r.name,
        &r.provider,
        &r.use_case,
        &r.category,
        &r.input_price,
        &r.output_price,
        &r.integration,
        &r.free_tier,
        &r.latency,
        &r.website,
        &r.alternatives,
        &r.enriched,
    ]
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    let text = |idx: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    };
    Ok(AgentRecord {
        name: text(0)?,
        provider: text(1)?,
        use_case: text(2)?,
        category: text(3)?,
        input_price: text(4)?,
        output_price: text(5)?,
        integration: text(6)?,
        free_tier: text(7)?,
        latency: text(8)?,
        website: text(9)?,
        alternatives: text(10)?,
        enriched: row.get::<_, Option<i64>>(11)?.unwrap_or(0) != 0,
    })
}

/// Add the `enriched` column if an older schema lacks it; no-op otherwise.
fn ensure_enriched_column(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if columns.iter().any(|c| c.eq_ignore_ascii_case("enriched")) {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {TABLE} ADD COLUMN enriched INTEGER NOT NULL DEFAULT 0"
    ))
}
