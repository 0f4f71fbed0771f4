use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(n > 0)
}

pub fn clear_config(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM app_config", [])?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Snapshots ──────────────────────────────────────────────────────

/// A cached snapshot row; `payload` is the serialized snapshot JSON.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub range_key: String,
    pub fetched_at: String,
    pub order_count: i64,
    pub payload: String,
}

pub fn save_snapshot(
    conn: &Connection,
    range_key: &str,
    range_start: &str,
    range_end: &str,
    fetched_at: &str,
    order_count: i64,
    payload: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO snapshots
            (range_key, range_start, range_end, fetched_at, order_count, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![range_key, range_start, range_end, fetched_at, order_count, payload],
    )?;
    Ok(())
}

pub fn load_snapshot(
    conn: &Connection,
    range_key: &str,
) -> Result<Option<StoredSnapshot>, rusqlite::Error> {
    conn.query_row(
        "SELECT range_key, fetched_at, order_count, payload FROM snapshots WHERE range_key = ?1",
        params![range_key],
        |row| {
            Ok(StoredSnapshot {
                range_key: row.get(0)?,
                fetched_at: row.get(1)?,
                order_count: row.get(2)?,
                payload: row.get(3)?,
            })
        },
    )
    .optional()
}

// ── Fetch jobs ─────────────────────────────────────────────────────

pub fn insert_fetch_job(
    conn: &Connection,
    range_key: &str,
    source: &str,
    generation: u64,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO fetch_jobs (range_key, source, generation, status, started_at)
         VALUES (?1, ?2, ?3, 'running', datetime('now'))",
        params![range_key, source, generation as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_fetch_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    order_count: Option<i64>,
    error: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE fetch_jobs SET status = ?2, completed_at = datetime('now'),
            order_count = ?3, error = ?4
         WHERE id = ?1",
        params![job_id, status, order_count, error],
    )?;
    Ok(())
}

/// Summary numbers for the `status` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub config_keys: i64,
    pub snapshots: i64,
    pub fetch_jobs: i64,
    pub failed_jobs: i64,
    pub last_success: Option<String>,
}

pub fn store_stats(conn: &Connection) -> Result<StoreStats, rusqlite::Error> {
    let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0));
    Ok(StoreStats {
        config_keys: count("SELECT COUNT(*) FROM app_config")?,
        snapshots: count("SELECT COUNT(*) FROM snapshots")?,
        fetch_jobs: count("SELECT COUNT(*) FROM fetch_jobs")?,
        failed_jobs: count("SELECT COUNT(*) FROM fetch_jobs WHERE status = 'failed'")?,
        last_success: conn.query_row(
            "SELECT MAX(completed_at) FROM fetch_jobs WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?,
    })
}
