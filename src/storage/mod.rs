pub mod kv;
pub mod repository;

pub use kv::{KeyValueStore, MemoryStore};

use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode for concurrent access. The writer serializes writes via
/// `tokio_rusqlite`'s internal channel; the reader can proceed without blocking.
///
/// It holds settings and cached snapshots only; the order API stays the
/// source of truth.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at the default path (`~/.orderlens/orderlens.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".orderlens");
        std::fs::create_dir_all(&dir)?;
        Self::open_at(dir.join("orderlens.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening database at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            let migrations = Migrations::new(vec![M::up(include_str!(
                "migrations/001_initial.sql"
            ))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA busy_timeout=5000;")?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    pub async fn stats(&self) -> Result<repository::StoreStats> {
        let stats = self.reader.call(|conn| repository::store_stats(conn)).await?;
        Ok(stats)
    }
}
