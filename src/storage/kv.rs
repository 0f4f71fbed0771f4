use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

/// String key/value persistence for settings.
///
/// Values are stored verbatim. Anything structured is serialized by the
/// caller before it gets here.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;
    /// Returns true if the key existed.
    fn remove(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local store, used by tests and `--db :memory:` style runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let value = self
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        let removed = self
            .writer()
            .call(move |conn| repository::delete_config(conn, &key))
            .await?;
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.writer()
            .call(|conn| repository::clear_config(conn))
            .await?;
        Ok(())
    }
}
