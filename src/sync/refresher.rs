use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::query::DateRange;
use crate::storage::{repository, Database};
use crate::sync::generation::{FetchTicket, GenerationCounter};
use crate::sync::mock::MockOrderSource;
use crate::sync::{fetch_snapshot, OrderSource, Snapshot, SnapshotOrigin};

/// Result of one refresh.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Newly fetched data.
    Fresh(Snapshot),
    /// A newer refresh started while this one was in flight; its response
    /// was discarded.
    Stale,
    /// The fetch failed and older or sample data is served instead.
    Fallback { snapshot: Snapshot, error: String },
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            RefreshOutcome::Fresh(s) | RefreshOutcome::Fallback { snapshot: s, .. } => Some(s),
            RefreshOutcome::Stale => None,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            RefreshOutcome::Fresh(s) | RefreshOutcome::Fallback { snapshot: s, .. } => Some(s),
            RefreshOutcome::Stale => None,
        }
    }
}

/// Fetches snapshots for date ranges and remembers the last good one per
/// range.
///
/// Fallback order after a failed fetch: last good snapshot held in memory,
/// then the one persisted in the database, then sample data when allowed.
pub struct Refresher<S: OrderSource> {
    source: S,
    db: Option<Database>,
    generations: GenerationCounter,
    last_good: Mutex<HashMap<String, Snapshot>>,
    allow_mock: bool,
}

impl<S: OrderSource> Refresher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            db: None,
            generations: GenerationCounter::new(),
            last_good: Mutex::new(HashMap::new()),
            allow_mock: false,
        }
    }

    /// Persist good snapshots and the fetch log to `db`.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Serve the built-in sample data when nothing else is available.
    pub fn allow_mock(mut self, allow: bool) -> Self {
        self.allow_mock = allow;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn generations(&self) -> &GenerationCounter {
        &self.generations
    }

    pub async fn refresh(&self, range: &DateRange) -> Result<RefreshOutcome> {
        let ticket = self.generations.next();
        let key = range.to_key();
        let job_id = self.start_job(&key, ticket).await;

        let result = fetch_snapshot(&self.source, range).await;

        if !self.generations.is_current(ticket) {
            log::debug!(
                "Discarding response for generation {} (current is {})",
                ticket.generation(),
                self.generations.current()
            );
            self.finish_job(job_id, "stale", None, None).await;
            return Ok(RefreshOutcome::Stale);
        }

        match result {
            Ok(snapshot) => {
                let count = snapshot.orders.len() as i64;
                self.remember(&key, &snapshot)?;
                self.persist(&snapshot).await;
                self.finish_job(job_id, "completed", Some(count), None).await;
                Ok(RefreshOutcome::Fresh(snapshot))
            }
            Err(e) => {
                log::warn!("Fetch for {key} failed: {e}");
                let message = e.to_string();
                self.finish_job(job_id, "failed", None, Some(message.clone())).await;
                let snapshot = self.fallback(range, e).await?;
                Ok(RefreshOutcome::Fallback {
                    snapshot,
                    error: message,
                })
            }
        }
    }

    async fn fallback(&self, range: &DateRange, error: Error) -> Result<Snapshot> {
        let key = range.to_key();

        let in_memory = self.lock_last_good()?.get(&key).cloned();
        if let Some(mut snapshot) = in_memory {
            log::info!("Serving in-memory snapshot for {key}");
            snapshot.origin = SnapshotOrigin::Cached(format!("memory@{}", snapshot.fetched_at));
            return Ok(snapshot);
        }

        match self.load_persisted(&key).await {
            Ok(Some(mut snapshot)) => {
                log::info!("Serving stored snapshot for {key}");
                snapshot.origin =
                    SnapshotOrigin::Cached(format!("database@{}", snapshot.fetched_at));
                self.remember(&key, &snapshot)?;
                return Ok(snapshot);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Could not read stored snapshot for {key}: {e}"),
        }

        if self.allow_mock {
            log::warn!("No cached data for {key}; serving sample data");
            let mock = MockOrderSource::new();
            let mut snapshot = Snapshot {
                range: *range,
                orders: mock.orders_for(range),
                pharmacies: mock.pharmacies(),
                fetched_at: Utc::now(),
                origin: SnapshotOrigin::Mock,
            };
            snapshot.enrich_pharmacy_names();
            return Ok(snapshot);
        }

        Err(error)
    }

    fn lock_last_good(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Snapshot>>> {
        self.last_good
            .lock()
            .map_err(|_| Error::Other("snapshot cache lock poisoned".into()))
    }

    fn remember(&self, key: &str, snapshot: &Snapshot) -> Result<()> {
        self.lock_last_good()?
            .insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn persist(&self, snapshot: &Snapshot) {
        let Some(db) = &self.db else { return };
        let payload = match serde_json::to_string(snapshot) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Could not serialize snapshot: {e}");
                return;
            }
        };
        let range = snapshot.range;
        let fetched_at = snapshot.fetched_at.to_rfc3339();
        let count = snapshot.orders.len() as i64;
        let result = db
            .writer()
            .call(move |conn| {
                repository::save_snapshot(
                    conn,
                    &range.to_key(),
                    &range.start.to_string(),
                    &range.end.to_string(),
                    &fetched_at,
                    count,
                    &payload,
                )
            })
            .await;
        if let Err(e) = result {
            log::warn!("Could not store snapshot: {e}");
        }
    }

    async fn load_persisted(&self, key: &str) -> Result<Option<Snapshot>> {
        let Some(db) = &self.db else { return Ok(None) };
        let key = key.to_string();
        let stored = db
            .reader()
            .call(move |conn| repository::load_snapshot(conn, &key))
            .await?;
        match stored {
            Some(row) => Ok(Some(serde_json::from_str(&row.payload)?)),
            None => Ok(None),
        }
    }

    async fn start_job(&self, key: &str, ticket: FetchTicket) -> Option<i64> {
        let db = self.db.as_ref()?;
        let key = key.to_string();
        let source = self.source.name().to_string();
        let generation = ticket.generation();
        match db
            .writer()
            .call(move |conn| repository::insert_fetch_job(conn, &key, &source, generation))
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Could not record fetch job: {e}");
                None
            }
        }
    }

    async fn finish_job(
        &self,
        job_id: Option<i64>,
        status: &'static str,
        order_count: Option<i64>,
        error: Option<String>,
    ) {
        let (Some(db), Some(job_id)) = (&self.db, job_id) else {
            return;
        };
        let result = db
            .writer()
            .call(move |conn| {
                repository::update_fetch_job(conn, job_id, status, order_count, error.as_deref())
            })
            .await;
        if let Err(e) = result {
            log::warn!("Could not update fetch job {job_id}: {e}");
        }
    }
}
