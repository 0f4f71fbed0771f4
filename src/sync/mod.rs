pub mod file;
pub mod generation;
pub mod http;
pub mod mock;
pub mod rate_limit;
pub mod refresher;

pub use file::FileOrderSource;
pub use generation::{FetchTicket, GenerationCounter};
pub use http::HttpOrderSource;
pub use mock::MockOrderSource;
pub use refresher::{RefreshOutcome, Refresher};

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Order, PharmacyDetails};
use crate::query::DateRange;

/// Where a snapshot's data came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "source")]
pub enum SnapshotOrigin {
    /// Freshly fetched from the named source.
    Live(String),
    /// Last-known-good data served after a failed fetch.
    Cached(String),
    /// Built-in sample data.
    Mock,
}

/// Orders for one date range plus the pharmacy lookup fetched alongside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub range: DateRange,
    pub orders: Vec<Order>,
    #[serde(default)]
    pub pharmacies: HashMap<i64, PharmacyDetails>,
    pub fetched_at: DateTime<Utc>,
    pub origin: SnapshotOrigin,
}

impl Snapshot {
    /// Fill empty pharmacy names on orders from the lookup.
    pub fn enrich_pharmacy_names(&mut self) {
        for order in &mut self.orders {
            if order.pharmacy.name.trim().is_empty() {
                if let Some(details) = self.pharmacies.get(&order.pharmacy.id) {
                    order.pharmacy.name = details.name.clone();
                }
            }
        }
    }

    pub fn find_order(&self, id: i64) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }
}

/// Upstream provider of orders and pharmacy details.
pub trait OrderSource: Send + Sync {
    /// Short name recorded in the fetch log.
    fn name(&self) -> &str;

    /// Orders created within `range`. Failure fails the whole fetch.
    fn fetch_orders(&self, range: &DateRange) -> impl Future<Output = Result<Vec<Order>>> + Send;

    /// Pharmacy details keyed by id. Best effort.
    fn fetch_pharmacy_lookup(
        &self,
    ) -> impl Future<Output = Result<HashMap<i64, PharmacyDetails>>> + Send;
}

/// Fetch orders and the pharmacy lookup concurrently.
///
/// An orders failure is returned as-is. A lookup failure is logged and
/// replaced with an empty map.
pub async fn fetch_snapshot<S: OrderSource>(source: &S, range: &DateRange) -> Result<Snapshot> {
    log::info!("Fetching orders for {} from {}", range.to_key(), source.name());
    let (orders, lookup) = tokio::join!(source.fetch_orders(range), source.fetch_pharmacy_lookup());

    let orders = orders?;
    let pharmacies = lookup.unwrap_or_else(|e| {
        log::warn!("Pharmacy lookup failed, continuing without it: {e}");
        HashMap::new()
    });

    let mut snapshot = Snapshot {
        range: *range,
        orders,
        pharmacies,
        fetched_at: Utc::now(),
        origin: SnapshotOrigin::Live(source.name().to_string()),
    };
    snapshot.enrich_pharmacy_names();
    log::info!(
        "Fetched {} orders, {} pharmacies",
        snapshot.orders.len(),
        snapshot.pharmacies.len()
    );
    Ok(snapshot)
}

/// Runtime-selected source, so the CLI can pick one without boxing.
pub enum AnySource {
    Http(HttpOrderSource),
    File(FileOrderSource),
    Mock(MockOrderSource),
}

impl OrderSource for AnySource {
    fn name(&self) -> &str {
        match self {
            AnySource::Http(s) => s.name(),
            AnySource::File(s) => s.name(),
            AnySource::Mock(s) => s.name(),
        }
    }

    async fn fetch_orders(&self, range: &DateRange) -> Result<Vec<Order>> {
        match self {
            AnySource::Http(s) => s.fetch_orders(range).await,
            AnySource::File(s) => s.fetch_orders(range).await,
            AnySource::Mock(s) => s.fetch_orders(range).await,
        }
    }

    async fn fetch_pharmacy_lookup(&self) -> Result<HashMap<i64, PharmacyDetails>> {
        match self {
            AnySource::Http(s) => s.fetch_pharmacy_lookup().await,
            AnySource::File(s) => s.fetch_pharmacy_lookup().await,
            AnySource::Mock(s) => s.fetch_pharmacy_lookup().await,
        }
    }
}
