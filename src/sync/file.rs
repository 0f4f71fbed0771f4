use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;
use crate::model::{null_default, parse_each, Order, PharmacyDetails};
use crate::query::DateRange;
use crate::sync::OrderSource;

/// Accepted JSON shapes for an order dump: a bare array of orders, or an
/// object carrying orders and an optional pharmacy list.
///
/// Entries stay raw until `into_parts` so a single unreadable order is
/// skipped instead of failing the whole payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OrdersPayload {
    List(Vec<serde_json::Value>),
    Wrapped {
        orders: Vec<serde_json::Value>,
        #[serde(default, deserialize_with = "null_default")]
        pharmacies: Vec<serde_json::Value>,
    },
}

impl OrdersPayload {
    pub(crate) fn into_parts(self) -> (Vec<Order>, Vec<PharmacyDetails>) {
        let (orders, pharmacies) = match self {
            OrdersPayload::List(orders) => (orders, Vec::new()),
            OrdersPayload::Wrapped { orders, pharmacies } => (orders, pharmacies),
        };
        (parse_each(orders, "order"), parse_each(pharmacies, "pharmacy"))
    }
}

pub(crate) fn index_pharmacies(list: Vec<PharmacyDetails>) -> HashMap<i64, PharmacyDetails> {
    list.into_iter().map(|p| (p.id, p)).collect()
}

/// Reads orders from a JSON file on disk. Orders outside the requested
/// range are dropped so the file can hold more than one period.
pub struct FileOrderSource {
    path: PathBuf,
}

impl FileOrderSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<(Vec<Order>, Vec<PharmacyDetails>)> {
        log::debug!("Reading orders from {}", self.path.display());
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let payload: OrdersPayload = serde_json::from_str(&raw)?;
        Ok(payload.into_parts())
    }
}

impl OrderSource for FileOrderSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch_orders(&self, range: &DateRange) -> Result<Vec<Order>> {
        let (orders, _) = self.load().await?;
        Ok(orders
            .into_iter()
            .filter(|o| range.contains_instant(o.creation_date))
            .collect())
    }

    async fn fetch_pharmacy_lookup(&self) -> Result<HashMap<i64, PharmacyDetails>> {
        let (_, pharmacies) = self.load().await?;
        Ok(index_pharmacies(pharmacies))
    }
}
