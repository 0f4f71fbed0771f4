pub mod actor;
pub mod status;

pub use actor::{Actor, HistoryRecord};
pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Reads an explicit `null` the same as a missing field.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse each element on its own. Elements that do not fit `T` are logged
/// and skipped so one bad entry does not sink the rest.
pub(crate) fn parse_each<T: DeserializeOwned>(items: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("Skipping malformed {what} at index {idx}: {e}");
                None
            }
        })
        .collect()
}

fn lenient_histories<'de, D>(deserializer: D) -> Result<Vec<HistoryRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<serde_json::Value> = null_default(deserializer)?;
    Ok(parse_each(raw, "history record"))
}

/// Pharmacy an order is fulfilled by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PharmacyRef {
    #[serde(default, deserialize_with = "null_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
}

/// Customer who placed the order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    #[serde(default, deserialize_with = "null_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub last_name: String,
}

impl CustomerRef {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// A delivery order with its raw status history.
///
/// Orders with an empty `histories` list are legacy orders: only the
/// creation and delivery timestamps are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub code: String,
    #[serde(default, deserialize_with = "null_default")]
    pub pharmacy: PharmacyRef,
    #[serde(default, deserialize_with = "null_default")]
    pub customer: CustomerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_location_name: Option<String>,
    pub creation_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// Records that cannot be read are dropped individually.
    #[serde(default, deserialize_with = "lenient_histories")]
    pub histories: Vec<HistoryRecord>,
    #[serde(default, deserialize_with = "null_default")]
    pub invoice_total: f64,
}

impl Order {
    pub fn new(id: i64, code: &str, pharmacy: PharmacyRef, creation_date: DateTime<Utc>) -> Self {
        Self {
            id,
            code: code.to_string(),
            pharmacy,
            customer: CustomerRef::default(),
            pickup_location_name: None,
            creation_date,
            delivered_at: None,
            histories: Vec::new(),
            invoice_total: 0.0,
        }
    }

    pub fn customer(mut self, first_name: &str, last_name: &str) -> Self {
        self.customer = CustomerRef {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        self
    }

    pub fn pickup_location(mut self, name: &str) -> Self {
        self.pickup_location_name = Some(name.to_string());
        self
    }

    pub fn delivered(mut self, at: DateTime<Utc>) -> Self {
        self.delivered_at = Some(at);
        self
    }

    pub fn invoice(mut self, total: f64) -> Self {
        self.invoice_total = total;
        self
    }

    /// Append a raw history record, preserving upstream order.
    pub fn history(mut self, status: OrderStatus, at: DateTime<Utc>, actor: Actor) -> Self {
        self.histories.push(HistoryRecord {
            status,
            updated_at: at,
            actor,
        });
        self
    }

    pub fn is_legacy(&self) -> bool {
        self.histories.is_empty()
    }

    /// Label used for the synthetic creation event: customer name and
    /// pickup location (falling back to the pharmacy name).
    pub fn origin_label(&self) -> String {
        let location = self
            .pickup_location_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.pharmacy.name);
        actor::join_labels(&self.customer.full_name(), location)
    }
}

/// Extra pharmacy information from the pharmacy lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyDetails {
    pub id: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}
