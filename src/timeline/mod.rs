pub mod normalize;

pub use normalize::{normalize, LifecycleEvent};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Order, OrderStatus};

/// One row of the display timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub performed_by: String,
    pub is_origin: bool,
}

impl From<LifecycleEvent> for TimelineEvent {
    fn from(e: LifecycleEvent) -> Self {
        Self {
            status: e.status,
            timestamp: e.timestamp,
            performed_by: e.actor_label,
            is_origin: e.is_origin,
        }
    }
}

/// Build the display timeline for one order: newest first, origin last.
///
/// The origin stays last even when upstream clocks put a history entry
/// before the creation timestamp. Entries with equal timestamps keep their
/// upstream relative order. Phase durations do not read this output; they
/// derive their own chronology from the raw history.
pub fn build_timeline(order: &Order) -> Vec<TimelineEvent> {
    let (mut events, origin): (Vec<LifecycleEvent>, Vec<LifecycleEvent>) =
        normalize(order).into_iter().partition(|e| !e.is_origin);

    // sort_by is stable
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    events
        .into_iter()
        .chain(origin)
        .map(TimelineEvent::from)
        .collect()
}

/// The order's current status: the chronologically newest history entry.
///
/// A `delivered_at` later than every history entry means `COMPLETED`, so
/// legacy orders report `COMPLETED` once delivered and `CREATED` otherwise.
/// Ties on the newest timestamp resolve to the later upstream record.
pub fn latest_status(order: &Order) -> OrderStatus {
    let newest = order
        .histories
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.updated_at.cmp(&b.updated_at).then(ia.cmp(ib)));
    match (newest, order.delivered_at) {
        (Some((_, h)), Some(delivered)) if delivered > h.updated_at => OrderStatus::Completed,
        (Some((_, h)), _) => h.status.clone(),
        (None, Some(_)) => OrderStatus::Completed,
        (None, None) => OrderStatus::Created,
    }
}
