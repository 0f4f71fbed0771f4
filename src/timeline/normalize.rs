use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Order, OrderStatus};

/// A status change in uniform shape, regardless of how the order recorded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub actor_label: String,
    /// True only for the synthetic creation event.
    pub is_origin: bool,
}

/// Map an order's history into lifecycle events, origin last.
///
/// Legacy orders (no history) get a synthetic `COMPLETED` event when a
/// delivery timestamp exists. Every order gets exactly one `CREATED` origin
/// event. Duplicate upstream records are passed through untouched.
pub fn normalize(order: &Order) -> Vec<LifecycleEvent> {
    let origin_label = order.origin_label();
    let mut events = Vec::with_capacity(order.histories.len() + 1);

    if order.histories.is_empty() {
        if let Some(delivered_at) = order.delivered_at {
            events.push(LifecycleEvent {
                status: OrderStatus::Completed,
                timestamp: delivered_at,
                actor_label: origin_label.clone(),
                is_origin: false,
            });
        }
    } else {
        events.extend(order.histories.iter().map(|h| LifecycleEvent {
            status: h.status.clone(),
            timestamp: h.updated_at,
            actor_label: h.actor.label(),
            is_origin: false,
        }));
    }

    events.push(LifecycleEvent {
        status: OrderStatus::Created,
        timestamp: order.creation_date,
        actor_label: origin_label,
        is_origin: true,
    });
    events
}
