//! Phase durations derived from an order's raw status history.
//!
//! Each function reads the raw `histories` list (never the display
//! timeline) and orders it chronologically on its own, so the result does
//! not depend on how upstream sorted the records.

use chrono::{DateTime, Utc};

use super::types::{PhaseDurations, PhaseMinutes, SkewPolicy};
use crate::date_util::floor_minutes;
use crate::model::{Order, OrderStatus};

/// Earliest timestamp at which the order entered `status`.
fn first_transition(order: &Order, status: &OrderStatus) -> Option<DateTime<Utc>> {
    order
        .histories
        .iter()
        .filter(|h| &h.status == status)
        .map(|h| h.updated_at)
        .min()
}

/// Delivery completion: the `delivered_at` field, else the latest
/// `COMPLETED` history entry.
pub fn completion_time(order: &Order) -> Option<DateTime<Utc>> {
    order.delivered_at.or_else(|| {
        order
            .histories
            .iter()
            .filter(|h| h.status == OrderStatus::Completed)
            .map(|h| h.updated_at)
            .max()
    })
}

fn between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> PhaseMinutes {
    match (from, to) {
        (Some(from), Some(to)) => PhaseMinutes::Computed(floor_minutes(from, to)),
        _ => PhaseMinutes::NotComputable,
    }
}

/// Creation to the first `READY`. Not computable unless `READY` comes
/// strictly after creation.
pub fn preparation_time(order: &Order) -> PhaseMinutes {
    match first_transition(order, &OrderStatus::Ready) {
        Some(ready) if ready > order.creation_date => {
            PhaseMinutes::Computed(floor_minutes(order.creation_date, ready))
        }
        _ => PhaseMinutes::NotComputable,
    }
}

/// First `READY` to first `GIVEN_TO_COURIER`.
pub fn courier_waiting_time(order: &Order) -> PhaseMinutes {
    between(
        first_transition(order, &OrderStatus::Ready),
        first_transition(order, &OrderStatus::GivenToCourier),
    )
}

/// First `GIVEN_TO_COURIER` to delivery completion.
pub fn in_transit_time(order: &Order) -> PhaseMinutes {
    between(
        first_transition(order, &OrderStatus::GivenToCourier),
        completion_time(order),
    )
}

/// Creation to delivery completion.
pub fn total_time(order: &Order) -> PhaseMinutes {
    between(Some(order.creation_date), completion_time(order))
}

/// All four durations, negative values propagated.
pub fn compute_durations(order: &Order) -> PhaseDurations {
    compute_durations_with(order, SkewPolicy::Propagate)
}

pub fn compute_durations_with(order: &Order, policy: SkewPolicy) -> PhaseDurations {
    let apply = |p: PhaseMinutes| match (policy, p) {
        (SkewPolicy::Clamp, PhaseMinutes::Computed(m)) if m < 0 => PhaseMinutes::Computed(0),
        _ => p,
    };
    PhaseDurations {
        preparation: apply(preparation_time(order)),
        courier_waiting: apply(courier_waiting_time(order)),
        in_transit: apply(in_transit_time(order)),
        total: apply(total_time(order)),
    }
}
