pub mod durations;
pub mod types;

pub use durations::{
    compute_durations, compute_durations_with, courier_waiting_time, in_transit_time,
    preparation_time, total_time,
};
pub use types::*;

use std::collections::BTreeMap;

use crate::model::Order;
use crate::query::builder::locale_cmp;
use crate::timeline::latest_status;

/// Delivery KPIs over `orders` with the default configuration.
pub fn compute_metrics(orders: &[Order]) -> DeliveryMetrics {
    compute_metrics_with(orders, &MetricsConfig::default())
}

pub fn compute_metrics_with(orders: &[Order], config: &MetricsConfig) -> DeliveryMetrics {
    let durations: Vec<PhaseDurations> = orders
        .iter()
        .map(|o| compute_durations_with(o, config.skew_policy))
        .collect();
    metrics_from_durations(&durations, config)
}

/// Histogram of total minutes over `orders` with the default configuration.
pub fn compute_distribution(orders: &[Order]) -> TimeDistribution {
    compute_distribution_with(orders, &MetricsConfig::default())
}

pub fn compute_distribution_with(orders: &[Order], config: &MetricsConfig) -> TimeDistribution {
    let durations: Vec<PhaseDurations> = orders
        .iter()
        .map(|o| compute_durations_with(o, config.skew_policy))
        .collect();
    distribution_from_durations(&durations)
}

/// KPIs per pharmacy, ordered by pharmacy name.
pub fn compute_pharmacy_breakdown(orders: &[Order], config: &MetricsConfig) -> Vec<PharmacyMetrics> {
    let mut groups: BTreeMap<i64, (String, Vec<PhaseDurations>)> = BTreeMap::new();
    for order in orders {
        let entry = groups
            .entry(order.pharmacy.id)
            .or_insert_with(|| (order.pharmacy.name.clone(), Vec::new()));
        entry
            .1
            .push(compute_durations_with(order, config.skew_policy));
    }

    let mut breakdown: Vec<PharmacyMetrics> = groups
        .into_iter()
        .map(|(pharmacy_id, (pharmacy_name, durations))| PharmacyMetrics {
            pharmacy_id,
            pharmacy_name,
            metrics: metrics_from_durations(&durations, config),
        })
        .collect();
    breakdown.sort_by(|a, b| locale_cmp(&a.pharmacy_name, &b.pharmacy_name));
    breakdown
}

/// Metrics, distribution, per-pharmacy breakdown and detail rows for an
/// already filtered order set.
pub fn summarize(orders: &[Order], config: &MetricsConfig) -> DashboardSummary {
    let rows: Vec<OrderRow> = orders
        .iter()
        .map(|o| OrderRow {
            id: o.id,
            code: o.code.clone(),
            pharmacy: o.pharmacy.name.clone(),
            customer: o.customer.full_name(),
            status: latest_status(o),
            created_at: o.creation_date,
            delivered_at: o.delivered_at,
            invoice_total: o.invoice_total,
            durations: compute_durations_with(o, config.skew_policy),
        })
        .collect();
    let durations: Vec<PhaseDurations> = rows.iter().map(|r| r.durations).collect();

    DashboardSummary {
        metrics: metrics_from_durations(&durations, config),
        distribution: distribution_from_durations(&durations),
        pharmacies: compute_pharmacy_breakdown(orders, config),
        rows,
    }
}

// ── Internal helpers ───────────────────────────────────────────────

fn metrics_from_durations(durations: &[PhaseDurations], config: &MetricsConfig) -> DeliveryMetrics {
    let avg = |field: fn(&PhaseDurations) -> PhaseMinutes| {
        mean(durations.iter().map(field), config.average_mode)
    };

    let totals: Vec<i64> = durations.iter().filter_map(|d| d.total.positive()).collect();
    let on_time = totals
        .iter()
        .filter(|m| **m <= config.on_time_threshold_minutes)
        .count();
    let on_time_percentage = if totals.is_empty() {
        0
    } else {
        (on_time as f64 / totals.len() as f64 * 100.0).round() as u32
    };

    DeliveryMetrics {
        avg_total_time: avg(|d| d.total),
        avg_preparation_time: avg(|d| d.preparation),
        avg_courier_waiting_time: avg(|d| d.courier_waiting),
        avg_delivery_time: avg(|d| d.in_transit),
        on_time_percentage,
        order_count: durations.len() as u64,
        computable_count: totals.len() as u64,
    }
}

/// Average in whole minutes. Halves round toward positive infinity, so
/// -2.5 becomes -2 and 2.5 becomes 3.
fn mean(values: impl Iterator<Item = PhaseMinutes>, mode: AverageMode) -> i64 {
    let mut sum: i64 = 0;
    let mut count: u64 = 0;
    for v in values {
        match (v, mode) {
            (PhaseMinutes::Computed(m), _) => {
                sum += m;
                count += 1;
            }
            (PhaseMinutes::NotComputable, AverageMode::IncludeNotComputable) => count += 1,
            (PhaseMinutes::NotComputable, AverageMode::ComputedOnly) => {}
        }
    }
    if count == 0 {
        return 0;
    }
    (sum as f64 / count as f64 + 0.5).floor() as i64
}

fn distribution_from_durations(durations: &[PhaseDurations]) -> TimeDistribution {
    let mut dist = TimeDistribution::default();
    for total in durations.iter().filter_map(|d| d.total.positive()) {
        match total {
            1..=30 => dist.up_to_30 += 1,
            31..=60 => dist.up_to_60 += 1,
            61..=90 => dist.up_to_90 += 1,
            _ => dist.over_90 += 1,
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Actor, OrderStatus, PharmacyRef};
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn pharmacy(id: i64, name: &str) -> PharmacyRef {
        PharmacyRef {
            id,
            name: name.into(),
        }
    }

    /// Legacy order taking `minutes` from creation to delivery.
    fn delivered_in(id: i64, minutes: i64) -> Order {
        Order::new(id, "L", pharmacy(1, "Central"), t(8, 0))
            .delivered(t(8, 0) + chrono::Duration::minutes(minutes))
    }

    fn scenario_a() -> Order {
        Order::new(1, "A-1", pharmacy(1, "Central"), t(10, 0))
            .history(OrderStatus::Ready, t(10, 20), Actor::Unknown)
            .history(OrderStatus::GivenToCourier, t(10, 25), Actor::Unknown)
            .delivered(t(10, 50))
    }

    #[test]
    fn test_scenario_a_metrics() {
        let orders = vec![scenario_a()];
        let m = compute_metrics(&orders);
        assert_eq!(m.avg_preparation_time, 20);
        assert_eq!(m.avg_courier_waiting_time, 5);
        assert_eq!(m.avg_delivery_time, 25);
        assert_eq!(m.avg_total_time, 50);
        assert_eq!(m.on_time_percentage, 100);

        let d = compute_distribution(&orders);
        assert_eq!(d.up_to_60, 1);
        assert_eq!(d.total(), 1);
    }

    #[test]
    fn test_empty_collection() {
        let m = compute_metrics(&[]);
        assert_eq!(m, DeliveryMetrics::default());
        assert_eq!(m.on_time_percentage, 0);
        assert_eq!(compute_distribution(&[]).total(), 0);
    }

    #[test]
    fn test_averages_include_not_computable_by_default() {
        // Scenario A (prep 20) plus a legacy order with no preparation phase.
        let orders = vec![scenario_a(), delivered_in(2, 30)];
        let m = compute_metrics(&orders);
        assert_eq!(m.avg_preparation_time, 10);
        assert_eq!(m.avg_total_time, 40);

        let config = MetricsConfig {
            average_mode: AverageMode::ComputedOnly,
            ..MetricsConfig::default()
        };
        let m = compute_metrics_with(&orders, &config);
        assert_eq!(m.avg_preparation_time, 20);
        assert_eq!(m.avg_total_time, 40);
    }

    #[test]
    fn test_averages_round_to_nearest() {
        let orders = vec![delivered_in(1, 10), delivered_in(2, 11)];
        assert_eq!(compute_metrics(&orders).avg_total_time, 11); // 10.5 rounds up
        let orders = vec![delivered_in(1, 10), delivered_in(2, 10), delivered_in(3, 11)];
        assert_eq!(compute_metrics(&orders).avg_total_time, 10);
    }

    #[test]
    fn test_negative_half_rounds_up() {
        let values = [PhaseMinutes::Computed(-2), PhaseMinutes::Computed(-3)];
        assert_eq!(mean(values.into_iter(), AverageMode::ComputedOnly), -2);
        let values = [PhaseMinutes::Computed(-4), PhaseMinutes::Computed(-5)];
        assert_eq!(mean(values.into_iter(), AverageMode::ComputedOnly), -4);
        let values = [PhaseMinutes::Computed(-7), PhaseMinutes::NotComputable];
        assert_eq!(mean(values.into_iter(), AverageMode::IncludeNotComputable), -3);
    }

    #[test]
    fn test_on_time_percentage_ignores_non_computable() {
        let undelivered = Order::new(9, "U", pharmacy(1, "Central"), t(8, 0));
        let orders = vec![
            delivered_in(1, 45),
            delivered_in(2, 60),
            delivered_in(3, 61),
            undelivered,
        ];
        let m = compute_metrics(&orders);
        assert_eq!(m.computable_count, 3);
        assert_eq!(m.order_count, 4);
        assert_eq!(m.on_time_percentage, 67); // 2 of 3
    }

    #[test]
    fn test_on_time_percentage_bounds() {
        let collections: Vec<Vec<Order>> = vec![
            vec![delivered_in(1, 5)],
            vec![delivered_in(1, 500)],
            vec![delivered_in(1, 0)],
            vec![delivered_in(1, 5), delivered_in(2, 500), delivered_in(3, 70)],
        ];
        for orders in collections {
            let pct = compute_metrics(&orders).on_time_percentage;
            assert!(pct <= 100, "percentage {pct} out of range");
        }
        assert_eq!(compute_metrics(&[delivered_in(1, 0)]).on_time_percentage, 0);
    }

    #[test]
    fn test_bucket_boundaries_close_on_lower_bucket() {
        let orders = vec![
            delivered_in(1, 30),
            delivered_in(2, 31),
            delivered_in(3, 60),
            delivered_in(4, 60),
            delivered_in(5, 90),
            delivered_in(6, 91),
        ];
        let d = compute_distribution(&orders);
        assert_eq!(d.up_to_30, 1);
        assert_eq!(d.up_to_60, 3);
        assert_eq!(d.up_to_90, 1);
        assert_eq!(d.over_90, 1);
    }

    #[test]
    fn test_histogram_sums_to_positive_totals() {
        let undelivered = Order::new(9, "U", pharmacy(1, "Central"), t(8, 0));
        let instant = delivered_in(8, 0);
        let orders = vec![
            delivered_in(1, 12),
            delivered_in(2, 75),
            delivered_in(3, 200),
            undelivered,
            instant,
        ];
        let d = compute_distribution(&orders);
        let m = compute_metrics(&orders);
        assert_eq!(d.total(), 3);
        assert_eq!(d.total(), m.computable_count);
    }

    #[test]
    fn test_skewed_totals_excluded_from_histogram() {
        let skewed = Order::new(1, "S", pharmacy(1, "Central"), t(10, 0)).delivered(t(9, 50));
        let orders = vec![skewed];

        let m = compute_metrics(&orders);
        assert_eq!(m.avg_total_time, -10);
        assert_eq!(m.computable_count, 0);
        assert_eq!(compute_distribution(&orders).total(), 0);

        let clamp = MetricsConfig {
            skew_policy: SkewPolicy::Clamp,
            ..MetricsConfig::default()
        };
        assert_eq!(compute_metrics_with(&orders, &clamp).avg_total_time, 0);
    }

    #[test]
    fn test_custom_on_time_threshold() {
        let orders = vec![delivered_in(1, 40), delivered_in(2, 50)];
        let config = MetricsConfig {
            on_time_threshold_minutes: 45,
            ..MetricsConfig::default()
        };
        assert_eq!(compute_metrics_with(&orders, &config).on_time_percentage, 50);
    }

    #[test]
    fn test_pharmacy_breakdown() {
        let mut north = delivered_in(1, 20);
        north.pharmacy = pharmacy(2, "north pharmacy");
        let mut central = delivered_in(2, 40);
        central.pharmacy = pharmacy(1, "Central");
        let mut central_late = delivered_in(3, 100);
        central_late.pharmacy = pharmacy(1, "Central");

        let breakdown =
            compute_pharmacy_breakdown(&[north, central, central_late], &MetricsConfig::default());
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].pharmacy_name, "Central");
        assert_eq!(breakdown[0].metrics.avg_total_time, 70);
        assert_eq!(breakdown[0].metrics.on_time_percentage, 50);
        assert_eq!(breakdown[1].pharmacy_name, "north pharmacy");
    }

    #[test]
    fn test_summarize() {
        let orders = vec![scenario_a(), delivered_in(2, 95)];
        let summary = summarize(&orders, &MetricsConfig::default());
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.rows[0].status, OrderStatus::Completed);
        assert_eq!(summary.rows[1].status, OrderStatus::Completed);
        assert_eq!(summary.distribution.over_90, 1);
        assert_eq!(summary.metrics.order_count, 2);
        assert_eq!(summary.pharmacies.len(), 1);
    }
}
