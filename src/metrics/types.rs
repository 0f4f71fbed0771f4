use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Error;
use crate::model::OrderStatus;

/// A phase duration in whole minutes, or the fact that it could not be
/// derived from the order's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "Option<i64>")]
pub enum PhaseMinutes {
    Computed(i64),
    NotComputable,
}

impl PhaseMinutes {
    pub fn minutes(self) -> Option<i64> {
        match self {
            PhaseMinutes::Computed(m) => Some(m),
            PhaseMinutes::NotComputable => None,
        }
    }

    /// Collapse to the zero-sentinel form used by the detail table export.
    pub fn as_legacy_minutes(self) -> i64 {
        self.minutes().unwrap_or(0)
    }

    pub fn is_computed(self) -> bool {
        matches!(self, PhaseMinutes::Computed(_))
    }

    /// Strictly positive computed minutes.
    pub fn positive(self) -> Option<i64> {
        self.minutes().filter(|m| *m > 0)
    }
}

impl From<PhaseMinutes> for Option<i64> {
    fn from(p: PhaseMinutes) -> Self {
        p.minutes()
    }
}

/// The four phase durations of one order. `total` is derived on its own,
/// not summed from the phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseDurations {
    pub preparation: PhaseMinutes,
    pub courier_waiting: PhaseMinutes,
    pub in_transit: PhaseMinutes,
    pub total: PhaseMinutes,
}

/// What to do with negative durations produced by skewed upstream clocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewPolicy {
    /// Keep negative minutes as reported.
    #[default]
    Propagate,
    /// Floor negative minutes at zero.
    Clamp,
}

impl FromStr for SkewPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "propagate" => Ok(SkewPolicy::Propagate),
            "clamp" => Ok(SkewPolicy::Clamp),
            other => Err(Error::Config(format!(
                "unknown skew policy '{other}' (expected propagate or clamp)"
            ))),
        }
    }
}

/// Which orders count in the denominator of an average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageMode {
    /// Not-computable durations count as zero.
    #[default]
    IncludeNotComputable,
    /// Only computed durations are averaged.
    ComputedOnly,
}

impl FromStr for AverageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include" | "include_not_computable" => Ok(AverageMode::IncludeNotComputable),
            "computed" | "computed_only" => Ok(AverageMode::ComputedOnly),
            other => Err(Error::Config(format!(
                "unknown average mode '{other}' (expected include or computed)"
            ))),
        }
    }
}

/// Knobs for duration and KPI computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsConfig {
    pub skew_policy: SkewPolicy,
    pub average_mode: AverageMode,
    /// Orders at or under this many total minutes are on time.
    pub on_time_threshold_minutes: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            skew_policy: SkewPolicy::default(),
            average_mode: AverageMode::default(),
            on_time_threshold_minutes: 60,
        }
    }
}

/// Population-level delivery KPIs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryMetrics {
    pub avg_total_time: i64,
    pub avg_preparation_time: i64,
    pub avg_courier_waiting_time: i64,
    pub avg_delivery_time: i64,
    /// 0-100, over orders with a positive total.
    pub on_time_percentage: u32,
    pub order_count: u64,
    /// Orders with a positive total time.
    pub computable_count: u64,
}

/// Fixed four-bucket histogram of total delivery minutes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeDistribution {
    #[serde(rename = "0-30")]
    pub up_to_30: u64,
    #[serde(rename = "30-60")]
    pub up_to_60: u64,
    #[serde(rename = "60-90")]
    pub up_to_90: u64,
    #[serde(rename = "90+")]
    pub over_90: u64,
}

impl TimeDistribution {
    pub const LABELS: [&'static str; 4] = ["0-30", "30-60", "60-90", "90+"];

    pub fn buckets(&self) -> [(&'static str, u64); 4] {
        [
            (Self::LABELS[0], self.up_to_30),
            (Self::LABELS[1], self.up_to_60),
            (Self::LABELS[2], self.up_to_90),
            (Self::LABELS[3], self.over_90),
        ]
    }

    pub fn total(&self) -> u64 {
        self.up_to_30 + self.up_to_60 + self.up_to_90 + self.over_90
    }
}

/// KPIs for a single pharmacy.
#[derive(Debug, Clone, Serialize)]
pub struct PharmacyMetrics {
    pub pharmacy_id: i64,
    pub pharmacy_name: String,
    pub metrics: DeliveryMetrics,
}

/// One row of the order detail table.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRow {
    pub id: i64,
    pub code: String,
    pub pharmacy: String,
    pub customer: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub invoice_total: f64,
    pub durations: PhaseDurations,
}

/// Everything the dashboard renders for one filtered snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub metrics: DeliveryMetrics,
    pub distribution: TimeDistribution,
    pub pharmacies: Vec<PharmacyMetrics>,
    pub rows: Vec<OrderRow>,
}
