pub mod config;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;
pub mod sync;
pub mod timeline;

pub use config::Settings;
pub use error::{Error, Result};
pub use metrics::{
    compute_distribution, compute_durations, compute_metrics, compute_pharmacy_breakdown,
    summarize, DashboardSummary, DeliveryMetrics, MetricsConfig, PhaseDurations, PhaseMinutes,
    TimeDistribution,
};
pub use model::{Actor, HistoryRecord, Order, OrderStatus, PharmacyDetails};
pub use query::{
    filter_sort, DateRange, ExclusionSet, OrderQuery, Period, SortDirection, SortField, SortState,
};
pub use storage::{Database, KeyValueStore, MemoryStore};
pub use sync::{
    AnySource, FileOrderSource, HttpOrderSource, MockOrderSource, OrderSource, RefreshOutcome,
    Refresher, Snapshot, SnapshotOrigin,
};
pub use timeline::{build_timeline, latest_status, TimelineEvent};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Dashboard data for one date range after filtering.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub range: DateRange,
    pub origin: SnapshotOrigin,
    pub fetched_at: DateTime<Utc>,
    /// Set when the live fetch failed and older or sample data is shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    #[serde(flatten)]
    pub summary: DashboardSummary,
}

/// One order's display timeline with its phase durations.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTimeline {
    pub order_id: i64,
    pub code: String,
    pub pharmacy: String,
    pub status: OrderStatus,
    pub durations: PhaseDurations,
    pub events: Vec<TimelineEvent>,
}

/// Main entry point: a data source, local store and effective settings.
pub struct OrderLens<S: OrderSource> {
    db: Database,
    settings: Settings,
    refresher: Refresher<S>,
}

impl<S: OrderSource> OrderLens<S> {
    pub fn new(db: Database, source: S, settings: Settings) -> Self {
        Self {
            refresher: Refresher::new(source).with_database(db.clone()),
            db,
            settings,
        }
    }

    /// Serve sample data when the source and every cache fail.
    pub fn allow_mock(mut self, allow: bool) -> Self {
        self.refresher = self.refresher.allow_mock(allow);
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Override the metric knobs for this session only.
    pub fn set_metrics_config(&mut self, metrics: MetricsConfig) {
        self.settings.metrics = metrics;
    }

    /// Fetch (or fall back to cached data for) `range`. Returns the
    /// snapshot and, on fallback, the fetch error.
    pub async fn load(&self, range: &DateRange) -> Result<(Snapshot, Option<String>)> {
        match self.refresher.refresh(range).await? {
            RefreshOutcome::Fresh(snapshot) => Ok((snapshot, None)),
            RefreshOutcome::Fallback { snapshot, error } => Ok((snapshot, Some(error))),
            RefreshOutcome::Stale => Err(Error::Other(format!(
                "refresh for {} was superseded by a newer request",
                range.to_key()
            ))),
        }
    }

    pub async fn dashboard(&self, range: &DateRange, query: &OrderQuery) -> Result<Dashboard> {
        let (snapshot, fetch_error) = self.load(range).await?;
        let orders = filter_sort(&snapshot.orders, query);
        Ok(Dashboard {
            range: snapshot.range,
            origin: snapshot.origin,
            fetched_at: snapshot.fetched_at,
            fetch_error,
            summary: summarize(&orders, &self.settings.metrics),
        })
    }

    /// Timeline for one order in `range`.
    pub async fn timeline(&self, range: &DateRange, order_id: i64) -> Result<OrderTimeline> {
        let (snapshot, _) = self.load(range).await?;
        let order = snapshot.find_order(order_id).ok_or_else(|| {
            Error::NotFound(format!("order {order_id} in {}", range.to_key()))
        })?;
        Ok(OrderTimeline {
            order_id: order.id,
            code: order.code.clone(),
            pharmacy: order.pharmacy.name.clone(),
            status: latest_status(order),
            durations: metrics::compute_durations_with(order, self.settings.metrics.skew_policy),
            events: build_timeline(order),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn march() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    async fn lens() -> OrderLens<MockOrderSource> {
        let db = Database::open_memory().await.unwrap();
        OrderLens::new(db, MockOrderSource::new(), Settings::default())
    }

    #[tokio::test]
    async fn test_dashboard_applies_query() {
        let lens = lens().await;
        let all = lens.dashboard(&march(), &OrderQuery::new()).await.unwrap();
        assert_eq!(all.origin, SnapshotOrigin::Live("mock".into()));
        assert!(all.fetch_error.is_none());
        assert_eq!(all.summary.metrics.order_count, all.summary.rows.len() as u64);

        let excluded: ExclusionSet = all.summary.rows.iter().take(5).map(|r| r.id).collect();
        let query = OrderQuery::new().date_range(march()).exclusions(&excluded);
        let fewer = lens.dashboard(&march(), &query).await.unwrap();
        assert_eq!(fewer.summary.rows.len(), all.summary.rows.len() - 5);
        assert!(fewer.summary.rows.iter().all(|r| !excluded.contains(r.id)));
    }

    #[tokio::test]
    async fn test_timeline_lookup() {
        let lens = lens().await;
        let (snapshot, _) = lens.load(&march()).await.unwrap();
        let id = snapshot.orders[0].id;

        let timeline = lens.timeline(&march(), id).await.unwrap();
        assert_eq!(timeline.order_id, id);
        assert_eq!(timeline.events.last().map(|e| e.is_origin), Some(true));

        let err = lens.timeline(&march(), -1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dashboard_serializes_flat() {
        let lens = lens().await;
        let dash = lens.dashboard(&march(), &OrderQuery::new()).await.unwrap();
        let json = serde_json::to_value(&dash).unwrap();
        assert!(json.get("metrics").is_some());
        assert!(json.get("distribution").is_some());
        assert!(json.get("fetch_error").is_none());
    }
}
