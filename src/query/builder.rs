use std::cmp::Ordering;
use std::str::FromStr;

use serde::Serialize;

use super::exclusion::ExclusionSet;
use super::period::{DateRange, Period};
use crate::error::Error;
use crate::metrics::{total_time, OrderRow};
use crate::model::Order;
use crate::timeline::latest_status;

/// Compare strings the way a user reading the table expects: case-folded
/// first, raw text only to break ties.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .eq(b.trim().chars().flat_map(char::to_lowercase))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(Error::Config(format!("unknown sort direction: {other}"))),
        }
    }
}

/// Sortable columns of the order detail table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    Code,
    Pharmacy,
    Customer,
    Status,
    Created,
    Delivered,
    InvoiceTotal,
    TotalMinutes,
}

impl SortField {
    /// Missing values (no delivery, no total) order before present ones.
    fn compare(self, a: &Order, b: &Order) -> Ordering {
        match self {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Code => locale_cmp(&a.code, &b.code),
            SortField::Pharmacy => locale_cmp(&a.pharmacy.name, &b.pharmacy.name),
            SortField::Customer => locale_cmp(&a.customer.full_name(), &b.customer.full_name()),
            SortField::Status => {
                let (sa, sb) = (latest_status(a), latest_status(b));
                sa.rank()
                    .cmp(&sb.rank())
                    .then_with(|| locale_cmp(sa.as_str(), sb.as_str()))
            }
            SortField::Created => a.creation_date.cmp(&b.creation_date),
            SortField::Delivered => a.delivered_at.cmp(&b.delivered_at),
            SortField::InvoiceTotal => a.invoice_total.total_cmp(&b.invoice_total),
            SortField::TotalMinutes => total_time(a).minutes().cmp(&total_time(b).minutes()),
        }
    }
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "id" => Ok(SortField::Id),
            "code" => Ok(SortField::Code),
            "pharmacy" => Ok(SortField::Pharmacy),
            "customer" => Ok(SortField::Customer),
            "status" => Ok(SortField::Status),
            "created" | "creation_date" => Ok(SortField::Created),
            "delivered" | "delivered_at" => Ok(SortField::Delivered),
            "invoice" | "invoice_total" => Ok(SortField::InvoiceTotal),
            "total" | "total_minutes" => Ok(SortField::TotalMinutes),
            other => Err(Error::Config(format!("unknown sort field: {other}"))),
        }
    }
}

/// Column sort state of the detail table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortState {
    column: Option<(SortField, SortDirection)>,
}

impl SortState {
    pub fn by(field: SortField, direction: SortDirection) -> Self {
        Self {
            column: Some((field, direction)),
        }
    }

    pub fn column(&self) -> Option<(SortField, SortDirection)> {
        self.column
    }

    /// Column header activation: the same column cycles
    /// ascending → descending → unsorted; another column starts ascending.
    pub fn toggle(&mut self, field: SortField) {
        self.column = match self.column {
            Some((f, SortDirection::Ascending)) if f == field => {
                Some((field, SortDirection::Descending))
            }
            Some((f, SortDirection::Descending)) if f == field => None,
            _ => Some((field, SortDirection::Ascending)),
        };
    }
}

/// Builder for the order filter and sort pipeline.
///
/// Stages run in order: date range, pharmacy multi-select, exclusion set,
/// then sort. Every stage is optional.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    date_range: Option<DateRange>,
    pharmacies: Vec<String>,
    exclusions: ExclusionSet,
    sort: SortState,
    pharmacy_sort: Option<SortDirection>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn period(self, period: &Period) -> Self {
        self.date_range(period.date_range())
    }

    /// Keep only orders from these pharmacies. An empty list keeps all.
    pub fn pharmacies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pharmacies = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclusions(mut self, set: &ExclusionSet) -> Self {
        self.exclusions = set.clone();
        self
    }

    pub fn sort(mut self, state: SortState) -> Self {
        self.sort = state;
        self
    }

    /// Sort by pharmacy name; overrides the column sort while set.
    pub fn pharmacy_sort(mut self, direction: Option<SortDirection>) -> Self {
        self.pharmacy_sort = direction;
        self
    }

    fn matches(&self, order: &Order) -> bool {
        if let Some(range) = &self.date_range {
            if !range.contains_instant(order.creation_date) {
                return false;
            }
        }
        if !self.pharmacies.is_empty()
            && !self
                .pharmacies
                .iter()
                .any(|p| eq_ignore_case(p, &order.pharmacy.name))
        {
            return false;
        }
        !self.exclusions.contains(order.id)
    }

    /// Run the pipeline. The sort is stable: ties keep their input order.
    pub fn apply(&self, orders: &[Order]) -> Vec<Order> {
        let mut result: Vec<Order> = orders.iter().filter(|o| self.matches(o)).cloned().collect();

        if let Some(direction) = self.pharmacy_sort {
            result.sort_by(|a, b| direction.apply(SortField::Pharmacy.compare(a, b)));
        } else if let Some((field, direction)) = self.sort.column() {
            result.sort_by(|a, b| direction.apply(field.compare(a, b)));
        }

        log::debug!(
            "Order query kept {} of {} orders ({} excluded ids)",
            result.len(),
            orders.len(),
            self.exclusions.len()
        );
        result
    }
}

/// Filter and sort `orders` with `query`.
pub fn filter_sort(orders: &[Order], query: &OrderQuery) -> Vec<Order> {
    query.apply(orders)
}

/// Render detail rows as CSV. Durations use the zero-for-unknown form of
/// the dashboard's spreadsheet export.
pub fn rows_to_csv(rows: &[OrderRow]) -> String {
    let mut out = String::from(
        "id,code,pharmacy,customer,status,created_at,delivered_at,invoice_total,\
         preparation_min,courier_waiting_min,in_transit_min,total_min\n",
    );
    for r in rows {
        let fields = [
            r.id.to_string(),
            csv_escape(&r.code),
            csv_escape(&r.pharmacy),
            csv_escape(&r.customer),
            csv_escape(r.status.as_str()),
            r.created_at.to_rfc3339(),
            r.delivered_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
            format!("{:.2}", r.invoice_total),
            r.durations.preparation.as_legacy_minutes().to_string(),
            r.durations.courier_waiting.as_legacy_minutes().to_string(),
            r.durations.in_transit.as_legacy_minutes().to_string(),
            r.durations.total.as_legacy_minutes().to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{compute_metrics, summarize, MetricsConfig};
    use crate::model::{Actor, OrderStatus, PharmacyRef};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, h, m, 0).unwrap()
    }

    fn order(id: i64, pharmacy: &str, day: u32, total_minutes: i64) -> Order {
        let created = at(day, 10, 0);
        Order::new(
            id,
            &format!("C-{id}"),
            PharmacyRef {
                id: pharmacy.len() as i64,
                name: pharmacy.into(),
            },
            created,
        )
        .delivered(created + chrono::Duration::minutes(total_minutes))
    }

    fn sample() -> Vec<Order> {
        vec![
            order(1, "Central", 1, 40),
            order(2, "north", 2, 20),
            order(3, "Central", 2, 90),
            order(4, "Eastside", 5, 40),
            order(5, "North", 9, 55),
        ]
    }

    fn ids(orders: &[Order]) -> Vec<i64> {
        orders.iter().map(|o| o.id).collect()
    }

    #[test]
    fn test_no_criteria_keeps_input_order() {
        let orders = sample();
        assert_eq!(ids(&filter_sort(&orders, &OrderQuery::new())), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
        );
        let q = OrderQuery::new().date_range(range);
        assert_eq!(ids(&filter_sort(&sample(), &q)), vec![2, 3, 4]);
    }

    #[test]
    fn test_pharmacy_multi_select_ignores_case() {
        let q = OrderQuery::new().pharmacies(["NORTH", "eastside"]);
        assert_eq!(ids(&filter_sort(&sample(), &q)), vec![2, 4, 5]);

        let q = OrderQuery::new().pharmacies(Vec::<String>::new());
        assert_eq!(filter_sort(&sample(), &q).len(), 5);
    }

    #[test]
    fn test_excluded_order_never_reaches_metrics() {
        let mut excluded = ExclusionSet::new();
        excluded.exclude(3);
        let q = OrderQuery::new().pharmacies(["Central"]).exclusions(&excluded);
        let kept = filter_sort(&sample(), &q);
        assert_eq!(ids(&kept), vec![1]);

        let m = compute_metrics(&kept);
        assert_eq!(m.order_count, 1);
        assert_eq!(m.avg_total_time, 40);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let q = OrderQuery::new().sort(SortState::by(SortField::TotalMinutes, SortDirection::Ascending));
        assert_eq!(ids(&filter_sort(&sample(), &q)), vec![2, 1, 4, 5, 3]);

        let q = OrderQuery::new().sort(SortState::by(SortField::TotalMinutes, SortDirection::Descending));
        assert_eq!(ids(&filter_sort(&sample(), &q)), vec![3, 5, 1, 4, 2]);
    }

    #[test]
    fn test_equal_dates_keep_relative_order() {
        let q = OrderQuery::new().sort(SortState::by(SortField::Created, SortDirection::Ascending));
        // Orders 2 and 3 share a creation instant.
        assert_eq!(ids(&filter_sort(&sample(), &q)), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_string_sort_is_case_insensitive() {
        let q = OrderQuery::new().sort(SortState::by(SortField::Pharmacy, SortDirection::Ascending));
        let names: Vec<String> = filter_sort(&sample(), &q)
            .into_iter()
            .map(|o| o.pharmacy.name)
            .collect();
        assert_eq!(names, vec!["Central", "Central", "Eastside", "North", "north"]);
    }

    #[test]
    fn test_pharmacy_sort_overrides_column_sort() {
        let q = OrderQuery::new()
            .sort(SortState::by(SortField::Id, SortDirection::Descending))
            .pharmacy_sort(Some(SortDirection::Descending));
        let first = &filter_sort(&sample(), &q)[0];
        assert_eq!(first.pharmacy.name, "north");

        let q = q.pharmacy_sort(None);
        assert_eq!(filter_sort(&sample(), &q)[0].id, 5);
    }

    #[test]
    fn test_toggle_cycles_through_directions() {
        let mut state = SortState::default();
        state.toggle(SortField::Created);
        assert_eq!(state.column(), Some((SortField::Created, SortDirection::Ascending)));
        state.toggle(SortField::Created);
        assert_eq!(state.column(), Some((SortField::Created, SortDirection::Descending)));
        state.toggle(SortField::Created);
        assert_eq!(state.column(), None);

        state.toggle(SortField::Created);
        state.toggle(SortField::Code);
        assert_eq!(state.column(), Some((SortField::Code, SortDirection::Ascending)));
    }

    #[test]
    fn test_missing_values_sort_first() {
        let pending = Order::new(
            9,
            "P",
            PharmacyRef {
                id: 1,
                name: "Central".into(),
            },
            at(1, 9, 0),
        )
        .history(OrderStatus::Ready, at(1, 9, 20), Actor::Unknown);
        let mut orders = sample();
        orders.push(pending);
        let q = OrderQuery::new().sort(SortState::by(SortField::Delivered, SortDirection::Ascending));
        assert_eq!(filter_sort(&orders, &q)[0].id, 9);
    }

    #[test]
    fn test_parse_sort_options() {
        assert_eq!("total-minutes".parse::<SortField>().unwrap(), SortField::TotalMinutes);
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Descending);
        assert!("color".parse::<SortField>().is_err());
    }

    #[test]
    fn test_locale_cmp() {
        assert_eq!(locale_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_cmp("Émile", "émile"), Ordering::Less);
        assert_eq!(locale_cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_rows_to_csv() {
        let mut orders = vec![order(1, "Central, Main St", 1, 40)];
        orders[0].customer.first_name = "Ann \"Quick\"".into();
        let summary = summarize(&orders, &MetricsConfig::default());
        let csv = rows_to_csv(&summary.rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("1,C-1,\"Central, Main St\",\"Ann \"\"Quick\"\"\",COMPLETED,"));
        assert!(lines[1].ends_with(",0,0,0,40"));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("hello,world"), "\"hello,world\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
