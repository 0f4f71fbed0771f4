use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::Result;
use crate::model::{Actor, Order, OrderStatus, PharmacyDetails, PharmacyRef};
use crate::query::DateRange;
use crate::sync::OrderSource;

const ORDERS_PER_DAY: i64 = 3;
/// Longer ranges are truncated to their most recent days.
const MAX_DAYS: i64 = 366;

const PHARMACIES: &[(i64, &str, &str)] = &[
    (1, "Central Pharmacy", "12 Market Square"),
    (2, "Harbor Apteka", "4 Quay Road"),
    (3, "Northside Chemist", "88 Ridge Avenue"),
];
const COURIERS: &[&str] = &["Dana Ortiz", "Sam Lee", "Ira Novak"];
const EMPLOYEES: &[&str] = &["K. Brandt", "M. Alvarez"];
const CUSTOMERS: &[(&str, &str)] = &[
    ("Alex", "Morgan"),
    ("Robin", "Chen"),
    ("Jordan", "Patel"),
    ("Casey", "Novak"),
];

/// Built-in sample data, deterministic for a given range.
///
/// Besides ordinary deliveries it includes legacy orders without history,
/// cancelled orders, one-sided clock skew and orders whose pharmacy name
/// only comes from the lookup.
#[derive(Debug, Clone, Default)]
pub struct MockOrderSource;

impl MockOrderSource {
    pub fn new() -> Self {
        Self
    }

    pub fn orders_for(&self, range: &DateRange) -> Vec<Order> {
        let start = if range.num_days() > MAX_DAYS {
            range.end - Duration::days(MAX_DAYS - 1)
        } else {
            range.start
        };
        start
            .iter_days()
            .take_while(|d| *d <= range.end)
            .flat_map(|day| (0..ORDERS_PER_DAY).map(move |slot| mock_order(day, slot)))
            .collect()
    }

    pub fn pharmacies(&self) -> HashMap<i64, PharmacyDetails> {
        PHARMACIES
            .iter()
            .map(|&(id, name, address)| {
                (
                    id,
                    PharmacyDetails {
                        id,
                        name: name.to_string(),
                        address: Some(address.to_string()),
                        phone: Some(format!("555-01{id:02}")),
                    },
                )
            })
            .collect()
    }
}

/// Cheap deterministic mixing so durations vary without a RNG.
fn mix(id: i64) -> i64 {
    (id.wrapping_mul(2_654_435_761) >> 7).rem_euclid(1_000_003)
}

fn pick<T: Copy>(items: &[T], seed: i64) -> T {
    items[seed.rem_euclid(items.len() as i64) as usize]
}

fn mock_order(day: NaiveDate, slot: i64) -> Order {
    let id = i64::from(day.num_days_from_ce()) * 10 + slot;
    let h = mix(id);
    let (pharmacy_id, pharmacy_name, _) = pick(PHARMACIES, h);
    let (first, last) = pick(CUSTOMERS, h / 3);

    let created = day
        .and_hms_opt(9 + (slot as u32) * 3, 0, 0)
        .unwrap_or_default()
        .and_utc()
        + Duration::minutes(h % 50);

    // Some orders carry no pharmacy name so the lookup has something to fill.
    let name = if h % 11 == 0 { "" } else { pharmacy_name };
    let order = Order::new(
        id,
        &format!("RX-{}-{slot}", day.format("%y%m%d")),
        PharmacyRef {
            id: pharmacy_id,
            name: name.to_string(),
        },
        created,
    )
    .customer(first, last)
    .invoice(((h % 9_000) as f64) / 100.0 + 5.0);

    let prep = 5 + h % 30;
    let wait = 1 + (h / 7) % 20;
    let transit = 8 + (h / 13) % 70;

    if h % 17 == 0 {
        return order.delivered(created + Duration::minutes(prep + wait + transit));
    }

    let pharmacy_actor = Actor::PharmacyEmployee {
        id: Some(100 + pharmacy_id),
        pharmacy_id: Some(pharmacy_id),
        pharmacy_name: pharmacy_name.to_string(),
        employee_name: pick(EMPLOYEES, h / 5).to_string(),
    };
    let courier = Actor::Courier {
        id: Some(200 + h % 3),
        name: pick(COURIERS, h / 11).to_string(),
    };

    let accepted = created + Duration::minutes(1 + h % 4);
    let order = order.history(OrderStatus::Accepted, accepted, pharmacy_actor.clone());

    if h % 19 == 0 {
        return order.history(
            OrderStatus::Cancelled,
            accepted + Duration::minutes(3),
            Actor::AdminUser {
                id: Some(1),
                first_name: "Support".into(),
                last_name: "Desk".into(),
                phone: None,
            },
        );
    }

    let ready = created + Duration::minutes(prep);
    // Courier device clock running behind the pharmacy's.
    let given = if h % 23 == 0 {
        ready - Duration::minutes(3)
    } else {
        ready + Duration::minutes(wait)
    };
    let on_the_way = given + Duration::minutes(2);
    let delivered = given + Duration::minutes(transit);

    let order = order
        .history(OrderStatus::Preparing, accepted + Duration::minutes(1), pharmacy_actor.clone())
        .history(OrderStatus::Ready, ready, pharmacy_actor)
        .history(OrderStatus::GivenToCourier, given, courier.clone())
        .history(OrderStatus::OnTheWay, on_the_way, courier.clone());

    // Orders still on the way at the end of the sample have no completion.
    if h % 29 == 0 {
        return order;
    }
    order
        .history(OrderStatus::Completed, delivered, courier)
        .delivered(delivered)
}

impl OrderSource for MockOrderSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_orders(&self, range: &DateRange) -> Result<Vec<Order>> {
        Ok(self.orders_for(range))
    }

    async fn fetch_pharmacy_lookup(&self) -> Result<HashMap<i64, PharmacyDetails>> {
        Ok(self.pharmacies())
    }
}
