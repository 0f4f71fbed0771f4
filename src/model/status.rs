use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a delivery order, as reported by the order API.
///
/// Unrecognized strings are kept verbatim in `Unknown` instead of failing
/// deserialization of the whole order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Created,
    Accepted,
    Preparing,
    Ready,
    GivenToCourier,
    OnTheWay,
    Completed,
    Cancelled,
    Unknown(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::GivenToCourier => "GIVEN_TO_COURIER",
            OrderStatus::OnTheWay => "ON_THE_WAY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Unknown(s) => s,
        }
    }

    /// Parse an upstream status string. Matching is case-insensitive and
    /// accepts the legacy aliases some pharmacies still send.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATED" | "NEW" => OrderStatus::Created,
            "ACCEPTED" => OrderStatus::Accepted,
            "PREPARING" | "IN_PROGRESS" => OrderStatus::Preparing,
            "READY" | "READY_FOR_PICKUP" => OrderStatus::Ready,
            "GIVEN_TO_COURIER" | "PICKED_UP" => OrderStatus::GivenToCourier,
            "ON_THE_WAY" | "IN_DELIVERY" => OrderStatus::OnTheWay,
            "COMPLETED" | "DELIVERED" => OrderStatus::Completed,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            _ => OrderStatus::Unknown(s.to_string()),
        }
    }

    /// Relative position in the happy-path lifecycle. Used for sorting the
    /// detail table by status; unknown statuses sort last.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Accepted => 1,
            OrderStatus::Preparing => 2,
            OrderStatus::Ready => 3,
            OrderStatus::GivenToCourier => 4,
            OrderStatus::OnTheWay => 5,
            OrderStatus::Completed => 6,
            OrderStatus::Cancelled => 7,
            OrderStatus::Unknown(_) => 8,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        OrderStatus::parse(&s)
    }
}

impl From<OrderStatus> for String {
    fn from(s: OrderStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
