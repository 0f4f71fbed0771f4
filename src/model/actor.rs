use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::OrderStatus;

/// Who performed a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Courier {
        id: Option<i64>,
        name: String,
    },
    PharmacyEmployee {
        id: Option<i64>,
        pharmacy_id: Option<i64>,
        pharmacy_name: String,
        employee_name: String,
    },
    AdminUser {
        id: Option<i64>,
        first_name: String,
        last_name: String,
        phone: Option<String>,
    },
    Unknown,
}

impl Actor {
    /// Human-readable label shown next to a timeline entry.
    pub fn label(&self) -> String {
        match self {
            Actor::Courier { name, .. } => name.trim().to_string(),
            Actor::PharmacyEmployee {
                pharmacy_name,
                employee_name,
                ..
            } => join_labels(pharmacy_name, employee_name),
            Actor::AdminUser {
                first_name,
                last_name,
                phone,
                ..
            } => {
                let full = format!("{} {}", first_name.trim(), last_name.trim());
                let full = full.trim();
                if !full.is_empty() {
                    full.to_string()
                } else {
                    phone.as_deref().map(str::trim).unwrap_or("").to_string()
                }
            }
            Actor::Unknown => String::new(),
        }
    }
}

/// Join two label halves with `" / "`, dropping blank halves.
pub fn join_labels(left: &str, right: &str) -> String {
    match (left.trim(), right.trim()) {
        ("", "") => String::new(),
        (l, "") => l.to_string(),
        ("", r) => r.to_string(),
        (l, r) => format!("{l} / {r}"),
    }
}

/// One status transition of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireHistoryRecord", into = "WireHistoryRecord")]
pub struct HistoryRecord {
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
    pub actor: Actor,
}

// ── Wire shape ─────────────────────────────────────────────────────
//
// The order API reports the actor as up to three optional sub-objects.
// They are folded into `Actor` on the way in and unfolded on the way out
// so cached snapshots keep the upstream shape.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHistoryRecord {
    new_status: OrderStatus,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    courier: Option<WireCourier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pharmacy_chat: Option<WirePharmacyChat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<WireUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireCourier {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WirePharmacyChat {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pharmacy: Option<WirePharmacy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WirePharmacy {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl From<WireHistoryRecord> for HistoryRecord {
    fn from(w: WireHistoryRecord) -> Self {
        let courier = w
            .courier
            .and_then(|c| non_blank(&c.name).map(|n| (c.id, n.to_string())));
        let actor = match (courier, w.pharmacy_chat, w.user) {
            (Some((id, name)), _, _) => Actor::Courier { id, name },
            (None, Some(chat), _) => {
                let pharmacy = chat.pharmacy.unwrap_or(WirePharmacy {
                    id: None,
                    name: None,
                });
                Actor::PharmacyEmployee {
                    id: chat.id,
                    pharmacy_id: pharmacy.id,
                    pharmacy_name: pharmacy.name.unwrap_or_default(),
                    employee_name: chat.name.unwrap_or_default(),
                }
            }
            (None, None, Some(user)) => Actor::AdminUser {
                id: user.id,
                first_name: user.first_name.unwrap_or_default(),
                last_name: user.last_name.unwrap_or_default(),
                phone: user.phone,
            },
            (None, None, None) => Actor::Unknown,
        };
        HistoryRecord {
            status: w.new_status,
            updated_at: w.updated_at,
            actor,
        }
    }
}

impl From<HistoryRecord> for WireHistoryRecord {
    fn from(r: HistoryRecord) -> Self {
        let mut wire = WireHistoryRecord {
            new_status: r.status,
            updated_at: r.updated_at,
            courier: None,
            pharmacy_chat: None,
            user: None,
        };
        match r.actor {
            Actor::Courier { id, name } => {
                wire.courier = Some(WireCourier {
                    id,
                    name: Some(name),
                });
            }
            Actor::PharmacyEmployee {
                id,
                pharmacy_id,
                pharmacy_name,
                employee_name,
            } => {
                wire.pharmacy_chat = Some(WirePharmacyChat {
                    id,
                    name: Some(employee_name),
                    pharmacy: Some(WirePharmacy {
                        id: pharmacy_id,
                        name: Some(pharmacy_name),
                    }),
                });
            }
            Actor::AdminUser {
                id,
                first_name,
                last_name,
                phone,
            } => {
                wire.user = Some(WireUser {
                    id,
                    first_name: Some(first_name),
                    last_name: Some(last_name),
                    phone,
                });
            }
            Actor::Unknown => {}
        }
        wire
    }
}
