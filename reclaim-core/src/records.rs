//! Records returned by the backend gateway.
//!
//! These mirror the JSON rows the backend emits. Fields the client does not
//! interpret are kept in `extra` so nothing is dropped on a round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Backend row identifier.
pub type RecordId = i64;

/// A pickup booking as seen by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: RecordId,
    #[serde(default)]
    pub user_id: Option<RecordId>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub category: String,
    #[serde(default)]
    pub device_model: Option<String>,
    #[serde(default)]
    pub apartment_name: Option<String>,
    #[serde(default)]
    pub street_number: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    pub status: String,
    #[serde(default)]
    pub route_id: Option<RecordId>,
    #[serde(default)]
    pub scheduled: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Booking {
    /// Minimal booking, mostly useful for fixtures.
    pub fn new(id: RecordId, category: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id,
            user_id: None,
            customer_name: None,
            category: category.into(),
            device_model: None,
            apartment_name: None,
            street_number: None,
            area: None,
            state: None,
            pincode: None,
            status: status.into(),
            route_id: None,
            scheduled: None,
            created_at: None,
            extra: Map::new(),
        }
    }
}

/// A booking assigned to the current delivery agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(flatten)]
    pub booking: Booking,
    #[serde(default)]
    pub delivery_status: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// A booking in the admin pickup queue, with its latest delivery assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    #[serde(flatten)]
    pub booking: Booking,
    #[serde(default)]
    pub delivery_status: Option<String>,
    #[serde(default)]
    pub delivery_guy: Option<String>,
}

impl Pickup {
    pub fn is_unassigned(&self) -> bool {
        self.delivery_guy.is_none()
    }
}

/// Aggregated recovery statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_bookings: i64,
    #[serde(default)]
    pub metals: BTreeMap<String, f64>,
    #[serde(default)]
    pub ev_battery_units: i64,
    #[serde(default)]
    pub solar_panel_units: i64,
    #[serde(default)]
    pub user_role: Option<String>,
}

/// Reward points held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointsBalance {
    pub points_balance: i64,
}

/// Delivery lifecycle states accepted by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    PickedUp,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a delivery assignment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAssignmentRequest {
    pub booking_id: RecordId,
    pub delivery_guy_id: RecordId,
}

/// Body of a create-booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub category: String,
    #[serde(default)]
    pub device_model: String,
    pub apartment_name: String,
    pub street_number: String,
    pub area: String,
    pub state: String,
    pub pincode: String,
}

/// Body of a points redemption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub points_to_redeem: i64,
}

/// Free-form acknowledgement returned by mutation endpoints.
pub type MutationAck = Value;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assignment_from_backend_row() {
        let row = json!({
            "id": 7,
            "user_id": 3,
            "customer_name": "asha",
            "category": "laptop",
            "status": "assigned",
            "scheduled": 1,
            "route_id": null,
            "delivery_status": "assigned",
            "assigned_at": "2024-05-01 10:00:00",
            "completed_at": null,
            "weight": 2.5
        });
        let assignment: Assignment = serde_json::from_value(row).unwrap();
        assert_eq!(assignment.booking.id, 7);
        assert_eq!(assignment.booking.category, "laptop");
        assert_eq!(assignment.delivery_status.as_deref(), Some("assigned"));
        assert_eq!(assignment.booking.extra.get("weight"), Some(&json!(2.5)));
    }

    #[test]
    fn test_pickup_unassigned() {
        let row = json!({
            "id": 1,
            "category": "battery",
            "status": "pending",
            "delivery_status": null,
            "delivery_guy": null
        });
        let pickup: Pickup = serde_json::from_value(row).unwrap();
        assert!(pickup.is_unassigned());
    }

    #[test]
    fn test_dashboard_defaults_missing_metals() {
        let stats: DashboardStats =
            serde_json::from_value(json!({ "total_bookings": 4 })).unwrap();
        assert_eq!(stats.total_bookings, 4);
        assert!(stats.metals.is_empty());
    }

    #[test]
    fn test_delivery_status_wire_form() {
        assert_eq!(DeliveryStatus::PickedUp.to_string(), "picked_up");
        let parsed: DeliveryStatus = serde_json::from_str("\"delivered\"").unwrap();
        assert_eq!(parsed, DeliveryStatus::Delivered);
    }
}
