//! Reclaim Core - Shared Types
//!
//! Roles, identities, backend records, the gateway contract and the shared
//! error type. Every other crate in the workspace depends on this one; it
//! performs no I/O.

pub mod error;
pub mod gateway;
pub mod identity;
pub mod records;

pub use error::{BroadcastError, ConfigError, GatewayError, ReclaimError, ReclaimResult};
pub use gateway::Gateway;
pub use identity::{poll_interval_for, Identity, Resource, Role, DEFAULT_POLL_INTERVAL};
pub use records::{
    Assignment, Booking, BookingDraft, DashboardStats, DeliveryAssignmentRequest,
    DeliveryStatus, MutationAck, Pickup, PointsBalance, RecordId, RedeemRequest,
};

/// Current wall-clock time as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
