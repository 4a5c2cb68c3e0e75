//! Reclaim Test Utilities
//!
//! Shared test infrastructure for the Reclaim workspace:
//! - A scriptable in-memory gateway
//! - Proptest generators for records and roles
//! - Fixtures for common sessions and data sets

pub use reclaim_core::{
    Assignment, Booking, BookingDraft, DashboardStats, DeliveryAssignmentRequest,
    DeliveryStatus, Gateway, GatewayError, Identity, MutationAck, Pickup, PointsBalance,
    RecordId, RedeemRequest, ReclaimResult, Resource, Role,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

// ============================================================================
// MOCK GATEWAY
// ============================================================================

/// A mutation observed by [`MockGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationCall {
    UpdateStatus {
        booking_id: RecordId,
        status: DeliveryStatus,
    },
    AssignDelivery(DeliveryAssignmentRequest),
    CreateBooking(BookingDraft),
    RedeemPoints(RedeemRequest),
}

#[derive(Debug, Default)]
struct MockState {
    assignments: Vec<Assignment>,
    pickups: Vec<Pickup>,
    bookings: Vec<Booking>,
    dashboard: DashboardStats,
    points: PointsBalance,
    failing: HashSet<Resource>,
    unauthorized: bool,
    calls: HashMap<Resource, usize>,
    mutations: Vec<MutationCall>,
}

/// In-memory gateway with scriptable data and failures.
///
/// Reads can be parked with [`MockGateway::hold`] to keep a refresh cycle in
/// flight; [`MockGateway::wait_for_calls`] lets a test wait until reads have
/// started.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
    started: watch::Sender<usize>,
    gate_open: watch::Sender<bool>,
    discards: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            started: watch::Sender::new(0),
            gate_open: watch::Sender::new(true),
            discards: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_assignments(&self, rows: Vec<Assignment>) {
        self.lock().assignments = rows;
    }

    pub fn set_pickups(&self, rows: Vec<Pickup>) {
        self.lock().pickups = rows;
    }

    pub fn set_bookings(&self, rows: Vec<Booking>) {
        self.lock().bookings = rows;
    }

    pub fn set_dashboard(&self, stats: DashboardStats) {
        self.lock().dashboard = stats;
    }

    pub fn set_points_balance(&self, points: i64) {
        self.lock().points = PointsBalance {
            points_balance: points,
        };
    }

    /// Make reads of `resource` fail with a 503 until [`MockGateway::recover`].
    pub fn fail(&self, resource: Resource) {
        self.lock().failing.insert(resource);
    }

    pub fn recover(&self, resource: Resource) {
        self.lock().failing.remove(&resource);
    }

    /// Answer every call with 401.
    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.lock().unauthorized = unauthorized;
    }

    /// Park reads after they are counted, until [`MockGateway::release`].
    pub fn hold(&self) {
        self.gate_open.send_replace(false);
    }

    pub fn release(&self) {
        self.gate_open.send_replace(true);
    }

    /// Reads of `resource` started so far.
    pub fn calls(&self, resource: Resource) -> usize {
        self.lock().calls.get(&resource).copied().unwrap_or(0)
    }

    /// Reads of any resource started so far.
    pub fn total_calls(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `count` reads have started.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut started = self.started.subscribe();
        let _ = started.wait_for(|n| *n >= count).await;
    }

    pub fn mutations(&self) -> Vec<MutationCall> {
        self.lock().mutations.clone()
    }

    /// Times `discard_cached` was called.
    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    async fn read<T>(
        &self,
        resource: Resource,
        pick: impl FnOnce(&MockState) -> T + Send,
    ) -> ReclaimResult<T> {
        {
            let mut state = self.lock();
            *state.calls.entry(resource).or_insert(0) += 1;
        }
        self.started.send_modify(|n| *n += 1);

        let mut gate = self.gate_open.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let state = self.lock();
        if state.unauthorized {
            return Err(GatewayError::Unauthorized {
                path: resource.path().to_string(),
            }
            .into());
        }
        if state.failing.contains(&resource) {
            return Err(GatewayError::Status {
                path: resource.path().to_string(),
                status: 503,
                body: "mock failure".to_string(),
            }
            .into());
        }
        Ok(pick(&state))
    }

    fn mutate(&self, call: MutationCall, path: &str) -> ReclaimResult<MutationAck> {
        let mut state = self.lock();
        if state.unauthorized {
            return Err(GatewayError::Unauthorized {
                path: path.to_string(),
            }
            .into());
        }
        state.mutations.push(call);
        Ok(serde_json::json!({ "message": "ok" }))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn assignments(&self) -> ReclaimResult<Vec<Assignment>> {
        self.read(Resource::Assignments, |s| s.assignments.clone())
            .await
    }

    async fn pickups(&self) -> ReclaimResult<Vec<Pickup>> {
        self.read(Resource::Pickups, |s| s.pickups.clone()).await
    }

    async fn dashboard(&self) -> ReclaimResult<DashboardStats> {
        self.read(Resource::Dashboard, |s| s.dashboard.clone()).await
    }

    async fn bookings(&self) -> ReclaimResult<Vec<Booking>> {
        self.read(Resource::Bookings, |s| s.bookings.clone()).await
    }

    async fn points_balance(&self) -> ReclaimResult<PointsBalance> {
        self.read(Resource::PointsBalance, |s| s.points).await
    }

    async fn update_status(
        &self,
        booking_id: RecordId,
        status: DeliveryStatus,
    ) -> ReclaimResult<MutationAck> {
        self.mutate(
            MutationCall::UpdateStatus { booking_id, status },
            "/delivery/update-status",
        )
    }

    async fn assign_delivery(
        &self,
        request: DeliveryAssignmentRequest,
    ) -> ReclaimResult<MutationAck> {
        self.mutate(MutationCall::AssignDelivery(request), "/admin/assign-delivery")
    }

    async fn create_booking(&self, draft: &BookingDraft) -> ReclaimResult<MutationAck> {
        self.mutate(MutationCall::CreateBooking(draft.clone()), "/bookings")
    }

    async fn redeem_points(&self, request: RedeemRequest) -> ReclaimResult<MutationAck> {
        self.mutate(MutationCall::RedeemPoints(request), "/points/redeem")
    }

    fn discard_cached(&self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Reclaim records.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::Delivery), Just(Role::Admin), Just(Role::User)]
    }

    pub fn arb_resource() -> impl Strategy<Value = Resource> {
        proptest::sample::select(Resource::ALL.to_vec())
    }

    pub fn arb_delivery_status() -> impl Strategy<Value = DeliveryStatus> {
        prop_oneof![
            Just(DeliveryStatus::Assigned),
            Just(DeliveryStatus::PickedUp),
            Just(DeliveryStatus::Delivered),
        ]
    }

    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        ("[a-z]{3,12}", arb_role()).prop_map(|(name, role)| Identity::new(name, role))
    }

    pub fn arb_booking() -> impl Strategy<Value = Booking> {
        (
            1..100_000i64,
            prop_oneof![
                Just("laptop"),
                Just("mobile"),
                Just("ev_battery"),
                Just("solar_panel"),
            ],
            prop_oneof![Just("pending"), Just("assigned"), Just("completed")],
            proptest::option::of("[0-9]{6}"),
        )
            .prop_map(|(id, category, status, pincode)| {
                let mut booking = Booking::new(id, category, status);
                booking.pincode = pincode;
                booking
            })
    }

    pub fn arb_bookings(max: usize) -> impl Strategy<Value = Vec<Booking>> {
        proptest::collection::vec(arb_booking(), 0..=max)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built sessions and data sets.

    use super::*;

    pub fn delivery_identity() -> Identity {
        Identity::new("ravi", Role::Delivery)
    }

    pub fn admin_identity() -> Identity {
        Identity::new("asha", Role::Admin)
    }

    pub fn user_identity() -> Identity {
        Identity::new("meena", Role::User)
    }

    pub fn identity_for(role: Role) -> Identity {
        match role {
            Role::Delivery => delivery_identity(),
            Role::Admin => admin_identity(),
            Role::User => user_identity(),
        }
    }

    pub fn sample_bookings() -> Vec<Booking> {
        vec![
            Booking::new(101, "laptop", "pending"),
            Booking::new(102, "ev_battery", "assigned"),
            Booking::new(103, "solar_panel", "completed"),
        ]
    }

    pub fn sample_assignments() -> Vec<Assignment> {
        vec![Assignment {
            booking: Booking::new(102, "ev_battery", "assigned"),
            delivery_status: Some(DeliveryStatus::Assigned.as_str().to_string()),
            assigned_at: Some("2025-01-10T09:00:00".to_string()),
            completed_at: None,
        }]
    }

    pub fn sample_pickups() -> Vec<Pickup> {
        vec![
            Pickup {
                booking: Booking::new(101, "laptop", "pending"),
                delivery_status: None,
                delivery_guy: None,
            },
            Pickup {
                booking: Booking::new(102, "ev_battery", "assigned"),
                delivery_status: Some(DeliveryStatus::Assigned.as_str().to_string()),
                delivery_guy: Some("ravi".to_string()),
            },
        ]
    }

    pub fn sample_dashboard() -> DashboardStats {
        DashboardStats {
            total_bookings: 3,
            metals: [("copper".to_string(), 1.25), ("lithium".to_string(), 0.4)]
                .into_iter()
                .collect(),
            ev_battery_units: 1,
            solar_panel_units: 1,
            user_role: Some(Role::Admin.as_str().to_string()),
        }
    }

    pub fn sample_draft() -> BookingDraft {
        BookingDraft {
            category: "laptop".to_string(),
            device_model: "ThinkPad T480".to_string(),
            apartment_name: "Lake View".to_string(),
            street_number: "12".to_string(),
            area: "Indiranagar".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560038".to_string(),
        }
    }

    /// A gateway preloaded with every sample data set.
    pub fn seeded_gateway() -> MockGateway {
        let gateway = MockGateway::new();
        gateway.set_assignments(sample_assignments());
        gateway.set_pickups(sample_pickups());
        gateway.set_bookings(sample_bookings());
        gateway.set_dashboard(sample_dashboard());
        gateway.set_points_balance(120);
        gateway
    }
}
