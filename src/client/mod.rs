//! Producer and consumer ends of live tracking.
//!
//! The detailer's device pushes fixes through a [`LocationSink`]; the
//! customer's view resolves a booking and follows it through a
//! [`TrackingBackend`]. [`LocalBackend`] wires both straight into a
//! running [`AppState`].

pub mod customer;
pub mod detailer;
pub mod source;

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::engine::bookings::lookup_booking;
use crate::engine::ingest::{IngestRequest, IngestResponse, ingest_location};
use crate::error::AppError;
use crate::models::booking::Booking;
use crate::notify::Subscription;
use crate::state::AppState;

pub use customer::{CustomerClient, CustomerState, TimelineStep, TrackingView};
pub use detailer::{DetailerClient, DetailerState, OperatorEvent};
pub use source::{ChannelSource, PositionSource, SimulatedRoute};

/// Anything that accepts one location update per call.
pub trait LocationSink: Send + Sync + 'static {
    fn send(
        &self,
        request: IngestRequest,
    ) -> impl Future<Output = Result<IngestResponse, AppError>> + Send;
}

/// Booking lookup plus the change feed keyed by internal booking id.
pub trait TrackingBackend: Send + Sync {
    fn lookup(&self, code: &str) -> impl Future<Output = Result<Booking, AppError>> + Send;

    fn subscribe(&self, booking_id: Uuid) -> Subscription;
}

#[derive(Clone)]
pub struct LocalBackend {
    state: Arc<AppState>,
}

impl LocalBackend {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl LocationSink for LocalBackend {
    async fn send(&self, request: IngestRequest) -> Result<IngestResponse, AppError> {
        ingest_location(&self.state, request)
    }
}

impl TrackingBackend for LocalBackend {
    async fn lookup(&self, code: &str) -> Result<Booking, AppError> {
        lookup_booking(&self.state, code)
    }

    fn subscribe(&self, booking_id: Uuid) -> Subscription {
        self.state.notifier.subscribe(booking_id)
    }
}
