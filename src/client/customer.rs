use tracing::debug;

use crate::client::TrackingBackend;
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::position::GeoPoint;
use crate::notify::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerState {
    Unresolved,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineStep {
    pub status: BookingStatus,
    pub reached: bool,
    pub current: bool,
}

/// Everything the tracking page renders, derived from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingView {
    pub booking_code: String,
    pub status: BookingStatus,
    pub timeline: Vec<TimelineStep>,
    pub marker: Option<GeoPoint>,
    pub eta_label: Option<String>,
    pub awaiting_first_update: bool,
    pub cancelled: bool,
}

impl From<&Booking> for TrackingView {
    fn from(booking: &Booking) -> Self {
        let current = booking.status.timeline_index();
        let timeline = BookingStatus::TIMELINE
            .iter()
            .enumerate()
            .map(|(index, step)| TimelineStep {
                status: *step,
                reached: current.is_some_and(|c| index <= c),
                current: current == Some(index),
            })
            .collect();

        let eta_label = match booking.status {
            BookingStatus::Scheduled | BookingStatus::OnTheWay => {
                booking.eta_minutes.map(eta_label)
            }
            _ => None,
        };

        Self {
            booking_code: booking.code.clone(),
            status: booking.status,
            timeline,
            marker: booking.position(),
            eta_label,
            awaiting_first_update: !booking.tracking_enabled,
            cancelled: booking.status == BookingStatus::Cancelled,
        }
    }
}

fn eta_label(minutes: u32) -> String {
    match minutes {
        0 => "Arriving now".to_string(),
        1..=59 => format!("About {minutes} min"),
        _ => format!("About {} h {} min", minutes / 60, minutes % 60),
    }
}

/// Consumer side: resolves a booking code, then follows its change feed.
///
/// The subscription lives exactly as long as the client (or until
/// [`CustomerClient::close`]).
pub struct CustomerClient<B: TrackingBackend> {
    backend: B,
    record: Option<Booking>,
    subscription: Option<Subscription>,
}

impl<B: TrackingBackend> CustomerClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            record: None,
            subscription: None,
        }
    }

    pub fn state(&self) -> CustomerState {
        if self.subscription.is_some() {
            CustomerState::Resolved
        } else {
            CustomerState::Unresolved
        }
    }

    pub async fn resolve(&mut self, code: &str) -> Result<&Booking, AppError> {
        self.close();

        let booking = self.backend.lookup(code).await?;
        let subscription = self.backend.subscribe(booking.id);
        // Re-read after subscribing so an update landing in between is not lost.
        let booking = self.backend.lookup(code).await.unwrap_or(booking);

        debug!(booking = %booking.code, "tracking view resolved");
        self.subscription = Some(subscription);
        Ok(self.record.insert(booking))
    }

    /// Waits for the next snapshot and replaces the held record with it.
    /// Returns `None` when unresolved or when the feed has closed.
    ///
    /// Snapshots carrying an older position than the held record were
    /// queued before the re-read in [`CustomerClient::resolve`] and are
    /// skipped.
    pub async fn next_update(&mut self) -> Option<&Booking> {
        loop {
            let booking = self.subscription.as_mut()?.recv().await?;
            if self.is_stale(&booking) {
                debug!(booking = %booking.code, "skipping stale snapshot");
                continue;
            }
            return Some(self.record.insert(booking));
        }
    }

    fn is_stale(&self, incoming: &Booking) -> bool {
        self.record
            .as_ref()
            .is_some_and(|held| incoming.position_updated_at < held.position_updated_at)
    }

    pub fn record(&self) -> Option<&Booking> {
        self.record.as_ref()
    }

    pub fn view(&self) -> Option<TrackingView> {
        self.record.as_ref().map(TrackingView::from)
    }

    pub fn close(&mut self) {
        self.subscription = None;
        self.record = None;
    }
}
