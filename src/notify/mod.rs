pub mod broadcast;

use futures::Stream;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use uuid::Uuid;

use crate::models::booking::Booking;

pub use broadcast::BroadcastNotifier;

/// Pushes every post-update booking record to the subscribers of its id.
pub trait ChangeNotifier: Send + Sync {
    fn subscribe(&self, booking_id: Uuid) -> Subscription;

    fn publish(&self, booking: &Booking);
}

pub type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Handle on one booking's change feed. Each item is a full snapshot.
///
/// Dropping the handle releases the subscription.
pub struct Subscription {
    booking_id: Uuid,
    rx: Option<Receiver<Booking>>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(booking_id: Uuid, rx: Receiver<Booking>, release: ReleaseFn) -> Self {
        Self {
            booking_id,
            rx: Some(rx),
            release: Some(release),
        }
    }

    pub fn booking_id(&self) -> Uuid {
        self.booking_id
    }

    /// Next snapshot, or `None` once the feed is closed.
    ///
    /// A lagging subscriber skips to the newest buffered snapshot; every
    /// delivery replaces the previous one wholesale, so nothing is lost.
    pub async fn recv(&mut self) -> Option<Booking> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(booking) => return Some(booking),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(booking_id = %self.booking_id, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Booking> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|booking| (booking, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver has to be gone before release inspects the channel.
        drop(self.rx.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
