use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::error::AppError;
use crate::geo::interpolate;
use crate::models::position::GeoPoint;

/// A device position feed.
///
/// `None` means the source finished on its own; `Some(Err(_))` means it
/// can no longer produce fixes. `next_fix` must be cancel-safe.
pub trait PositionSource: Send + 'static {
    fn next_fix(&mut self) -> impl Future<Output = Option<Result<GeoPoint, AppError>>> + Send;
}

/// Bridges fixes pushed from elsewhere (a device socket, a test).
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<GeoPoint, AppError>>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<Result<GeoPoint, AppError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

impl PositionSource for ChannelSource {
    async fn next_fix(&mut self) -> Option<Result<GeoPoint, AppError>> {
        self.rx.recv().await
    }
}

/// Walks a straight line from `from` to `to` in `steps` hops, one per tick.
pub struct SimulatedRoute {
    from: GeoPoint,
    to: GeoPoint,
    steps: u32,
    next_step: u32,
    ticker: Interval,
}

impl SimulatedRoute {
    pub fn new(from: GeoPoint, to: GeoPoint, steps: u32, step_interval: Duration) -> Self {
        let mut ticker = interval(step_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            from,
            to,
            steps: steps.max(1),
            next_step: 0,
            ticker,
        }
    }

    pub fn destination(&self) -> GeoPoint {
        self.to
    }
}

impl PositionSource for SimulatedRoute {
    async fn next_fix(&mut self) -> Option<Result<GeoPoint, AppError>> {
        if self.next_step > self.steps {
            return None;
        }
        self.ticker.tick().await;

        let t = f64::from(self.next_step) / f64::from(self.steps);
        self.next_step += 1;
        Some(Ok(interpolate(&self.from, &self.to, t)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ChannelSource, PositionSource, SimulatedRoute};
    use crate::error::AppError;
    use crate::models::position::GeoPoint;

    #[tokio::test]
    async fn route_runs_from_start_to_destination_then_ends() {
        let from = GeoPoint { lat: 0.0, lng: 0.0 };
        let to = GeoPoint { lat: 1.0, lng: 2.0 };
        let mut route = SimulatedRoute::new(from, to, 2, Duration::from_millis(1));

        let mut fixes = Vec::new();
        while let Some(fix) = route.next_fix().await {
            fixes.push(fix.unwrap());
        }

        assert_eq!(fixes.len(), 3);
        assert_eq!(fixes[0], from);
        assert_eq!(fixes[1], GeoPoint { lat: 0.5, lng: 1.0 });
        assert_eq!(fixes[2], to);
        assert_eq!(route.destination(), to);
    }

    #[tokio::test]
    async fn channel_source_relays_errors_and_end() {
        let (tx, mut source) = ChannelSource::new(4);
        tx.send(Ok(GeoPoint { lat: 1.0, lng: 1.0 })).await.unwrap();
        tx.send(Err(AppError::SourceUnavailable("denied".to_string())))
            .await
            .unwrap();
        drop(tx);

        assert!(source.next_fix().await.unwrap().is_ok());
        assert!(source.next_fix().await.unwrap().is_err());
        assert!(source.next_fix().await.is_none());
    }
}
