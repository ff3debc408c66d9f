use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::client::LocationSink;
use crate::client::source::PositionSource;
use crate::engine::ingest::{IngestRequest, IngestResponse};
use crate::error::AppError;
use crate::geo::eta_minutes;
use crate::models::booking::BookingStatus;
use crate::models::position::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailerState {
    Idle,
    Tracking,
}

/// What the operator sees while tracking runs.
#[derive(Debug)]
pub enum OperatorEvent {
    Sent(IngestResponse),
    IngestFailed(AppError),
    SourceUnavailable(AppError),
    SourceEnded,
}

enum Command {
    Status(BookingStatus),
    Eta(u32),
    Stop,
}

struct Session {
    commands: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

/// Producer side: follows a position source and pushes every fix, status
/// change and periodic resend of the last fix into a [`LocationSink`].
pub struct DetailerClient<S: LocationSink> {
    booking_code: String,
    sink: Arc<S>,
    resend_interval: Duration,
    route_target: Option<(GeoPoint, f64)>,
    state_tx: Arc<watch::Sender<DetailerState>>,
    events_tx: mpsc::UnboundedSender<OperatorEvent>,
    session: Option<Session>,
}

impl<S: LocationSink> DetailerClient<S> {
    pub fn new(
        booking_code: impl Into<String>,
        sink: Arc<S>,
        resend_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<OperatorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(DetailerState::Idle);

        (
            Self {
                booking_code: booking_code.into(),
                sink,
                resend_interval,
                route_target: None,
                state_tx: Arc::new(state_tx),
                events_tx,
                session: None,
            },
            events_rx,
        )
    }

    /// Derive `eta_minutes` from each fix's distance to `destination`.
    pub fn with_destination(mut self, destination: GeoPoint, speed_kmh: f64) -> Self {
        self.route_target = Some((destination, speed_kmh));
        self
    }

    pub fn booking_code(&self) -> &str {
        &self.booking_code
    }

    pub fn state(&self) -> DetailerState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DetailerState> {
        self.state_tx.subscribe()
    }

    pub fn start<P: PositionSource>(&mut self, source: P) -> Result<(), AppError> {
        if self.state() == DetailerState::Tracking {
            return Err(AppError::Conflict(format!(
                "already tracking {}",
                self.booking_code
            )));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.state_tx.send_replace(DetailerState::Tracking);

        let worker = Worker {
            booking_code: self.booking_code.clone(),
            sink: self.sink.clone(),
            events: self.events_tx.clone(),
            route_target: self.route_target,
            status: None,
            eta: None,
        };
        let handle = tokio::spawn(worker.run(
            source,
            commands_rx,
            self.resend_interval,
            self.state_tx.clone(),
        ));

        self.session = Some(Session {
            commands: commands_tx,
            handle,
        });
        info!(booking = %self.booking_code, "tracking started");
        Ok(())
    }

    pub fn set_status(&self, status: BookingStatus) -> Result<(), AppError> {
        self.command(Command::Status(status))
    }

    pub fn set_eta(&self, eta_minutes: u32) -> Result<(), AppError> {
        self.command(Command::Eta(eta_minutes))
    }

    /// Cancels the position watch and the resend timer.
    pub async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.commands.send(Command::Stop);
            if let Err(err) = session.handle.await {
                warn!(booking = %self.booking_code, error = %err, "tracking task failed");
            }
        }
        self.state_tx.send_replace(DetailerState::Idle);
    }

    fn command(&self, command: Command) -> Result<(), AppError> {
        let not_tracking = || AppError::Conflict(format!("not tracking {}", self.booking_code));

        if self.state() != DetailerState::Tracking {
            return Err(not_tracking());
        }
        self.session
            .as_ref()
            .ok_or_else(not_tracking)?
            .commands
            .send(command)
            .map_err(|_| not_tracking())
    }
}

impl<S: LocationSink> Drop for DetailerClient<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.handle.abort();
        }
    }
}

struct Worker<S> {
    booking_code: String,
    sink: Arc<S>,
    events: mpsc::UnboundedSender<OperatorEvent>,
    route_target: Option<(GeoPoint, f64)>,
    status: Option<BookingStatus>,
    eta: Option<u32>,
}

impl<S: LocationSink> Worker<S> {
    async fn run<P: PositionSource>(
        mut self,
        mut source: P,
        mut commands: mpsc::UnboundedReceiver<Command>,
        resend_interval: Duration,
        state_tx: Arc<watch::Sender<DetailerState>>,
    ) {
        let mut last_fix: Option<GeoPoint> = None;
        let mut resend = interval(resend_interval);
        resend.set_missed_tick_behavior(MissedTickBehavior::Delay);
        resend.tick().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Status(status)) => {
                        self.status = Some(status);
                        // Without a fix yet, the status rides along with the first one.
                        if let Some(fix) = last_fix {
                            self.push(fix).await;
                        }
                    }
                    Some(Command::Eta(eta)) => self.eta = Some(eta),
                    Some(Command::Stop) | None => break,
                },
                fix = source.next_fix() => match fix {
                    Some(Ok(point)) => {
                        last_fix = Some(point);
                        if let Some((destination, speed_kmh)) = self.route_target {
                            self.eta = Some(eta_minutes(&point, &destination, speed_kmh));
                        }
                        self.push(point).await;
                        resend.reset();
                    }
                    Some(Err(err)) => {
                        warn!(booking = %self.booking_code, error = %err, "position source failed");
                        let err = match err {
                            AppError::SourceUnavailable(_) => err,
                            other => AppError::SourceUnavailable(other.to_string()),
                        };
                        let _ = self.events.send(OperatorEvent::SourceUnavailable(err));
                        break;
                    }
                    None => {
                        let _ = self.events.send(OperatorEvent::SourceEnded);
                        break;
                    }
                },
                _ = resend.tick() => {
                    if let Some(fix) = last_fix {
                        self.push(fix).await;
                    }
                }
            }
        }

        state_tx.send_replace(DetailerState::Idle);
        info!(booking = %self.booking_code, "tracking stopped");
    }

    async fn push(&self, point: GeoPoint) {
        let mut request = IngestRequest::new(&self.booking_code, point);
        if let Some(status) = self.status {
            request = request.with_status(status);
        }
        if let Some(eta) = self.eta {
            request = request.with_eta(eta);
        }

        let event = match self.sink.send(request).await {
            Ok(response) => OperatorEvent::Sent(response),
            Err(err) => {
                warn!(booking = %self.booking_code, error = %err, "location push failed");
                OperatorEvent::IngestFailed(err)
            }
        };
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::{DetailerClient, DetailerState, OperatorEvent};
    use crate::client::LocationSink;
    use crate::client::source::ChannelSource;
    use crate::engine::ingest::{IngestRequest, IngestResponse, validate};
    use crate::error::AppError;
    use crate::models::booking::BookingStatus;
    use crate::models::position::GeoPoint;

    #[derive(Default)]
    struct RecordingSink {
        requests: Mutex<Vec<IngestRequest>>,
    }

    impl LocationSink for RecordingSink {
        async fn send(&self, request: IngestRequest) -> Result<IngestResponse, AppError> {
            let update = validate(&request)?;
            self.requests.lock().unwrap().push(request);
            Ok(IngestResponse {
                success: true,
                booking_identifier: update.booking_identifier,
                status: update.status.unwrap_or(BookingStatus::Scheduled),
                lat: update.position.lat,
                lng: update.position.lng,
                eta_minutes: update.eta_minutes,
            })
        }
    }

    async fn next_event(
        events: &mut tokio::sync::mpsc::UnboundedReceiver<OperatorEvent>,
    ) -> OperatorEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event in time")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn each_fix_is_pushed_with_current_status() {
        let sink = Arc::new(RecordingSink::default());
        let (mut detailer, mut events) =
            DetailerClient::new("RW-ABC123", sink.clone(), Duration::from_secs(60));
        let (tx, source) = ChannelSource::new(8);

        detailer.start(source).unwrap();
        assert_eq!(detailer.state(), DetailerState::Tracking);
        detailer.set_status(BookingStatus::OnTheWay).unwrap();

        tx.send(Ok(GeoPoint {
            lat: 26.1224,
            lng: -80.1373,
        }))
        .await
        .unwrap();

        // The status may land before or after the first fix is pushed.
        let mut saw_status = false;
        for _ in 0..2 {
            if let OperatorEvent::Sent(response) = next_event(&mut events).await {
                if response.status == BookingStatus::OnTheWay {
                    saw_status = true;
                    break;
                }
            }
        }
        assert!(saw_status);

        detailer.stop().await;
        assert_eq!(detailer.state(), DetailerState::Idle);
    }

    #[tokio::test]
    async fn resend_repeats_last_fix_without_movement() {
        let sink = Arc::new(RecordingSink::default());
        let (mut detailer, mut events) =
            DetailerClient::new("RW-ABC123", sink.clone(), Duration::from_millis(20));
        let (tx, source) = ChannelSource::new(8);
        detailer.start(source).unwrap();

        tx.send(Ok(GeoPoint { lat: 1.0, lng: 2.0 })).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                next_event(&mut events).await,
                OperatorEvent::Sent(_)
            ));
        }

        let requests = sink.requests.lock().unwrap().len();
        assert!(requests >= 3);
        drop(tx);
    }

    #[tokio::test]
    async fn source_failure_returns_to_idle() {
        let sink = Arc::new(RecordingSink::default());
        let (mut detailer, mut events) =
            DetailerClient::new("RW-ABC123", sink, Duration::from_secs(60));
        let mut state = detailer.watch_state();
        let (tx, source) = ChannelSource::new(8);
        detailer.start(source).unwrap();

        tx.send(Err(AppError::SourceUnavailable(
            "permission denied".to_string(),
        )))
        .await
        .unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            OperatorEvent::SourceUnavailable(_)
        ));
        timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == DetailerState::Idle),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(detailer.set_status(BookingStatus::Arrived).is_err());

        // A fresh start is allowed after the failure.
        let (_tx, source) = ChannelSource::new(1);
        assert!(detailer.start(source).is_ok());
        detailer.stop().await;
    }

    #[tokio::test]
    async fn cannot_start_twice_or_command_while_idle() {
        let sink = Arc::new(RecordingSink::default());
        let (mut detailer, _events) =
            DetailerClient::new("RW-ABC123", sink, Duration::from_secs(60));
        assert!(detailer.set_eta(5).is_err());

        let (_tx1, first) = ChannelSource::new(1);
        let (_tx2, second) = ChannelSource::new(1);
        detailer.start(first).unwrap();
        assert!(matches!(
            detailer.start(second),
            Err(AppError::Conflict(_))
        ));
        detailer.stop().await;
    }

    #[tokio::test]
    async fn destination_drives_eta() {
        let sink = Arc::new(RecordingSink::default());
        let (detailer, mut events) =
            DetailerClient::new("RW-ABC123", sink, Duration::from_secs(60));
        let mut detailer = detailer.with_destination(
            GeoPoint {
                lat: 25.7617,
                lng: -80.1918,
            },
            40.0,
        );
        let (tx, source) = ChannelSource::new(8);
        detailer.start(source).unwrap();

        tx.send(Ok(GeoPoint {
            lat: 26.1224,
            lng: -80.1373,
        }))
        .await
        .unwrap();

        match next_event(&mut events).await {
            OperatorEvent::Sent(response) => {
                let eta = response.eta_minutes.unwrap();
                assert!((58..=63).contains(&eta));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        detailer.stop().await;
    }
}
