use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::source::SimulatedRoute;
use crate::client::{DetailerClient, LocalBackend, LocationSink, OperatorEvent};
use crate::engine::ingest::IngestRequest;
use crate::error::AppError;
use crate::geo::eta_minutes;
use crate::models::booking::BookingStatus;
use crate::models::position::GeoPoint;
use crate::state::AppState;

const MAX_STEPS: u32 = 500;
const MIN_STEP_INTERVAL_MS: u64 = 50;
const MAX_STEP_INTERVAL_MS: u64 = 60_000;

fn default_steps() -> u32 {
    30
}

fn default_step_interval_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationRequest {
    pub from: GeoPoint,
    pub to: GeoPoint,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationStarted {
    pub booking_identifier: String,
    pub steps: u32,
    pub step_interval_ms: u64,
    pub eta_minutes: u32,
}

/// Drives a booking along a simulated route, the way a detailer's phone
/// would: `on-the-way` while moving, `arrived` at the destination.
pub fn start_simulation(
    state: Arc<AppState>,
    code: &str,
    request: SimulationRequest,
) -> Result<SimulationStarted, AppError> {
    let from = GeoPoint::new(request.from.lat, request.from.lng)?;
    let to = GeoPoint::new(request.to.lat, request.to.lng)?;
    if request.steps == 0 || request.steps > MAX_STEPS {
        return Err(AppError::Validation(format!(
            "steps must be between 1 and {MAX_STEPS}"
        )));
    }
    if !(MIN_STEP_INTERVAL_MS..=MAX_STEP_INTERVAL_MS).contains(&request.step_interval_ms) {
        return Err(AppError::Validation(format!(
            "step_interval_ms must be between {MIN_STEP_INTERVAL_MS} and {MAX_STEP_INTERVAL_MS}"
        )));
    }

    let booking = state.store.get(code)?;
    // The run reports on-the-way, so it may only start before arrival.
    if !matches!(
        booking.status,
        BookingStatus::Scheduled | BookingStatus::OnTheWay
    ) {
        return Err(AppError::Validation(format!(
            "booking {} is {}",
            booking.code, booking.status
        )));
    }

    let speed_kmh = state.settings.simulation_speed_kmh;
    let started = SimulationStarted {
        booking_identifier: booking.code.clone(),
        steps: request.steps,
        step_interval_ms: request.step_interval_ms,
        eta_minutes: eta_minutes(&from, &to, speed_kmh),
    };

    let route = SimulatedRoute::new(
        from,
        to,
        request.steps,
        Duration::from_millis(request.step_interval_ms),
    );
    tokio::spawn(run_simulation(state, booking.code, route));

    info!(
        booking = %started.booking_identifier,
        steps = started.steps,
        eta_minutes = started.eta_minutes,
        "simulation started"
    );
    Ok(started)
}

async fn run_simulation(state: Arc<AppState>, code: String, route: SimulatedRoute) {
    let destination = route.destination();
    let backend = Arc::new(LocalBackend::new(state.clone()));
    let (detailer, mut events) =
        DetailerClient::new(code.clone(), backend.clone(), state.settings.resend_interval);
    let mut detailer = detailer.with_destination(destination, state.settings.simulation_speed_kmh);

    if let Err(err) = detailer
        .start(route)
        .and_then(|()| detailer.set_status(BookingStatus::OnTheWay))
    {
        warn!(booking = %code, error = %err, "simulation failed to start");
        return;
    }

    while let Some(event) = events.recv().await {
        match event {
            OperatorEvent::Sent(_) => {}
            OperatorEvent::IngestFailed(err) => {
                if !err.is_retryable() {
                    warn!(booking = %code, error = %err, "simulation aborted");
                    break;
                }
            }
            OperatorEvent::SourceUnavailable(err) => {
                warn!(booking = %code, error = %err, "simulated source failed");
                break;
            }
            OperatorEvent::SourceEnded => {
                let arrival = IngestRequest::new(&code, destination)
                    .with_status(BookingStatus::Arrived)
                    .with_eta(0);
                match backend.send(arrival).await {
                    Ok(_) => info!(booking = %code, "simulation arrived"),
                    Err(err) => warn!(booking = %code, error = %err, "arrival update failed"),
                }
                break;
            }
        }
    }

    detailer.stop().await;
}
