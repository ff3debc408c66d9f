use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::booking::{BookingPatch, BookingStatus};
use crate::models::position::GeoPoint;
use crate::state::AppState;

/// Raw ingest body. Fields stay loosely typed so that shape errors come
/// back as the documented validation messages instead of a decode failure.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub booking_identifier: Option<Value>,
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub lng: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub eta_minutes: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub booking_identifier: String,
    pub status: BookingStatus,
    pub lat: f64,
    pub lng: f64,
    pub eta_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIngest {
    pub booking_identifier: String,
    pub position: GeoPoint,
    pub status: Option<BookingStatus>,
    pub eta_minutes: Option<u32>,
}

impl IngestRequest {
    pub fn new(booking_identifier: &str, position: GeoPoint) -> Self {
        Self {
            booking_identifier: Some(Value::from(booking_identifier)),
            lat: Some(Value::from(position.lat)),
            lng: Some(Value::from(position.lng)),
            status: None,
            eta_minutes: None,
        }
    }

    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = Some(Value::from(status.as_str()));
        self
    }

    pub fn with_eta(mut self, eta_minutes: u32) -> Self {
        self.eta_minutes = Some(Value::from(eta_minutes));
        self
    }
}

/// Checks shape and ranges. Never touches storage.
pub fn validate(request: &IngestRequest) -> Result<ValidatedIngest, AppError> {
    let booking_identifier = match &request.booking_identifier {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        _ => return Err(AppError::validation("booking_identifier required")),
    };

    let (lat, lng) = match (
        request.lat.as_ref().and_then(Value::as_f64),
        request.lng.as_ref().and_then(Value::as_f64),
    ) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Err(AppError::validation("lat/lng must be numeric")),
    };

    let position = GeoPoint::new(lat, lng)?;

    let eta_minutes = match &request.eta_minutes {
        None | Some(Value::Null) => None,
        Some(raw) => match raw.as_f64() {
            Some(eta) if eta.is_finite() && eta >= 0.0 && eta.round() <= f64::from(u32::MAX) => {
                Some(eta.round() as u32)
            }
            _ => {
                return Err(AppError::validation(
                    "eta_minutes must be a non-negative number",
                ));
            }
        },
    };

    // Unknown status strings are dropped, not rejected.
    let status = match &request.status {
        Some(Value::String(raw)) => {
            let parsed = BookingStatus::parse(raw);
            if parsed.is_none() {
                debug!(booking = %booking_identifier, status = %raw, "ignoring unrecognized status");
            }
            parsed
        }
        _ => None,
    };

    Ok(ValidatedIngest {
        booking_identifier,
        position,
        status,
        eta_minutes,
    })
}

/// Applies one location update and fans the new record out to subscribers.
pub fn ingest_location(
    state: &AppState,
    request: IngestRequest,
) -> Result<IngestResponse, AppError> {
    let start = Instant::now();
    let result = apply(state, &request);
    let elapsed = start.elapsed().as_secs_f64();

    match &result {
        Ok(response) => {
            state.metrics.observe_ingest("success", elapsed);
            info!(
                booking = %response.booking_identifier,
                status = %response.status,
                lat = response.lat,
                lng = response.lng,
                "location ingested"
            );
        }
        Err(err) => {
            let outcome = match err {
                AppError::Validation(_) => "invalid",
                AppError::NotFound(_) => "not_found",
                _ => "error",
            };
            state.metrics.observe_ingest(outcome, elapsed);
            warn!(error = %err, "location ingest rejected");
        }
    }

    result
}

fn apply(state: &AppState, request: &IngestRequest) -> Result<IngestResponse, AppError> {
    let update = validate(request)?;

    let patch = BookingPatch::Position {
        position: update.position,
        status: update.status,
        eta_minutes: update.eta_minutes,
        at: Utc::now(),
    };
    let booking = state.store.update(&update.booking_identifier, &patch)?;
    state.notifier.publish(&booking);

    Ok(IngestResponse {
        success: true,
        booking_identifier: booking.code,
        status: booking.status,
        lat: update.position.lat,
        lng: update.position.lng,
        eta_minutes: booking.eta_minutes,
    })
}
