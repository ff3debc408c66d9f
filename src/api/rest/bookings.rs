use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};

use crate::api::rest::json_body;
use crate::engine::bookings::{CreateBookingRequest, cancel_booking, create_booking, lookup_booking};
use crate::engine::simulation::{SimulationRequest, SimulationStarted, start_simulation};
use crate::error::AppError;
use crate::models::booking::Booking;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create))
        .route("/bookings/:code", get(lookup))
        .route("/bookings/:code/cancel", post(cancel))
        .route("/bookings/:code/simulate", post(simulate))
}

async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let request = json_body(payload)?;
    let booking = create_booking(&state, request)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn lookup(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(lookup_booking(&state, &code)?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(cancel_booking(&state, &code)?))
}

async fn simulate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SimulationStarted>), AppError> {
    let request = json_body(payload)?;
    let started = start_simulation(state, &code, request)?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}
