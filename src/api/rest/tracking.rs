use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;

use crate::api::rest::json_body;
use crate::engine::ingest::{IngestRequest, IngestResponse, ingest_location};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tracking/location", post(update_location).options(preflight))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let request = json_body(payload)?;
    let response = ingest_location(&state, request)?;
    Ok(Json(response))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}
