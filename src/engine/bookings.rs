use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{
    Booking, BookingPatch, BookingStatus, CustomerContact, ServiceLine, generate_code,
};
use crate::state::AppState;

const MAX_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub customer: CustomerContact,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub services: Vec<ServiceLine>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn create_booking(
    state: &AppState,
    request: CreateBookingRequest,
) -> Result<Booking, AppError> {
    validate_booking(&request)?;

    let total_cents: u64 = request
        .services
        .iter()
        .map(|line| line.price_cents)
        .sum();
    let notes = request
        .notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty());

    let mut booking = Booking {
        id: Uuid::new_v4(),
        code: generate_code(),
        customer: request.customer,
        scheduled_date: request.scheduled_date,
        scheduled_time: request.scheduled_time,
        services: request.services,
        notes,
        total_cents,
        status: BookingStatus::Scheduled,
        lat: None,
        lng: None,
        position_updated_at: None,
        eta_minutes: None,
        tracking_enabled: false,
        created_at: Utc::now(),
    };

    for _ in 0..MAX_CODE_ATTEMPTS {
        match state.store.insert(booking.clone()) {
            Ok(created) => {
                state.metrics.bookings_total.inc();
                info!(booking = %created.code, total_cents = created.total_cents, "booking created");
                return Ok(created);
            }
            Err(AppError::Conflict(_)) => booking.code = generate_code(),
            Err(err) => return Err(err),
        }
    }

    Err(AppError::Storage(
        "could not allocate a unique booking code".to_string(),
    ))
}

pub fn lookup_booking(state: &AppState, code: &str) -> Result<Booking, AppError> {
    state.store.get(code)
}

pub fn cancel_booking(state: &AppState, code: &str) -> Result<Booking, AppError> {
    let booking = state.store.update(code, &BookingPatch::Cancel)?;
    state.notifier.publish(&booking);
    info!(booking = %booking.code, "booking cancelled");
    Ok(booking)
}

fn validate_booking(request: &CreateBookingRequest) -> Result<(), AppError> {
    let customer = &request.customer;
    if customer.name.trim().is_empty() {
        return Err(AppError::validation("customer name required"));
    }
    if !customer.email.contains('@') {
        return Err(AppError::validation("customer email is invalid"));
    }
    if customer.phone.trim().is_empty() {
        return Err(AppError::validation("customer phone required"));
    }
    if customer.address.trim().is_empty() {
        return Err(AppError::validation("service address required"));
    }
    if request.services.is_empty() {
        return Err(AppError::validation("at least one service required"));
    }
    if request
        .services
        .iter()
        .any(|line| line.name.trim().is_empty())
    {
        return Err(AppError::validation("service name cannot be empty"));
    }
    Ok(())
}
