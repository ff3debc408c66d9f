use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::position::GeoPoint;

pub const CODE_PREFIX: &str = "RW-";
const CODE_LEN: usize = 6;
// No 0/O or 1/I, customers read these codes over the phone.
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    Scheduled,
    OnTheWay,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// The ordered job timeline. `Cancelled` sits outside it.
    pub const TIMELINE: [BookingStatus; 5] = [
        BookingStatus::Scheduled,
        BookingStatus::OnTheWay,
        BookingStatus::Arrived,
        BookingStatus::InProgress,
        BookingStatus::Completed,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(BookingStatus::Scheduled),
            "on-the-way" => Some(BookingStatus::OnTheWay),
            "arrived" => Some(BookingStatus::Arrived),
            "in-progress" => Some(BookingStatus::InProgress),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::OnTheWay => "on-the-way",
            BookingStatus::Arrived => "arrived",
            BookingStatus::InProgress => "in-progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn timeline_index(&self) -> Option<usize> {
        Self::TIMELINE.iter().position(|step| step == self)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceLine {
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub code: String,
    pub customer: CustomerContact,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub services: Vec<ServiceLine>,
    pub notes: Option<String>,
    pub total_cents: u64,
    pub status: BookingStatus,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub position_updated_at: Option<DateTime<Utc>>,
    pub eta_minutes: Option<u32>,
    pub tracking_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn position(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

/// Partial field set applied to one booking under the store's entry lock.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingPatch {
    Position {
        position: GeoPoint,
        status: Option<BookingStatus>,
        eta_minutes: Option<u32>,
        at: DateTime<Utc>,
    },
    Cancel,
}

impl BookingPatch {
    pub fn apply(&self, booking: &mut Booking) -> Result<(), AppError> {
        match self {
            BookingPatch::Position {
                position,
                status,
                eta_minutes,
                at,
            } => {
                if booking.status.is_terminal() {
                    return Err(AppError::Validation(format!(
                        "booking {} is {} and no longer accepts location updates",
                        booking.code, booking.status
                    )));
                }

                booking.lat = Some(position.lat);
                booking.lng = Some(position.lng);
                booking.position_updated_at = Some(*at);
                booking.tracking_enabled = true;
                if let Some(status) = status {
                    booking.status = *status;
                }
                if let Some(eta) = eta_minutes {
                    booking.eta_minutes = Some(*eta);
                }
                Ok(())
            }
            BookingPatch::Cancel => match booking.status {
                BookingStatus::Completed => Err(AppError::Conflict(format!(
                    "booking {} is already completed",
                    booking.code
                ))),
                _ => {
                    booking.status = BookingStatus::Cancelled;
                    Ok(())
                }
            },
        }
    }
}

/// Maps random bytes onto an `RW-XXXXXX` code.
pub fn code_from_bytes(bytes: &[u8]) -> String {
    let mut code = String::with_capacity(CODE_PREFIX.len() + CODE_LEN);
    code.push_str(CODE_PREFIX);
    for byte in bytes.iter().take(CODE_LEN) {
        code.push(CODE_ALPHABET[(*byte as usize) % CODE_ALPHABET.len()] as char);
    }
    code
}

pub fn generate_code() -> String {
    code_from_bytes(Uuid::new_v4().as_bytes())
}
