use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingPatch};
use crate::store::PositionStore;

#[derive(Default)]
pub struct MemoryStore {
    bookings: DashMap<String, Booking>,
    codes_by_id: DashMap<Uuid, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryStore {
    fn insert(&self, booking: Booking) -> Result<Booking, AppError> {
        match self.bookings.entry(booking.code.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "booking code {} already exists",
                booking.code
            ))),
            Entry::Vacant(slot) => {
                self.codes_by_id.insert(booking.id, booking.code.clone());
                slot.insert(booking.clone());
                Ok(booking)
            }
        }
    }

    fn get(&self, code: &str) -> Result<Booking, AppError> {
        self.bookings
            .get(code)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("booking {code} not found")))
    }

    fn get_by_id(&self, id: Uuid) -> Result<Booking, AppError> {
        let code = self
            .codes_by_id
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;
        self.get(&code)
    }

    fn update(&self, code: &str, patch: &BookingPatch) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(code)
            .ok_or_else(|| AppError::NotFound(format!("booking {code} not found")))?;

        // Guard check and field-set happen under the same shard write lock.
        let mut updated = booking.clone();
        patch.apply(&mut updated)?;
        *booking = updated.clone();

        Ok(updated)
    }

    fn len(&self) -> usize {
        self.bookings.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::error::AppError;
    use crate::models::booking::{Booking, BookingPatch, BookingStatus, CustomerContact};
    use crate::models::position::GeoPoint;
    use crate::store::PositionStore;

    fn booking(seed: u128, code: &str) -> Booking {
        Booking {
            id: Uuid::from_u128(seed),
            code: code.to_string(),
            customer: CustomerContact {
                name: "Sam".to_string(),
                email: "sam@example.com".to_string(),
                phone: "555-0101".to_string(),
                address: "400 SE 2nd Ave".to_string(),
            },
            scheduled_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            services: vec![],
            notes: None,
            total_cents: 0,
            status: BookingStatus::Scheduled,
            lat: None,
            lng: None,
            position_updated_at: None,
            eta_minutes: None,
            tracking_enabled: false,
            created_at: Utc::now(),
        }
    }

    fn move_to(lat: f64, lng: f64) -> BookingPatch {
        BookingPatch::Position {
            position: GeoPoint { lat, lng },
            status: None,
            eta_minutes: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_code_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert(booking(1, "RW-AAAAAA")).unwrap();
        let err = store.insert(booking(2, "RW-AAAAAA")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let store = MemoryStore::new();
        store.insert(booking(1, "RW-ABC123")).unwrap();
        assert!(store.get("RW-ABC123").is_ok());
        assert!(matches!(
            store.get("rw-abc123"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn get_by_id_resolves_through_index() {
        let store = MemoryStore::new();
        store.insert(booking(42, "RW-ZZZZZZ")).unwrap();
        let found = store.get_by_id(Uuid::from_u128(42)).unwrap();
        assert_eq!(found.code, "RW-ZZZZZZ");
        assert!(store.get_by_id(Uuid::from_u128(43)).is_err());
    }

    #[test]
    fn failed_patch_leaves_record_untouched() {
        let store = MemoryStore::new();
        let mut cancelled = booking(1, "RW-CANCEL");
        cancelled.status = BookingStatus::Cancelled;
        store.insert(cancelled.clone()).unwrap();

        assert!(store.update("RW-CANCEL", &move_to(1.0, 1.0)).is_err());
        assert_eq!(store.get("RW-CANCEL").unwrap(), cancelled);
    }

    #[test]
    fn updates_to_one_booking_do_not_touch_another() {
        let store = MemoryStore::new();
        store.insert(booking(1, "RW-AAAAAA")).unwrap();
        let untouched = store.insert(booking(2, "RW-BBBBBB")).unwrap();

        store.update("RW-AAAAAA", &move_to(10.0, 20.0)).unwrap();
        assert_eq!(store.get("RW-BBBBBB").unwrap(), untouched);
    }

    #[test]
    fn concurrent_writers_leave_one_complete_position() {
        let store = Arc::new(MemoryStore::new());
        store.insert(booking(1, "RW-RACE00")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let v = i as f64;
                        store.update("RW-RACE00", &move_to(v, v)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let final_state = store.get("RW-RACE00").unwrap();
        // Whichever writer won, lat and lng come from the same write.
        assert_eq!(final_state.lat, final_state.lng);
        assert!(final_state.tracking_enabled);
    }
}
