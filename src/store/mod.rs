pub mod memory;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingPatch};

pub use memory::MemoryStore;

/// Authoritative copy of each booking's position, status and ETA.
///
/// `update` applies a patch as one atomic field-set. There is no version
/// token: concurrent writers interleave as last-writer-wins.
pub trait PositionStore: Send + Sync {
    /// Fails with `Conflict` if the code is already taken.
    fn insert(&self, booking: Booking) -> Result<Booking, AppError>;

    /// Case-sensitive exact match on the shareable code.
    fn get(&self, code: &str) -> Result<Booking, AppError>;

    fn get_by_id(&self, id: Uuid) -> Result<Booking, AppError>;

    fn update(&self, code: &str, patch: &BookingPatch) -> Result<Booking, AppError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
