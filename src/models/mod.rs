pub mod booking;
pub mod position;
