pub mod bookings;
pub mod ingest;
pub mod simulation;
