//! Rental marketplace backend that keeps listings, bookings, payments, and
//! feedback consistent across document collections.

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;

pub use error::AppError;
