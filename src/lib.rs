//! Aldine circulation engine
//!
//! The lending, reservation-allocation and penalty-accrual core of the
//! Aldine library management system. The presentation layer, authentication
//! and report generation live elsewhere; this crate owns book copy-count
//! consistency across borrowing, queued reservations and time-based expiry,
//! and the incremental day-by-day penalty calculator.

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use models::Scope;
