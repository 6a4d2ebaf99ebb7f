//! Reservation model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::ReservationStatus;

/// Reservation model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub reservation_date: DateTime<Utc>,
    pub allocate_after: DateTime<Utc>,
    pub is_allocated: bool,
    pub allocated_at: Option<DateTime<Utc>>,
    pub status: i16,
    pub transfer_count: i16,
    pub cancel_reason: Option<String>,
    pub is_active: bool,
}

impl Reservation {
    pub fn status(&self) -> ReservationStatus {
        ReservationStatus::from(self.status)
    }

    /// Still queued or holding an allocation.
    pub fn is_open(&self) -> bool {
        self.is_active && !self.status().is_final()
    }

    /// Eligible for allocation at `now`: queued, not already allocated,
    /// past its allocate-after instant.
    pub fn is_allocatable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && !self.is_allocated
            && self.status() == ReservationStatus::Reserved
            && self.allocate_after <= now
    }
}
