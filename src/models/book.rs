//! Book model and related types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::BookStatus;

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub price: Decimal,
    pub total_copies: i16,
    pub available_copies: i16,
    pub status: i16,
    pub is_active: bool,
}

impl Book {
    pub fn status(&self) -> BookStatus {
        BookStatus::from(self.status)
    }

    /// A book can take new reservations or borrows unless removed or inactive.
    pub fn is_circulating(&self) -> bool {
        self.is_active && self.status() != BookStatus::Removed
    }
}
