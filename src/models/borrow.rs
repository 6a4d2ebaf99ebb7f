//! Borrow record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::BorrowStatus;

/// Borrow record model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BorrowRecord {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: i16,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub renew_date: Option<DateTime<Utc>>,
    pub renew_count: i16,
    pub return_date: Option<DateTime<Utc>>,
    pub lost_claim_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl BorrowRecord {
    pub fn status(&self) -> BorrowStatus {
        BorrowStatus::from(self.status)
    }

    /// Still counts against the user's borrow limit.
    pub fn is_open(&self) -> bool {
        self.is_active && !self.status().is_final()
    }

    /// Overdue is derived, not a user transition: an open record past its
    /// due date. Promotion to Overdue status happens in the accrual pass.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date < now
    }

    /// Whole days elapsed since the due date, zero if not yet due.
    pub fn overdue_days(&self, now: DateTime<Utc>) -> i32 {
        if self.due_date >= now {
            return 0;
        }
        (now - self.due_date).num_days() as i32
    }
}
