//! Membership grant model (read-only eligibility input)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Membership grant model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipGrant {
    pub id: i32,
    pub user_id: i32,
    pub borrow_limit: i16,
    pub reservation_limit: i16,
    pub effective_start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
}

impl MembershipGrant {
    /// Valid at `now`: active and inside its validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.effective_start_date <= now && now < self.expiration_date
    }
}
