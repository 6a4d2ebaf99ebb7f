//! Membership grants repository (read-only eligibility input)

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{error::AppResult, models::membership::MembershipGrant};

#[derive(Clone)]
pub struct MembershipsRepository {
    pool: Pool<Postgres>,
}

impl MembershipsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// The user's membership valid at `now`, if any
    pub async fn current_for_user(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<MembershipGrant>> {
        let grant = sqlx::query_as::<_, MembershipGrant>(
            "SELECT * FROM membership_grants
             WHERE user_id = $1 AND is_active
               AND effective_start_date <= $2 AND expiration_date > $2
             ORDER BY effective_start_date DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    /// Same lookup inside a pass transaction
    pub async fn current_for_user_in_pass(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<MembershipGrant>> {
        let grant = sqlx::query_as::<_, MembershipGrant>(
            "SELECT * FROM membership_grants
             WHERE user_id = $1 AND is_active
               AND effective_start_date <= $2 AND expiration_date > $2
             ORDER BY effective_start_date DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(grant)
    }

    /// The most recently expired grant, used as the eligibility instant when
    /// a user holds books with no current membership
    pub async fn last_expired_for_user(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<MembershipGrant>> {
        let grant = sqlx::query_as::<_, MembershipGrant>(
            "SELECT * FROM membership_grants
             WHERE user_id = $1 AND expiration_date <= $2
             ORDER BY expiration_date DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(grant)
    }
}
