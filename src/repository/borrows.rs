//! Borrow records repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{borrow::BorrowRecord, enums::BorrowStatus, Scope},
};

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrow record by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecord>("SELECT * FROM borrow_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", id)))
    }

    /// Count open (active, non-final) borrow records held by a user
    pub async fn count_open_for_user(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records
             WHERE user_id = $1 AND is_active AND status NOT IN ($2, $3, $4)",
        )
        .bind(user_id)
        .bind(i16::from(BorrowStatus::Returned))
        .bind(i16::from(BorrowStatus::Cancelled))
        .bind(i16::from(BorrowStatus::ClaimedLost))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Does the user already hold an open borrow record for this book?
    pub async fn exists_open_for_user_book(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM borrow_records
                WHERE user_id = $1 AND book_id = $2 AND is_active AND status NOT IN ($3, $4, $5)
             )",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(i16::from(BorrowStatus::Returned))
        .bind(i16::from(BorrowStatus::Cancelled))
        .bind(i16::from(BorrowStatus::ClaimedLost))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Create a new borrow record
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO borrow_records
                (user_id, book_id, status, borrow_date, due_date, renew_count, is_active)
            VALUES ($1, $2, $3, $4, $5, 0, TRUE)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(i16::from(BorrowStatus::Borrowed))
        .bind(now)
        .bind(due_date)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Apply a renewal: new due date, renewal timestamp, bumped count
    pub async fn update_renewal(
        &self,
        conn: &mut PgConnection,
        id: i32,
        now: DateTime<Utc>,
        due_date: DateTime<Utc>,
        renew_count: i16,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE borrow_records
             SET status = $1, renew_date = $2, due_date = $3, renew_count = $4
             WHERE id = $5",
        )
        .bind(i16::from(BorrowStatus::Renewed))
        .bind(now)
        .bind(due_date)
        .bind(renew_count)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Close a record as returned
    pub async fn mark_returned(
        &self,
        conn: &mut PgConnection,
        id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET status = $1, return_date = $2 WHERE id = $3")
            .bind(i16::from(BorrowStatus::Returned))
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Close a record as cancelled
    pub async fn mark_cancelled(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET status = $1 WHERE id = $2")
            .bind(i16::from(BorrowStatus::Cancelled))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Soft-delete a record
    pub async fn mark_deleted(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Close a record as a lost claim
    pub async fn mark_claimed_lost(
        &self,
        conn: &mut PgConnection,
        id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET status = $1, lost_claim_date = $2 WHERE id = $3")
            .bind(i16::from(BorrowStatus::ClaimedLost))
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Promote a record to Overdue on first detection by the accrual pass
    pub async fn promote_overdue(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET status = $1 WHERE id = $2")
            .bind(i16::from(BorrowStatus::Overdue))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Open records past their due date at `now`
    pub async fn list_overdue(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        scope: Scope,
    ) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records
             WHERE is_active AND status NOT IN ($1, $2, $3) AND due_date < $4
               AND ($5::int IS NULL OR user_id = $5)
             ORDER BY user_id, due_date",
        )
        .bind(i16::from(BorrowStatus::Returned))
        .bind(i16::from(BorrowStatus::Cancelled))
        .bind(i16::from(BorrowStatus::ClaimedLost))
        .bind(now)
        .bind(scope.user_id())
        .fetch_all(&mut *conn)
        .await?;
        Ok(records)
    }

    /// All open records, ordered so the accrual pass can group per user
    pub async fn list_open(
        &self,
        conn: &mut PgConnection,
        scope: Scope,
    ) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records
             WHERE is_active AND status NOT IN ($1, $2, $3)
               AND ($4::int IS NULL OR user_id = $4)
             ORDER BY user_id, borrow_date",
        )
        .bind(i16::from(BorrowStatus::Returned))
        .bind(i16::from(BorrowStatus::Cancelled))
        .bind(i16::from(BorrowStatus::ClaimedLost))
        .bind(scope.user_id())
        .fetch_all(&mut *conn)
        .await?;
        Ok(records)
    }

    /// Active lost claims still subject to accrual
    pub async fn list_lost_claims(
        &self,
        conn: &mut PgConnection,
        scope: Scope,
    ) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records
             WHERE is_active AND status = $1
               AND ($2::int IS NULL OR user_id = $2)
             ORDER BY user_id, lost_claim_date",
        )
        .bind(i16::from(BorrowStatus::ClaimedLost))
        .bind(scope.user_id())
        .fetch_all(&mut *conn)
        .await?;
        Ok(records)
    }
}
