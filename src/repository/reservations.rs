//! Reservations repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{enums::ReservationStatus, reservation::Reservation, Scope},
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get reservation by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Count open (active, non-final) reservations held by a user
    pub async fn count_open_for_user(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations
             WHERE user_id = $1 AND is_active AND status NOT IN ($2, $3)",
        )
        .bind(user_id)
        .bind(i16::from(ReservationStatus::Fulfilled))
        .bind(i16::from(ReservationStatus::Cancelled))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Does the user already hold an open reservation for this book?
    pub async fn exists_open_for_user_book(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2 AND is_active AND status NOT IN ($3, $4)
             )",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(i16::from(ReservationStatus::Fulfilled))
        .bind(i16::from(ReservationStatus::Cancelled))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Any open reservation left for this book? Drives the Reserved status.
    pub async fn exists_open_for_book(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE book_id = $1 AND is_active AND status NOT IN ($2, $3)
             )",
        )
        .bind(book_id)
        .bind(i16::from(ReservationStatus::Fulfilled))
        .bind(i16::from(ReservationStatus::Cancelled))
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    /// The user's live allocation for a book, if any
    pub async fn find_open_allocation(
        &self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations
             WHERE user_id = $1 AND book_id = $2 AND is_active AND is_allocated AND status = $3",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(i16::from(ReservationStatus::Allocated))
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    /// Create a new reservation, queued as of `now`
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO reservations
                (user_id, book_id, reservation_date, allocate_after, is_allocated,
                 status, transfer_count, is_active)
            VALUES ($1, $2, $3, $3, FALSE, $4, 0, TRUE)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(now)
        .bind(i16::from(ReservationStatus::Reserved))
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Soft-delete a reservation without recording a cancel reason
    pub async fn mark_deleted(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query(
            "UPDATE reservations SET status = $1, is_allocated = FALSE, is_active = FALSE WHERE id = $2",
        )
        .bind(i16::from(ReservationStatus::Cancelled))
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Allocations whose pickup window closed before `cutoff`
    pub async fn list_expired_allocations(
        &self,
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
        scope: Scope,
    ) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations
             WHERE is_active AND is_allocated AND status = $1 AND allocated_at < $2
               AND ($3::int IS NULL OR user_id = $3)
             ORDER BY allocated_at",
        )
        .bind(i16::from(ReservationStatus::Allocated))
        .bind(cutoff)
        .bind(scope.user_id())
        .fetch_all(&mut *conn)
        .await?;
        Ok(reservations)
    }

    /// Queued reservations eligible for allocation at `now`, FIFO by
    /// reservation date. Optionally restricted to a set of books (the
    /// just-freed ones when chained after expiry).
    pub async fn list_pending(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        scope: Scope,
        book_ids: Option<&[i32]>,
    ) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations
             WHERE is_active AND NOT is_allocated AND status = $1 AND allocate_after <= $2
               AND ($3::int IS NULL OR user_id = $3)
               AND ($4::int[] IS NULL OR book_id = ANY($4))
             ORDER BY reservation_date",
        )
        .bind(i16::from(ReservationStatus::Reserved))
        .bind(now)
        .bind(scope.user_id())
        .bind(book_ids)
        .fetch_all(&mut *conn)
        .await?;
        Ok(reservations)
    }

    /// Mark a reservation allocated as of `now`
    pub async fn mark_allocated(
        &self,
        conn: &mut PgConnection,
        id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE reservations
             SET is_allocated = TRUE, allocated_at = $1, status = $2
             WHERE id = $3",
        )
        .bind(now)
        .bind(i16::from(ReservationStatus::Allocated))
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Cancel a reservation (soft-deactivates it)
    pub async fn mark_cancelled(
        &self,
        conn: &mut PgConnection,
        id: i32,
        reason: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE reservations
             SET status = $1, is_allocated = FALSE, cancel_reason = $2, is_active = FALSE
             WHERE id = $3",
        )
        .bind(i16::from(ReservationStatus::Cancelled))
        .bind(reason)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Return a transferred reservation to the queue
    pub async fn mark_transferred(
        &self,
        conn: &mut PgConnection,
        id: i32,
        allocate_after: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE reservations
             SET status = $1, is_allocated = FALSE, allocated_at = NULL,
                 allocate_after = $2, transfer_count = transfer_count + 1
             WHERE id = $3",
        )
        .bind(i16::from(ReservationStatus::Reserved))
        .bind(allocate_after)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Mark an allocation fulfilled (the user borrowed the copy)
    pub async fn mark_fulfilled(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE reservations SET status = $1 WHERE id = $2")
            .bind(i16::from(ReservationStatus::Fulfilled))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
