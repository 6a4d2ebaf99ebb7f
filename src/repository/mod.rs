//! Repository layer for database operations

pub mod books;
pub mod borrows;
pub mod memberships;
pub mod penalties;
pub mod reservations;
pub mod settings;

use sqlx::{Pool, Postgres, Transaction};

use crate::error::AppResult;

/// Advisory lock key serialising circulation passes.
///
/// Batch passes and user-scoped reconciliation passes both mutate the shared
/// book inventory; the transaction-scoped advisory lock makes them take turns
/// instead of racing over freed copies.
const CIRCULATION_LOCK_KEY: i64 = 0x414c_4449_4e45; // "ALDINE"

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub reservations: reservations::ReservationsRepository,
    pub borrows: borrows::BorrowsRepository,
    pub penalties: penalties::PenaltiesRepository,
    pub memberships: memberships::MembershipsRepository,
    pub settings: settings::SettingsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            penalties: penalties::PenaltiesRepository::new(pool.clone()),
            memberships: memberships::MembershipsRepository::new(pool.clone()),
            settings: settings::SettingsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Begin a transaction holding the circulation advisory lock.
    ///
    /// The lock is released automatically on commit or rollback.
    pub async fn begin_circulation_pass(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CIRCULATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}
