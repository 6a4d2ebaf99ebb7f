//! Penalties repository for database operations

use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        enums::{PaymentStatus, PenaltyType},
        penalty::{NewPenalty, Penalty},
    },
};

#[derive(Clone)]
pub struct PenaltiesRepository {
    pool: Pool<Postgres>,
}

impl PenaltiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get penalty by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Penalty> {
        sqlx::query_as::<_, Penalty>("SELECT * FROM penalties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Penalty with id {} not found", id)))
    }

    /// The unpaid penalty of a given type for a user, optionally tied to a
    /// specific borrow record. The accrual pass tops this row up instead of
    /// creating a second one.
    pub async fn find_unpaid(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        penalty_type: PenaltyType,
        borrow_record_id: Option<i32>,
    ) -> AppResult<Option<Penalty>> {
        let penalty = sqlx::query_as::<_, Penalty>(
            "SELECT * FROM penalties
             WHERE user_id = $1 AND penalty_type = $2 AND payment_status = $3 AND is_active
               AND borrow_record_id IS NOT DISTINCT FROM $4
             ORDER BY id
             LIMIT 1",
        )
        .bind(user_id)
        .bind(i16::from(penalty_type))
        .bind(i16::from(PaymentStatus::Unpaid))
        .bind(borrow_record_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(penalty)
    }

    /// Any unpaid penalty attached to a borrow record? Blocks deletion.
    pub async fn exists_unpaid_for_borrow(&self, borrow_record_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM penalties
                WHERE borrow_record_id = $1 AND payment_status = $2 AND is_active
             )",
        )
        .bind(borrow_record_id)
        .bind(i16::from(PaymentStatus::Unpaid))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Create a new penalty row
    pub async fn create(&self, conn: &mut PgConnection, penalty: &NewPenalty) -> AppResult<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO penalties
                (user_id, borrow_record_id, penalty_type, payment_status, amount,
                 overdue_days_billed, description, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
            RETURNING id
            "#,
        )
        .bind(penalty.user_id)
        .bind(penalty.borrow_record_id)
        .bind(i16::from(penalty.penalty_type))
        .bind(i16::from(PaymentStatus::Unpaid))
        .bind(penalty.amount)
        .bind(penalty.overdue_days_billed)
        .bind(&penalty.description)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Add an accrued delta and advance the billing cursor.
    ///
    /// The WHERE clause keeps the cursor monotonic even if two passes ever
    /// compute against the same snapshot.
    pub async fn apply_accrual(
        &self,
        conn: &mut PgConnection,
        id: i32,
        delta: Decimal,
        new_marker: i32,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE penalties
             SET amount = amount + $1, overdue_days_billed = $2
             WHERE id = $3 AND overdue_days_billed < $2",
        )
        .bind(delta)
        .bind(new_marker)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
