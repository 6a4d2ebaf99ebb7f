//! Penalty model and related types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::{PaymentStatus, PenaltyType};

/// Penalty model from database
///
/// `overdue_days_billed` is the accrual cursor: the last day already billed.
/// It only ever advances, which is what makes repeated accrual passes safe.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Penalty {
    pub id: i32,
    pub user_id: i32,
    pub borrow_record_id: Option<i32>,
    pub penalty_type: i16,
    pub payment_status: i16,
    pub amount: Decimal,
    pub overdue_days_billed: i32,
    pub description: Option<String>,
    pub is_active: bool,
}

impl Penalty {
    pub fn penalty_type(&self) -> PenaltyType {
        PenaltyType::from(self.penalty_type)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from(self.payment_status)
    }
}

/// New penalty row staged by the accrual pass or a lost claim
#[derive(Debug, Clone)]
pub struct NewPenalty {
    pub user_id: i32,
    pub borrow_record_id: Option<i32>,
    pub penalty_type: PenaltyType,
    pub amount: Decimal,
    pub overdue_days_billed: i32,
    pub description: String,
}
