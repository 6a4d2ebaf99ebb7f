//! Penalty accrual engine
//!
//! A pure day-by-day calculator (`accrue_amount`) plus the pass that decides
//! which users and records owe a new or updated penalty. Accrual always
//! produces a delta on top of the billing cursor, never a recomputed total,
//! so running the pass twice on the same day changes nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::BorrowRecord,
        enums::{BorrowStatus, EscalationType, PenaltyType},
        penalty::NewPenalty,
        Scope,
    },
    repository::Repository,
    services::{
        audit::AuditWriter,
        notifications::{announce, NotificationType, Notifier},
        settings::CirculationSettings,
    },
};

/// Compute the amount owed for days `last_billed_day+1 ..= overdue_days`.
///
/// The per-day rate escalates every `interval_days`: additively by
/// `escalation_value` per elapsed interval, or multiplicatively by
/// `escalation_value` raised per interval. Days already billed contribute
/// nothing, which makes the function idempotent for an unchanged day count
/// and additive across successive calls.
///
/// A rate that compounds past `Decimal`'s range (a long-lived record under
/// an aggressive multiplicative setting) comes back as a consistency error
/// rather than a bogus amount; the accrual pass skips that record.
pub fn accrue_amount(
    overdue_days: i32,
    last_billed_day: i32,
    base_rate: Decimal,
    escalation: EscalationType,
    escalation_value: Decimal,
    interval_days: i32,
    item_count: i32,
) -> AppResult<Decimal> {
    if overdue_days <= last_billed_day || item_count <= 0 {
        return Ok(Decimal::ZERO);
    }

    let items = Decimal::from(item_count);
    let mut total = Decimal::ZERO;
    for day in (last_billed_day + 1)..=overdue_days {
        let interval = if interval_days > 0 { day / interval_days } else { 0 };
        let rate = if interval == 0 {
            Some(base_rate)
        } else {
            match escalation {
                EscalationType::Additive => escalation_value
                    .checked_mul(Decimal::from(interval))
                    .and_then(|step| base_rate.checked_add(step)),
                EscalationType::Multiplicative => {
                    let mut rate = Some(base_rate);
                    for _ in 0..interval {
                        rate = rate.and_then(|r| r.checked_mul(escalation_value));
                    }
                    rate
                }
            }
        };
        total = rate
            .and_then(|r| r.checked_mul(items))
            .and_then(|day_amount| total.checked_add(day_amount))
            .ok_or_else(|| {
                AppError::Consistency(format!(
                    "penalty accrual amount exceeds the representable range over {} days",
                    overdue_days - last_billed_day
                ))
            })?;
    }
    Ok(total)
}

/// Whole days elapsed since `since`, less a grace window
pub(crate) fn days_beyond(now: DateTime<Utc>, since: DateTime<Utc>, grace_days: i64) -> i32 {
    let days = (now - since).num_days() - grace_days;
    days.max(0) as i32
}

/// Outcome of an accrual pass
#[derive(Debug, Default, Serialize)]
pub struct AccrualReport {
    pub penalties_created: u32,
    pub penalties_updated: u32,
    pub records_promoted: u32,
    pub skipped: u32,
    pub total_accrued: Decimal,
}

/// Per-penalty notice handed to the notification dispatcher
#[derive(Debug, Clone, Serialize)]
struct PenaltyNotice {
    user_id: i32,
    penalty_type: PenaltyType,
    borrow_record_id: Option<i32>,
    accrued: Decimal,
}

/// Notice emitted when an open record is first promoted to Overdue
#[derive(Debug, Clone, Serialize)]
struct OverdueNotice {
    user_id: i32,
    book_id: i32,
    borrow_record_id: i32,
    due_date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PenaltyService {
    repository: Repository,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditWriter>,
}

impl PenaltyService {
    pub fn new(
        repository: Repository,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditWriter>,
    ) -> Self {
        Self {
            repository,
            notifier,
            audit,
        }
    }

    /// Run the three accrual sources over the scope, in one transaction:
    /// over-holding, late return/renew, and lost claims.
    pub async fn accrue(&self, scope: Scope) -> AppResult<AccrualReport> {
        let settings = CirculationSettings::load(&self.repository).await?;
        let now = Utc::now();

        let mut tx = self.repository.begin_circulation_pass().await?;
        let mut report = AccrualReport::default();
        let mut notices: Vec<PenaltyNotice> = Vec::new();
        let mut promoted: Vec<OverdueNotice> = Vec::new();

        self.accrue_over_holding(&mut tx, now, scope, &settings, &mut report, &mut notices)
            .await?;
        self.accrue_late_returns(&mut tx, now, scope, &settings, &mut report, &mut notices, &mut promoted)
            .await?;
        self.accrue_lost_claims(&mut tx, now, scope, &settings, &mut report, &mut notices)
            .await?;

        tx.commit().await?;

        if report.penalties_created + report.penalties_updated > 0 {
            tracing::info!(
                created = report.penalties_created,
                updated = report.penalties_updated,
                promoted = report.records_promoted,
                skipped = report.skipped,
                accrued = %report.total_accrued,
                "penalty accrual pass complete"
            );
        }
        announce(self.notifier.as_ref(), NotificationType::BookOverdue, &promoted).await;
        announce(self.notifier.as_ref(), NotificationType::PenaltyAssessed, &notices).await;

        Ok(report)
    }

    /// Users holding more books than their membership allows
    async fn accrue_over_holding(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        scope: Scope,
        settings: &CirculationSettings,
        report: &mut AccrualReport,
        notices: &mut Vec<PenaltyNotice>,
    ) -> AppResult<()> {
        let open = self.repository.borrows.list_open(conn, scope).await?;

        // records arrive ordered by (user_id, borrow_date)
        let mut iter = open.into_iter().peekable();
        while let Some(first) = iter.next() {
            let user_id = first.user_id;
            let mut records: Vec<BorrowRecord> = vec![first];
            while let Some(r) = iter.next_if(|r| r.user_id == user_id) {
                records.push(r);
            }
            let count = records.len() as i64;

            let membership = self
                .repository
                .memberships
                .current_for_user_in_pass(conn, user_id, now)
                .await?
                .filter(|m| m.is_valid_at(now));

            match membership {
                Some(m) => {
                    let excess = count - m.borrow_limit.max(0) as i64;
                    if excess <= 0 {
                        continue;
                    }
                    // the over-holding clock starts with the first borrow
                    // beyond the limit
                    let Some(start) = records.get(m.borrow_limit.max(0) as usize) else {
                        continue;
                    };
                    let days = days_beyond(now, start.borrow_date, settings.holding_carry_over_days);
                    if days > 0 {
                        self.upsert_accrual(
                            conn,
                            report,
                            notices,
                            user_id,
                            PenaltyType::ExtraHoldings,
                            None,
                            days,
                            excess as i32,
                            settings,
                            &format!("Holding {} books over the limit of {}", count, m.borrow_limit),
                        )
                        .await?;
                    }
                }
                None => {
                    let Some(last) = self
                        .repository
                        .memberships
                        .last_expired_for_user(conn, user_id, now)
                        .await?
                    else {
                        tracing::warn!(user_id, "open borrow records with no membership history");
                        continue;
                    };
                    let days = days_beyond(
                        now,
                        last.expiration_date,
                        settings.expired_membership_buffer_days,
                    );
                    if days > 0 {
                        self.upsert_accrual(
                            conn,
                            report,
                            notices,
                            user_id,
                            PenaltyType::BooksHeldUnderExpiredMembership,
                            None,
                            days,
                            count as i32,
                            settings,
                            &format!("Holding {} books under an expired membership", count),
                        )
                        .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Open records past their due date; promotes them to Overdue on first
    /// detection
    async fn accrue_late_returns(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        scope: Scope,
        settings: &CirculationSettings,
        report: &mut AccrualReport,
        notices: &mut Vec<PenaltyNotice>,
        promoted: &mut Vec<OverdueNotice>,
    ) -> AppResult<()> {
        let overdue = self.repository.borrows.list_overdue(conn, now, scope).await?;

        for record in &overdue {
            if matches!(record.status(), BorrowStatus::Borrowed | BorrowStatus::Renewed) {
                self.repository.borrows.promote_overdue(conn, record.id).await?;
                report.records_promoted += 1;
                promoted.push(OverdueNotice {
                    user_id: record.user_id,
                    book_id: record.book_id,
                    borrow_record_id: record.id,
                    due_date: record.due_date,
                });
                self.audit
                    .record("borrow.promoted_overdue", "borrow_record", record.id)
                    .await;
            }

            let days = record.overdue_days(now);
            if days > 0 {
                self.upsert_accrual(
                    conn,
                    report,
                    notices,
                    record.user_id,
                    PenaltyType::LateReturnRenew,
                    Some(record.id),
                    days,
                    1,
                    settings,
                    &format!("Overdue since {}", record.due_date.date_naive()),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Lost claims keep accruing on top of the seeded book price until the
    /// penalty is paid
    async fn accrue_lost_claims(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        scope: Scope,
        settings: &CirculationSettings,
        report: &mut AccrualReport,
        notices: &mut Vec<PenaltyNotice>,
    ) -> AppResult<()> {
        let lost = self.repository.borrows.list_lost_claims(conn, scope).await?;

        for record in &lost {
            let Some(claimed_at) = record.lost_claim_date else {
                continue;
            };
            let days = days_beyond(now, claimed_at, 0);
            if days == 0 {
                continue;
            }

            // once the penalty is paid (or gone), the claim stops accruing
            let Some(penalty) = self
                .repository
                .penalties
                .find_unpaid(conn, record.user_id, PenaltyType::LostBook, Some(record.id))
                .await?
            else {
                continue;
            };
            if days <= penalty.overdue_days_billed {
                continue;
            }

            let delta = match accrue_amount(
                days,
                penalty.overdue_days_billed,
                settings.penalty_base_rate,
                settings.penalty_escalation_type,
                settings.penalty_escalation_value,
                settings.penalty_escalation_interval_days,
                1,
            ) {
                Ok(delta) => delta,
                Err(e) => {
                    tracing::error!(
                        record_id = record.id,
                        user_id = record.user_id,
                        "skipping lost claim accrual: {}",
                        e
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            if delta.is_zero() {
                continue;
            }
            self.repository
                .penalties
                .apply_accrual(conn, penalty.id, delta, days)
                .await?;
            report.penalties_updated += 1;
            report.total_accrued += delta;
            notices.push(PenaltyNotice {
                user_id: record.user_id,
                penalty_type: PenaltyType::LostBook,
                borrow_record_id: Some(record.id),
                accrued: delta,
            });
        }
        Ok(())
    }

    /// Top up the matching unpaid penalty, or create one
    #[allow(clippy::too_many_arguments)]
    async fn upsert_accrual(
        &self,
        conn: &mut PgConnection,
        report: &mut AccrualReport,
        notices: &mut Vec<PenaltyNotice>,
        user_id: i32,
        penalty_type: PenaltyType,
        borrow_record_id: Option<i32>,
        overdue_days: i32,
        item_count: i32,
        settings: &CirculationSettings,
        description: &str,
    ) -> AppResult<()> {
        let existing = self
            .repository
            .penalties
            .find_unpaid(conn, user_id, penalty_type, borrow_record_id)
            .await?;

        let last_billed = existing.as_ref().map_or(0, |p| p.overdue_days_billed);
        if overdue_days <= last_billed {
            return Ok(());
        }

        let accrued = match accrue_amount(
            overdue_days,
            last_billed,
            settings.penalty_base_rate,
            settings.penalty_escalation_type,
            settings.penalty_escalation_value,
            settings.penalty_escalation_interval_days,
            item_count,
        ) {
            Ok(accrued) => accrued,
            Err(e) => {
                tracing::error!(user_id, kind = %penalty_type, "skipping penalty accrual: {}", e);
                report.skipped += 1;
                return Ok(());
            }
        };
        if accrued.is_zero() {
            return Ok(());
        }

        match existing {
            Some(penalty) => {
                self.repository
                    .penalties
                    .apply_accrual(conn, penalty.id, accrued, overdue_days)
                    .await?;
                report.penalties_updated += 1;
            }
            None => {
                self.repository
                    .penalties
                    .create(
                        conn,
                        &NewPenalty {
                            user_id,
                            borrow_record_id,
                            penalty_type,
                            amount: accrued,
                            overdue_days_billed: overdue_days,
                            description: description.to_string(),
                        },
                    )
                    .await?;
                report.penalties_created += 1;
            }
        }

        report.total_accrued += accrued;
        notices.push(PenaltyNotice {
            user_id,
            penalty_type,
            borrow_record_id,
            accrued,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_escalating_scenario() {
        // base 5, +5 every 5 days, 1 item, 10 days from scratch:
        // days 1-4 at 5, days 5-9 at 10, day 10 at 15 = 20 + 50 + 15
        let total = accrue_amount(10, 0, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
        assert_eq!(total, dec(85));
    }

    #[test]
    fn test_idempotent_for_unchanged_days() {
        let first = accrue_amount(10, 0, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
        assert!(first > Decimal::ZERO);
        // same day count, cursor already advanced: nothing more to bill
        let second = accrue_amount(10, 10, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
        assert_eq!(second, Decimal::ZERO);
    }

    #[test]
    fn test_additivity_across_cursor() {
        for (d1, d2) in [(0, 0), (0, 10), (4, 10), (7, 7), (3, 17)] {
            let whole = accrue_amount(d2, 0, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
            let head = accrue_amount(d1, 0, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
            let tail = accrue_amount(d2, d1, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
            assert_eq!(whole, head + tail, "split at {} of {}", d1, d2);
        }
    }

    #[test]
    fn test_multiplicative_escalation() {
        // base 5, x2 every 3 days, 7 days: 5+5 + 10*3 + 20*2 = 80
        let total =
            accrue_amount(7, 0, dec(5), EscalationType::Multiplicative, dec(2), 3, 1).unwrap();
        assert_eq!(total, dec(80));
    }

    #[test]
    fn test_multiplicative_overflow_is_consistency_error() {
        // a rate doubling daily compounds past Decimal's range well before
        // day 100; the calculator reports it instead of panicking
        let err = accrue_amount(100, 0, dec(5), EscalationType::Multiplicative, dec(2), 1, 1)
            .unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));

        // the already-billed head stays fine even when the far tail would not
        let head = accrue_amount(10, 0, dec(5), EscalationType::Multiplicative, dec(2), 1, 1);
        assert!(head.is_ok());
    }

    #[test]
    fn test_item_count_scales_linearly() {
        let one = accrue_amount(10, 0, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap();
        let three = accrue_amount(10, 0, dec(5), EscalationType::Additive, dec(5), 5, 3).unwrap();
        assert_eq!(three, one * dec(3));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(
            accrue_amount(0, 0, dec(5), EscalationType::Additive, dec(5), 5, 1).unwrap(),
            Decimal::ZERO
        );
        assert_eq!(
            accrue_amount(5, 0, dec(5), EscalationType::Additive, dec(5), 5, 0).unwrap(),
            Decimal::ZERO
        );
        // zero interval never escalates
        assert_eq!(
            accrue_amount(10, 0, dec(5), EscalationType::Additive, dec(5), 0, 1).unwrap(),
            dec(50)
        );
    }

    #[test]
    fn test_days_beyond_grace() {
        let now = Utc::now();
        assert_eq!(days_beyond(now, now - Duration::days(10), 7), 3);
        assert_eq!(days_beyond(now, now - Duration::days(5), 7), 0);
        assert_eq!(days_beyond(now, now + Duration::days(1), 0), 0);
    }
}
