//! Borrowing lifecycle
//!
//! State machine of a single borrow record: none -> Borrowed, terminal in
//! Returned, Cancelled or ClaimedLost. Eligibility is checked before any
//! mutation is staged, so a rejection never leaves partial state behind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrow::BorrowRecord,
        enums::{BookStatus, BorrowStatus, PenaltyType},
        membership::MembershipGrant,
        penalty::NewPenalty,
        reservation::Reservation,
    },
    repository::Repository,
    services::{
        audit::AuditWriter,
        inventory,
        notifications::{NotificationType, Notifier},
        settings::CirculationSettings,
    },
};

/// Pure borrow eligibility decision over a snapshot of the user's state.
///
/// The book must be Available, or Reserved with the allocation held by this
/// same user; the user needs a valid membership, room under their borrow
/// limit, and no open record for the book already.
pub(crate) fn check_borrow_eligibility(
    membership: Option<&MembershipGrant>,
    open_borrows: i64,
    already_holds_book: bool,
    book: &Book,
    own_allocation: Option<&Reservation>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let membership = membership
        .filter(|m| m.is_valid_at(now))
        .ok_or_else(|| AppError::BusinessRule("User has no active membership".to_string()))?;

    if open_borrows >= membership.borrow_limit as i64 {
        return Err(AppError::BusinessRule(format!(
            "Borrow limit reached ({}/{})",
            open_borrows, membership.borrow_limit
        )));
    }

    if already_holds_book {
        return Err(AppError::Conflict(
            "User already holds a borrow record for this book".to_string(),
        ));
    }

    if !book.is_circulating() {
        return Err(AppError::BusinessRule(format!(
            "Book '{}' is not in circulation",
            book.title
        )));
    }

    match book.status() {
        BookStatus::Available => Ok(()),
        BookStatus::Reserved if own_allocation.is_some() => Ok(()),
        BookStatus::Reserved => Err(AppError::BusinessRule(
            "Book is reserved for another user".to_string(),
        )),
        _ => Err(AppError::BusinessRule("No copy available".to_string())),
    }
}

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditWriter>,
}

impl LendingService {
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

    /// Borrow a book, either directly or through the user's own allocation
    pub async fn borrow(&self, user_id: i32, book_id: i32) -> AppResult<BorrowRecord> {
        let settings = CirculationSettings::load(&self.repository).await?;
        let now = Utc::now();

        let membership = self.repository.memberships.current_for_user(user_id, now).await?;
        let open_borrows = self.repository.borrows.count_open_for_user(user_id).await?;
        let already_holds = self
            .repository
            .borrows
            .exists_open_for_user_book(user_id, book_id)
            .await?;
        let book = self.repository.books.get_by_id(book_id).await?;
        let allocation = self
            .repository
            .reservations
            .find_open_allocation(user_id, book_id)
            .await?;

        check_borrow_eligibility(
            membership.as_ref(),
            open_borrows,
            already_holds,
            &book,
            allocation.as_ref(),
            now,
        )?;

        let due_date = now + Duration::days(settings.borrow_due_days);

        let mut tx = self.repository.begin_circulation_pass().await?;
        let id = self
            .repository
            .borrows
            .create(&mut tx, user_id, book_id, now, due_date)
            .await?;

        // a borrow through an allocation consumes it; the copy itself was
        // already taken out of the pool when the allocation was made
        if let Some(allocation) = allocation {
            self.repository
                .reservations
                .mark_fulfilled(&mut tx, allocation.id)
                .await?;
            let mut book = self.repository.books.get_for_update(&mut tx, book_id).await?;
            let has_open = self
                .repository
                .reservations
                .exists_open_for_book(&mut tx, book_id)
                .await?;
            inventory::recompute_status(&mut book, has_open);
            self.repository.books.update_inventory(&mut tx, &book).await?;
        }

        tx.commit().await?;

        self.audit.record("borrow.created", "borrow_record", id).await;
        self.repository.borrows.get_by_id(id).await
    }

    /// Renew an open borrow record
    pub async fn renew(&self, record_id: i32) -> AppResult<BorrowRecord> {
        let settings = CirculationSettings::load(&self.repository).await?;
        let now = Utc::now();

        let record = self.repository.borrows.get_by_id(record_id).await?;
        if !record.is_open() {
            return Err(AppError::BusinessRule(
                "Cannot renew a closed borrow record".to_string(),
            ));
        }
        if record.renew_count >= settings.renew_limit {
            return Err(AppError::BusinessRule(format!(
                "Maximum renewals reached ({}/{})",
                record.renew_count, settings.renew_limit
            )));
        }

        let due_date = now + Duration::days(settings.borrow_due_days);

        let mut tx = self.repository.pool.begin().await?;
        self.repository
            .borrows
            .update_renewal(&mut tx, record.id, now, due_date, record.renew_count + 1)
            .await?;
        tx.commit().await?;

        self.audit.record("borrow.renewed", "borrow_record", record_id).await;
        self.repository.borrows.get_by_id(record_id).await
    }

    /// Return a borrowed book, freeing a copy for the reservation queue
    pub async fn return_record(&self, record_id: i32) -> AppResult<BorrowRecord> {
        let now = Utc::now();

        let mut tx = self.repository.begin_circulation_pass().await?;

        let record = self.repository.borrows.get_by_id(record_id).await?;
        if !record.is_open() {
            return Err(AppError::BusinessRule(
                "Borrow record is already closed".to_string(),
            ));
        }

        self.repository.borrows.mark_returned(&mut tx, record.id, now).await?;

        let mut book = self
            .repository
            .books
            .get_for_update(&mut tx, record.book_id)
            .await?;
        if inventory::try_release_copy(&mut book) {
            let has_open = self
                .repository
                .reservations
                .exists_open_for_book(&mut tx, record.book_id)
                .await?;
            inventory::recompute_status(&mut book, has_open);
            self.repository.books.update_inventory(&mut tx, &book).await?;
        } else {
            // a direct borrow never took a copy out of the pool, so the
            // book is already at capacity when it comes back
            tracing::warn!(
                book_id = book.id,
                record_id = record.id,
                "returned book already at full availability"
            );
        }

        tx.commit().await?;

        self.audit.record("borrow.returned", "borrow_record", record_id).await;
        self.repository.borrows.get_by_id(record_id).await
    }

    /// Cancel an open borrow record
    pub async fn cancel(&self, record_id: i32) -> AppResult<()> {
        let record = self.repository.borrows.get_by_id(record_id).await?;
        if !record.is_open() {
            return Err(AppError::BusinessRule(
                "Borrow record is already closed".to_string(),
            ));
        }

        let mut tx = self.repository.pool.begin().await?;
        self.repository.borrows.mark_cancelled(&mut tx, record.id).await?;
        tx.commit().await?;

        self.audit.record("borrow.cancelled", "borrow_record", record_id).await;
        Ok(())
    }

    /// Soft-delete a borrow record; blocked while an unpaid penalty is attached
    pub async fn delete(&self, record_id: i32) -> AppResult<()> {
        let record = self.repository.borrows.get_by_id(record_id).await?;

        if record.status() != BorrowStatus::ClaimedLost
            && self
                .repository
                .penalties
                .exists_unpaid_for_borrow(record_id)
                .await?
        {
            return Err(AppError::BusinessRule(
                "Cannot delete a borrow record with an unpaid penalty".to_string(),
            ));
        }

        let mut tx = self.repository.pool.begin().await?;
        self.repository.borrows.mark_deleted(&mut tx, record.id).await?;
        tx.commit().await?;

        self.audit.record("borrow.deleted", "borrow_record", record_id).await;
        Ok(())
    }

    /// Declare a borrowed book lost, seeding a LostBook penalty at the
    /// current book price. The penalty keeps growing in the accrual pass
    /// until it is paid.
    pub async fn claim_lost(&self, record_id: i32) -> AppResult<()> {
        let now = Utc::now();

        let record = self.repository.borrows.get_by_id(record_id).await?;
        if !record.is_open() {
            return Err(AppError::BusinessRule(
                "Borrow record is already closed".to_string(),
            ));
        }
        let book = self.repository.books.get_by_id(record.book_id).await?;

        let mut tx = self.repository.pool.begin().await?;
        self.repository
            .borrows
            .mark_claimed_lost(&mut tx, record.id, now)
            .await?;
        let penalty_id = self
            .repository
            .penalties
            .create(
                &mut tx,
                &NewPenalty {
                    user_id: record.user_id,
                    borrow_record_id: Some(record.id),
                    penalty_type: PenaltyType::LostBook,
                    amount: book.price,
                    overdue_days_billed: 0,
                    description: format!("Lost copy of '{}'", book.title),
                },
            )
            .await?;
        tx.commit().await?;

        self.audit.record("borrow.claimed_lost", "borrow_record", record_id).await;
        self.notifier
            .notify(
                NotificationType::LostClaimRecorded,
                json!({
                    "user_id": record.user_id,
                    "book_id": record.book_id,
                    "borrow_record_id": record.id,
                    "penalty_id": penalty_id,
                    "amount": book.price,
                }),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::ReservationStatus;
    use rust_decimal::Decimal;

    fn membership(borrow_limit: i16, now: DateTime<Utc>) -> MembershipGrant {
        MembershipGrant {
            id: 1,
            user_id: 100,
            borrow_limit,
            reservation_limit: 5,
            effective_start_date: now - Duration::days(30),
            expiration_date: now + Duration::days(335),
            is_active: true,
        }
    }

    fn book(status: BookStatus) -> Book {
        Book {
            id: 1,
            title: "Ficciones".to_string(),
            price: Decimal::new(1500, 2),
            total_copies: 2,
            available_copies: if status == BookStatus::Available { 1 } else { 0 },
            status: i16::from(status),
            is_active: true,
        }
    }

    fn allocation(now: DateTime<Utc>) -> Reservation {
        Reservation {
            id: 7,
            user_id: 100,
            book_id: 1,
            reservation_date: now - Duration::days(3),
            allocate_after: now - Duration::days(3),
            is_allocated: true,
            allocated_at: Some(now - Duration::days(1)),
            status: i16::from(ReservationStatus::Allocated),
            transfer_count: 0,
            cancel_reason: None,
            is_active: true,
        }
    }

    #[test]
    fn test_borrow_requires_membership() {
        let now = Utc::now();
        let err = check_borrow_eligibility(None, 0, false, &book(BookStatus::Available), None, now)
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[test]
    fn test_borrow_rejects_expired_membership() {
        let now = Utc::now();
        let mut m = membership(5, now);
        m.expiration_date = now - Duration::days(1);
        let result =
            check_borrow_eligibility(Some(&m), 0, false, &book(BookStatus::Available), None, now);
        assert!(result.is_err());
    }

    #[test]
    fn test_borrow_enforces_limit() {
        let now = Utc::now();
        let m = membership(3, now);
        assert!(
            check_borrow_eligibility(Some(&m), 2, false, &book(BookStatus::Available), None, now)
                .is_ok()
        );
        let err =
            check_borrow_eligibility(Some(&m), 3, false, &book(BookStatus::Available), None, now)
                .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[test]
    fn test_borrow_rejects_duplicate_record() {
        let now = Utc::now();
        let m = membership(5, now);
        let err =
            check_borrow_eligibility(Some(&m), 0, true, &book(BookStatus::Available), None, now)
                .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_borrow_reserved_requires_own_allocation() {
        let now = Utc::now();
        let m = membership(5, now);
        let reserved = book(BookStatus::Reserved);

        let err = check_borrow_eligibility(Some(&m), 0, false, &reserved, None, now).unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));

        let a = allocation(now);
        assert!(check_borrow_eligibility(Some(&m), 0, false, &reserved, Some(&a), now).is_ok());
    }

    #[test]
    fn test_borrow_rejects_removed_book() {
        let now = Utc::now();
        let m = membership(5, now);
        let mut removed = book(BookStatus::Available);
        removed.status = i16::from(BookStatus::Removed);
        assert!(check_borrow_eligibility(Some(&m), 0, false, &removed, None, now).is_err());
    }
}
