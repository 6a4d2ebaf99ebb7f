//! Inventory & reservation allocator
//!
//! Owns the consistency of the shared copy pool across direct borrowing,
//! queued reservations and time-based expiry. The batch passes load a
//! snapshot, plan in memory and persist the plan inside one transaction
//! guarded by the circulation advisory lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        enums::ReservationStatus,
        reservation::Reservation,
        Scope,
    },
    repository::Repository,
    services::{
        audit::AuditWriter,
        inventory,
        notifications::{announce, NotificationType, Notifier},
        settings::CirculationSettings,
    },
};

/// Cancel reason recorded when an allocation's pickup window closes
pub const CANCEL_REASON_TIMEOUT: &str = "Timeout";

/// One reservation granted a physical copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationGrant {
    pub reservation_id: i32,
    pub user_id: i32,
    pub book_id: i32,
}

impl AllocationGrant {
    fn from_reservation(r: &Reservation) -> Self {
        Self {
            reservation_id: r.id,
            user_id: r.user_id,
            book_id: r.book_id,
        }
    }
}

/// Outcome of a reallocation/allocation pass
#[derive(Debug, Default, Serialize)]
pub struct AllocationReport {
    pub expired: Vec<AllocationGrant>,
    pub allocated: Vec<AllocationGrant>,
    pub skipped: u32,
}

/// In-memory expiry plan over a loaded snapshot
#[derive(Debug, Default)]
pub(crate) struct ExpiryPlan {
    pub cancelled: Vec<AllocationGrant>,
    pub skipped: u32,
}

/// Free the copies held by timed-out allocations.
///
/// A book whose counters cannot absorb the freed copy is a consistency
/// violation: the item is logged and skipped, the pass continues.
pub(crate) fn plan_expirations(books: &mut HashMap<i32, Book>, expired: &[Reservation]) -> ExpiryPlan {
    let mut plan = ExpiryPlan::default();
    for reservation in expired {
        let Some(book) = books.get_mut(&reservation.book_id) else {
            tracing::error!(
                reservation_id = reservation.id,
                book_id = reservation.book_id,
                "expired allocation references unknown book, skipping"
            );
            plan.skipped += 1;
            continue;
        };
        match inventory::adjust_availability(book, 1) {
            Ok(()) => plan.cancelled.push(AllocationGrant::from_reservation(reservation)),
            Err(e) => {
                tracing::error!(reservation_id = reservation.id, "skipping expired allocation: {}", e);
                plan.skipped += 1;
            }
        }
    }
    plan
}

/// Hand out available copies to the pending queue.
///
/// `pending` arrives FIFO by reservation date; each reservation takes a copy
/// while its book has any left, so with k copies the k earliest win.
/// Reservations still inside their allocate-after delay are passed over.
pub(crate) fn plan_allocations(
    books: &mut HashMap<i32, Book>,
    pending: &[Reservation],
    now: DateTime<Utc>,
) -> Vec<AllocationGrant> {
    let mut grants = Vec::new();
    for reservation in pending {
        if !reservation.is_allocatable(now) {
            continue;
        }
        let Some(book) = books.get_mut(&reservation.book_id) else {
            continue;
        };
        if !book.is_circulating() || book.available_copies == 0 {
            continue;
        }
        if let Err(e) = inventory::adjust_availability(book, -1) {
            tracing::error!(reservation_id = reservation.id, "skipping allocation: {}", e);
            continue;
        }
        grants.push(AllocationGrant::from_reservation(reservation));
    }
    grants
}

#[derive(Clone)]
pub struct AllocatorService {
    repository: Repository,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditWriter>,
}

impl AllocatorService {
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

    /// Queue a reservation for a user
    pub async fn reserve(&self, user_id: i32, book_id: i32) -> AppResult<Reservation> {
        let now = Utc::now();

        let membership = self
            .repository
            .memberships
            .current_for_user(user_id, now)
            .await?
            .ok_or_else(|| {
                AppError::BusinessRule(format!("User {} has no active membership", user_id))
            })?;

        let open = self.repository.reservations.count_open_for_user(user_id).await?;
        if open >= membership.reservation_limit as i64 {
            return Err(AppError::BusinessRule(format!(
                "Reservation limit reached ({}/{})",
                open, membership.reservation_limit
            )));
        }

        let book = self.repository.books.get_by_id(book_id).await?;
        if !book.is_circulating() {
            return Err(AppError::BusinessRule(format!(
                "Book '{}' is not available for reservation",
                book.title
            )));
        }

        if self
            .repository
            .reservations
            .exists_open_for_user_book(user_id, book_id)
            .await?
        {
            return Err(AppError::Conflict(
                "User already holds a reservation for this book".to_string(),
            ));
        }
        if self
            .repository
            .borrows
            .exists_open_for_user_book(user_id, book_id)
            .await?
        {
            return Err(AppError::Conflict(
                "User already holds a borrow record for this book".to_string(),
            ));
        }

        let mut tx = self.repository.pool.begin().await?;
        let id = self
            .repository
            .reservations
            .create(&mut tx, user_id, book_id, now)
            .await?;
        tx.commit().await?;

        self.audit.record("reservation.created", "reservation", id).await;
        self.repository.reservations.get_by_id(id).await
    }

    /// Give up an allocated copy and rejoin the queue after the configured delay
    pub async fn transfer(&self, reservation_id: i32) -> AppResult<()> {
        let settings = CirculationSettings::load(&self.repository).await?;
        let now = Utc::now();

        let mut tx = self.repository.begin_circulation_pass().await?;

        let reservation = self.repository.reservations.get_by_id(reservation_id).await?;
        if !reservation.is_active || reservation.status() != ReservationStatus::Allocated {
            return Err(AppError::BusinessRule(
                "Only an allocated reservation can be transferred".to_string(),
            ));
        }
        if reservation.transfer_count >= settings.transfer_limit {
            return Err(AppError::BusinessRule(format!(
                "Transfer limit reached ({}/{})",
                reservation.transfer_count, settings.transfer_limit
            )));
        }

        let mut book = self
            .repository
            .books
            .get_for_update(&mut tx, reservation.book_id)
            .await?;
        inventory::adjust_availability(&mut book, 1)?;
        // the reservation itself goes back in the queue, so it stays open
        inventory::recompute_status(&mut book, true);

        self.repository
            .reservations
            .mark_transferred(
                &mut tx,
                reservation.id,
                now + Duration::days(settings.allocation_delay_days),
            )
            .await?;
        self.repository.books.update_inventory(&mut tx, &book).await?;

        tx.commit().await?;

        self.audit
            .record("reservation.transferred", "reservation", reservation_id)
            .await;
        Ok(())
    }

    /// Cancel a reservation with a reason
    pub async fn cancel(&self, reservation_id: i32, reason: &str) -> AppResult<()> {
        self.release(reservation_id, Some(reason)).await?;
        self.audit
            .record("reservation.cancelled", "reservation", reservation_id)
            .await;
        self.notifier
            .notify(
                NotificationType::ReservationCancelled,
                json!({ "reservation_id": reservation_id, "reason": reason }),
            )
            .await;
        Ok(())
    }

    /// Soft-delete a reservation
    pub async fn delete(&self, reservation_id: i32) -> AppResult<()> {
        self.release(reservation_id, None).await?;
        self.audit
            .record("reservation.deleted", "reservation", reservation_id)
            .await;
        Ok(())
    }

    /// Deactivate a reservation, freeing its copy if it held an allocation
    async fn release(&self, reservation_id: i32, cancel_reason: Option<&str>) -> AppResult<()> {
        let mut tx = self.repository.begin_circulation_pass().await?;

        let reservation = self.repository.reservations.get_by_id(reservation_id).await?;
        if !reservation.is_open() {
            return Err(AppError::BusinessRule(
                "Reservation is already closed".to_string(),
            ));
        }

        match cancel_reason {
            Some(reason) => {
                self.repository
                    .reservations
                    .mark_cancelled(&mut tx, reservation.id, reason)
                    .await?
            }
            None => {
                self.repository
                    .reservations
                    .mark_deleted(&mut tx, reservation.id)
                    .await?
            }
        }

        if reservation.is_allocated && reservation.status() == ReservationStatus::Allocated {
            let mut book = self
                .repository
                .books
                .get_for_update(&mut tx, reservation.book_id)
                .await?;
            inventory::adjust_availability(&mut book, 1)?;
            let has_open = self
                .repository
                .reservations
                .exists_open_for_book(&mut tx, reservation.book_id)
                .await?;
            inventory::recompute_status(&mut book, has_open);
            self.repository.books.update_inventory(&mut tx, &book).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Cancel timed-out allocations, free their copies, then immediately
    /// reconsider the freed books for the pending queue. One transaction.
    pub async fn reallocate_expired(&self, scope: Scope) -> AppResult<AllocationReport> {
        let settings = CirculationSettings::load(&self.repository).await?;
        let now = Utc::now();

        let mut tx = self.repository.begin_circulation_pass().await?;

        let cutoff = now - Duration::days(settings.allocation_due_days);
        let expired = self
            .repository
            .reservations
            .list_expired_allocations(&mut tx, cutoff, scope)
            .await?;

        let mut book_ids: Vec<i32> = expired.iter().map(|r| r.book_id).collect();
        book_ids.sort_unstable();
        book_ids.dedup();

        let mut books: HashMap<i32, Book> = self
            .repository
            .books
            .list_for_update(&mut tx, &book_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let plan = plan_expirations(&mut books, &expired);
        for grant in &plan.cancelled {
            self.repository
                .reservations
                .mark_cancelled(&mut tx, grant.reservation_id, CANCEL_REASON_TIMEOUT)
                .await?;
        }

        let mut freed: Vec<i32> = plan.cancelled.iter().map(|g| g.book_id).collect();
        freed.sort_unstable();
        freed.dedup();

        for book_id in &freed {
            if let Some(book) = books.get_mut(book_id) {
                let has_open = self
                    .repository
                    .reservations
                    .exists_open_for_book(&mut tx, *book_id)
                    .await?;
                inventory::recompute_status(book, has_open);
                self.repository.books.update_inventory(&mut tx, book).await?;
            }
        }

        // the freed copies go straight back to the queue, regardless of the
        // expiry scope: the oldest reservation wins whoever holds it
        let allocated = self
            .allocate_in(&mut tx, now, Scope::All, Some(&freed))
            .await?;

        tx.commit().await?;

        if !plan.cancelled.is_empty() {
            tracing::info!(
                expired = plan.cancelled.len(),
                allocated = allocated.len(),
                "reallocation pass complete"
            );
        }
        announce(
            self.notifier.as_ref(),
            NotificationType::AllocationExpired,
            &plan.cancelled,
        )
        .await;
        announce(
            self.notifier.as_ref(),
            NotificationType::AllocationReady,
            &allocated,
        )
        .await;

        Ok(AllocationReport {
            expired: plan.cancelled,
            allocated,
            skipped: plan.skipped,
        })
    }

    /// Hand available copies to eligible reservations, FIFO by creation time
    pub async fn allocate_pending(&self, scope: Scope) -> AppResult<AllocationReport> {
        let now = Utc::now();

        let mut tx = self.repository.begin_circulation_pass().await?;
        let allocated = self.allocate_in(&mut tx, now, scope, None).await?;
        tx.commit().await?;

        if !allocated.is_empty() {
            tracing::info!(allocated = allocated.len(), "allocation pass complete");
        }
        announce(
            self.notifier.as_ref(),
            NotificationType::AllocationReady,
            &allocated,
        )
        .await;

        Ok(AllocationReport {
            expired: Vec::new(),
            allocated,
            skipped: 0,
        })
    }

    /// Allocation step shared by both passes, run on the pass transaction
    async fn allocate_in(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        scope: Scope,
        book_ids: Option<&[i32]>,
    ) -> AppResult<Vec<AllocationGrant>> {
        let pending = self
            .repository
            .reservations
            .list_pending(conn, now, scope, book_ids)
            .await?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<i32> = pending.iter().map(|r| r.book_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut books: HashMap<i32, Book> = self
            .repository
            .books
            .list_for_update(conn, &ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let grants = plan_allocations(&mut books, &pending, now);
        for grant in &grants {
            self.repository
                .reservations
                .mark_allocated(conn, grant.reservation_id, now)
                .await?;
        }

        let mut touched: Vec<i32> = grants.iter().map(|g| g.book_id).collect();
        touched.sort_unstable();
        touched.dedup();
        for book_id in touched {
            if let Some(book) = books.get_mut(&book_id) {
                // the freshly allocated reservation keeps the queue open
                inventory::recompute_status(book, true);
                self.repository.books.update_inventory(conn, book).await?;
            }
        }

        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::BookStatus;
    use rust_decimal::Decimal;

    fn book(id: i32, available: i16, total: i16) -> Book {
        Book {
            id,
            title: format!("Book {}", id),
            price: Decimal::new(900, 2),
            total_copies: total,
            available_copies: available,
            status: i16::from(if available > 0 {
                BookStatus::Available
            } else {
                BookStatus::Reserved
            }),
            is_active: true,
        }
    }

    fn reservation(id: i32, user_id: i32, book_id: i32, day: i64) -> Reservation {
        let date = Utc::now() - Duration::days(30 - day);
        Reservation {
            id,
            user_id,
            book_id,
            reservation_date: date,
            allocate_after: date,
            is_allocated: false,
            allocated_at: None,
            status: i16::from(ReservationStatus::Reserved),
            transfer_count: 0,
            cancel_reason: None,
            is_active: true,
        }
    }

    fn books_map(books: Vec<Book>) -> HashMap<i32, Book> {
        books.into_iter().map(|b| (b.id, b)).collect()
    }

    #[test]
    fn test_fifo_allocates_earliest() {
        // 2 copies, 4 reservations ordered by date: the 2 earliest win
        let mut books = books_map(vec![book(1, 2, 3)]);
        let pending = vec![
            reservation(10, 100, 1, 1),
            reservation(11, 101, 1, 2),
            reservation(12, 102, 1, 3),
            reservation(13, 103, 1, 4),
        ];

        let grants = plan_allocations(&mut books, &pending, Utc::now());

        let ids: Vec<i32> = grants.iter().map(|g| g.reservation_id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(books[&1].available_copies, 0);
    }

    #[test]
    fn test_allocation_spans_books_independently() {
        let mut books = books_map(vec![book(1, 1, 1), book(2, 2, 2)]);
        let pending = vec![
            reservation(10, 100, 1, 1),
            reservation(11, 101, 2, 2),
            reservation(12, 102, 1, 3), // book 1 exhausted
            reservation(13, 103, 2, 4),
        ];

        let grants = plan_allocations(&mut books, &pending, Utc::now());

        let ids: Vec<i32> = grants.iter().map(|g| g.reservation_id).collect();
        assert_eq!(ids, vec![10, 11, 13]);
        assert_eq!(books[&1].available_copies, 0);
        assert_eq!(books[&2].available_copies, 0);
    }

    #[test]
    fn test_allocation_skips_removed_books() {
        let mut removed = book(1, 1, 1);
        removed.status = i16::from(BookStatus::Removed);
        let mut books = books_map(vec![removed]);
        let pending = vec![reservation(10, 100, 1, 1)];

        let grants = plan_allocations(&mut books, &pending, Utc::now());
        assert!(grants.is_empty());
        assert_eq!(books[&1].available_copies, 1);
    }

    #[test]
    fn test_allocation_skips_unknown_book() {
        let mut books = books_map(vec![]);
        let pending = vec![reservation(10, 100, 7, 1)];
        assert!(plan_allocations(&mut books, &pending, Utc::now()).is_empty());
    }

    #[test]
    fn test_allocation_waits_out_the_delay() {
        // a reservation re-queued by a transfer only becomes eligible once
        // its allocate-after instant has passed
        let mut books = books_map(vec![book(1, 1, 1)]);
        let mut delayed = reservation(10, 100, 1, 1);
        delayed.allocate_after = Utc::now() + Duration::days(2);
        let eligible = reservation(11, 101, 1, 5);
        let pending = vec![delayed, eligible];

        let grants = plan_allocations(&mut books, &pending, Utc::now());

        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].reservation_id, 11);
    }

    #[test]
    fn test_expiry_frees_copies() {
        let mut books = books_map(vec![book(1, 0, 1)]);
        let mut expired = reservation(10, 100, 1, 1);
        expired.is_allocated = true;
        expired.status = i16::from(ReservationStatus::Allocated);

        let plan = plan_expirations(&mut books, &[expired]);

        assert_eq!(plan.cancelled.len(), 1);
        assert_eq!(plan.skipped, 0);
        assert_eq!(books[&1].available_copies, 1);
    }

    #[test]
    fn test_expiry_skips_inconsistent_book() {
        // book already at capacity: freeing one more would exceed total
        let mut books = books_map(vec![book(1, 1, 1)]);
        let mut expired = reservation(10, 100, 1, 1);
        expired.is_allocated = true;
        expired.status = i16::from(ReservationStatus::Allocated);

        let plan = plan_expirations(&mut books, &[expired]);

        assert!(plan.cancelled.is_empty());
        assert_eq!(plan.skipped, 1);
        assert_eq!(books[&1].available_copies, 1);
    }

    #[test]
    fn test_expired_copy_flows_back_to_queue() {
        // expiry then allocation over the same snapshot: the freed copy is
        // handed to the oldest pending reservation in the same pass
        let mut books = books_map(vec![book(1, 0, 1)]);
        let mut expired = reservation(10, 100, 1, 1);
        expired.is_allocated = true;
        expired.status = i16::from(ReservationStatus::Allocated);

        let plan = plan_expirations(&mut books, &[expired]);
        assert_eq!(books[&1].available_copies, 1);

        let pending = vec![reservation(11, 101, 1, 2), reservation(12, 102, 1, 3)];
        let grants = plan_allocations(&mut books, &pending, Utc::now());

        assert_eq!(plan.cancelled.len(), 1);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].reservation_id, 11);
        assert_eq!(books[&1].available_copies, 0);
    }
}
