//! Book inventory ownership
//!
//! The one place allowed to touch (available_copies, status). Callers adjust
//! availability and recompute status through these functions, then persist
//! both fields together via `BooksRepository::update_inventory`.

use crate::{
    error::{AppError, AppResult},
    models::{book::Book, enums::BookStatus},
};

/// Apply a copy-count delta, enforcing `0 <= available <= total`.
///
/// A violation means the stored counters have drifted; it is reported, never
/// clamped, so the affected item can be investigated.
pub fn adjust_availability(book: &mut Book, delta: i16) -> AppResult<()> {
    let next = book.available_copies + delta;
    if next < 0 || next > book.total_copies {
        return Err(AppError::Consistency(format!(
            "book {}: available copies would become {} of {} total",
            book.id, next, book.total_copies
        )));
    }
    book.available_copies = next;
    Ok(())
}

/// Free one copy if the book is below capacity.
///
/// Returns false without touching the count when the book is already at
/// capacity, which happens when a borrow that never consumed a copy is
/// returned. The caller logs it.
pub fn try_release_copy(book: &mut Book) -> bool {
    if book.available_copies < book.total_copies {
        book.available_copies += 1;
        true
    } else {
        false
    }
}

/// Derive the book status from its availability and reservation queue.
///
/// Removed books keep their status; everything else follows the invariant:
/// Reserved only at zero availability with a live queue, Available whenever
/// copies remain.
pub fn recompute_status(book: &mut Book, has_open_reservations: bool) {
    if book.status() == BookStatus::Removed {
        return;
    }
    let status = if book.available_copies > 0 {
        BookStatus::Available
    } else if has_open_reservations {
        BookStatus::Reserved
    } else {
        BookStatus::CheckedOut
    };
    book.status = i16::from(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn book(available: i16, total: i16, status: BookStatus) -> Book {
        Book {
            id: 1,
            title: "The Aleph".to_string(),
            price: Decimal::new(1250, 2),
            total_copies: total,
            available_copies: available,
            status: i16::from(status),
            is_active: true,
        }
    }

    #[test]
    fn test_adjust_within_bounds() {
        let mut b = book(1, 3, BookStatus::Available);
        assert!(adjust_availability(&mut b, 1).is_ok());
        assert_eq!(b.available_copies, 2);
        assert!(adjust_availability(&mut b, -2).is_ok());
        assert_eq!(b.available_copies, 0);
    }

    #[test]
    fn test_adjust_rejects_overflow() {
        let mut b = book(3, 3, BookStatus::Available);
        let err = adjust_availability(&mut b, 1).unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));
        // state untouched on rejection
        assert_eq!(b.available_copies, 3);
    }

    #[test]
    fn test_adjust_rejects_underflow() {
        let mut b = book(0, 3, BookStatus::Reserved);
        assert!(adjust_availability(&mut b, -1).is_err());
        assert_eq!(b.available_copies, 0);
    }

    #[test]
    fn test_release_copy_at_capacity() {
        let mut b = book(2, 2, BookStatus::Available);
        assert!(!try_release_copy(&mut b));
        assert_eq!(b.available_copies, 2);

        let mut b = book(1, 2, BookStatus::Available);
        assert!(try_release_copy(&mut b));
        assert_eq!(b.available_copies, 2);
    }

    #[test]
    fn test_recompute_status() {
        let mut b = book(0, 2, BookStatus::Available);
        recompute_status(&mut b, true);
        assert_eq!(b.status(), BookStatus::Reserved);

        recompute_status(&mut b, false);
        assert_eq!(b.status(), BookStatus::CheckedOut);

        b.available_copies = 1;
        recompute_status(&mut b, true);
        assert_eq!(b.status(), BookStatus::Available);
    }

    #[test]
    fn test_recompute_keeps_removed() {
        let mut b = book(1, 2, BookStatus::Removed);
        recompute_status(&mut b, false);
        assert_eq!(b.status(), BookStatus::Removed);
    }
}
