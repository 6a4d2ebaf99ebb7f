//! Shared domain enums for circulation state

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BookStatus
// ---------------------------------------------------------------------------

/// Book availability status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum BookStatus {
    Available = 0,
    Reserved = 1,
    CheckedOut = 2,
    Removed = 3,
}

impl From<i16> for BookStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => BookStatus::Reserved,
            2 => BookStatus::CheckedOut,
            3 => BookStatus::Removed,
            _ => BookStatus::Available,
        }
    }
}

impl From<BookStatus> for i16 {
    fn from(s: BookStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BookStatus::Available => "Available",
            BookStatus::Reserved => "Reserved",
            BookStatus::CheckedOut => "Checked out",
            BookStatus::Removed => "Removed",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// ReservationStatus
// ---------------------------------------------------------------------------

/// Reservation lifecycle status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum ReservationStatus {
    Reserved = 0,
    Allocated = 1,
    Fulfilled = 2,
    Cancelled = 3,
}

impl ReservationStatus {
    /// Fulfilled and Cancelled reservations never re-enter the queue.
    pub fn is_final(self) -> bool {
        matches!(self, ReservationStatus::Fulfilled | ReservationStatus::Cancelled)
    }
}

impl From<i16> for ReservationStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => ReservationStatus::Allocated,
            2 => ReservationStatus::Fulfilled,
            3 => ReservationStatus::Cancelled,
            _ => ReservationStatus::Reserved,
        }
    }
}

impl From<ReservationStatus> for i16 {
    fn from(s: ReservationStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReservationStatus::Reserved => "Reserved",
            ReservationStatus::Allocated => "Allocated",
            ReservationStatus::Fulfilled => "Fulfilled",
            ReservationStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// BorrowStatus
// ---------------------------------------------------------------------------

/// Borrow record lifecycle status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum BorrowStatus {
    Borrowed = 0,
    Renewed = 1,
    Returned = 2,
    Overdue = 3,
    Cancelled = 4,
    ClaimedLost = 5,
}

impl BorrowStatus {
    /// Returned, Cancelled and ClaimedLost are terminal states.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            BorrowStatus::Returned | BorrowStatus::Cancelled | BorrowStatus::ClaimedLost
        )
    }
}

impl From<i16> for BorrowStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => BorrowStatus::Renewed,
            2 => BorrowStatus::Returned,
            3 => BorrowStatus::Overdue,
            4 => BorrowStatus::Cancelled,
            5 => BorrowStatus::ClaimedLost,
            _ => BorrowStatus::Borrowed,
        }
    }
}

impl From<BorrowStatus> for i16 {
    fn from(s: BorrowStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BorrowStatus::Borrowed => "Borrowed",
            BorrowStatus::Renewed => "Renewed",
            BorrowStatus::Returned => "Returned",
            BorrowStatus::Overdue => "Overdue",
            BorrowStatus::Cancelled => "Cancelled",
            BorrowStatus::ClaimedLost => "Claimed lost",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// PenaltyType
// ---------------------------------------------------------------------------

/// Penalty classification codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum PenaltyType {
    ExtraHoldings = 0,
    BooksHeldUnderExpiredMembership = 1,
    LateReturnRenew = 2,
    LostBook = 3,
}

impl From<i16> for PenaltyType {
    fn from(v: i16) -> Self {
        match v {
            1 => PenaltyType::BooksHeldUnderExpiredMembership,
            2 => PenaltyType::LateReturnRenew,
            3 => PenaltyType::LostBook,
            _ => PenaltyType::ExtraHoldings,
        }
    }
}

impl From<PenaltyType> for i16 {
    fn from(t: PenaltyType) -> Self {
        t as i16
    }
}

impl std::fmt::Display for PenaltyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PenaltyType::ExtraHoldings => "Extra holdings",
            PenaltyType::BooksHeldUnderExpiredMembership => "Books held under expired membership",
            PenaltyType::LateReturnRenew => "Late return or renewal",
            PenaltyType::LostBook => "Lost book",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

/// Penalty payment status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum PaymentStatus {
    Unpaid = 0,
    Paid = 1,
}

impl From<i16> for PaymentStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        }
    }
}

impl From<PaymentStatus> for i16 {
    fn from(s: PaymentStatus) -> Self {
        s as i16
    }
}

// ---------------------------------------------------------------------------
// EscalationType
// ---------------------------------------------------------------------------

/// Penalty rate escalation mode, parsed from the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationType {
    Additive,
    Multiplicative,
}

impl EscalationType {
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "multiplicative" => EscalationType::Multiplicative,
            _ => EscalationType::Additive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(BookStatus::from(1), BookStatus::Reserved);
        assert_eq!(i16::from(BookStatus::Removed), 3);
        assert_eq!(ReservationStatus::from(2), ReservationStatus::Fulfilled);
        assert_eq!(BorrowStatus::from(5), BorrowStatus::ClaimedLost);
        assert_eq!(BorrowStatus::from(99), BorrowStatus::Borrowed);
    }

    #[test]
    fn test_final_states() {
        assert!(ReservationStatus::Cancelled.is_final());
        assert!(!ReservationStatus::Allocated.is_final());
        assert!(BorrowStatus::Returned.is_final());
        assert!(!BorrowStatus::Overdue.is_final());
    }

    #[test]
    fn test_escalation_parse() {
        assert_eq!(EscalationType::parse("multiplicative"), EscalationType::Multiplicative);
        assert_eq!(EscalationType::parse("additive"), EscalationType::Additive);
        assert_eq!(EscalationType::parse("unknown"), EscalationType::Additive);
    }
}
