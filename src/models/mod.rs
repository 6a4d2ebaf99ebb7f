//! Domain models for circulation state

pub mod book;
pub mod borrow;
pub mod enums;
pub mod membership;
pub mod penalty;
pub mod reservation;

/// Execution scope of a batch pass: the whole tenant or a single user.
///
/// A user's own page view triggers a `User` pass so their reservations and
/// penalties are reconciled without touching anyone else's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    User(i32),
}

impl Scope {
    /// The user filter this scope contributes to queries, if any.
    pub fn user_id(&self) -> Option<i32> {
        match self {
            Scope::All => None,
            Scope::User(id) => Some(*id),
        }
    }
}
