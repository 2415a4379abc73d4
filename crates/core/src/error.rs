//! Ledger error model.

use thiserror::Error;

use crate::amount::{Amount, Balance};
use crate::id::{GroupId, IdentityKey};

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every variant is a deterministic precondition failure. None are retried; an
/// operation that returns one of these has left all ledger state untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("{user} is already a member of group {group_id}")]
    AlreadyMember { group_id: GroupId, user: IdentityKey },

    #[error("{user} is not a member of group {group_id}")]
    NotAMember { group_id: GroupId, user: IdentityKey },

    #[error("group {0} has no members")]
    EmptyGroup(GroupId),

    /// Group would exceed the configured member cap.
    #[error("group {group_id} is full (max {max} members)")]
    GroupFull { group_id: GroupId, max: usize },

    #[error("payer {payer} is not a member of group {group_id}")]
    PayerNotMember { group_id: GroupId, payer: IdentityKey },

    #[error("debtor {debtor} is not a member of group {group_id}")]
    DebtorNotMember { group_id: GroupId, debtor: IdentityKey },

    #[error("shares sum to {shares}, expected {total}")]
    AmountMismatch { total: Amount, shares: Amount },

    #[error("percentages sum to {0}, expected 100")]
    InvalidPercentageSum(u64),

    #[error("{participants} participants but {values} shares")]
    LengthMismatch { participants: usize, values: usize },

    #[error("expense needs at least one participant")]
    NoParticipants,

    #[error("{debtor} has no negative balance ({balance})")]
    NoNegativeBalance { debtor: IdentityKey, balance: Balance },

    #[error("{creditor} is not a creditor ({balance})")]
    NotACreditor { creditor: IdentityKey, balance: Balance },

    #[error("nothing to settle")]
    NothingToSettle,

    #[error("external transfer failed: {0}")]
    ExternalTransferFailed(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// A ledger invariant (e.g. zero-sum) would have been broken.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An operation tried to re-enter a group that the current thread is
    /// already mutating (e.g. from inside a payment callback).
    #[error("re-entrant call into group {0}")]
    ReentrantCall(GroupId),

    #[error("ledger state lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub fn not_a_member(group_id: GroupId, user: IdentityKey) -> Self {
        Self::NotAMember { group_id, user }
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::ArithmeticOverflow(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Stable machine-readable code, suitable for surfacing to callers verbatim.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GroupNotFound(_) => "GroupNotFound",
            Self::AlreadyMember { .. } => "AlreadyMember",
            Self::NotAMember { .. } => "NotAMember",
            Self::EmptyGroup(_) => "EmptyGroup",
            Self::GroupFull { .. } => "GroupFull",
            Self::PayerNotMember { .. } => "PayerNotMember",
            Self::DebtorNotMember { .. } => "DebtorNotMember",
            Self::AmountMismatch { .. } => "AmountMismatch",
            Self::InvalidPercentageSum(_) => "InvalidPercentageSum",
            Self::LengthMismatch { .. } => "LengthMismatch",
            Self::NoParticipants => "NoParticipants",
            Self::NoNegativeBalance { .. } => "NoNegativeBalance",
            Self::NotACreditor { .. } => "NotACreditor",
            Self::NothingToSettle => "NothingToSettle",
            Self::ExternalTransferFailed(_) => "ExternalTransferFailed",
            Self::InvalidIdentity(_) => "InvalidIdentity",
            Self::ArithmeticOverflow(_) => "ArithmeticOverflow",
            Self::InvariantViolation(_) => "InvariantViolation",
            Self::ReentrantCall(_) => "ReentrantCall",
            Self::LockPoisoned => "LockPoisoned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_identifiers() {
        let user = IdentityKey::from_u128(9);
        let err = LedgerError::AlreadyMember {
            group_id: GroupId::new(3),
            user,
        };
        assert_eq!(
            err.to_string(),
            format!("{user} is already a member of group 3")
        );
        assert_eq!(err.code(), "AlreadyMember");
    }

    #[test]
    fn mismatch_reports_both_sides() {
        let err = LedgerError::AmountMismatch { total: 100, shares: 99 };
        assert_eq!(err.to_string(), "shares sum to 99, expected 100");
    }
}
