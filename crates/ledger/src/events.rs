//! Notifications emitted by committed ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{Amount, ExpenseId, GroupId, IdentityKey};
use splitledger_events::{Event, EventEnvelope};

use crate::simplify::Transfer;

/// Envelope type published on the notification sink.
pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group_id: GroupId,
    pub owner: IdentityKey,
    pub members: Vec<IdentityKey>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoined {
    pub group_id: GroupId,
    pub user: IdentityKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseAdded {
    pub group_id: GroupId,
    pub expense_id: ExpenseId,
    pub payer: IdentityKey,
    pub total_amount: Amount,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtsSimplified {
    pub group_id: GroupId,
    pub transfers: Vec<Transfer>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettled {
    pub group_id: GroupId,
    pub debtor: IdentityKey,
    pub creditor: IdentityKey,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    GroupCreated(GroupCreated),
    UserJoined(UserJoined),
    ExpenseAdded(ExpenseAdded),
    DebtsSimplified(DebtsSimplified),
    DebtSettled(DebtSettled),
}

impl LedgerEvent {
    pub fn group_id(&self) -> GroupId {
        match self {
            LedgerEvent::GroupCreated(e) => e.group_id,
            LedgerEvent::UserJoined(e) => e.group_id,
            LedgerEvent::ExpenseAdded(e) => e.group_id,
            LedgerEvent::DebtsSimplified(e) => e.group_id,
            LedgerEvent::DebtSettled(e) => e.group_id,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::GroupCreated(_) => "ledger.group.created",
            LedgerEvent::UserJoined(_) => "ledger.group.user_joined",
            LedgerEvent::ExpenseAdded(_) => "ledger.expense.added",
            LedgerEvent::DebtsSimplified(_) => "ledger.debts.simplified",
            LedgerEvent::DebtSettled(_) => "ledger.debt.settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::GroupCreated(e) => e.occurred_at,
            LedgerEvent::UserJoined(e) => e.occurred_at,
            LedgerEvent::ExpenseAdded(e) => e.occurred_at,
            LedgerEvent::DebtsSimplified(e) => e.occurred_at,
            LedgerEvent::DebtSettled(e) => e.occurred_at,
        }
    }
}
