//! Shared-expense ledger core.
//!
//! Groups of participants record expenses; the ledger keeps every member's net
//! position per group, can collapse those positions into a minimal set of
//! transfers, and settles a debtor against a creditor through an external
//! payment capability.
//!
//! Pure bookkeeping plus locking: no persistence, no transport.

pub mod balance;
pub mod config;
pub mod events;
pub mod expense;
pub mod group;
pub mod ledger;
mod registry;
pub mod settlement;
pub mod simplify;
mod state;

pub use balance::{BalanceSnapshot, BalanceStore};
pub use config::{ConfigError, LedgerConfig};
pub use events::{
    DebtSettled, DebtsSimplified, ExpenseAdded, GroupCreated, LedgerEnvelope, LedgerEvent,
    UserJoined,
};
pub use expense::{Expense, ExpenseShare, NewExpense, SplitKind, equal_split, percentage_split};
pub use group::{CreateGroup, Group, GroupCommand, JoinGroup, MembershipIndex};
pub use ledger::Ledger;
pub use settlement::{NoopPaymentGateway, PaymentError, PaymentGateway};
pub use simplify::{Transfer, plan_transfers};
