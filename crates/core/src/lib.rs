//! `splitledger-core`: ledger foundation building blocks.
//!
//! This crate contains **pure** primitives (identifiers, amounts, errors).
//! No locking, no IO.

pub mod aggregate;
pub mod amount;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use amount::{Amount, Balance, DEFAULT_DECIMALS, format_amount};
pub use entity::Entity;
pub use error::{LedgerError, LedgerResult};
pub use id::{ExpenseId, GroupId, IdentityKey};
