//! Mutable per-group state guarded by the group's lock.

use splitledger_core::{Balance, IdentityKey};

use crate::balance::BalanceStore;
use crate::expense::Expense;
use crate::group::Group;

/// Everything one group owns: membership, balances, expense log.
///
/// Only ever touched while holding the group's mutex, so each public ledger
/// operation sees and leaves a consistent state.
#[derive(Debug)]
pub(crate) struct GroupState {
    pub(crate) group: Group,
    pub(crate) balances: BalanceStore,
    pub(crate) expenses: Vec<Expense>,
    last_sequence: u64,
}

impl GroupState {
    pub(crate) fn new(group: Group) -> Self {
        Self {
            group,
            balances: BalanceStore::new(),
            expenses: Vec::new(),
            last_sequence: 0,
        }
    }

    /// Next notification sequence number for this group (starts at 1).
    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// Balances of every member, in join order.
    pub(crate) fn member_balances(&self) -> Vec<(IdentityKey, Balance)> {
        self.group
            .members()
            .iter()
            .map(|m| (*m, self.balances.get(m)))
            .collect()
    }
}
