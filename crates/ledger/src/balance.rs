//! Per-group net balances.
//!
//! The store keeps each member's *net* position directly instead of a pairwise
//! debtor → creditor graph, so reading a position is a single lookup and an
//! expense touches only the payer and its debtors. Any pairwise view is derived
//! on demand (see `simplify::plan_transfers`).
//!
//! Every mutation must be paired: the deltas applied by one logical operation
//! sum to zero, which keeps the group total at exactly zero.

use std::collections::HashMap;

use splitledger_core::amount::{self, Balance};
use splitledger_core::{IdentityKey, LedgerError, LedgerResult};

/// Net balances for one group. Absent entries read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceStore {
    balances: HashMap<IdentityKey, Balance>,
}

/// Saved values for a subset of members, used to undo a staged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    entries: Vec<(IdentityKey, Balance)>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: &IdentityKey) -> Balance {
        self.balances.get(user).copied().unwrap_or(0)
    }

    /// Add `delta` to a single member.
    ///
    /// Callers must pair this with an opposite adjustment in the same
    /// operation. Prefer [`BalanceStore::apply`] which enforces that.
    pub fn adjust(&mut self, user: IdentityKey, delta: Balance) -> LedgerResult<()> {
        let next = amount::checked_add(self.get(&user), delta)?;
        self.balances.insert(user, next);
        Ok(())
    }

    /// Apply a batch of deltas all-or-nothing.
    ///
    /// The batch must be zero-sum. New values are computed first; the store is
    /// only written once every delta is known to fit.
    pub fn apply(&mut self, deltas: &[(IdentityKey, Balance)]) -> LedgerResult<()> {
        let mut net: Balance = 0;
        let mut staged: Vec<(IdentityKey, Balance)> = Vec::with_capacity(deltas.len());

        for (user, delta) in deltas {
            net = amount::checked_add(net, *delta)?;
            match staged.iter_mut().find(|(k, _)| k == user) {
                Some((_, value)) => *value = amount::checked_add(*value, *delta)?,
                None => staged.push((*user, amount::checked_add(self.get(user), *delta)?)),
            }
        }

        if net != 0 {
            return Err(LedgerError::invariant(format!(
                "unbalanced batch (net delta {net})"
            )));
        }

        for (user, value) in staged {
            self.balances.insert(user, value);
        }
        Ok(())
    }

    /// Move `amount` from `from` to `to` (debit one, credit the other).
    pub fn transfer(&mut self, from: IdentityKey, to: IdentityKey, amount: Balance) -> LedgerResult<()> {
        let negated = amount
            .checked_neg()
            .ok_or_else(|| LedgerError::overflow(format!("cannot negate {amount}")))?;
        self.apply(&[(from, negated), (to, amount)])
    }

    /// Zero every listed member. Only used as the first half of a full rewrite.
    pub fn reset_all<'a>(&mut self, members: impl IntoIterator<Item = &'a IdentityKey>) {
        for member in members {
            self.balances.insert(*member, 0);
        }
    }

    /// Sum over all stored entries; zero whenever the store is consistent.
    pub fn total(&self) -> Balance {
        // Partial sums may leave the i128 range even when the total does not.
        self.balances
            .values()
            .fold(0, |acc: Balance, v| acc.wrapping_add(*v))
    }

    pub fn snapshot(&self, users: &[IdentityKey]) -> BalanceSnapshot {
        BalanceSnapshot {
            entries: users.iter().map(|u| (*u, self.get(u))).collect(),
        }
    }

    pub fn restore(&mut self, snapshot: BalanceSnapshot) {
        for (user, value) in snapshot.entries {
            self.balances.insert(user, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u128) -> IdentityKey {
        IdentityKey::from_u128(n)
    }

    #[test]
    fn absent_members_read_as_zero() {
        let store = BalanceStore::new();
        assert_eq!(store.get(&key(1)), 0);
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn paired_adjustments_keep_the_total_at_zero() {
        let mut store = BalanceStore::new();
        store.adjust(key(1), 40).unwrap();
        store.adjust(key(2), -40).unwrap();

        assert_eq!(store.get(&key(1)), 40);
        assert_eq!(store.get(&key(2)), -40);
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn overflowing_adjust_is_rejected_without_writes() {
        let mut store = BalanceStore::new();
        store.adjust(key(1), i128::MAX).unwrap();

        let err = store.adjust(key(1), 1).unwrap_err();
        assert!(matches!(err, LedgerError::ArithmeticOverflow(_)));
        assert_eq!(store.get(&key(1)), i128::MAX);

        store.adjust(key(2), i128::MIN).unwrap();
        assert!(store.adjust(key(2), -1).is_err());
        assert_eq!(store.get(&key(2)), i128::MIN);
    }

    #[test]
    fn apply_merges_repeated_members() {
        let mut store = BalanceStore::new();
        store
            .apply(&[(key(1), 100), (key(2), -60), (key(2), -40)])
            .unwrap();
        assert_eq!(store.get(&key(1)), 100);
        assert_eq!(store.get(&key(2)), -100);
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn unbalanced_batch_is_rejected_without_writes() {
        let mut store = BalanceStore::new();
        let err = store.apply(&[(key(1), 10), (key(2), -9)]).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
        assert_eq!(store, BalanceStore::new());
    }

    #[test]
    fn overflowing_batch_leaves_store_untouched() {
        let mut store = BalanceStore::new();
        store.transfer(key(2), key(1), i128::MAX).unwrap();
        let before = store.clone();

        assert!(store.transfer(key(3), key(1), 1).is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn snapshot_restore_undoes_transfer() {
        let mut store = BalanceStore::new();
        store.transfer(key(2), key(1), 50).unwrap();

        let snapshot = store.snapshot(&[key(1), key(2)]);
        store.transfer(key(1), key(2), 50).unwrap();
        assert_eq!(store.get(&key(1)), 0);

        store.restore(snapshot);
        assert_eq!(store.get(&key(1)), 50);
        assert_eq!(store.get(&key(2)), -50);
    }

    #[test]
    fn reset_all_zeroes_listed_members() {
        let mut store = BalanceStore::new();
        store.transfer(key(2), key(1), 5).unwrap();
        store.reset_all(&[key(1), key(2)]);
        assert_eq!(store.get(&key(1)), 0);
        assert_eq!(store.get(&key(2)), 0);
    }
}
