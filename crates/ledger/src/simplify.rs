//! Debt simplification.
//!
//! Works on aggregated net positions, not on the shape of whatever pairwise
//! debts produced them. The result is a transfer set with the fewest edges
//! consistent with the same balances: at most `debtors + creditors - 1`.

use serde::{Deserialize, Serialize};

use splitledger_core::amount::{self, Amount, Balance};
use splitledger_core::{IdentityKey, LedgerError, LedgerResult};

use crate::state::GroupState;

/// A directed payment: `from` owes `to` the given amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: IdentityKey,
    pub to: IdentityKey,
    pub amount: Amount,
}

/// Greedy two-pointer matching over net balances.
///
/// Debtors are ordered most-negative first, creditors largest first. Both sorts
/// are stable, so ties keep the order of `balances` (join order when called
/// from a group). Zero balances take no part.
pub fn plan_transfers(balances: &[(IdentityKey, Balance)]) -> Vec<Transfer> {
    let mut debtors: Vec<(IdentityKey, Amount)> = Vec::new();
    let mut creditors: Vec<(IdentityKey, Amount)> = Vec::new();
    for (user, balance) in balances {
        if *balance < 0 {
            debtors.push((*user, balance.unsigned_abs()));
        } else if *balance > 0 {
            creditors.push((*user, balance.unsigned_abs()));
        }
    }

    debtors.sort_by(|a, b| b.1.cmp(&a.1));
    creditors.sort_by(|a, b| b.1.cmp(&a.1));

    let mut transfers = Vec::with_capacity((debtors.len() + creditors.len()).saturating_sub(1));
    let (mut d, mut c) = (0, 0);
    while d < debtors.len() && c < creditors.len() {
        let amount = debtors[d].1.min(creditors[c].1);
        if amount > 0 {
            transfers.push(Transfer {
                from: debtors[d].0,
                to: creditors[c].0,
                amount,
            });
            debtors[d].1 -= amount;
            creditors[c].1 -= amount;
        }
        if debtors[d].1 == 0 {
            d += 1;
        }
        if creditors[c].1 == 0 {
            c += 1;
        }
    }

    transfers
}

impl GroupState {
    /// Rewrite the group's balances from the greedy transfer plan.
    ///
    /// Balances are zeroed and then rebuilt by replaying each transfer, so every
    /// unit removed is added back somewhere and each member's net position is
    /// the same afterwards.
    pub(crate) fn simplify(&mut self, caller: IdentityKey) -> LedgerResult<Vec<Transfer>> {
        let group_id = self.group.id_typed();
        if self.group.members().is_empty() {
            return Err(LedgerError::EmptyGroup(group_id));
        }
        if !self.group.is_member(&caller) {
            return Err(LedgerError::not_a_member(group_id, caller));
        }

        let before = self.member_balances();
        let transfers = plan_transfers(&before);

        let members = self.group.members().to_vec();
        let snapshot = self.balances.snapshot(&members);
        self.balances.reset_all(&members);

        for transfer in &transfers {
            let applied = amount::to_balance(transfer.amount)
                .and_then(|value| self.balances.transfer(transfer.from, transfer.to, value));
            if let Err(err) = applied {
                self.balances.restore(snapshot);
                return Err(err);
            }
            tracing::debug!(
                group_id = %group_id,
                from = %transfer.from,
                to = %transfer.to,
                amount = %transfer.amount,
                "simplified transfer"
            );
        }

        if self.member_balances() != before {
            self.balances.restore(snapshot);
            return Err(LedgerError::invariant(
                "simplification changed a member's net position",
            ));
        }

        Ok(transfers)
    }
}
