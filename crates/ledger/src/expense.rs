//! Expense recording and share allocation.
//!
//! All three allocation modes (equal, percentage, exact) reduce to one list of
//! `(debtor, amount)` shares and go through the same checked core, which
//! enforces membership and `sum(shares) == total`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::amount::{self, Amount, Balance};
use splitledger_core::{Entity, ExpenseId, GroupId, IdentityKey, LedgerError, LedgerResult};

use crate::state::GroupState;

/// How the shares of an expense were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Equal,
    Percentage,
    Exact,
}

/// One debtor's part of an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseShare {
    pub debtor: IdentityKey,
    pub amount: Amount,
}

/// Recorded expense (immutable, append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub description: String,
    pub total_amount: Amount,
    pub payer: IdentityKey,
    pub shares: Vec<ExpenseShare>,
    pub split: SplitKind,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Unvalidated expense input, produced by one of the allocation modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub description: String,
    pub total_amount: Amount,
    pub payer: IdentityKey,
    pub debtors: Vec<IdentityKey>,
    pub amounts: Vec<Amount>,
    pub split: SplitKind,
}

/// Equal split: everyone gets `total / n`; the first participant also absorbs
/// the remainder so no unit is lost.
pub fn equal_split(total: Amount, participants: usize) -> LedgerResult<Vec<Amount>> {
    if participants == 0 {
        return Err(LedgerError::NoParticipants);
    }
    let n = participants as u128;
    let base = total / n;
    let mut shares = vec![base; participants];
    shares[0] += total % n;
    Ok(shares)
}

/// Percentage split: `floor(total * pct / 100)` each, leftover to the first
/// participant. Percentages must sum to exactly 100.
pub fn percentage_split(total: Amount, percentages: &[u32]) -> LedgerResult<Vec<Amount>> {
    if percentages.is_empty() {
        return Err(LedgerError::NoParticipants);
    }
    let pct_sum: u64 = percentages.iter().map(|p| u64::from(*p)).sum();
    if pct_sum != 100 {
        return Err(LedgerError::InvalidPercentageSum(pct_sum));
    }

    // floor(t * p / 100) == (t / 100) * p + floor((t % 100) * p / 100), and the
    // right-hand side cannot overflow for p <= 100.
    let hundreds = total / 100;
    let rest = total % 100;
    let mut shares: Vec<Amount> = percentages
        .iter()
        .map(|p| {
            let p = u128::from(*p);
            hundreds * p + rest * p / 100
        })
        .collect();

    let allocated = amount::checked_sum(&shares)?;
    shares[0] += total - allocated;
    Ok(shares)
}

impl NewExpense {
    pub fn equal(
        description: impl Into<String>,
        total_amount: Amount,
        payer: IdentityKey,
        participants: &[IdentityKey],
    ) -> LedgerResult<Self> {
        let amounts = equal_split(total_amount, participants.len())?;
        Ok(Self {
            description: description.into(),
            total_amount,
            payer,
            debtors: participants.to_vec(),
            amounts,
            split: SplitKind::Equal,
        })
    }

    pub fn percentage(
        description: impl Into<String>,
        total_amount: Amount,
        payer: IdentityKey,
        participants: &[IdentityKey],
        percentages: &[u32],
    ) -> LedgerResult<Self> {
        if participants.len() != percentages.len() {
            return Err(LedgerError::LengthMismatch {
                participants: participants.len(),
                values: percentages.len(),
            });
        }
        let amounts = percentage_split(total_amount, percentages)?;
        Ok(Self {
            description: description.into(),
            total_amount,
            payer,
            debtors: participants.to_vec(),
            amounts,
            split: SplitKind::Percentage,
        })
    }

    pub fn exact(
        description: impl Into<String>,
        total_amount: Amount,
        payer: IdentityKey,
        debtors: &[IdentityKey],
        amounts: &[Amount],
    ) -> Self {
        Self {
            description: description.into(),
            total_amount,
            payer,
            debtors: debtors.to_vec(),
            amounts: amounts.to_vec(),
            split: SplitKind::Exact,
        }
    }
}

impl GroupState {
    /// Validate and record an expense.
    ///
    /// `next_id` is only called once every check has passed, so a rejected
    /// expense consumes no id and leaves balances and the log untouched.
    pub(crate) fn record_expense(
        &mut self,
        expense: NewExpense,
        next_id: impl FnOnce() -> ExpenseId,
        recorded_at: DateTime<Utc>,
    ) -> LedgerResult<Expense> {
        let group_id = self.group.id_typed();

        if !self.group.is_member(&expense.payer) {
            return Err(LedgerError::PayerNotMember {
                group_id,
                payer: expense.payer,
            });
        }
        if let Some(debtor) = expense.debtors.iter().find(|d| !self.group.is_member(d)) {
            return Err(LedgerError::DebtorNotMember {
                group_id,
                debtor: *debtor,
            });
        }
        if expense.debtors.len() != expense.amounts.len() {
            return Err(LedgerError::LengthMismatch {
                participants: expense.debtors.len(),
                values: expense.amounts.len(),
            });
        }
        if expense.debtors.is_empty() {
            return Err(LedgerError::NoParticipants);
        }

        let shares_total = amount::checked_sum(&expense.amounts)?;
        if shares_total != expense.total_amount {
            return Err(LedgerError::AmountMismatch {
                total: expense.total_amount,
                shares: shares_total,
            });
        }

        let mut deltas: Vec<(IdentityKey, Balance)> = Vec::with_capacity(expense.debtors.len() + 1);
        deltas.push((expense.payer, amount::to_balance(expense.total_amount)?));
        for (debtor, share) in expense.debtors.iter().zip(&expense.amounts) {
            deltas.push((*debtor, -amount::to_balance(*share)?));
        }
        self.balances.apply(&deltas)?;

        let recorded = Expense {
            id: next_id(),
            group_id,
            description: expense.description,
            total_amount: expense.total_amount,
            payer: expense.payer,
            shares: expense
                .debtors
                .into_iter()
                .zip(expense.amounts)
                .map(|(debtor, amount)| ExpenseShare { debtor, amount })
                .collect(),
            split: expense.split,
            recorded_at,
        };
        self.expenses.push(recorded.clone());

        tracing::debug!(
            group_id = %group_id,
            expense_id = %recorded.id,
            shares = recorded.shares.len(),
            "expense shares applied"
        );

        Ok(recorded)
    }
}
