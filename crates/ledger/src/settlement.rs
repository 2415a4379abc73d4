//! Settlement between one debtor and one creditor.
//!
//! The ledger side is written first and the external payment runs last, under
//! the same group lock. If the payment fails, the staged balances are restored
//! from a snapshot and the whole settlement is reported as failed.

use std::sync::Arc;

use thiserror::Error;

use splitledger_core::amount::{self, Amount};
use splitledger_core::{IdentityKey, LedgerError, LedgerResult};

use crate::balance::{BalanceSnapshot, BalanceStore};
use crate::state::GroupState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("payment backend unavailable: {0}")]
    Unavailable(String),
}

/// Moves value outside the ledger's own bookkeeping (token contract, bank API,
/// internal wallet...).
///
/// Called while the group is locked. An implementation must not call back into
/// the same group; the ledger rejects such calls with `ReentrantCall`. If it
/// panics, the staged balances are restored before the lock is released.
pub trait PaymentGateway: Send + Sync {
    fn transfer(&self, from: IdentityKey, to: IdentityKey, amount: Amount) -> Result<(), PaymentError>;
}

impl<G> PaymentGateway for Arc<G>
where
    G: PaymentGateway + ?Sized,
{
    fn transfer(&self, from: IdentityKey, to: IdentityKey, amount: Amount) -> Result<(), PaymentError> {
        (**self).transfer(from, to, amount)
    }
}

/// Gateway for books-only ledgers: every transfer succeeds and nothing moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPaymentGateway;

impl PaymentGateway for NoopPaymentGateway {
    fn transfer(&self, _from: IdentityKey, _to: IdentityKey, _amount: Amount) -> Result<(), PaymentError> {
        Ok(())
    }
}

/// Staged balance change that is undone on drop unless committed.
///
/// Restoring from `Drop` also covers a payment gateway that panics: the group's
/// balances are back to their pre-settlement values while the stack unwinds.
struct StagedBalances<'a> {
    balances: &'a mut BalanceStore,
    snapshot: Option<BalanceSnapshot>,
}

impl<'a> StagedBalances<'a> {
    fn new(balances: &'a mut BalanceStore, snapshot: BalanceSnapshot) -> Self {
        Self {
            balances,
            snapshot: Some(snapshot),
        }
    }

    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for StagedBalances<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.balances.restore(snapshot);
        }
    }
}

impl GroupState {
    /// Amount `debtor` can settle against `creditor` right now.
    pub(crate) fn settlement_amount(&self, debtor: IdentityKey, creditor: IdentityKey) -> LedgerResult<Amount> {
        let debt = self.balances.get(&debtor);
        if debt >= 0 {
            return Err(LedgerError::NoNegativeBalance {
                debtor,
                balance: debt,
            });
        }
        let credit = self.balances.get(&creditor);
        if credit <= 0 {
            return Err(LedgerError::NotACreditor {
                creditor,
                balance: credit,
            });
        }

        let amount = debt.unsigned_abs().min(credit.unsigned_abs());
        if amount == 0 {
            return Err(LedgerError::NothingToSettle);
        }
        Ok(amount)
    }

    /// Stage the balance change, run the payment, commit or roll back.
    pub(crate) fn settle<P>(&mut self, debtor: IdentityKey, creditor: IdentityKey, payments: &P) -> LedgerResult<Amount>
    where
        P: PaymentGateway + ?Sized,
    {
        let amount = self.settlement_amount(debtor, creditor)?;

        let snapshot = self.balances.snapshot(&[debtor, creditor]);
        // Debtor's negative balance moves up, creditor's positive balance moves down.
        self.balances
            .transfer(creditor, debtor, amount::to_balance(amount)?)?;

        let staged = StagedBalances::new(&mut self.balances, snapshot);

        if let Err(err) = payments.transfer(debtor, creditor, amount) {
            drop(staged);
            tracing::warn!(
                group_id = %self.group.id_typed(),
                debtor = %debtor,
                creditor = %creditor,
                amount = %amount,
                error = %err,
                "payment failed; settlement rolled back"
            );
            return Err(LedgerError::ExternalTransferFailed(err.to_string()));
        }

        staged.commit();
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::test_group;
    use proptest::prelude::*;
    use splitledger_core::Balance;
    use std::sync::Mutex;

    fn key(n: u128) -> IdentityKey {
        IdentityKey::from_u128(n)
    }

    fn state_with(balances: &[(IdentityKey, Balance)]) -> GroupState {
        let members: Vec<IdentityKey> = balances.iter().map(|(k, _)| *k).collect();
        let mut state = GroupState::new(test_group(&members));
        state.balances.apply(balances).unwrap();
        state
    }

    /// Records calls and optionally fails them.
    #[derive(Default)]
    struct RecordingGateway {
        fail: bool,
        calls: Mutex<Vec<(IdentityKey, IdentityKey, Amount)>>,
    }

    impl PaymentGateway for RecordingGateway {
        fn transfer(&self, from: IdentityKey, to: IdentityKey, amount: Amount) -> Result<(), PaymentError> {
            self.calls.lock().unwrap().push((from, to, amount));
            if self.fail {
                Err(PaymentError::Declined("insufficient funds".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn settles_the_smaller_side() {
        let mut state = state_with(&[(key(1), 30), (key(2), -50), (key(3), 20)]);
        let gateway = RecordingGateway::default();

        let amount = state.settle(key(2), key(1), &gateway).unwrap();

        assert_eq!(amount, 30);
        assert_eq!(state.balances.get(&key(1)), 0);
        assert_eq!(state.balances.get(&key(2)), -20);
        assert_eq!(state.balances.total(), 0);
        assert_eq!(*gateway.calls.lock().unwrap(), vec![(key(2), key(1), 30)]);
    }

    #[test]
    fn non_negative_debtor_is_rejected() {
        let mut state = state_with(&[(key(1), 10), (key(2), -10), (key(3), 0)]);
        let err = state
            .settle(key(3), key(1), &NoopPaymentGateway)
            .unwrap_err();
        assert_eq!(err, LedgerError::NoNegativeBalance { debtor: key(3), balance: 0 });

        let err = state
            .settle(key(1), key(1), &NoopPaymentGateway)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoNegativeBalance { .. }));
    }

    #[test]
    fn non_positive_creditor_is_rejected() {
        let mut state = state_with(&[(key(1), 10), (key(2), -5), (key(3), -5)]);
        let err = state
            .settle(key(2), key(3), &NoopPaymentGateway)
            .unwrap_err();
        assert_eq!(err, LedgerError::NotACreditor { creditor: key(3), balance: -5 });
    }

    #[test]
    fn failed_payment_rolls_back() {
        let mut state = state_with(&[(key(1), 10), (key(2), -10)]);
        let version = splitledger_core::AggregateRoot::version(&state.group);
        let gateway = RecordingGateway {
            fail: true,
            ..RecordingGateway::default()
        };

        let err = state.settle(key(2), key(1), &gateway).unwrap_err();

        assert!(matches!(err, LedgerError::ExternalTransferFailed(msg) if msg.contains("insufficient")));
        assert_eq!(state.balances.get(&key(1)), 10);
        assert_eq!(state.balances.get(&key(2)), -10);
        assert_eq!(splitledger_core::AggregateRoot::version(&state.group), version);
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }

    struct PanickingGateway;

    impl PaymentGateway for PanickingGateway {
        fn transfer(&self, _from: IdentityKey, _to: IdentityKey, _amount: Amount) -> Result<(), PaymentError> {
            panic!("gateway crashed");
        }
    }

    #[test]
    fn panicking_gateway_leaves_balances_restored() {
        let mut state = state_with(&[(key(1), 10), (key(2), -10)]);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            state.settle(key(2), key(1), &PanickingGateway)
        }));

        assert!(outcome.is_err());
        assert_eq!(state.balances.get(&key(1)), 10);
        assert_eq!(state.balances.get(&key(2)), -10);
        assert_eq!(state.balances.total(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: settlement never pushes either party past zero.
        #[test]
        fn settlement_never_flips_sign(debt in 1i128..1_000_000, credit in 1i128..1_000_000) {
            let third = debt - credit;
            let mut state = state_with(&[(key(1), credit), (key(2), -debt), (key(3), third)]);

            let amount = state.settle(key(2), key(1), &NoopPaymentGateway).unwrap();

            prop_assert_eq!(amount, debt.min(credit) as u128);
            prop_assert!(state.balances.get(&key(1)) >= 0);
            prop_assert!(state.balances.get(&key(2)) <= 0);
            prop_assert_eq!(state.balances.total(), 0);
        }
    }
}
