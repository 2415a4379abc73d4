//! `Ledger`: the public face of the accounting core.
//!
//! Every public operation runs as one indivisible unit against a single group:
//!
//! ```text
//! look up group handle (table read lock, released immediately)
//!   ↓
//! lock group (held for the whole operation)
//!   ↓
//! decide (aggregate `handle` or the checked core) → mutate
//!   (settlement only: external payment, roll back on failure)
//!   ↓
//! apply the event to the group aggregate, publish notification (best-effort, still under the group lock so the
//! per-group sequence matches publication order)
//! ```
//!
//! Operations on different groups never contend beyond the short table lookup.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

use splitledger_core::{
    Aggregate, Amount, Balance, ExpenseId, GroupId, IdentityKey, LedgerError, LedgerResult,
    format_amount,
};
use splitledger_events::{EventBus, EventEnvelope, InMemoryEventBus};

use crate::config::LedgerConfig;
use crate::events::{DebtSettled, DebtsSimplified, ExpenseAdded, LedgerEnvelope, LedgerEvent};
use crate::expense::{Expense, NewExpense};
use crate::group::{Group, GroupCommand, JoinGroup};
use crate::registry::{GroupRegistry, ReentrancyGuard, lock_state};
use crate::settlement::{NoopPaymentGateway, PaymentGateway};
use crate::simplify::{Transfer, plan_transfers};
use crate::state::GroupState;

/// Shared-expense ledger.
///
/// - `P`: external payment capability used by [`Ledger::settle`]
/// - `B`: notification sink
///
/// `Ledger` is `Send + Sync`; share it behind an `Arc`.
#[derive(Debug)]
pub struct Ledger<P = NoopPaymentGateway, B = InMemoryEventBus<LedgerEnvelope>> {
    config: LedgerConfig,
    registry: GroupRegistry,
    /// Last expense id handed out (ids start at 1).
    last_expense_id: AtomicU64,
    payments: P,
    bus: B,
}

impl Ledger {
    /// Books-only ledger with an in-memory notification bus.
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(config, NoopPaymentGateway, InMemoryEventBus::new())
    }
}

impl<P, B> Ledger<P, B> {
    pub fn new(config: LedgerConfig, payments: P, bus: B) -> Self {
        Self {
            config,
            registry: GroupRegistry::new(),
            last_expense_id: AtomicU64::new(0),
            payments,
            bus,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn payments(&self) -> &P {
        &self.payments
    }

    fn fmt_amount(&self, amount: Amount) -> String {
        format_amount(amount, self.config.decimals)
    }

    /// Run `f` against a group's state under its lock.
    fn with_group<T>(
        &self,
        group_id: GroupId,
        f: impl FnOnce(&mut GroupState) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let handle = self.registry.handle(group_id)?;
        let _reentry = ReentrancyGuard::enter(&handle, group_id)?;
        let mut state = lock_state(&handle)?;
        f(&mut state)
    }
}

impl<P, B> Ledger<P, B>
where
    P: PaymentGateway,
    B: EventBus<LedgerEnvelope>,
{
    /// Apply a committed event to the group aggregate, then publish it.
    fn commit(&self, state: &mut GroupState, event: LedgerEvent) {
        state.group.apply(&event);
        self.publish(state, event);
    }

    /// Wrap and publish a notification. Delivery failures are logged, never returned.
    fn publish(&self, state: &mut GroupState, event: LedgerEvent) {
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            state.group.id_typed(),
            state.next_sequence(),
            event,
        );
        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(
                group_id = %state.group.id_typed(),
                error = ?err,
                "failed to publish ledger notification"
            );
        }
    }

    /// Create a group owned by `creator`.
    ///
    /// `creator` always becomes the first member; null or repeated entries in
    /// `initial_members` are skipped.
    pub fn create_group(
        &self,
        creator: IdentityKey,
        initial_members: &[IdentityKey],
    ) -> LedgerResult<GroupId> {
        let now = Utc::now();
        self.registry.create_group(
            creator,
            initial_members,
            self.config.max_members,
            now,
            |state, events| {
                tracing::info!(
                    group_id = %state.group.id_typed(),
                    owner = %creator,
                    members = state.group.members().len(),
                    "group created"
                );
                // Already applied by the aggregate on creation.
                for event in events {
                    self.publish(state, event);
                }
            },
        )
    }

    pub fn join_group(&self, group_id: GroupId, user: IdentityKey) -> LedgerResult<()> {
        self.with_group(group_id, |state| {
            // Take the index first so members and index move in lock-step.
            let mut index = self.registry.index_mut()?;
            let events = state.group.handle(&GroupCommand::Join(JoinGroup {
                group_id,
                user,
                max_members: self.config.max_members,
                occurred_at: Utc::now(),
            }))?;
            index.insert(user, group_id);
            drop(index);

            tracing::info!(group_id = %group_id, user = %user, "user joined group");
            for event in events {
                self.commit(state, event);
            }
            Ok(())
        })
    }

    /// Record an expense split equally between `participants`.
    ///
    /// The first participant absorbs the integer remainder.
    pub fn add_expense_equal(
        &self,
        group_id: GroupId,
        description: impl Into<String>,
        total_amount: Amount,
        payer: IdentityKey,
        participants: &[IdentityKey],
    ) -> LedgerResult<ExpenseId> {
        let description = description.into();
        self.with_group(group_id, |state| {
            let expense = NewExpense::equal(description, total_amount, payer, participants)?;
            self.record(state, expense)
        })
    }

    /// Record an expense split by whole percentages (must sum to 100).
    ///
    /// Each share is floored; the first participant absorbs the leftover.
    pub fn add_expense_percentage(
        &self,
        group_id: GroupId,
        description: impl Into<String>,
        total_amount: Amount,
        payer: IdentityKey,
        participants: &[IdentityKey],
        percentages: &[u32],
    ) -> LedgerResult<ExpenseId> {
        let description = description.into();
        self.with_group(group_id, |state| {
            let expense =
                NewExpense::percentage(description, total_amount, payer, participants, percentages)?;
            self.record(state, expense)
        })
    }

    /// Record an expense with caller-supplied shares (must sum to the total).
    pub fn add_expense_exact(
        &self,
        group_id: GroupId,
        description: impl Into<String>,
        total_amount: Amount,
        payer: IdentityKey,
        debtors: &[IdentityKey],
        amounts: &[Amount],
    ) -> LedgerResult<ExpenseId> {
        let expense = NewExpense::exact(description, total_amount, payer, debtors, amounts);
        self.with_group(group_id, |state| self.record(state, expense))
    }

    fn record(&self, state: &mut GroupState, expense: NewExpense) -> LedgerResult<ExpenseId> {
        let recorded = state.record_expense(
            expense,
            || ExpenseId::new(self.last_expense_id.fetch_add(1, Ordering::SeqCst) + 1),
            Utc::now(),
        )?;

        tracing::info!(
            group_id = %recorded.group_id,
            expense_id = %recorded.id,
            payer = %recorded.payer,
            total = %self.fmt_amount(recorded.total_amount),
            split = ?recorded.split,
            "expense recorded"
        );
        self.commit(
            state,
            LedgerEvent::ExpenseAdded(ExpenseAdded {
                group_id: recorded.group_id,
                expense_id: recorded.id,
                payer: recorded.payer,
                total_amount: recorded.total_amount,
                description: recorded.description.clone(),
                occurred_at: recorded.recorded_at,
            }),
        );
        Ok(recorded.id)
    }

    /// Collapse the group's balances into the minimal transfer set.
    ///
    /// Only a current member may trigger this. Each member's net position is
    /// unchanged; the returned transfers are the new debt edges.
    pub fn simplify_debts(&self, group_id: GroupId, caller: IdentityKey) -> LedgerResult<Vec<Transfer>> {
        self.with_group(group_id, |state| {
            let transfers = state.simplify(caller)?;
            tracing::info!(
                group_id = %group_id,
                caller = %caller,
                transfers = transfers.len(),
                "debts simplified"
            );
            self.commit(
                state,
                LedgerEvent::DebtsSimplified(DebtsSimplified {
                    group_id,
                    transfers: transfers.clone(),
                    occurred_at: Utc::now(),
                }),
            );
            Ok(transfers)
        })
    }

    /// Settle as much as possible of `debtor`'s debt against `creditor`.
    ///
    /// Returns the settled amount. If the payment gateway fails, balances are
    /// restored and `ExternalTransferFailed` is returned.
    pub fn settle(&self, group_id: GroupId, debtor: IdentityKey, creditor: IdentityKey) -> LedgerResult<Amount> {
        self.with_group(group_id, |state| {
            let amount = state.settle(debtor, creditor, &self.payments)?;
            tracing::info!(
                group_id = %group_id,
                debtor = %debtor,
                creditor = %creditor,
                amount = %self.fmt_amount(amount),
                "debt settled"
            );
            self.commit(
                state,
                LedgerEvent::DebtSettled(DebtSettled {
                    group_id,
                    debtor,
                    creditor,
                    amount,
                    occurred_at: Utc::now(),
                }),
            );
            Ok(amount)
        })
    }
}

/// Read-only queries. These always reflect the latest committed state.
impl<P, B> Ledger<P, B> {
    /// Whether `user` belongs to `group_id`; `false` for unknown groups.
    pub fn is_member(&self, group_id: GroupId, user: &IdentityKey) -> LedgerResult<bool> {
        match self.with_group(group_id, |state| Ok(state.group.is_member(user))) {
            Err(LedgerError::GroupNotFound(_)) => Ok(false),
            other => other,
        }
    }

    pub fn group(&self, group_id: GroupId) -> LedgerResult<Group> {
        self.with_group(group_id, |state| Ok(state.group.clone()))
    }

    /// Members in join order (owner first).
    pub fn group_members(&self, group_id: GroupId) -> LedgerResult<Vec<IdentityKey>> {
        self.with_group(group_id, |state| Ok(state.group.members().to_vec()))
    }

    pub fn user_groups(&self, user: &IdentityKey) -> LedgerResult<BTreeSet<GroupId>> {
        self.registry.user_groups(user)
    }

    /// Net balance of `user` in `group_id`; zero for unknown groups or users.
    pub fn balance(&self, group_id: GroupId, user: &IdentityKey) -> LedgerResult<Balance> {
        match self.with_group(group_id, |state| Ok(state.balances.get(user))) {
            Err(LedgerError::GroupNotFound(_)) => Ok(0),
            other => other,
        }
    }

    /// Every member's balance, in join order.
    pub fn group_balances(&self, group_id: GroupId) -> LedgerResult<Vec<(IdentityKey, Balance)>> {
        self.with_group(group_id, |state| Ok(state.member_balances()))
    }

    /// Recorded expenses, oldest first.
    pub fn expenses(&self, group_id: GroupId) -> LedgerResult<Vec<Expense>> {
        self.with_group(group_id, |state| Ok(state.expenses.clone()))
    }

    pub fn expense(&self, group_id: GroupId, expense_id: ExpenseId) -> LedgerResult<Option<Expense>> {
        self.with_group(group_id, |state| {
            Ok(state.expenses.iter().find(|e| e.id == expense_id).cloned())
        })
    }

    /// The transfers `simplify_debts` would produce, without touching anything.
    pub fn suggested_transfers(&self, group_id: GroupId) -> LedgerResult<Vec<Transfer>> {
        self.with_group(group_id, |state| Ok(plan_transfers(&state.member_balances())))
    }
}
