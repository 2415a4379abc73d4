//! Group registry: owns every group's state handle and the membership index.
//!
//! Lock order is always: group table → group mutex → membership index.
//! The table lock is only held long enough to look up or insert a handle.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use splitledger_core::{GroupId, IdentityKey, LedgerError, LedgerResult};

use crate::events::LedgerEvent;
use crate::group::{CreateGroup, Group, MembershipIndex};
use crate::state::GroupState;

pub(crate) type GroupHandle = Arc<Mutex<GroupState>>;

thread_local! {
    /// Group locks held by the current thread (keyed by handle address).
    static HELD_GROUPS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a group as locked by this thread for the guard's lifetime.
///
/// A second attempt from the same thread (a payment gateway or notification
/// sink calling back into the ledger) fails fast instead of deadlocking on the
/// group mutex.
pub(crate) struct ReentrancyGuard {
    key: usize,
}

impl ReentrancyGuard {
    pub(crate) fn enter(handle: &GroupHandle, group_id: GroupId) -> LedgerResult<Self> {
        let key = Arc::as_ptr(handle) as usize;
        HELD_GROUPS.with(|held| {
            let mut held = held.borrow_mut();
            if held.contains(&key) {
                return Err(LedgerError::ReentrantCall(group_id));
            }
            held.push(key);
            Ok(Self { key })
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        HELD_GROUPS.with(|held| held.borrow_mut().retain(|k| *k != self.key));
    }
}

pub(crate) fn lock_state(handle: &GroupHandle) -> LedgerResult<MutexGuard<'_, GroupState>> {
    handle.lock().map_err(|_| LedgerError::LockPoisoned)
}

#[derive(Debug)]
struct GroupTable {
    by_id: HashMap<GroupId, GroupHandle>,
    /// Next id to hand out; only advanced once a group is actually inserted.
    next_id: u64,
}

#[derive(Debug)]
pub struct GroupRegistry {
    table: RwLock<GroupTable>,
    index: RwLock<MembershipIndex>,
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(GroupTable {
                by_id: HashMap::new(),
                next_id: 1,
            }),
            index: RwLock::new(MembershipIndex::default()),
        }
    }

    /// Create and register a group.
    ///
    /// `on_created` runs with the new group's lock held (and marked as held by
    /// this thread), after the group is visible in the table and the index. It
    /// receives the events the group applied on creation.
    pub(crate) fn create_group<F>(
        &self,
        creator: IdentityKey,
        initial_members: &[IdentityKey],
        max_members: Option<usize>,
        created_at: DateTime<Utc>,
        on_created: F,
    ) -> LedgerResult<GroupId>
    where
        F: FnOnce(&mut GroupState, Vec<LedgerEvent>),
    {
        let mut table = self.table.write().map_err(|_| LedgerError::LockPoisoned)?;
        let group_id = GroupId::new(table.next_id);
        let (group, events) = Group::create(CreateGroup {
            group_id,
            creator,
            initial_members: initial_members.to_vec(),
            max_members,
            occurred_at: created_at,
        })?;
        let members = group.members().to_vec();

        let handle: GroupHandle = Arc::new(Mutex::new(GroupState::new(group)));
        let _reentry = ReentrancyGuard::enter(&handle, group_id)?;
        let mut state = lock_state(&handle)?;
        {
            let mut index = self.index.write().map_err(|_| LedgerError::LockPoisoned)?;
            for member in members {
                index.insert(member, group_id);
            }
        }
        table.by_id.insert(group_id, Arc::clone(&handle));
        table.next_id += 1;
        drop(table);

        on_created(&mut *state, events);
        Ok(group_id)
    }

    pub(crate) fn handle(&self, group_id: GroupId) -> LedgerResult<GroupHandle> {
        let table = self.table.read().map_err(|_| LedgerError::LockPoisoned)?;
        table
            .by_id
            .get(&group_id)
            .cloned()
            .ok_or(LedgerError::GroupNotFound(group_id))
    }

    /// Write access to the membership index. Take it with the group's lock held.
    pub(crate) fn index_mut(&self) -> LedgerResult<RwLockWriteGuard<'_, MembershipIndex>> {
        self.index.write().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn user_groups(&self, user: &IdentityKey) -> LedgerResult<BTreeSet<GroupId>> {
        let index = self.index.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(index.groups_of(user))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.read().map(|t| t.by_id.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitledger_core::AggregateRoot;

    fn key(n: u128) -> IdentityKey {
        IdentityKey::from_u128(n)
    }

    #[test]
    fn ids_start_at_one_and_skip_nothing_on_failure() {
        let registry = GroupRegistry::new();
        let first = registry
            .create_group(key(1), &[], None, Utc::now(), |_, _| {})
            .unwrap();
        assert_eq!(first, GroupId::new(1));

        let err = registry
            .create_group(IdentityKey::NULL, &[], None, Utc::now(), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidIdentity(_)));

        let second = registry
            .create_group(key(2), &[], None, Utc::now(), |_, _| {})
            .unwrap();
        assert_eq!(second, GroupId::new(2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn index_reflects_initial_members() {
        let registry = GroupRegistry::new();
        let g = registry
            .create_group(key(1), &[key(2)], None, Utc::now(), |_, _| {})
            .unwrap();

        assert!(registry.user_groups(&key(2)).unwrap().contains(&g));
        assert!(registry.user_groups(&key(3)).unwrap().is_empty());
    }

    #[test]
    fn unknown_group_is_not_found() {
        let registry = GroupRegistry::new();
        assert_eq!(registry.len(), 0);
        assert_eq!(
            registry.handle(GroupId::new(5)).unwrap_err(),
            LedgerError::GroupNotFound(GroupId::new(5))
        );
    }

    #[test]
    fn creation_callback_sees_the_group_as_held() {
        let registry = GroupRegistry::new();
        let mut seen = None;
        let g = registry
            .create_group(key(1), &[key(2)], None, Utc::now(), |state, events| {
                let handle = registry.handle(state.group.id_typed()).unwrap();
                seen = Some((
                    ReentrancyGuard::enter(&handle, state.group.id_typed()).err(),
                    events.len(),
                    state.group.version(),
                ));
            })
            .unwrap();

        assert_eq!(seen, Some((Some(LedgerError::ReentrantCall(g)), 1, 1)));
        // Released once creation returns.
        let handle = registry.handle(g).unwrap();
        assert!(ReentrancyGuard::enter(&handle, g).is_ok());
    }
}
