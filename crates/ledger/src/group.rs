//! Groups and their membership.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{
    Aggregate, AggregateRoot, GroupId, IdentityKey, LedgerError, LedgerResult,
};

use crate::events::{GroupCreated, LedgerEvent, UserJoined};

/// Aggregate root: Group.
///
/// Invariants: the owner is always `members[0]`; `members` holds no duplicates
/// and no null identity; members are only ever appended (join order).
///
/// The version counts applied events: one for creation, then one per join,
/// expense, simplification and settlement committed against the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    owner: IdentityKey,
    members: Vec<IdentityKey>,
    version: u64,
    created_at: DateTime<Utc>,
    created: bool,
}

/// Command: CreateGroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub group_id: GroupId,
    pub creator: IdentityKey,
    /// Null or repeated entries are skipped silently.
    pub initial_members: Vec<IdentityKey>,
    pub max_members: Option<usize>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: JoinGroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroup {
    pub group_id: GroupId,
    pub user: IdentityKey,
    pub max_members: Option<usize>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCommand {
    Create(CreateGroup),
    Join(JoinGroup),
}

impl Group {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: GroupId) -> Self {
        Self {
            id,
            owner: IdentityKey::NULL,
            members: Vec::new(),
            version: 0,
            created_at: DateTime::<Utc>::default(),
            created: false,
        }
    }

    /// Run a `CreateGroup` command against a fresh aggregate.
    ///
    /// Returns the created group together with the events it applied.
    pub fn create(command: CreateGroup) -> LedgerResult<(Self, Vec<LedgerEvent>)> {
        let mut group = Self::empty(command.group_id);
        let events = group.handle(&GroupCommand::Create(command))?;
        for event in &events {
            group.apply(event);
        }
        Ok((group, events))
    }

    /// Linear scan over the member list.
    pub fn is_member(&self, user: &IdentityKey) -> bool {
        self.members.iter().any(|m| m == user)
    }

    pub fn id_typed(&self) -> GroupId {
        self.id
    }

    pub fn owner(&self) -> IdentityKey {
        self.owner
    }

    pub fn members(&self) -> &[IdentityKey] {
        &self.members
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ensure_group_id(&self, group_id: GroupId) -> LedgerResult<()> {
        if self.id != group_id {
            return Err(LedgerError::invariant(format!(
                "command for group {group_id} sent to group {}",
                self.id
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateGroup) -> LedgerResult<Vec<LedgerEvent>> {
        if self.created {
            return Err(LedgerError::invariant(format!("group {} already exists", self.id)));
        }
        self.ensure_group_id(cmd.group_id)?;
        if cmd.creator.is_null() {
            return Err(LedgerError::InvalidIdentity("group creator is null".to_string()));
        }

        let mut members = Vec::with_capacity(cmd.initial_members.len() + 1);
        members.push(cmd.creator);
        for member in &cmd.initial_members {
            if member.is_null() || members.contains(member) {
                continue;
            }
            members.push(*member);
        }

        if let Some(max) = cmd.max_members {
            if members.len() > max {
                return Err(LedgerError::GroupFull {
                    group_id: cmd.group_id,
                    max,
                });
            }
        }

        Ok(vec![LedgerEvent::GroupCreated(GroupCreated {
            group_id: cmd.group_id,
            owner: cmd.creator,
            members,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_join(&self, cmd: &JoinGroup) -> LedgerResult<Vec<LedgerEvent>> {
        if !self.created {
            return Err(LedgerError::GroupNotFound(cmd.group_id));
        }
        self.ensure_group_id(cmd.group_id)?;
        if cmd.user.is_null() {
            return Err(LedgerError::InvalidIdentity("joining user is null".to_string()));
        }
        if self.is_member(&cmd.user) {
            return Err(LedgerError::AlreadyMember {
                group_id: self.id,
                user: cmd.user,
            });
        }
        if let Some(max) = cmd.max_members {
            if self.members.len() >= max {
                return Err(LedgerError::GroupFull {
                    group_id: self.id,
                    max,
                });
            }
        }

        Ok(vec![LedgerEvent::UserJoined(UserJoined {
            group_id: self.id,
            user: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl AggregateRoot for Group {
    type Id = GroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Group {
    type Command = GroupCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::GroupCreated(e) => {
                self.id = e.group_id;
                self.owner = e.owner;
                self.members = e.members.clone();
                self.created_at = e.occurred_at;
                self.created = true;
            }
            LedgerEvent::UserJoined(e) => {
                self.members.push(e.user);
            }
            // Balance-side events live in the group's stores; the group only
            // counts them.
            LedgerEvent::ExpenseAdded(_)
            | LedgerEvent::DebtsSimplified(_)
            | LedgerEvent::DebtSettled(_) => {}
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GroupCommand::Create(cmd) => self.handle_create(cmd),
            GroupCommand::Join(cmd) => self.handle_join(cmd),
        }
    }
}

/// Identity → groups it belongs to. Kept in lock-step with `Group::members`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipIndex {
    by_user: HashMap<IdentityKey, BTreeSet<GroupId>>,
}

impl MembershipIndex {
    pub fn insert(&mut self, user: IdentityKey, group_id: GroupId) {
        self.by_user.entry(user).or_default().insert(group_id);
    }

    pub fn groups_of(&self, user: &IdentityKey) -> BTreeSet<GroupId> {
        self.by_user.get(user).cloned().unwrap_or_default()
    }
}

/// Group 1 with `members[0]` as owner and no cap.
#[cfg(test)]
pub(crate) fn test_group(members: &[IdentityKey]) -> Group {
    let (group, _) = Group::create(CreateGroup {
        group_id: GroupId::new(1),
        creator: members[0],
        initial_members: members[1..].to_vec(),
        max_members: None,
        occurred_at: Utc::now(),
    })
    .unwrap();
    group
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u128) -> IdentityKey {
        IdentityKey::from_u128(n)
    }

    fn create_cmd(group_id: u64, creator: IdentityKey, initial: &[IdentityKey], max: Option<usize>) -> CreateGroup {
        CreateGroup {
            group_id: GroupId::new(group_id),
            creator,
            initial_members: initial.to_vec(),
            max_members: max,
            occurred_at: Utc::now(),
        }
    }

    fn join_cmd(group_id: u64, user: IdentityKey, max: Option<usize>) -> GroupCommand {
        GroupCommand::Join(JoinGroup {
            group_id: GroupId::new(group_id),
            user,
            max_members: max,
            occurred_at: Utc::now(),
        })
    }

    fn execute(group: &mut Group, command: GroupCommand) -> LedgerResult<Vec<LedgerEvent>> {
        let events = group.handle(&command)?;
        for event in &events {
            group.apply(event);
        }
        Ok(events)
    }

    #[test]
    fn creator_is_first_and_duplicates_are_skipped() {
        let (g, events) =
            Group::create(create_cmd(1, key(1), &[key(2), key(1), IdentityKey::NULL, key(3), key(2)], None))
                .unwrap();
        assert_eq!(g.owner(), key(1));
        assert_eq!(g.members(), &[key(1), key(2), key(3)]);
        assert_eq!(g.version(), 1);
        match &events[..] {
            [LedgerEvent::GroupCreated(e)] => assert_eq!(e.members, g.members()),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn null_creator_is_rejected() {
        let err = Group::create(create_cmd(1, IdentityKey::NULL, &[], None)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidIdentity(_)));
    }

    #[test]
    fn created_group_cannot_be_created_again() {
        let g = test_group(&[key(1)]);
        let err = g
            .handle(&GroupCommand::Create(create_cmd(1, key(2), &[], None)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn join_on_uncreated_group_is_not_found() {
        let g = Group::empty(GroupId::new(7));
        let err = g.handle(&join_cmd(1, key(1), None)).unwrap_err();
        assert_eq!(err, LedgerError::GroupNotFound(GroupId::new(7)));
    }

    #[test]
    fn join_appends_in_order() {
        let mut g = test_group(&[key(1), key(2)]);
        let events = execute(&mut g, join_cmd(1, key(3), None)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(g.members(), &[key(1), key(2), key(3)]);
        assert_eq!(g.version(), 2);
        assert!(g.is_member(&key(3)));
    }

    #[test]
    fn handle_does_not_mutate() {
        let g = test_group(&[key(1)]);
        let before = g.clone();
        g.handle(&join_cmd(1, key(2), None)).unwrap();
        assert_eq!(g, before);
    }

    #[test]
    fn joining_twice_fails() {
        let mut g = test_group(&[key(1)]);
        execute(&mut g, join_cmd(1, key(2), None)).unwrap();
        let err = execute(&mut g, join_cmd(1, key(2), None)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadyMember {
                group_id: GroupId::new(1),
                user: key(2)
            }
        );
        assert_eq!(g.members().len(), 2);
        assert_eq!(g.version(), 2);
    }

    #[test]
    fn member_cap_applies_to_create_and_join() {
        let err = Group::create(create_cmd(4, key(1), &[key(2), key(3)], Some(2))).unwrap_err();
        assert_eq!(err, LedgerError::GroupFull { group_id: GroupId::new(4), max: 2 });

        let (mut g, _) = Group::create(create_cmd(5, key(1), &[key(2)], Some(2))).unwrap();
        assert!(matches!(
            execute(&mut g, join_cmd(1, key(3), Some(2))),
            Err(LedgerError::GroupFull { .. })
        ));
    }

    #[test]
    fn balance_events_only_advance_the_version() {
        let mut g = test_group(&[key(1), key(2)]);
        g.apply(&LedgerEvent::DebtSettled(crate::events::DebtSettled {
            group_id: GroupId::new(1),
            debtor: key(2),
            creditor: key(1),
            amount: 5,
            occurred_at: Utc::now(),
        }));
        assert_eq!(g.version(), 2);
        assert_eq!(g.members(), &[key(1), key(2)]);
    }

    #[test]
    fn index_collects_groups_per_user() {
        let mut index = MembershipIndex::default();
        index.insert(key(1), GroupId::new(2));
        index.insert(key(1), GroupId::new(1));
        index.insert(key(1), GroupId::new(2));

        let groups: Vec<_> = index.groups_of(&key(1)).into_iter().collect();
        assert_eq!(groups, vec![GroupId::new(1), GroupId::new(2)]);
        assert!(index.groups_of(&key(9)).is_empty());
    }
}
