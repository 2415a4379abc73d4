use serde::{Deserialize, Serialize};
use uuid::Uuid;

use splitledger_core::GroupId;

/// Envelope for a ledger event, carrying group + ordering metadata.
///
/// Notes:
/// - Every notification is scoped to exactly one group.
/// - `sequence_number` increases by one per event within a group, starting at 1,
///   so consumers can detect gaps or duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    group_id: GroupId,

    /// Position in the group's notification stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: Uuid, group_id: GroupId, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id,
            group_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
