//! Aggregate root trait for ledger state that evolves through versioned mutations.

/// Aggregate root marker + minimal interface.
///
/// Carries no storage concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Incremented once per committed mutation.
    fn version(&self) -> u64;
}

/// Aggregate execution semantics.
///
/// - **Decision logic**: `handle(&self, cmd)` validates and returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// `handle` never mutates; a rejected command leaves the aggregate untouched.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
