//! Ledger notification mechanics: event trait, envelopes and the pub/sub sink.
//!
//! Nothing in here knows about groups or balances beyond the identifiers used
//! to scope an envelope.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
