use chrono::{DateTime, Utc};

/// A ledger notification.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - **fire-and-forget** (the ledger never depends on delivery)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "ledger.expense.added").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying operation committed.
    fn occurred_at(&self) -> DateTime<Utc>;
}
