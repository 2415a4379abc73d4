//! Tracing/logging setup shared by every binary or test harness that embeds the ledger.

/// Initialize process-wide tracing from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ObservabilityConfig, ObservabilityConfigError, init_with};
