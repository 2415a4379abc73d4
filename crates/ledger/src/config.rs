//! Ledger configuration.
//!
//! Loaded from environment variables, defaults otherwise:
//!
//! - `SPLITLEDGER_DECIMALS`: implied decimals of amounts (default 18, max 38)
//! - `SPLITLEDGER_MAX_MEMBERS`: optional cap on group size (unset = unlimited)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitledger_core::DEFAULT_DECIMALS;

pub const DECIMALS_ENV: &str = "SPLITLEDGER_DECIMALS";
pub const MAX_MEMBERS_ENV: &str = "SPLITLEDGER_MAX_MEMBERS";

/// Largest decimal count whose scale (`10^d`) still fits in a `u128`.
const MAX_DECIMALS: u8 = 38;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Implied decimals, used when rendering amounts in logs.
    pub decimals: u8,
    /// Maximum members per group (`None` = unlimited).
    pub max_members: Option<usize>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            decimals: DEFAULT_DECIMALS,
            max_members: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary key lookup (env, file, test map...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(DECIMALS_ENV) {
            let decimals: u8 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                var: DECIMALS_ENV,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
            if decimals > MAX_DECIMALS {
                return Err(ConfigError::InvalidValue {
                    var: DECIMALS_ENV,
                    value: raw,
                    reason: format!("must be at most {MAX_DECIMALS}"),
                });
            }
            config.decimals = decimals;
        }

        if let Some(raw) = lookup(MAX_MEMBERS_ENV) {
            let max: usize = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                var: MAX_MEMBERS_ENV,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    var: MAX_MEMBERS_ENV,
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_members = Some(max);
        }

        Ok(config)
    }

    pub fn with_max_members(mut self, max: usize) -> Self {
        self.max_members = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = LedgerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.decimals, 18);
        assert_eq!(config.max_members, None);
    }

    #[test]
    fn reads_both_values() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            (DECIMALS_ENV, "6"),
            (MAX_MEMBERS_ENV, " 12 "),
        ]))
        .unwrap();
        assert_eq!(config.decimals, 6);
        assert_eq!(config.max_members, Some(12));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = LedgerConfig::from_lookup(lookup_from(&[(DECIMALS_ENV, "39")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: DECIMALS_ENV, .. }));

        let err = LedgerConfig::from_lookup(lookup_from(&[(MAX_MEMBERS_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: MAX_MEMBERS_ENV, .. }));

        assert!(LedgerConfig::from_lookup(lookup_from(&[(MAX_MEMBERS_ENV, "many")])).is_err());
    }
}
