//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Opaque participant identity.
///
/// Totally ordered so that any derived ordering (e.g. sorted query results) is
/// deterministic. The all-zero key is the *null identity* and is never admitted
/// as a group member.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(Uuid);

impl IdentityKey {
    /// The null identity.
    pub const NULL: IdentityKey = IdentityKey(Uuid::nil());

    /// Create a new random identity.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing keys explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Deterministic key built from a small integer (handy for fixtures).
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for IdentityKey {
    fn default() -> Self {
        Self::NULL
    }
}

impl core::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for IdentityKey {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<IdentityKey> for Uuid {
    fn from(value: IdentityKey) -> Self {
        value.0
    }
}

impl FromStr for IdentityKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| LedgerError::InvalidIdentity(format!("IdentityKey: {e}")))?;
        Ok(Self(uuid))
    }
}

macro_rules! impl_counter_id {
    ($t:ident, $name:literal) => {
        #[doc = concat!("Sequential ", $name, " (assigned from a ledger-scoped counter, starting at 1).")]
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(u64);

        impl $t {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $t {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for u64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_counter_id!(GroupId, "group id");
impl_counter_id!(ExpenseId, "expense id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_identity_is_default_and_nil() {
        assert!(IdentityKey::NULL.is_null());
        assert_eq!(IdentityKey::default(), IdentityKey::NULL);
        assert!(!IdentityKey::new().is_null());
    }

    #[test]
    fn identity_parses_and_rejects_garbage() {
        let key = IdentityKey::from_u128(42);
        let parsed: IdentityKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);

        let err = "not-a-uuid".parse::<IdentityKey>().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidIdentity(_)));
    }

    #[test]
    fn identities_are_totally_ordered() {
        let a = IdentityKey::from_u128(1);
        let b = IdentityKey::from_u128(2);
        assert!(a < b);
    }

    #[test]
    fn counter_ids_serialize_transparently() {
        let id = GroupId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(u64::from(ExpenseId::from(3)), 3);
    }
}
