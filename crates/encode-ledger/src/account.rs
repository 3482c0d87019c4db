//! Account identifiers on the host ledger.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LedgerError, Result};

/// Maximum length of an account principal.
pub const MAX_ACCOUNT_LENGTH: usize = 128;

/// A principal on the host ledger (the signer of a call, or a custody account).
///
/// Principals are opaque to the marketplace. The only structural rules are that
/// they are non-empty, bounded, and free of whitespace and control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account id, validating its format.
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty, too long, or contains whitespace or
    /// control characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(LedgerError::invalid_account("account id cannot be empty"));
        }
        if id.len() > MAX_ACCOUNT_LENGTH {
            return Err(LedgerError::invalid_account(format!(
                "account id exceeds {MAX_ACCOUNT_LENGTH} bytes"
            )));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LedgerError::invalid_account(
                "account id cannot contain whitespace or control characters",
            ));
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("deployer" ; "plain name")]
    #[test_case("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM" ; "stacks principal")]
    #[test_case("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.encode-marketplace" ; "contract principal")]
    fn valid_account_ids(raw: &str) {
        let id = AccountId::new(raw).unwrap();
        assert_eq!(id.as_str(), raw);
        assert_eq!(id.to_string(), raw);
    }

    #[test_case("" ; "empty")]
    #[test_case("wallet 1" ; "inner space")]
    #[test_case("wallet\n" ; "newline")]
    #[test_case("wallet\0" ; "nul byte")]
    fn invalid_account_ids(raw: &str) {
        assert!(AccountId::new(raw).is_err());
    }

    #[test]
    fn rejects_overlong_id() {
        let raw = "a".repeat(MAX_ACCOUNT_LENGTH + 1);
        assert!(AccountId::new(raw).is_err());
        let raw = "a".repeat(MAX_ACCOUNT_LENGTH);
        assert!(AccountId::new(raw).is_ok());
    }

    #[test]
    fn parse_from_str() {
        let id: AccountId = "wallet_2".parse().unwrap();
        assert_eq!(id.as_str(), "wallet_2");
    }

    #[test]
    fn serde_is_transparent_and_validating() {
        let id = AccountId::new("wallet_1").unwrap();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"wallet_1\"");

        let back: AccountId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);

        let bad: std::result::Result<AccountId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
