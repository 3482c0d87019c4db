//! Identifiers and per-call context.

use std::fmt;

use encode_ledger::{AccountId, Height};
use serde::{Deserialize, Serialize};

/// Sequential job identifier, assigned from 0 at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Create a job id from its raw sequence number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proposal sequence number, scoped to a single job and assigned from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(u64);

impl ProposalId {
    /// Create a proposal id from its raw sequence number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is calling and when.
///
/// The host ledger authenticates the signer and supplies the current height;
/// the marketplace trusts both as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Signer of the current call.
    pub caller: AccountId,
    /// Current block height.
    pub height: Height,
}

impl CallContext {
    /// Create a call context.
    #[must_use]
    pub const fn new(caller: AccountId, height: Height) -> Self {
        Self { caller, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_numbers() {
        assert_eq!(JobId::new(7).to_string(), "7");
        assert_eq!(ProposalId::new(0).to_string(), "0");
    }

    #[test]
    fn ids_order_by_sequence() {
        assert!(JobId::new(1) < JobId::new(2));
        assert!(ProposalId::new(3) > ProposalId::new(2));
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&JobId::new(42)).expect("serialize");
        assert_eq!(json, "42");
        let back: ProposalId = serde_json::from_str("5").expect("deserialize");
        assert_eq!(back.get(), 5);
    }
}
