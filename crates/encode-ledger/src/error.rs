//! Error types for host ledger operations.

use thiserror::Error;

use crate::account::AccountId;
use crate::amount::Amount;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while moving funds on the host ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The source account cannot cover the transfer.
    #[error("insufficient funds in {account}: have {available}, need {required}")]
    InsufficientFunds {
        /// Account that was debited.
        account: AccountId,
        /// Balance at the time of the call.
        available: Amount,
        /// Amount the call tried to move.
        required: Amount,
    },

    /// Transfers of zero are rejected by the host.
    #[error("invalid amount: {message}")]
    InvalidAmount {
        /// Description of the amount error.
        message: String,
    },

    /// Source and destination are the same account.
    #[error("cannot transfer from {0} to itself")]
    SelfTransfer(AccountId),

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow crediting {0}")]
    Overflow(AccountId),

    /// Malformed account identifier.
    #[error("invalid account: {message}")]
    InvalidAccount {
        /// Description of the account error.
        message: String,
    },
}

impl LedgerError {
    /// Create an insufficient funds error.
    #[must_use]
    pub fn insufficient_funds(account: AccountId, available: Amount, required: Amount) -> Self {
        Self::InsufficientFunds {
            account,
            available,
            required,
        }
    }

    /// Create an invalid amount error.
    #[must_use]
    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::InvalidAmount {
            message: message.into(),
        }
    }

    /// Create an invalid account error.
    #[must_use]
    pub fn invalid_account(message: impl Into<String>) -> Self {
        Self::InvalidAccount {
            message: message.into(),
        }
    }
}
