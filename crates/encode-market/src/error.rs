//! Error types for encode-market.

use encode_ledger::{AccountId, Amount, Height, LedgerError};
use thiserror::Error;

use crate::job::JobStatus;
use crate::proposal::ProposalStatus;
use crate::types::{JobId, ProposalId};

/// Result type alias for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors returned by marketplace operations.
///
/// Every variant is raised before the failing call mutates anything, so a
/// caller that receives an error can assume the marketplace is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Malformed input the caller can correct.
    #[error("invalid {field}: {reason}")]
    InvalidParameter {
        /// The offending input.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The caller lacks the role required for the action.
    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        /// Signer of the rejected call.
        caller: AccountId,
        /// The attempted action.
        action: &'static str,
    },

    /// No job with this id.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// No proposal with this id on the job.
    #[error("proposal {proposal} not found on job {job}")]
    ProposalNotFound {
        /// Job the proposal was looked up on.
        job: JobId,
        /// Missing proposal.
        proposal: ProposalId,
    },

    /// The job no longer accepts proposals or acceptance.
    #[error("job {job} is not open (status: {status})")]
    JobNotOpen {
        /// The job.
        job: JobId,
        /// Its current status.
        status: JobStatus,
    },

    /// The job is not in a state that permits the action.
    #[error("cannot {action} job {job} in status {status}")]
    WrongState {
        /// The job.
        job: JobId,
        /// Its current status.
        status: JobStatus,
        /// The attempted action.
        action: &'static str,
    },

    /// The proposal has already been decided or withdrawn.
    #[error("proposal {proposal} on job {job} is not pending (status: {status})")]
    ProposalNotPending {
        /// The job.
        job: JobId,
        /// The proposal.
        proposal: ProposalId,
        /// Its current status.
        status: ProposalStatus,
    },

    /// Bid is zero or exceeds the job budget.
    #[error("invalid bid {bid}: must be between 1 and the budget {budget}")]
    InvalidBid {
        /// The rejected bid.
        bid: Amount,
        /// The job budget.
        budget: Amount,
    },

    /// The job's deadline has been reached.
    #[error("job {job} window closed at height {deadline} (current height {height})")]
    JobExpiredWindow {
        /// The job.
        job: JobId,
        /// Its deadline height.
        deadline: Height,
        /// Height of the rejected call.
        height: Height,
    },

    /// The depositor cannot cover the escrow deposit.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount required for the operation.
        required: Amount,
        /// Amount currently available.
        available: Amount,
    },

    /// Release or refund requested for a job holding no funds.
    #[error("no funds held in escrow for job {0}")]
    NoFundsHeld(JobId),

    /// Transition not permitted by the job or escrow state machine.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// The host ledger rejected a transfer for a reason other than funds.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// Persisted state failed consistency checks on restore.
    #[error("corrupt marketplace state: {0}")]
    CorruptState(String),
}

impl From<LedgerError> for MarketError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds {
                available,
                required,
                ..
            } => Self::InsufficientFunds {
                required,
                available,
            },
            other => Self::Ledger(other),
        }
    }
}

/// Fieldless classification of [`MarketError`], for callers that branch on
/// the cause of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`MarketError::InvalidParameter`].
    InvalidParameter,
    /// See [`MarketError::Unauthorized`].
    Unauthorized,
    /// See [`MarketError::JobNotFound`].
    JobNotFound,
    /// See [`MarketError::ProposalNotFound`].
    ProposalNotFound,
    /// See [`MarketError::JobNotOpen`].
    JobNotOpen,
    /// See [`MarketError::WrongState`].
    WrongState,
    /// See [`MarketError::ProposalNotPending`].
    ProposalNotPending,
    /// See [`MarketError::InvalidBid`].
    InvalidBid,
    /// See [`MarketError::JobExpiredWindow`].
    JobExpiredWindow,
    /// See [`MarketError::InsufficientFunds`].
    InsufficientFunds,
    /// See [`MarketError::NoFundsHeld`].
    NoFundsHeld,
    /// See [`MarketError::InvalidTransition`].
    InvalidTransition,
    /// See [`MarketError::Ledger`].
    Ledger,
    /// See [`MarketError::CorruptState`].
    CorruptState,
}

impl MarketError {
    /// Create an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(caller: &AccountId, action: &'static str) -> Self {
        Self::Unauthorized {
            caller: caller.clone(),
            action,
        }
    }

    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::JobNotFound(_) => ErrorKind::JobNotFound,
            Self::ProposalNotFound { .. } => ErrorKind::ProposalNotFound,
            Self::JobNotOpen { .. } => ErrorKind::JobNotOpen,
            Self::WrongState { .. } => ErrorKind::WrongState,
            Self::ProposalNotPending { .. } => ErrorKind::ProposalNotPending,
            Self::InvalidBid { .. } => ErrorKind::InvalidBid,
            Self::JobExpiredWindow { .. } => ErrorKind::JobExpiredWindow,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::NoFundsHeld(_) => ErrorKind::NoFundsHeld,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Ledger(_) => ErrorKind::Ledger,
            Self::CorruptState(_) => ErrorKind::CorruptState,
        }
    }
}

/// Errors loading or validating a [`MarketConfig`](crate::config::MarketConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config is not valid TOML or does not match the schema.
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its permitted range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
