//! # encode-ledger
//!
//! Host ledger primitives consumed by the Encode marketplace.
//!
//! This crate provides:
//! - [`AccountId`]: principals that sign calls and hold balances
//! - [`Amount`]: overflow-checked amounts in the smallest currency unit
//! - [`Height`]: the host's monotonically increasing logical clock
//! - [`Ledger`]: the all-or-nothing transfer capability the marketplace is given
//! - [`InMemoryLedger`]: an in-memory host for tests and simulations
//!
//! ## Example
//!
//! ```rust
//! use encode_ledger::{AccountId, Amount, InMemoryLedger, Ledger};
//!
//! # fn example() -> encode_ledger::Result<()> {
//! let alice = AccountId::new("wallet_1")?;
//! let bob = AccountId::new("wallet_2")?;
//! let mut ledger = InMemoryLedger::with_balances([(alice.clone(), Amount::new(100))]);
//!
//! ledger.transfer(&alice, &bob, Amount::new(40))?;
//! assert_eq!(ledger.balance(&bob), Amount::new(40));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod amount;
pub mod error;
pub mod ledger;

pub use account::AccountId;
pub use amount::Amount;
pub use error::{LedgerError, Result};
pub use ledger::{InMemoryLedger, Ledger};

/// Block height on the host ledger.
pub type Height = u64;
