//! # encode-market
//!
//! A job marketplace where posters publish paid work requests, providers bid
//! on them, and the accepted bid is held in escrow until the work is delivered.
//!
//! This crate provides:
//!
//! - [`JobRegistry`]: job records and the job lifecycle state machine
//! - [`ProposalRegistry`]: bids against open jobs
//! - [`EscrowLedger`]: funds held in custody per job
//! - [`Marketplace`]: the controller that enforces every rule across the three
//! - [`SharedMarketplace`]: a lock-guarded handle for multi-threaded hosts
//!
//! Funds move only through the [`Ledger`](encode_ledger::Ledger) capability
//! handed to the marketplace.
//!
//! ## Example
//!
//! ```rust
//! use encode_ledger::{AccountId, Amount, InMemoryLedger, Ledger};
//! use encode_market::{CallContext, JobStatus, MarketConfig, Marketplace};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let poster = AccountId::new("wallet_1")?;
//! let provider = AccountId::new("wallet_2")?;
//! let ledger = InMemoryLedger::with_balances([(poster.clone(), Amount::new(5000))]);
//! let mut market = Marketplace::new(MarketConfig::new(AccountId::new("escrow")?), ledger)?;
//!
//! let job = market.create_job(
//!     &CallContext::new(poster.clone(), 10),
//!     "Logo design",
//!     "Vector logo, three revisions",
//!     Amount::new(5000),
//!     110,
//! )?;
//! let bid = market.submit_work_proposal(
//!     &CallContext::new(provider.clone(), 11),
//!     job,
//!     "Portfolio attached",
//!     Amount::new(4500),
//!     100,
//! )?;
//! market.accept_proposal(&CallContext::new(poster.clone(), 12), job, bid)?;
//! market.complete_job(&CallContext::new(poster, 50), job)?;
//!
//! assert_eq!(market.get_job(job)?.status, JobStatus::Completed);
//! assert_eq!(market.ledger().balance(&provider), Amount::new(4500));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod job;
pub mod marketplace;
pub mod proposal;
pub mod shared;
pub mod snapshot;
pub mod types;
pub mod validation;

pub use config::{LimitsConfig, MarketConfig};
pub use error::{ConfigError, ErrorKind, MarketError, Result};
pub use escrow::{EscrowEntry, EscrowLedger, EscrowState};
pub use events::{EventSink, MarketEvent, MemoryEventSink, NoopEventSink, TracingEventSink};
pub use job::{Authority, Job, JobRegistry, JobStatus, NewJob};
pub use marketplace::Marketplace;
pub use proposal::{NewProposal, Proposal, ProposalRegistry, ProposalStatus};
pub use shared::SharedMarketplace;
pub use snapshot::MarketState;
pub use types::{CallContext, JobId, ProposalId};
