//! Point-in-time snapshots of marketplace state.
//!
//! A [`MarketState`] captures every record the marketplace owns, but not the
//! host ledger, the configuration or the event sink. Restoring checks that
//! the escrow entries agree with the job records before accepting the state.

use encode_ledger::{Amount, Ledger};
use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::escrow::{EscrowEntry, EscrowLedger, EscrowState};
use crate::events::{EventSink, NoopEventSink};
use crate::job::{Job, JobRegistry, JobStatus};
use crate::marketplace::Marketplace;
use crate::proposal::{Proposal, ProposalRegistry, ProposalStatus};

/// Serializable marketplace records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    /// Every job, in id order.
    pub jobs: Vec<Job>,
    /// Every proposal, ordered by job then sequence.
    pub proposals: Vec<Proposal>,
    /// Every escrow entry, in job order.
    pub escrow: Vec<EscrowEntry>,
    /// Id the next created job receives.
    pub next_job_id: u64,
}

impl MarketState {
    /// Serializes the state to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses state from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a `MarketState`.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Checks one job against its escrow entry and proposals.
fn check_job(job: &Job, escrow: &EscrowLedger, proposals: &ProposalRegistry) -> Result<()> {
    let corrupt = |what: &str| MarketError::CorruptState(format!("job {}: {what}", job.id));

    if escrow.held(job.id) != job.escrowed {
        return Err(corrupt("escrowed amount disagrees with escrow ledger"));
    }

    let held = !job.escrowed.is_zero();
    if held != (job.status == JobStatus::ProposalAccepted) {
        return Err(corrupt("funds held outside the accepted state"));
    }

    let accepted: Vec<&Proposal> = proposals
        .for_job(job.id)
        .filter(|p| p.status == ProposalStatus::Accepted)
        .collect();
    match (job.accepted_proposal, accepted.as_slice()) {
        (None, []) => {}
        (Some(id), [only]) if only.id == id => {
            if job.status == JobStatus::ProposalAccepted && only.bid != job.escrowed {
                return Err(corrupt("escrowed amount differs from the accepted bid"));
            }
        }
        _ => return Err(corrupt("accepted proposal does not match proposal records")),
    }

    if job.status != JobStatus::Open && proposals.pending_for_job(job.id).next().is_some() {
        return Err(corrupt("pending proposals on a closed job"));
    }

    let count = proposals.for_job(job.id).count();
    if u64::try_from(count).map_or(true, |count| count > job.proposal_count) {
        return Err(corrupt("more proposals than the proposal counter allows"));
    }

    Ok(())
}

impl<L> Marketplace<L> {
    /// Captures every job, proposal and escrow record.
    #[must_use]
    pub fn snapshot(&self) -> MarketState {
        MarketState {
            jobs: self.jobs.iter().cloned().collect(),
            proposals: self.proposals.iter().cloned().collect(),
            escrow: self.escrow.iter().cloned().collect(),
            next_job_id: self.jobs.next_id().get(),
        }
    }
}

impl<L: Ledger> Marketplace<L> {
    /// Rebuilds a marketplace from a snapshot.
    ///
    /// The host ledger is taken as given; the custody balance is expected to
    /// match the total escrowed in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::CorruptState`] if the records are inconsistent
    /// with each other or with the custody balance, and
    /// [`MarketError::InvalidParameter`] if the configuration is invalid.
    pub fn restore(
        state: MarketState,
        config: MarketConfig,
        ledger: L,
        sink: impl EventSink + 'static,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| MarketError::invalid_parameter("config", e.to_string()))?;

        let jobs = JobRegistry::from_parts(state.jobs, state.next_job_id)?;
        let proposals = ProposalRegistry::from_parts(state.proposals)?;
        let escrow = EscrowLedger::from_parts(config.custody_account.clone(), state.escrow)?;

        for job in jobs.iter() {
            check_job(job, &escrow, &proposals)?;
        }
        for entry in escrow.iter() {
            let job = jobs.get(entry.job_id).map_err(|_| {
                MarketError::CorruptState(format!("escrow entry for unknown job {}", entry.job_id))
            })?;
            let expected = match job.status {
                JobStatus::ProposalAccepted => Some(EscrowState::Funded),
                JobStatus::Completed => Some(EscrowState::Released),
                JobStatus::Cancelled => Some(EscrowState::Refunded),
                JobStatus::Open | JobStatus::Expired => None,
            };
            if expected != Some(entry.state) {
                return Err(MarketError::CorruptState(format!(
                    "escrow for job {} is {} while the job is {}",
                    job.id, entry.state, job.status
                )));
            }
        }
        if proposals.iter().any(|p| jobs.get(p.job_id).is_err()) {
            return Err(MarketError::CorruptState(
                "proposal references an unknown job".to_string(),
            ));
        }

        let custody = ledger.balance(&config.custody_account);
        let total: Amount = escrow.total_held();
        if custody < total {
            return Err(MarketError::CorruptState(format!(
                "custody balance {custody} cannot cover {total} held in escrow"
            )));
        }

        Ok(Self {
            config,
            jobs,
            proposals,
            escrow,
            ledger,
            events: Box::new(sink),
        })
    }

    /// Rebuilds a marketplace from a snapshot with events discarded.
    ///
    /// # Errors
    ///
    /// See [`restore`](Self::restore).
    pub fn restore_silent(state: MarketState, config: MarketConfig, ledger: L) -> Result<Self> {
        Self::restore(state, config, ledger, NoopEventSink)
    }
}
