//! Proposal registry.
//!
//! Proposals are keyed by `(JobId, ProposalId)` where the proposal id is a
//! per-job sequence. They are never deleted: once decided they stay as an
//! immutable record of who bid what.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use encode_ledger::{AccountId, Amount, Height};
use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::job::{Job, JobStatus};
use crate::types::{JobId, ProposalId};
use crate::validation::validate_description;

/// Status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Awaiting the creator's decision.
    Pending,
    /// Chosen by the creator. At most one per job.
    Accepted,
    /// Passed over, or the job closed without choosing it.
    Rejected,
    /// Retracted by the proposer.
    Withdrawn,
}

impl ProposalStatus {
    /// Returns true if the proposal can still be accepted or withdrawn.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

/// A bid against an open job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Job this proposal bids on.
    pub job_id: JobId,
    /// Sequence within the job.
    pub id: ProposalId,
    /// Bidding account.
    pub proposer: AccountId,
    /// Pitch and delivery plan.
    pub description: String,
    /// Amount the proposer asks for.
    pub bid: Amount,
    /// Height by which the proposer commits to deliver if accepted.
    pub delivery_deadline: Height,
    /// Height at which the proposal was submitted.
    pub submitted_at: Height,
    /// Current status.
    pub status: ProposalStatus,
}

/// Parameters of a new proposal.
#[derive(Debug, Clone)]
pub struct NewProposal {
    /// Bidding account.
    pub proposer: AccountId,
    /// Pitch.
    pub description: String,
    /// Requested amount.
    pub bid: Amount,
    /// Delivery deadline height.
    pub delivery_deadline: Height,
}

/// Owns every proposal record.
#[derive(Debug, Default, Clone)]
pub struct ProposalRegistry {
    proposals: BTreeMap<(JobId, ProposalId), Proposal>,
}

fn job_range(job: JobId) -> RangeInclusive<(JobId, ProposalId)> {
    (job, ProposalId::new(0))..=(job, ProposalId::new(u64::MAX))
}

impl ProposalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and records a proposal against `job`, returning its id.
    ///
    /// Checks run in order: job open, job window, bid, proposer is neither
    /// the creator nor the custody account, proposal cap, description,
    /// delivery deadline. The job's proposal counter is advanced only on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotOpen`], [`MarketError::JobExpiredWindow`],
    /// [`MarketError::InvalidBid`], [`MarketError::Unauthorized`] or
    /// [`MarketError::InvalidParameter`].
    pub fn submit(
        &mut self,
        job: &mut Job,
        proposal: NewProposal,
        height: Height,
        config: &MarketConfig,
    ) -> Result<ProposalId> {
        let limits = &config.limits;
        if job.status != JobStatus::Open {
            return Err(MarketError::JobNotOpen {
                job: job.id,
                status: job.status,
            });
        }
        if !job.is_window_open(height) {
            return Err(MarketError::JobExpiredWindow {
                job: job.id,
                deadline: job.deadline,
                height,
            });
        }
        if proposal.bid.is_zero() || proposal.bid > job.budget {
            return Err(MarketError::InvalidBid {
                bid: proposal.bid,
                budget: job.budget,
            });
        }
        if job.is_creator(&proposal.proposer) {
            return Err(MarketError::unauthorized(
                &proposal.proposer,
                "bid on their own job",
            ));
        }
        // Escrow cannot pay its own custody account.
        if proposal.proposer == config.custody_account {
            return Err(MarketError::unauthorized(
                &proposal.proposer,
                "bid from the custody account",
            ));
        }
        if job.proposal_count >= limits.max_proposals_per_job {
            return Err(MarketError::invalid_parameter(
                "proposals",
                format!(
                    "job {} already has the maximum of {} proposals",
                    job.id, limits.max_proposals_per_job
                ),
            ));
        }
        validate_description(&proposal.description, limits)?;
        if proposal.delivery_deadline <= height {
            return Err(MarketError::invalid_parameter(
                "delivery_deadline",
                format!(
                    "{} is not after current height {height}",
                    proposal.delivery_deadline
                ),
            ));
        }

        let id = ProposalId::new(job.proposal_count);
        job.proposal_count += 1;
        self.proposals.insert(
            (job.id, id),
            Proposal {
                job_id: job.id,
                id,
                proposer: proposal.proposer,
                description: proposal.description,
                bid: proposal.bid,
                delivery_deadline: proposal.delivery_deadline,
                submitted_at: height,
                status: ProposalStatus::Pending,
            },
        );
        Ok(id)
    }

    /// Gets a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProposalNotFound`] for unknown keys.
    pub fn get(&self, job: JobId, proposal: ProposalId) -> Result<&Proposal> {
        self.proposals
            .get(&(job, proposal))
            .ok_or(MarketError::ProposalNotFound { job, proposal })
    }

    /// Gets a proposal that must still be pending.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProposalNotFound`] or
    /// [`MarketError::ProposalNotPending`].
    pub fn get_pending(&self, job: JobId, proposal: ProposalId) -> Result<&Proposal> {
        let found = self.get(job, proposal)?;
        if !found.status.is_pending() {
            return Err(MarketError::ProposalNotPending {
                job,
                proposal,
                status: found.status,
            });
        }
        Ok(found)
    }

    /// Marks `winner` accepted and every other pending proposal on the job
    /// rejected. Returns the ids that were rejected.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProposalNotFound`] or
    /// [`MarketError::ProposalNotPending`] without changing anything.
    pub fn accept(&mut self, job: JobId, winner: ProposalId) -> Result<Vec<ProposalId>> {
        self.get_pending(job, winner)?;

        let mut rejected = Vec::new();
        for ((_, id), proposal) in self.proposals.range_mut(job_range(job)) {
            if *id == winner {
                proposal.status = ProposalStatus::Accepted;
            } else if proposal.status.is_pending() {
                proposal.status = ProposalStatus::Rejected;
                rejected.push(*id);
            }
        }
        Ok(rejected)
    }

    /// Rejects every pending proposal on the job. Returns the rejected ids.
    pub fn reject_pending(&mut self, job: JobId) -> Vec<ProposalId> {
        let mut rejected = Vec::new();
        for ((_, id), proposal) in self.proposals.range_mut(job_range(job)) {
            if proposal.status.is_pending() {
                proposal.status = ProposalStatus::Rejected;
                rejected.push(*id);
            }
        }
        rejected
    }

    /// Withdraws a pending proposal on behalf of its proposer.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProposalNotFound`], [`MarketError::Unauthorized`]
    /// if `caller` is not the proposer, or [`MarketError::ProposalNotPending`].
    pub fn withdraw(&mut self, job: JobId, proposal: ProposalId, caller: &AccountId) -> Result<()> {
        let found = self
            .proposals
            .get_mut(&(job, proposal))
            .ok_or(MarketError::ProposalNotFound { job, proposal })?;

        if &found.proposer != caller {
            return Err(MarketError::unauthorized(caller, "withdraw this proposal"));
        }
        if !found.status.is_pending() {
            return Err(MarketError::ProposalNotPending {
                job,
                proposal,
                status: found.status,
            });
        }
        found.status = ProposalStatus::Withdrawn;
        Ok(())
    }

    /// All proposals on a job, in submission order.
    pub fn for_job(&self, job: JobId) -> impl Iterator<Item = &Proposal> {
        self.proposals.range(job_range(job)).map(|(_, p)| p)
    }

    /// Pending proposals on a job, in submission order.
    pub fn pending_for_job(&self, job: JobId) -> impl Iterator<Item = &Proposal> {
        self.for_job(job).filter(|p| p.status.is_pending())
    }

    /// Iterate over every proposal, ordered by job then sequence.
    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Total number of proposals across all jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Returns true if no proposal has been submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// Rebuild a registry from persisted records.
    pub(crate) fn from_parts(proposals: Vec<Proposal>) -> Result<Self> {
        let mut registry = Self::new();
        for proposal in proposals {
            let key = (proposal.job_id, proposal.id);
            if registry.proposals.insert(key, proposal).is_some() {
                return Err(MarketError::CorruptState(format!(
                    "duplicate proposal {} on job {}",
                    key.1, key.0
                )));
            }
        }
        Ok(registry)
    }
}
