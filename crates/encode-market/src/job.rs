//! Job registry and the job lifecycle state machine.
//!
//! ```text
//! Open ──accept──▶ ProposalAccepted ──complete──▶ Completed
//!  │                   │
//!  ├──cancel──▶ Cancelled ◀──cancel (approval or delivery timeout)
//!  │
//!  └──expire──▶ Expired
//! ```
//!
//! Completed, Cancelled and Expired are terminal.

use std::collections::BTreeMap;
use std::fmt;

use encode_ledger::{AccountId, Amount, Height};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::types::{JobId, ProposalId};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepting proposals.
    Open,
    /// One proposal accepted; its bid is held in escrow.
    ProposalAccepted,
    /// Delivery confirmed and escrow released to the provider.
    Completed,
    /// Withdrawn by the creator; any escrow refunded.
    Cancelled,
    /// Deadline passed with no accepted proposal.
    Expired,
}

impl JobStatus {
    /// Checks if a transition to the target status is permitted.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use JobStatus::{Cancelled, Completed, Expired, Open, ProposalAccepted};

        matches!(
            (self, target),
            (Open, ProposalAccepted | Cancelled | Expired)
                | (ProposalAccepted, Completed | Cancelled)
        )
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::ProposalAccepted => write!(f, "proposal_accepted"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Who is driving a job transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority<'a> {
    /// The signer of the current call.
    Caller(&'a AccountId),
    /// Height-driven maintenance; anyone may expire a job once its deadline passes.
    Keeper,
    /// The marketplace controller, after it has checked its own preconditions.
    Controller,
}

/// A paid work request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Sequential identifier.
    pub id: JobId,
    /// Account that posted the job and funds the escrow.
    pub creator: AccountId,
    /// Short ASCII title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Maximum the creator will pay.
    pub budget: Amount,
    /// Height at which the job stops accepting proposals.
    pub deadline: Height,
    /// Height at which the job was posted.
    pub created_at: Height,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// The accepted proposal, once there is one.
    pub accepted_proposal: Option<ProposalId>,
    /// Funds currently held in escrow for this job.
    pub escrowed: Amount,
    /// Whether the accepted provider has agreed to cancellation.
    #[serde(default)]
    pub cancellation_approved: bool,
    /// Number of proposals ever submitted; the next proposal's sequence.
    pub proposal_count: u64,
}

impl Job {
    /// Returns true if `account` posted this job.
    #[must_use]
    pub fn is_creator(&self, account: &AccountId) -> bool {
        &self.creator == account
    }

    /// Returns true if the job can still take proposals at `height`.
    #[must_use]
    pub fn is_window_open(&self, height: Height) -> bool {
        height < self.deadline
    }
}

/// Parameters of a new job, after validation.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Posting account.
    pub creator: AccountId,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Budget.
    pub budget: Amount,
    /// Deadline height.
    pub deadline: Height,
}

/// Owns every job record and allocates job ids.
#[derive(Debug, Default, Clone)]
pub struct JobRegistry {
    jobs: BTreeMap<JobId, Job>,
    next_id: u64,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new open job and returns its id.
    ///
    /// Text fields are validated by the caller against the configured limits;
    /// this checks the numeric rules.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidParameter`] if the budget is zero or the
    /// deadline is not after `height`.
    pub fn create(&mut self, job: NewJob, height: Height) -> Result<JobId> {
        if job.budget.is_zero() {
            return Err(MarketError::invalid_parameter("budget", "must be greater than 0"));
        }
        if job.deadline <= height {
            return Err(MarketError::invalid_parameter(
                "deadline",
                format!("{} is not after current height {height}", job.deadline),
            ));
        }

        let id = JobId::new(self.next_id);
        self.next_id += 1;
        self.jobs.insert(
            id,
            Job {
                id,
                creator: job.creator,
                title: job.title,
                description: job.description,
                budget: job.budget,
                deadline: job.deadline,
                created_at: height,
                status: JobStatus::Open,
                accepted_proposal: None,
                escrowed: Amount::ZERO,
                cancellation_approved: false,
                proposal_count: 0,
            },
        );
        Ok(id)
    }

    /// Gets a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`] for unknown ids.
    pub fn get(&self, id: JobId) -> Result<&Job> {
        self.jobs.get(&id).ok_or(MarketError::JobNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs.get_mut(&id).ok_or(MarketError::JobNotFound(id))
    }

    /// Moves a job to `target`, checking authority and the state machine.
    ///
    /// Cancellation must come from the creator, expiry from a keeper, and
    /// acceptance or completion from the controller.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Unauthorized`] for the wrong authority and
    /// [`MarketError::InvalidTransition`] for a transition the state machine
    /// does not allow.
    pub fn transition(&mut self, id: JobId, target: JobStatus, by: Authority<'_>) -> Result<()> {
        let job = self.get_mut(id)?;

        match (target, by) {
            (JobStatus::Cancelled, Authority::Caller(caller)) if job.is_creator(caller) => {}
            (JobStatus::Cancelled, Authority::Caller(caller)) => {
                return Err(MarketError::unauthorized(caller, "cancel this job"));
            }
            (JobStatus::Expired, Authority::Keeper)
            | (JobStatus::ProposalAccepted | JobStatus::Completed, Authority::Controller) => {}
            (_, Authority::Caller(caller)) => {
                return Err(MarketError::unauthorized(caller, "drive this transition"));
            }
            (target, _) => {
                return Err(MarketError::invalid_transition(job.status, target));
            }
        }

        if !job.status.can_transition_to(&target) {
            return Err(MarketError::invalid_transition(job.status, target));
        }
        job.status = target;
        Ok(())
    }

    /// Number of jobs ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no job has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Iterate over jobs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// The id the next created job will receive.
    #[must_use]
    pub const fn next_id(&self) -> JobId {
        JobId::new(self.next_id)
    }

    /// Rebuild a registry from persisted records.
    pub(crate) fn from_parts(jobs: Vec<Job>, next_id: u64) -> Result<Self> {
        let mut registry = Self {
            jobs: BTreeMap::new(),
            next_id,
        };
        for job in jobs {
            if job.id.get() >= next_id {
                return Err(MarketError::CorruptState(format!(
                    "job {} is beyond the id counter {next_id}",
                    job.id
                )));
            }
            if registry.jobs.insert(job.id, job).is_some() {
                return Err(MarketError::CorruptState("duplicate job id".to_string()));
            }
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use test_case::test_case;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    fn new_job(budget: u64, deadline: Height) -> NewJob {
        NewJob {
            creator: account("wallet_1"),
            title: "Web3 Development Project".to_string(),
            description: "Comprehensive blockchain frontend".to_string(),
            budget: Amount::new(budget),
            deadline,
        }
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let mut registry = JobRegistry::new();
        assert!(registry.is_empty());

        let first = registry.create(new_job(5000, 110), 10).unwrap();
        let second = registry.create(new_job(100, 20), 10).unwrap();

        assert_eq!(first, JobId::new(0));
        assert_eq!(second, JobId::new(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.next_id(), JobId::new(2));
    }

    #[test]
    fn create_stores_open_job() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(5000, 110), 10).unwrap();
        let job = registry.get(id).unwrap();

        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.budget, Amount::new(5000));
        assert_eq!(job.deadline, 110);
        assert_eq!(job.created_at, 10);
        assert_eq!(job.escrowed, Amount::ZERO);
        assert!(job.accepted_proposal.is_none());
        assert_eq!(job.proposal_count, 0);
    }

    #[test]
    fn create_rejects_zero_budget() {
        let mut registry = JobRegistry::new();
        let err = registry.create(new_job(0, 110), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(registry.is_empty());
        assert_eq!(registry.next_id(), JobId::new(0));
    }

    #[test_case(10 ; "deadline equals height")]
    #[test_case(9 ; "deadline in the past")]
    fn create_rejects_stale_deadline(deadline: Height) {
        let mut registry = JobRegistry::new();
        let err = registry.create(new_job(100, deadline), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn get_unknown_job() {
        let registry = JobRegistry::new();
        assert_eq!(
            registry.get(JobId::new(3)).unwrap_err(),
            MarketError::JobNotFound(JobId::new(3))
        );
    }

    #[test]
    fn window_closes_at_deadline() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();
        let job = registry.get(id).unwrap();
        assert!(job.is_window_open(19));
        assert!(!job.is_window_open(20));
        assert!(!job.is_window_open(21));
    }

    #[test_case(JobStatus::Open, JobStatus::ProposalAccepted, true)]
    #[test_case(JobStatus::Open, JobStatus::Cancelled, true)]
    #[test_case(JobStatus::Open, JobStatus::Expired, true)]
    #[test_case(JobStatus::Open, JobStatus::Completed, false)]
    #[test_case(JobStatus::Open, JobStatus::Open, false)]
    #[test_case(JobStatus::ProposalAccepted, JobStatus::Completed, true)]
    #[test_case(JobStatus::ProposalAccepted, JobStatus::Cancelled, true)]
    #[test_case(JobStatus::ProposalAccepted, JobStatus::Expired, false)]
    #[test_case(JobStatus::ProposalAccepted, JobStatus::Open, false)]
    #[test_case(JobStatus::Completed, JobStatus::Cancelled, false)]
    #[test_case(JobStatus::Cancelled, JobStatus::Open, false)]
    #[test_case(JobStatus::Expired, JobStatus::ProposalAccepted, false)]
    fn state_machine_table(from: JobStatus, to: JobStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Open.is_terminal());
        assert!(!JobStatus::ProposalAccepted.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
    }

    #[test]
    fn creator_can_cancel() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();
        let creator = account("wallet_1");
        registry
            .transition(id, JobStatus::Cancelled, Authority::Caller(&creator))
            .unwrap();
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn stranger_cannot_cancel() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();
        let stranger = account("wallet_3");
        let err = registry
            .transition(id, JobStatus::Cancelled, Authority::Caller(&stranger))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Open);
    }

    #[test]
    fn callers_cannot_drive_controller_transitions() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();
        let creator = account("wallet_1");
        let err = registry
            .transition(id, JobStatus::ProposalAccepted, Authority::Caller(&creator))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn keeper_expires_but_cannot_complete() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();

        let err = registry
            .transition(id, JobStatus::Completed, Authority::Keeper)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        registry
            .transition(id, JobStatus::Expired, Authority::Keeper)
            .unwrap();
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Expired);
    }

    #[test]
    fn terminal_job_rejects_further_transitions() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();
        registry
            .transition(id, JobStatus::Expired, Authority::Keeper)
            .unwrap();

        let creator = account("wallet_1");
        let err = registry
            .transition(id, JobStatus::Cancelled, Authority::Caller(&creator))
            .unwrap_err();
        assert_eq!(
            err,
            MarketError::invalid_transition(JobStatus::Expired, JobStatus::Cancelled)
        );
    }

    #[test]
    fn controller_accepts_then_completes() {
        let mut registry = JobRegistry::new();
        let id = registry.create(new_job(100, 20), 10).unwrap();
        registry
            .transition(id, JobStatus::ProposalAccepted, Authority::Controller)
            .unwrap();
        registry
            .transition(id, JobStatus::Completed, Authority::Controller)
            .unwrap();
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn status_display_and_serde_agree() {
        for status in [
            JobStatus::Open,
            JobStatus::ProposalAccepted,
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::Expired,
        ] {
            let json = serde_json::to_string(&status).expect("serialize");
            assert_eq!(json, format!("\"{status}\""));
        }
    }
}
