//! The marketplace controller.
//!
//! [`Marketplace`] is the only entry point that mutates state. It owns the
//! job and proposal registries, the escrow ledger and the host ledger handle,
//! and sequences them so that each operation either commits completely or
//! leaves everything untouched: every check runs before the first mutation,
//! and the host transfer (the only mutation that can fail) runs first.

use encode_ledger::{AccountId, Amount, Height, Ledger};
use tracing::{debug, info};

use crate::config::MarketConfig;
use crate::error::{ConfigError, MarketError, Result};
use crate::escrow::EscrowLedger;
use crate::events::{EventSink, MarketEvent, NoopEventSink};
use crate::job::{Authority, Job, JobRegistry, JobStatus, NewJob};
use crate::proposal::{NewProposal, Proposal, ProposalRegistry};
use crate::types::{CallContext, JobId, ProposalId};
use crate::validation::{validate_description, validate_title};

/// A job marketplace bound to one host ledger.
pub struct Marketplace<L> {
    pub(crate) config: MarketConfig,
    pub(crate) jobs: JobRegistry,
    pub(crate) proposals: ProposalRegistry,
    pub(crate) escrow: EscrowLedger,
    pub(crate) ledger: L,
    pub(crate) events: Box<dyn EventSink>,
}

impl<L: std::fmt::Debug> std::fmt::Debug for Marketplace<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("config", &self.config)
            .field("jobs", &self.jobs.len())
            .field("proposals", &self.proposals.len())
            .field("escrow", &self.escrow)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

fn wrong_state(job: &Job, action: &'static str) -> MarketError {
    MarketError::WrongState {
        job: job.id,
        status: job.status,
        action,
    }
}

fn log_rejection<T>(operation: &'static str, ctx: &CallContext, result: Result<T>) -> Result<T> {
    result.inspect_err(|e| {
        debug!(
            operation,
            caller = %ctx.caller,
            height = ctx.height,
            kind = ?e.kind(),
            error = %e,
            "operation rejected"
        );
    })
}

impl<L: Ledger> Marketplace<L> {
    /// Creates an empty marketplace over `ledger`.
    ///
    /// Events are discarded until a sink is attached with
    /// [`with_event_sink`](Self::with_event_sink).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails validation.
    pub fn new(config: MarketConfig, ledger: L) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let escrow = EscrowLedger::new(config.custody_account.clone());
        Ok(Self {
            config,
            jobs: JobRegistry::new(),
            proposals: ProposalRegistry::new(),
            escrow,
            ledger,
            events: Box::new(NoopEventSink),
        })
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Box::new(sink);
        self
    }

    fn emit(&self, event: &MarketEvent) {
        self.events.emit(event);
    }

    /// Posts a new job owned by the caller.
    ///
    /// No funds move; the creator's balance is only checked when a proposal
    /// is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Unauthorized`] if the caller is the custody
    /// account, and [`MarketError::InvalidParameter`] for a malformed title or
    /// description, a zero budget, or a deadline not after the current height.
    pub fn create_job(
        &mut self,
        ctx: &CallContext,
        title: impl Into<String>,
        description: impl Into<String>,
        budget: Amount,
        deadline: Height,
    ) -> Result<JobId> {
        let result = self.create_job_checked(ctx, title.into(), description.into(), budget, deadline);
        log_rejection("create_job", ctx, result)
    }

    fn create_job_checked(
        &mut self,
        ctx: &CallContext,
        title: String,
        description: String,
        budget: Amount,
        deadline: Height,
    ) -> Result<JobId> {
        // Escrow deposits from the custody account would be self-transfers.
        if ctx.caller == self.config.custody_account {
            return Err(MarketError::unauthorized(
                &ctx.caller,
                "post jobs from the custody account",
            ));
        }
        validate_title(&title, &self.config.limits)?;
        validate_description(&description, &self.config.limits)?;

        let id = self.jobs.create(
            NewJob {
                creator: ctx.caller.clone(),
                title,
                description,
                budget,
                deadline,
            },
            ctx.height,
        )?;

        info!(job = %id, creator = %ctx.caller, budget = %budget, deadline, "job created");
        self.emit(&MarketEvent::JobCreated {
            job: id,
            creator: ctx.caller.clone(),
            budget,
            deadline,
            height: ctx.height,
        });
        Ok(id)
    }

    /// Submits a bid on an open job on behalf of the caller.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`], [`MarketError::JobNotOpen`],
    /// [`MarketError::JobExpiredWindow`], [`MarketError::InvalidBid`],
    /// [`MarketError::Unauthorized`] if the caller created the job or is the
    /// custody account, or [`MarketError::InvalidParameter`].
    pub fn submit_work_proposal(
        &mut self,
        ctx: &CallContext,
        job: JobId,
        description: impl Into<String>,
        bid: Amount,
        delivery_deadline: Height,
    ) -> Result<ProposalId> {
        let result =
            self.submit_work_proposal_checked(ctx, job, description.into(), bid, delivery_deadline);
        log_rejection("submit_work_proposal", ctx, result)
    }

    fn submit_work_proposal_checked(
        &mut self,
        ctx: &CallContext,
        job_id: JobId,
        description: String,
        bid: Amount,
        delivery_deadline: Height,
    ) -> Result<ProposalId> {
        let job = self.jobs.get_mut(job_id)?;
        let id = self.proposals.submit(
            job,
            NewProposal {
                proposer: ctx.caller.clone(),
                description,
                bid,
                delivery_deadline,
            },
            ctx.height,
            &self.config,
        )?;

        info!(job = %job_id, proposal = %id, proposer = %ctx.caller, bid = %bid, "proposal submitted");
        self.emit(&MarketEvent::ProposalSubmitted {
            job: job_id,
            proposal: id,
            proposer: ctx.caller.clone(),
            bid,
            height: ctx.height,
        });
        Ok(id)
    }

    /// Accepts a pending proposal and moves its bid from the creator into
    /// escrow. Every other pending proposal on the job is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Unauthorized`] unless the caller created the
    /// job, [`MarketError::JobNotOpen`], [`MarketError::JobExpiredWindow`],
    /// [`MarketError::ProposalNotFound`], [`MarketError::ProposalNotPending`],
    /// or [`MarketError::InsufficientFunds`] if the creator cannot cover the
    /// bid.
    pub fn accept_proposal(
        &mut self,
        ctx: &CallContext,
        job: JobId,
        proposal: ProposalId,
    ) -> Result<()> {
        let result = self.accept_proposal_checked(ctx, job, proposal);
        log_rejection("accept_proposal", ctx, result)
    }

    fn accept_proposal_checked(
        &mut self,
        ctx: &CallContext,
        job_id: JobId,
        proposal_id: ProposalId,
    ) -> Result<()> {
        let job = self.jobs.get(job_id)?;
        if !job.is_creator(&ctx.caller) {
            return Err(MarketError::unauthorized(&ctx.caller, "accept proposals on this job"));
        }
        if job.status != JobStatus::Open {
            return Err(MarketError::JobNotOpen {
                job: job_id,
                status: job.status,
            });
        }
        if !job.is_window_open(ctx.height) {
            return Err(MarketError::JobExpiredWindow {
                job: job_id,
                deadline: job.deadline,
                height: ctx.height,
            });
        }
        let bid = self.proposals.get_pending(job_id, proposal_id)?.bid;

        self.escrow
            .deposit(&mut self.ledger, job_id, &ctx.caller, bid)?;

        let rejected = self.proposals.accept(job_id, proposal_id)?;
        self.jobs
            .transition(job_id, JobStatus::ProposalAccepted, Authority::Controller)?;
        let job = self.jobs.get_mut(job_id)?;
        job.accepted_proposal = Some(proposal_id);
        job.escrowed = bid;
        job.cancellation_approved = false;

        info!(
            job = %job_id,
            proposal = %proposal_id,
            escrowed = %bid,
            rejected = rejected.len(),
            "proposal accepted"
        );
        self.emit(&MarketEvent::ProposalAccepted {
            job: job_id,
            proposal: proposal_id,
            escrowed: bid,
            rejected,
            height: ctx.height,
        });
        Ok(())
    }

    /// Withdraws the caller's own pending proposal.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`], [`MarketError::ProposalNotFound`],
    /// [`MarketError::Unauthorized`] unless the caller is the proposer, or
    /// [`MarketError::ProposalNotPending`].
    pub fn withdraw_proposal(
        &mut self,
        ctx: &CallContext,
        job: JobId,
        proposal: ProposalId,
    ) -> Result<()> {
        let result = self
            .jobs
            .get(job)
            .and_then(|_| self.proposals.withdraw(job, proposal, &ctx.caller));
        log_rejection("withdraw_proposal", ctx, result)?;

        info!(job = %job, proposal = %proposal, proposer = %ctx.caller, "proposal withdrawn");
        self.emit(&MarketEvent::ProposalWithdrawn {
            job,
            proposal,
            height: ctx.height,
        });
        Ok(())
    }

    /// Records the accepted provider's consent to cancel the job.
    ///
    /// Once approved, the creator may cancel before the delivery deadline and
    /// recover the escrowed bid.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::WrongState`] unless the job has an accepted
    /// proposal, or [`MarketError::Unauthorized`] unless the caller is its
    /// proposer.
    pub fn approve_cancellation(&mut self, ctx: &CallContext, job: JobId) -> Result<()> {
        let result = self.approve_cancellation_checked(ctx, job);
        log_rejection("approve_cancellation", ctx, result)
    }

    fn approve_cancellation_checked(&mut self, ctx: &CallContext, job_id: JobId) -> Result<()> {
        let provider = self.accepted(job_id, "approve cancellation of")?.proposer.clone();
        if provider != ctx.caller {
            return Err(MarketError::unauthorized(&ctx.caller, "approve cancellation of this job"));
        }

        self.jobs.get_mut(job_id)?.cancellation_approved = true;

        info!(job = %job_id, provider = %provider, "cancellation approved");
        self.emit(&MarketEvent::CancellationApproved {
            job: job_id,
            provider,
            height: ctx.height,
        });
        Ok(())
    }

    /// Confirms delivery and releases escrow to the accepted provider.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Unauthorized`] unless the caller created the
    /// job, or [`MarketError::WrongState`] unless a proposal is accepted.
    pub fn complete_job(&mut self, ctx: &CallContext, job: JobId) -> Result<()> {
        let result = self.complete_job_checked(ctx, job);
        log_rejection("complete_job", ctx, result)
    }

    fn complete_job_checked(&mut self, ctx: &CallContext, job_id: JobId) -> Result<()> {
        self.require_creator(ctx, job_id, "complete this job")?;
        let provider = self.accepted(job_id, "complete")?.proposer.clone();

        let released = self.escrow.release(&mut self.ledger, job_id, &provider)?;

        self.jobs
            .transition(job_id, JobStatus::Completed, Authority::Controller)?;
        self.jobs.get_mut(job_id)?.escrowed = Amount::ZERO;

        info!(job = %job_id, provider = %provider, released = %released, "job completed");
        self.emit(&MarketEvent::JobCompleted {
            job: job_id,
            provider,
            released,
            height: ctx.height,
        });
        Ok(())
    }

    /// Cancels a job on behalf of its creator.
    ///
    /// An open job is cancelled outright and its pending proposals rejected.
    /// A job with an accepted proposal can be cancelled once the provider has
    /// approved, or once the accepted delivery deadline has passed; the
    /// escrowed bid is refunded to the creator.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Unauthorized`] unless the caller created the
    /// job, or [`MarketError::WrongState`] if the job is terminal or the
    /// provider has neither approved nor missed the delivery deadline.
    pub fn cancel_job(&mut self, ctx: &CallContext, job: JobId) -> Result<()> {
        let result = self.cancel_job_checked(ctx, job);
        log_rejection("cancel_job", ctx, result)
    }

    fn cancel_job_checked(&mut self, ctx: &CallContext, job_id: JobId) -> Result<()> {
        let job = self.require_creator(ctx, job_id, "cancel this job")?;
        let status = job.status;
        let approved = job.cancellation_approved;

        let refunded = match status {
            JobStatus::Open => Amount::ZERO,
            JobStatus::ProposalAccepted => {
                let delivery_deadline = self.accepted(job_id, "cancel")?.delivery_deadline;
                if !approved && ctx.height < delivery_deadline {
                    return Err(wrong_state(self.jobs.get(job_id)?, "cancel"));
                }
                self.escrow.refund(&mut self.ledger, job_id)?
            }
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Expired => {
                return Err(wrong_state(self.jobs.get(job_id)?, "cancel"));
            }
        };

        self.jobs
            .transition(job_id, JobStatus::Cancelled, Authority::Caller(&ctx.caller))?;
        self.jobs.get_mut(job_id)?.escrowed = Amount::ZERO;
        let rejected = self.proposals.reject_pending(job_id);

        info!(job = %job_id, refunded = %refunded, rejected = rejected.len(), "job cancelled");
        self.emit(&MarketEvent::JobCancelled {
            job: job_id,
            refunded,
            rejected,
            height: ctx.height,
        });
        Ok(())
    }

    /// Expires an open job whose deadline has been reached. Any caller may
    /// drive expiry.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::WrongState`] unless the job is open and
    /// `ctx.height >= deadline`.
    pub fn expire_job(&mut self, ctx: &CallContext, job: JobId) -> Result<()> {
        let result = self.expire_job_checked(ctx, job);
        log_rejection("expire_job", ctx, result)
    }

    fn expire_job_checked(&mut self, ctx: &CallContext, job_id: JobId) -> Result<()> {
        let job = self.jobs.get(job_id)?;
        if job.status != JobStatus::Open || job.is_window_open(ctx.height) {
            return Err(wrong_state(job, "expire"));
        }

        self.jobs
            .transition(job_id, JobStatus::Expired, Authority::Keeper)?;
        let rejected = self.proposals.reject_pending(job_id);

        info!(job = %job_id, keeper = %ctx.caller, rejected = rejected.len(), "job expired");
        self.emit(&MarketEvent::JobExpired {
            job: job_id,
            rejected,
            height: ctx.height,
        });
        Ok(())
    }

    fn require_creator(
        &self,
        ctx: &CallContext,
        job_id: JobId,
        action: &'static str,
    ) -> Result<&Job> {
        let job = self.jobs.get(job_id)?;
        if !job.is_creator(&ctx.caller) {
            return Err(MarketError::unauthorized(&ctx.caller, action));
        }
        Ok(job)
    }

    /// The accepted proposal of a job in `ProposalAccepted`.
    fn accepted(&self, job_id: JobId, action: &'static str) -> Result<&Proposal> {
        let job = self.jobs.get(job_id)?;
        if job.status != JobStatus::ProposalAccepted {
            return Err(wrong_state(job, action));
        }
        let proposal = job.accepted_proposal.ok_or_else(|| {
            MarketError::CorruptState(format!("job {job_id} is accepted without a proposal"))
        })?;
        self.proposals.get(job_id, proposal)
    }
}

impl<L> Marketplace<L> {
    /// Gets a job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`] for unknown ids.
    pub fn get_job(&self, job: JobId) -> Result<&Job> {
        self.jobs.get(job)
    }

    /// Gets a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProposalNotFound`] for unknown ids.
    pub fn get_proposal(&self, job: JobId, proposal: ProposalId) -> Result<&Proposal> {
        self.proposals.get(job, proposal)
    }

    /// Every proposal on a job, in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`] for unknown ids.
    pub fn proposals_for_job(&self, job: JobId) -> Result<Vec<&Proposal>> {
        self.jobs.get(job)?;
        Ok(self.proposals.for_job(job).collect())
    }

    /// Pending proposals on a job, in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`] for unknown ids.
    pub fn pending_proposals(&self, job: JobId) -> Result<Vec<&Proposal>> {
        self.jobs.get(job)?;
        Ok(self.proposals.pending_for_job(job).collect())
    }

    /// Iterate over every job in id order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Number of jobs ever created.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Amount currently escrowed for a job.
    #[must_use]
    pub fn escrow_held(&self, job: JobId) -> Amount {
        self.escrow.held(job)
    }

    /// Amount escrowed across every job.
    #[must_use]
    pub fn total_escrowed(&self) -> Amount {
        self.escrow.total_held()
    }

    /// The escrow ledger.
    #[must_use]
    pub const fn escrow(&self) -> &EscrowLedger {
        &self.escrow
    }

    /// The deployment configuration.
    #[must_use]
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The custody account holding escrowed funds.
    #[must_use]
    pub fn custody_account(&self) -> &AccountId {
        &self.config.custody_account
    }

    /// The host ledger.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable access to the host ledger, for funding accounts in simulations.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Consumes the marketplace and returns the host ledger.
    pub fn into_ledger(self) -> L {
        self.ledger
    }
}
