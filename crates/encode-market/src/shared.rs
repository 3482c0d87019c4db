//! A marketplace shared between threads.
//!
//! Every operation runs under one coarse lock, so concurrent callers observe
//! the same total order a single-threaded host would impose.

use std::sync::Arc;

use encode_ledger::{Amount, Height, Ledger};
use parking_lot::Mutex;

use crate::error::Result;
use crate::job::Job;
use crate::marketplace::Marketplace;
use crate::proposal::Proposal;
use crate::snapshot::MarketState;
use crate::types::{CallContext, JobId, ProposalId};

/// Thread-safe handle to a [`Marketplace`]. Clones share the same state.
#[derive(Debug)]
pub struct SharedMarketplace<L> {
    inner: Arc<Mutex<Marketplace<L>>>,
}

impl<L> Clone for SharedMarketplace<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Ledger> SharedMarketplace<L> {
    /// Wraps a marketplace.
    #[must_use]
    pub fn new(market: Marketplace<L>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(market)),
        }
    }

    /// Runs `f` with exclusive access to the marketplace.
    pub fn with<R>(&self, f: impl FnOnce(&mut Marketplace<L>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// See [`Marketplace::create_job`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::create_job`].
    pub fn create_job(
        &self,
        ctx: &CallContext,
        title: impl Into<String>,
        description: impl Into<String>,
        budget: Amount,
        deadline: Height,
    ) -> Result<JobId> {
        self.inner
            .lock()
            .create_job(ctx, title, description, budget, deadline)
    }

    /// See [`Marketplace::submit_work_proposal`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::submit_work_proposal`].
    pub fn submit_work_proposal(
        &self,
        ctx: &CallContext,
        job: JobId,
        description: impl Into<String>,
        bid: Amount,
        delivery_deadline: Height,
    ) -> Result<ProposalId> {
        self.inner
            .lock()
            .submit_work_proposal(ctx, job, description, bid, delivery_deadline)
    }

    /// See [`Marketplace::accept_proposal`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::accept_proposal`].
    pub fn accept_proposal(&self, ctx: &CallContext, job: JobId, proposal: ProposalId) -> Result<()> {
        self.inner.lock().accept_proposal(ctx, job, proposal)
    }

    /// See [`Marketplace::withdraw_proposal`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::withdraw_proposal`].
    pub fn withdraw_proposal(
        &self,
        ctx: &CallContext,
        job: JobId,
        proposal: ProposalId,
    ) -> Result<()> {
        self.inner.lock().withdraw_proposal(ctx, job, proposal)
    }

    /// See [`Marketplace::approve_cancellation`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::approve_cancellation`].
    pub fn approve_cancellation(&self, ctx: &CallContext, job: JobId) -> Result<()> {
        self.inner.lock().approve_cancellation(ctx, job)
    }

    /// See [`Marketplace::complete_job`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::complete_job`].
    pub fn complete_job(&self, ctx: &CallContext, job: JobId) -> Result<()> {
        self.inner.lock().complete_job(ctx, job)
    }

    /// See [`Marketplace::cancel_job`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::cancel_job`].
    pub fn cancel_job(&self, ctx: &CallContext, job: JobId) -> Result<()> {
        self.inner.lock().cancel_job(ctx, job)
    }

    /// See [`Marketplace::expire_job`].
    ///
    /// # Errors
    ///
    /// Same as [`Marketplace::expire_job`].
    pub fn expire_job(&self, ctx: &CallContext, job: JobId) -> Result<()> {
        self.inner.lock().expire_job(ctx, job)
    }

    /// A copy of a job record.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`](crate::MarketError::JobNotFound).
    pub fn get_job(&self, job: JobId) -> Result<Job> {
        self.inner.lock().get_job(job).cloned()
    }

    /// A copy of a proposal record.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProposalNotFound`](crate::MarketError::ProposalNotFound).
    pub fn get_proposal(&self, job: JobId, proposal: ProposalId) -> Result<Proposal> {
        self.inner.lock().get_proposal(job, proposal).cloned()
    }

    /// Number of jobs ever created.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.inner.lock().job_count()
    }

    /// Amount escrowed for a job.
    #[must_use]
    pub fn escrow_held(&self, job: JobId) -> Amount {
        self.inner.lock().escrow_held(job)
    }

    /// A consistent snapshot of every record.
    #[must_use]
    pub fn snapshot(&self) -> MarketState {
        self.inner.lock().snapshot()
    }
}

impl<L: Ledger> From<Marketplace<L>> for SharedMarketplace<L> {
    fn from(market: Marketplace<L>) -> Self {
        Self::new(market)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use encode_ledger::{AccountId, InMemoryLedger};
    use std::thread;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    #[test]
    fn concurrent_submissions_get_distinct_sequences() {
        let ledger = InMemoryLedger::with_balances([(account("wallet_1"), Amount::new(100_000))]);
        let market =
            SharedMarketplace::new(Marketplace::new(MarketConfig::new(account("escrow")), ledger).unwrap());
        let job = market
            .create_job(
                &CallContext::new(account("wallet_1"), 1),
                "Shared",
                "",
                Amount::new(1000),
                1_000,
            )
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let market = market.clone();
                thread::spawn(move || {
                    let ctx = CallContext::new(account(&format!("bidder_{i}")), 2);
                    market
                        .submit_work_proposal(&ctx, job, "bid", Amount::new(100 + i), 500)
                        .unwrap()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().get())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<u64>>());
        assert_eq!(market.get_job(job).unwrap().proposal_count, 8);
    }

    #[test]
    fn with_gives_direct_access() {
        let market = SharedMarketplace::from(
            Marketplace::new(MarketConfig::new(account("escrow")), InMemoryLedger::new()).unwrap(),
        );
        market.with(|m| m.ledger_mut().mint(&account("wallet_1"), Amount::new(5)));
        let balance = market.with(|m| m.ledger().balance(&account("wallet_1")));
        assert_eq!(balance, Amount::new(5));
        assert_eq!(market.job_count(), 0);
        assert!(market.snapshot().jobs.is_empty());
    }
}
