//! Escrow management for accepted jobs.
//!
//! Escrowed funds sit in the marketplace's custody account on the host
//! ledger. Each job has at most one escrow entry, which moves through a small
//! state machine:
//!
//! ```text
//! (none) ──deposit──▶ Funded ──release──▶ Released
//!                        └────refund───▶ Refunded
//! ```
//!
//! Each operation calls the host transfer first and records the result only
//! if the transfer succeeded, so a failed call leaves both the host ledger and
//! the entry untouched.

use std::collections::BTreeMap;
use std::fmt;

use encode_ledger::{AccountId, Amount, Ledger};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MarketError, Result};
use crate::types::JobId;

/// The state of an escrow entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    /// Funds deposited and locked.
    Funded,
    /// Funds paid out to the provider.
    Released,
    /// Funds returned to the depositor.
    Refunded,
}

impl EscrowState {
    /// Checks if a transition to the target state is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use EscrowState::{Funded, Refunded, Released};

        matches!((self, target), (Funded, Released | Refunded))
    }

    /// Returns true if the funds have left escrow.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Funded => write!(f, "funded"),
            Self::Released => write!(f, "released"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// Funds held for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEntry {
    /// The job these funds are committed to.
    pub job_id: JobId,
    /// Account the funds came from, and the refund destination.
    pub depositor: AccountId,
    /// Amount originally deposited.
    pub deposited: Amount,
    /// Amount still held. Zero once finalized.
    pub held: Amount,
    /// Current state.
    pub state: EscrowState,
    /// Where the funds went when finalized.
    pub beneficiary: Option<AccountId>,
}

/// Ledger of escrow entries, keyed by job.
#[derive(Debug, Clone)]
pub struct EscrowLedger {
    custody: AccountId,
    entries: BTreeMap<JobId, EscrowEntry>,
}

impl EscrowLedger {
    /// Creates an empty escrow ledger custodied by `custody`.
    #[must_use]
    pub fn new(custody: AccountId) -> Self {
        Self {
            custody,
            entries: BTreeMap::new(),
        }
    }

    /// The custody account on the host ledger.
    #[must_use]
    pub fn custody(&self) -> &AccountId {
        &self.custody
    }

    /// Debits `from` into custody and records a funded entry for `job`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InsufficientFunds`] if `from` cannot cover the
    /// amount, [`MarketError::InvalidTransition`] if the job already has an
    /// entry, or [`MarketError::InvalidParameter`] for a zero amount.
    pub fn deposit<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        job: JobId,
        from: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        if let Some(existing) = self.entries.get(&job) {
            return Err(MarketError::invalid_transition(
                existing.state,
                EscrowState::Funded,
            ));
        }
        if amount.is_zero() {
            return Err(MarketError::invalid_parameter(
                "amount",
                "escrow deposit must be positive",
            ));
        }

        ledger.transfer(from, &self.custody, amount).map_err(|e| {
            debug!(job = %job, from = %from, amount = %amount, error = %e, "escrow deposit refused");
            MarketError::from(e)
        })?;

        self.entries.insert(
            job,
            EscrowEntry {
                job_id: job,
                depositor: from.clone(),
                deposited: amount,
                held: amount,
                state: EscrowState::Funded,
                beneficiary: None,
            },
        );
        debug!(job = %job, from = %from, amount = %amount, "escrow funded");
        Ok(())
    }

    /// Pays the full held amount to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NoFundsHeld`] if nothing is held for the job.
    pub fn release<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        job: JobId,
        to: &AccountId,
    ) -> Result<Amount> {
        self.pay_out(ledger, job, Some(to), EscrowState::Released)
    }

    /// Returns the full held amount to the depositor.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NoFundsHeld`] if nothing is held for the job.
    pub fn refund<L: Ledger + ?Sized>(&mut self, ledger: &mut L, job: JobId) -> Result<Amount> {
        self.pay_out(ledger, job, None, EscrowState::Refunded)
    }

    fn pay_out<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        job: JobId,
        to: Option<&AccountId>,
        target: EscrowState,
    ) -> Result<Amount> {
        let entry = self
            .entries
            .get_mut(&job)
            .filter(|e| e.state == EscrowState::Funded && !e.held.is_zero())
            .ok_or(MarketError::NoFundsHeld(job))?;

        if !entry.state.can_transition_to(&target) {
            return Err(MarketError::invalid_transition(entry.state, target));
        }

        let destination = to.unwrap_or(&entry.depositor).clone();
        let amount = entry.held;
        ledger
            .transfer(&self.custody, &destination, amount)
            .map_err(|e| {
                warn!(job = %job, to = %destination, amount = %amount, error = %e, "escrow payout failed");
                MarketError::from(e)
            })?;

        entry.held = Amount::ZERO;
        entry.state = target;
        entry.beneficiary = Some(destination);
        debug!(job = %job, amount = %amount, state = %target, "escrow finalized");
        Ok(amount)
    }

    /// Amount currently held for a job. Zero if there is no entry.
    #[must_use]
    pub fn held(&self, job: JobId) -> Amount {
        self.entries.get(&job).map_or(Amount::ZERO, |e| e.held)
    }

    /// Sum held across all jobs. Should equal the custody balance.
    #[must_use]
    pub fn total_held(&self) -> Amount {
        self.entries.values().map(|e| e.held).sum()
    }

    /// The entry for a job, if one was ever funded.
    #[must_use]
    pub fn entry(&self, job: JobId) -> Option<&EscrowEntry> {
        self.entries.get(&job)
    }

    /// Iterate over every entry in job order.
    pub fn iter(&self) -> impl Iterator<Item = &EscrowEntry> {
        self.entries.values()
    }

    /// Rebuild an escrow ledger from persisted entries.
    pub(crate) fn from_parts(custody: AccountId, entries: Vec<EscrowEntry>) -> Result<Self> {
        let mut ledger = Self::new(custody);
        for entry in entries {
            let consistent = match entry.state {
                EscrowState::Funded => entry.held == entry.deposited && entry.beneficiary.is_none(),
                EscrowState::Released | EscrowState::Refunded => {
                    entry.held.is_zero() && entry.beneficiary.is_some()
                }
            };
            if !consistent {
                return Err(MarketError::CorruptState(format!(
                    "escrow entry for job {} is inconsistent with state {}",
                    entry.job_id, entry.state
                )));
            }
            if ledger.entries.insert(entry.job_id, entry).is_some() {
                return Err(MarketError::CorruptState("duplicate escrow entry".to_string()));
            }
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use encode_ledger::InMemoryLedger;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    fn setup(balance: u64) -> (EscrowLedger, InMemoryLedger) {
        let escrow = EscrowLedger::new(account("escrow"));
        let ledger = InMemoryLedger::with_balances([(account("buyer"), Amount::new(balance))]);
        (escrow, ledger)
    }

    #[test]
    fn escrow_state_transitions() {
        assert!(EscrowState::Funded.can_transition_to(&EscrowState::Released));
        assert!(EscrowState::Funded.can_transition_to(&EscrowState::Refunded));

        assert!(!EscrowState::Funded.can_transition_to(&EscrowState::Funded));
        assert!(!EscrowState::Released.can_transition_to(&EscrowState::Refunded));
        assert!(!EscrowState::Refunded.can_transition_to(&EscrowState::Released));
        assert!(!EscrowState::Released.can_transition_to(&EscrowState::Funded));
    }

    #[test]
    fn escrow_state_display() {
        assert_eq!(EscrowState::Funded.to_string(), "funded");
        assert_eq!(EscrowState::Released.to_string(), "released");
        assert_eq!(EscrowState::Refunded.to_string(), "refunded");
    }

    #[test]
    fn deposit_moves_funds_into_custody() {
        let (mut escrow, mut ledger) = setup(5000);
        let job = JobId::new(0);

        escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(4500))
            .unwrap();

        assert_eq!(escrow.held(job), Amount::new(4500));
        assert_eq!(escrow.total_held(), Amount::new(4500));
        assert_eq!(ledger.balance(&account("escrow")), Amount::new(4500));
        assert_eq!(ledger.balance(&account("buyer")), Amount::new(500));

        let entry = escrow.entry(job).unwrap();
        assert_eq!(entry.state, EscrowState::Funded);
        assert_eq!(entry.depositor, account("buyer"));
    }

    #[test]
    fn deposit_without_funds_records_nothing() {
        let (mut escrow, mut ledger) = setup(100);
        let job = JobId::new(0);

        let err = escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(4500))
            .unwrap_err();

        assert_eq!(
            err,
            MarketError::InsufficientFunds {
                required: Amount::new(4500),
                available: Amount::new(100),
            }
        );
        assert!(escrow.entry(job).is_none());
        assert_eq!(ledger.balance(&account("buyer")), Amount::new(100));
    }

    #[test]
    fn cannot_deposit_twice() {
        let (mut escrow, mut ledger) = setup(5000);
        let job = JobId::new(0);
        escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(100))
            .unwrap();

        let err = escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(100))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(ledger.balance(&account("buyer")), Amount::new(4900));
    }

    #[test]
    fn zero_deposit_is_rejected() {
        let (mut escrow, mut ledger) = setup(5000);
        let err = escrow
            .deposit(&mut ledger, JobId::new(0), &account("buyer"), Amount::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn release_pays_provider_and_zeroes_entry() {
        let (mut escrow, mut ledger) = setup(5000);
        let job = JobId::new(0);
        escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(4500))
            .unwrap();

        let paid = escrow
            .release(&mut ledger, job, &account("provider"))
            .unwrap();

        assert_eq!(paid, Amount::new(4500));
        assert_eq!(escrow.held(job), Amount::ZERO);
        assert_eq!(ledger.balance(&account("provider")), Amount::new(4500));
        assert_eq!(ledger.balance(&account("escrow")), Amount::ZERO);

        let entry = escrow.entry(job).unwrap();
        assert_eq!(entry.state, EscrowState::Released);
        assert_eq!(entry.deposited, Amount::new(4500));
        assert_eq!(entry.beneficiary, Some(account("provider")));
    }

    #[test]
    fn refund_returns_to_depositor() {
        let (mut escrow, mut ledger) = setup(5000);
        let job = JobId::new(0);
        escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(4500))
            .unwrap();

        let refunded = escrow.refund(&mut ledger, job).unwrap();

        assert_eq!(refunded, Amount::new(4500));
        assert_eq!(ledger.balance(&account("buyer")), Amount::new(5000));
        assert_eq!(escrow.entry(job).unwrap().state, EscrowState::Refunded);
    }

    #[test]
    fn release_or_refund_without_funds() {
        let (mut escrow, mut ledger) = setup(5000);
        let job = JobId::new(0);

        assert_eq!(
            escrow.refund(&mut ledger, job).unwrap_err(),
            MarketError::NoFundsHeld(job)
        );
        assert_eq!(
            escrow
                .release(&mut ledger, job, &account("provider"))
                .unwrap_err(),
            MarketError::NoFundsHeld(job)
        );
    }

    #[test]
    fn finalized_entry_cannot_pay_twice() {
        let (mut escrow, mut ledger) = setup(5000);
        let job = JobId::new(0);
        escrow
            .deposit(&mut ledger, job, &account("buyer"), Amount::new(4500))
            .unwrap();
        escrow
            .release(&mut ledger, job, &account("provider"))
            .unwrap();

        assert_eq!(
            escrow.refund(&mut ledger, job).unwrap_err(),
            MarketError::NoFundsHeld(job)
        );
        assert_eq!(ledger.balance(&account("provider")), Amount::new(4500));
    }

    #[test]
    fn total_held_tracks_custody_balance() {
        let mut escrow = EscrowLedger::new(account("escrow"));
        let mut ledger = InMemoryLedger::with_balances([
            (account("a"), Amount::new(1000)),
            (account("b"), Amount::new(1000)),
        ]);

        escrow
            .deposit(&mut ledger, JobId::new(0), &account("a"), Amount::new(300))
            .unwrap();
        escrow
            .deposit(&mut ledger, JobId::new(1), &account("b"), Amount::new(200))
            .unwrap();
        escrow.refund(&mut ledger, JobId::new(0)).unwrap();

        assert_eq!(escrow.total_held(), Amount::new(200));
        assert_eq!(ledger.balance(escrow.custody()), escrow.total_held());
        assert_eq!(escrow.iter().count(), 2);
    }

    #[test]
    fn from_parts_rejects_inconsistent_entries() {
        let entry = EscrowEntry {
            job_id: JobId::new(0),
            depositor: account("buyer"),
            deposited: Amount::new(100),
            held: Amount::new(100),
            state: EscrowState::Released,
            beneficiary: Some(account("provider")),
        };
        let err = EscrowLedger::from_parts(account("escrow"), vec![entry]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptState);
    }
}
