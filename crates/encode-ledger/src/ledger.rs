//! The host transfer capability and an in-memory host for development.
//!
//! The marketplace never touches balances directly. It is handed something
//! implementing [`Ledger`] and moves funds only through [`Ledger::transfer`],
//! which must be all-or-nothing: either both sides of the transfer are applied
//! or neither is.

use std::collections::BTreeMap;

use tracing::debug;

use crate::account::AccountId;
use crate::amount::Amount;
use crate::error::{LedgerError, Result};

/// Fund-transfer primitive provided by the host ledger.
pub trait Ledger {
    /// Current balance of an account. Unknown accounts hold zero.
    fn balance(&self, account: &AccountId) -> Amount;

    /// Atomically move `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if `from` cannot cover the
    /// amount. On any error no balance has changed.
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;
}

impl<L: Ledger + ?Sized> Ledger for Box<L> {
    fn balance(&self, account: &AccountId) -> Amount {
        (**self).balance(account)
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        (**self).transfer(from, to, amount)
    }
}

/// In-memory host ledger.
///
/// Holds one balance per account and applies transfers in place. Used by tests,
/// benchmarks and local simulations of the marketplace.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    accounts: BTreeMap<AccountId, Amount>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger with the given starting balances.
    #[must_use]
    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        let mut ledger = Self::new();
        for (account, amount) in balances {
            ledger.mint(&account, amount);
        }
        ledger
    }

    /// Credit new funds to an account (genesis allocation / faucet).
    pub fn mint(&mut self, account: &AccountId, amount: Amount) {
        let balance = self.accounts.entry(account.clone()).or_default();
        *balance = balance.saturating_add(amount);
        debug!(account = %account, amount = %amount, "minted");
    }

    /// Sum of every balance held on this ledger.
    #[must_use]
    pub fn total_supply(&self) -> Amount {
        self.accounts.values().sum()
    }

    /// Iterate over all known accounts and their balances.
    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, Amount)> {
        self.accounts.iter().map(|(k, v)| (k, *v))
    }
}

impl Ledger for InMemoryLedger {
    fn balance(&self, account: &AccountId) -> Amount {
        self.accounts.get(account).copied().unwrap_or(Amount::ZERO)
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::invalid_amount("transfer amount must be positive"));
        }
        if from == to {
            return Err(LedgerError::SelfTransfer(from.clone()));
        }

        let available = self.balance(from);
        let debited = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::insufficient_funds(from.clone(), available, amount))?;
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(to.clone()))?;

        // Both sides are computed before either is written.
        self.accounts.insert(from.clone(), debited);
        self.accounts.insert(to.clone(), credited);

        debug!(from = %from, to = %to, amount = %amount, "transfer completed");
        Ok(())
    }
}
