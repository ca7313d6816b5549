//! Native-currency ledger collaborator
//!
//! The contract never holds balances itself: it asks the ledger to move
//! value between accounts, and treats every such call as fallible.

use std::collections::{HashMap, HashSet};
use tracing::debug;
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::LedgerError;

pub trait Ledger {
    fn balance_of(&self, account: &Address) -> Amount;

    /// Move `amount` from `from` to `to`. Either both balances change or
    /// neither does.
    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount)
        -> Result<(), LedgerError>;
}

/// In-process ledger holding balances in a map.
///
/// Accounts can be flagged to reject incoming transfers, which lets tests
/// exercise the rollback path of failed payouts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: HashMap<Address, Amount>,
    rejecting: HashSet<Address>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air (genesis allocation).
    pub fn mint(&mut self, account: Address, amount: Amount) -> Result<(), LedgerError> {
        self.safe_credit(&account, amount)
    }

    /// Make `account` refuse every incoming transfer.
    pub fn reject_incoming(&mut self, account: Address) {
        self.rejecting.insert(account);
    }

    pub fn accept_incoming(&mut self, account: &Address) {
        self.rejecting.remove(account);
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |acc, b| acc.checked_add(*b))
    }

    fn safe_credit(&mut self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let current = self.balances.entry(*account).or_insert(Amount::ZERO);
        *current = current
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { account: *account })?;
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if self.rejecting.contains(to) {
            return Err(LedgerError::Rejected { account: *to });
        }

        let available = self.balance_of(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                account: *from,
                required: amount,
                available,
            })?;

        if from != to {
            let credited = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { account: *to })?;
            self.balances.insert(*from, remaining);
            self.balances.insert(*to, credited);
        }

        debug!(%from, %to, %amount, "ledger transfer");
        Ok(())
    }
}
