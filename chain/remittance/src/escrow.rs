//! Escrow book: pending transfers keyed by password commitment
//!
//! Owns the commitment → transfer table and the transfer counter. Every
//! record moves from `Pending` to exactly one of `Withdrawn` or `Cancelled`
//! and never back. Settled records keep sender, amount and expiration for
//! reconciliation after a safeguard sweep.
//!
//! The book only mutates its own state. Moving value is the contract's job,
//! which is why every settle method returns the record as it was so a failed
//! payout can be rolled back with `restore`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use types::ids::{Address, TransferId};
use types::numeric::{Amount, Timestamp, SECONDS_PER_DAY};

use crate::commitment::Commitment;
use crate::errors::RemittanceError;

/// How a sender expresses when an unclaimed transfer becomes cancellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryInput {
    /// Whole days from now, within the configured window
    Days(u32),
    /// Absolute unix timestamp
    At(Timestamp),
}

impl ExpiryInput {
    /// Resolve to an absolute expiration strictly after `now`.
    pub fn resolve(
        self,
        now: Timestamp,
        min_days: u32,
        max_days: u32,
    ) -> Result<Timestamp, RemittanceError> {
        let expiration = match self {
            ExpiryInput::Days(days) => {
                if days < min_days || days > max_days {
                    return Err(RemittanceError::InvalidExpiryRange {
                        days,
                        min: min_days,
                        max: max_days,
                    });
                }
                u64::from(days)
                    .checked_mul(SECONDS_PER_DAY)
                    .and_then(|secs| now.checked_add(secs))
                    .ok_or(RemittanceError::Overflow)?
            }
            ExpiryInput::At(at) => at,
        };

        if expiration <= now {
            return Err(RemittanceError::ExpirationNotInFuture { expiration, now });
        }
        Ok(expiration)
    }
}

/// Settlement state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Withdrawn {
        claimant: Address,
        settled_at: Timestamp,
    },
    Cancelled {
        settled_at: Timestamp,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub transfer_id: TransferId,
    pub sender: Address,
    /// Amount funded. Kept after settlement; see `active_amount`.
    pub amount: Amount,
    pub expiration: Timestamp,
    pub created_at: Timestamp,
    pub status: TransferStatus,
}

impl PendingTransfer {
    pub fn is_active(&self) -> bool {
        self.status == TransferStatus::Pending
    }

    /// Amount still held in escrow for this record.
    pub fn active_amount(&self) -> Amount {
        if self.is_active() {
            self.amount
        } else {
            Amount::ZERO
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expiration
    }
}

#[derive(Debug, Clone, Default)]
pub struct EscrowBook {
    transfers: HashMap<Commitment, PendingTransfer>,
    num_transactions: u64,
}

impl EscrowBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending transfer under `commitment`.
    ///
    /// A commitment holds at most one record for the lifetime of the
    /// contract; settled commitments cannot be reused.
    pub fn open(
        &mut self,
        commitment: Commitment,
        sender: Address,
        amount: Amount,
        expiration: Timestamp,
        now: Timestamp,
    ) -> Result<TransferId, RemittanceError> {
        if amount.is_zero() {
            return Err(RemittanceError::NoFundsSent);
        }
        if commitment.is_zero() {
            return Err(RemittanceError::InvalidCommitment);
        }
        if self.transfers.contains_key(&commitment) {
            return Err(RemittanceError::CommitmentAlreadyUsed);
        }

        let next = self
            .num_transactions
            .checked_add(1)
            .ok_or(RemittanceError::Overflow)?;
        let transfer_id = TransferId::new(next);

        self.transfers.insert(
            commitment,
            PendingTransfer {
                transfer_id,
                sender,
                amount,
                expiration,
                created_at: now,
                status: TransferStatus::Pending,
            },
        );
        self.num_transactions = next;
        Ok(transfer_id)
    }

    /// Undo an `open` made earlier in the same call.
    pub(crate) fn discard(&mut self, commitment: &Commitment) {
        if self.transfers.remove(commitment).is_some() {
            self.num_transactions -= 1;
        }
    }

    /// Settle the record as withdrawn by `claimant`.
    ///
    /// Returns the record as it was before settlement.
    pub fn settle_withdrawn(
        &mut self,
        commitment: &Commitment,
        claimant: Address,
        now: Timestamp,
    ) -> Result<PendingTransfer, RemittanceError> {
        let record = self
            .transfers
            .get_mut(commitment)
            .filter(|r| r.is_active())
            .ok_or(RemittanceError::NoFundsForCommitment)?;

        let before = record.clone();
        record.status = TransferStatus::Withdrawn {
            claimant,
            settled_at: now,
        };
        Ok(before)
    }

    /// Settle the record as cancelled by its sender after expiry.
    ///
    /// Returns the record as it was before settlement.
    pub fn settle_cancelled(
        &mut self,
        commitment: &Commitment,
        caller: &Address,
        now: Timestamp,
    ) -> Result<PendingTransfer, RemittanceError> {
        let record = self
            .transfers
            .get_mut(commitment)
            .filter(|r| r.is_active())
            .ok_or(RemittanceError::InvalidOrAlreadySettled)?;

        if !record.is_expired(now) {
            return Err(RemittanceError::NotYetExpired {
                expiration: record.expiration,
            });
        }
        if record.sender != *caller {
            return Err(RemittanceError::CallerNotAuthorized { caller: *caller });
        }

        let before = record.clone();
        record.status = TransferStatus::Cancelled { settled_at: now };
        Ok(before)
    }

    /// Put back a record captured before a settle in the same call.
    pub(crate) fn restore(&mut self, commitment: Commitment, record: PendingTransfer) {
        self.transfers.insert(commitment, record);
    }

    pub fn get(&self, commitment: &Commitment) -> Option<&PendingTransfer> {
        self.transfers.get(commitment)
    }

    pub fn num_transactions(&self) -> u64 {
        self.num_transactions
    }

    /// Sum of amounts over all active records.
    pub fn escrowed_total(&self) -> Result<Amount, RemittanceError> {
        self.transfers
            .values()
            .try_fold(Amount::ZERO, |acc, r| acc.checked_add(r.active_amount()))
            .ok_or(RemittanceError::Overflow)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Commitment, &PendingTransfer)> {
        self.transfers.iter()
    }
}
