//! Contract error types
//!
//! Every rejected precondition aborts the whole call. Each variant carries a
//! stable reason string and classifies into one of five error kinds.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::ids::Address;
use types::numeric::{Amount, Timestamp};

/// Coarse classification of a failure, used by callers deciding whether a
/// resubmission with different parameters could succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Caller lacks the identity or capability required
    Authorization,
    /// Global lifecycle state forbids the operation
    State,
    /// No active record for the referenced commitment or credential
    NotFound,
    /// Outbound value transfer failed; the call was rolled back
    Transfer,
}

/// Errors returned by remittance contract operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemittanceError {
    // ─── Validation ───
    #[error("Invalid input: secret must not be empty or whitespace")]
    InvalidInput,

    #[error("No funds sent")]
    NoFundsSent,

    #[error("Invalid commitment: the zero hash cannot hold funds")]
    InvalidCommitment,

    #[error("Expiration {expiration} is not after current time {now}")]
    ExpirationNotInFuture { expiration: Timestamp, now: Timestamp },

    #[error("Expiry of {days} days is outside the allowed range {min}..={max}")]
    InvalidExpiryRange { days: u32, min: u32, max: u32 },

    #[error("Commitment already used")]
    CommitmentAlreadyUsed,

    #[error("Address must not be the zero address")]
    ZeroAddress,

    #[error("Exchange shop already registered: {address}")]
    AlreadyRegistered { address: Address },

    #[error("Invalid exchange shop secret")]
    InvalidShopSecret,

    #[error("Invalid arguments for {function}: {reason}")]
    InvalidArguments { function: String, reason: String },

    #[error("Recipient must not be the contract itself: {address}")]
    InvalidRecipient { address: Address },

    #[error("Arithmetic overflow in balance calculation")]
    Overflow,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // ─── Authorization ───
    #[error("Unauthorized: caller is not the owner")]
    Unauthorized,

    #[error("Caller not authorized: {caller}")]
    CallerNotAuthorized { caller: Address },

    // ─── State ───
    #[error("Contract is paused")]
    ContractPaused,

    #[error("Contract is killed")]
    ContractKilled,

    #[error("Contract is already paused")]
    AlreadyPaused,

    #[error("Contract is not paused")]
    NotPaused,

    #[error("Contract is not in a safeguardable state")]
    NotInSafeguardableState,

    #[error("Reentrancy detected")]
    Reentrancy,

    #[error("Unsupported operation: {function}")]
    UnsupportedOperation { function: String },

    #[error("Transfer not yet expired: expires at {expiration}")]
    NotYetExpired { expiration: Timestamp },

    #[error("Service unavailable: a previous call panicked mid-operation")]
    ServiceUnavailable,

    // ─── Not found ───
    #[error("No funds for commitment")]
    NoFundsForCommitment,

    #[error("Transfer invalid or already settled")]
    InvalidOrAlreadySettled,

    #[error("Exchange shop not registered: {address}")]
    NotRegistered { address: Address },

    #[error("Exchange shop credential already used")]
    ShopCredentialAlreadyUsed,

    // ─── Transfer ───
    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] LedgerError),
}

impl RemittanceError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        use RemittanceError::*;
        match self {
            InvalidInput
            | NoFundsSent
            | InvalidCommitment
            | ExpirationNotInFuture { .. }
            | InvalidExpiryRange { .. }
            | CommitmentAlreadyUsed
            | ZeroAddress
            | AlreadyRegistered { .. }
            | InvalidShopSecret
            | InvalidArguments { .. }
            | InvalidRecipient { .. }
            | Overflow
            | Config(_) => ErrorKind::Validation,
            Unauthorized | CallerNotAuthorized { .. } => ErrorKind::Authorization,
            ContractPaused
            | ContractKilled
            | AlreadyPaused
            | NotPaused
            | NotInSafeguardableState
            | Reentrancy
            | UnsupportedOperation { .. }
            | NotYetExpired { .. }
            | ServiceUnavailable => ErrorKind::State,
            NoFundsForCommitment
            | InvalidOrAlreadySettled
            | NotRegistered { .. }
            | ShopCredentialAlreadyUsed => ErrorKind::NotFound,
            TransferFailed(_) => ErrorKind::Transfer,
        }
    }
}

/// Failures reported by the native-currency ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: Address,
        required: Amount,
        available: Amount,
    },

    #[error("recipient {account} rejected the transfer")]
    Rejected { account: Address },

    #[error("balance overflow for {account}")]
    Overflow { account: Address },
}

/// Configuration loading and validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(String),

    #[error("Invalid expiry window: min {min} days, max {max} days")]
    InvalidExpiryWindow { min: u32, max: u32 },
}
