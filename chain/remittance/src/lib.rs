//! Remittance Escrow Contract
//!
//! Hash-locked, time-bounded escrow for cross-border remittances. A sender
//! locks value under a commitment to a secret password; a cash-out agent
//! (exchange shop) who learns the password claims it, or the sender reclaims
//! it after expiry. The owner maintains the shop registry and the
//! pause/kill/safeguard lifecycle.
//!
//! # Modules
//! - `commitment`: Contract-bound SHA-256 commitments over secrets
//! - `escrow`: Pending transfer records, expiry and settlement
//! - `registry`: Exchange shop allow-list and one-time credentials
//! - `lifecycle`: Active / Paused / Killed state and the safeguard flag
//! - `security`: Reentrancy guard and owner access control
//! - `ledger`: Native-currency ledger interface plus in-memory implementation
//! - `clock`: Block time source
//! - `config`: Per-deployment policy
//! - `events`: Event taxonomy and append-only log
//! - `errors`: Contract error types
//! - `contract`: The `Remittance` contract itself
//! - `dispatch`: Call requests, receipts and the thread-safe service front

pub mod clock;
pub mod commitment;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod errors;
pub mod escrow;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod registry;
pub mod security;

pub use contract::{Claim, Remittance, ShopProof};
pub use dispatch::{CallRequest, Receipt, RemittanceService};
pub use errors::{ErrorKind, RemittanceError};

/// Contract ABI version, frozen after release
pub const CONTRACT_ABI_VERSION: &str = "1.0.0";
