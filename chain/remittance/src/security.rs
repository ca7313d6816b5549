//! Shared security primitives
//!
//! Single-owner access control and the reentrancy guard wrapped around
//! every money-moving entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use types::ids::Address;

use crate::errors::RemittanceError;

/// Reentrancy guard preventing nested calls into protected functions.
///
/// A contract function enters the guard before executing state-changing
/// logic. The returned token releases it when dropped, including while
/// unwinding from a panic. Any nested entry attempt fails.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    locked: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Create a new unlocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guard for the lifetime of the returned token.
    /// Returns `None` if already locked (reentrancy attempt).
    pub fn enter(&self) -> Option<ReentrancyToken> {
        self.try_lock().then(|| ReentrancyToken {
            locked: Arc::clone(&self.locked),
        })
    }

    /// Acquire the guard. Returns `true` if successfully acquired.
    /// Returns `false` if already locked (reentrancy attempt).
    pub fn acquire(&mut self) -> bool {
        self.try_lock()
    }

    /// Release the guard.
    pub fn release(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    /// Check if currently locked.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Proof of holding a `ReentrancyGuard`; releases it on drop.
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct ReentrancyToken {
    locked: Arc<AtomicBool>,
}

impl Drop for ReentrancyToken {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

/// Single-owner access control.
///
/// The owner is fixed at construction; there is no transfer or renounce.
#[derive(Debug, Clone)]
pub struct AccessControl {
    owner: Address,
}

impl AccessControl {
    /// Create access control for `owner`. The zero address cannot own.
    pub fn new(owner: Address) -> Result<Self, RemittanceError> {
        if owner.is_zero() {
            return Err(RemittanceError::ZeroAddress);
        }
        Ok(Self { owner })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, caller: &Address) -> bool {
        *caller == self.owner
    }

    /// Fail with `Unauthorized` unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &Address) -> Result<(), RemittanceError> {
        if !self.is_owner(caller) {
            return Err(RemittanceError::Unauthorized);
        }
        Ok(())
    }
}
