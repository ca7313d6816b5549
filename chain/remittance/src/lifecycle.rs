//! Lifecycle controller: Active → Paused → Killed, plus one-shot safeguard
//!
//! Pause halts new activity reversibly, kill halts it irreversibly, and
//! safeguard performs a single full-balance rescue. The controller only
//! tracks state; owner checks and the sweep itself live in the contract.

use serde::{Deserialize, Serialize};

use crate::config::SafeguardGate;
use crate::errors::RemittanceError;

/// Global contract state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Initial state; all operations permitted
    Active,
    /// Money-moving and registry operations halted; reversible
    Paused,
    /// Terminal except for the safeguard sweep
    Killed,
}

#[derive(Debug, Clone)]
pub struct LifecycleController {
    state: LifecycleState,
    funds_safeguarded: bool,
}

impl LifecycleController {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Active,
            funds_safeguarded: false,
        }
    }

    /// Rebuild a controller in an arbitrary state, e.g. for isolated tests.
    pub fn with_state(state: LifecycleState, funds_safeguarded: bool) -> Self {
        Self {
            state,
            funds_safeguarded,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == LifecycleState::Paused
    }

    pub fn is_killed(&self) -> bool {
        self.state == LifecycleState::Killed
    }

    pub fn funds_safeguarded(&self) -> bool {
        self.funds_safeguarded
    }

    /// Gate for money-moving and registry operations.
    pub fn ensure_active(&self) -> Result<(), RemittanceError> {
        match self.state {
            LifecycleState::Active => Ok(()),
            LifecycleState::Paused => Err(RemittanceError::ContractPaused),
            LifecycleState::Killed => Err(RemittanceError::ContractKilled),
        }
    }

    /// Active → Paused.
    pub fn pause(&mut self) -> Result<(), RemittanceError> {
        match self.state {
            LifecycleState::Active => {
                self.state = LifecycleState::Paused;
                Ok(())
            }
            LifecycleState::Paused => Err(RemittanceError::AlreadyPaused),
            LifecycleState::Killed => Err(RemittanceError::ContractKilled),
        }
    }

    /// Paused → Active.
    pub fn unpause(&mut self) -> Result<(), RemittanceError> {
        match self.state {
            LifecycleState::Paused => {
                self.state = LifecycleState::Active;
                Ok(())
            }
            LifecycleState::Active => Err(RemittanceError::NotPaused),
            LifecycleState::Killed => Err(RemittanceError::ContractKilled),
        }
    }

    /// Paused → Killed. Killing requires a prior pause.
    pub fn kill(&mut self) -> Result<(), RemittanceError> {
        match self.state {
            LifecycleState::Paused => {
                self.state = LifecycleState::Killed;
                Ok(())
            }
            LifecycleState::Active => Err(RemittanceError::NotPaused),
            LifecycleState::Killed => Err(RemittanceError::ContractKilled),
        }
    }

    /// Check that a safeguard sweep is allowed under `gate`.
    pub fn ensure_safeguardable(&self, gate: SafeguardGate) -> Result<(), RemittanceError> {
        if self.funds_safeguarded {
            return Err(RemittanceError::NotInSafeguardableState);
        }
        let allowed = match gate {
            SafeguardGate::WhenPaused => {
                matches!(self.state, LifecycleState::Paused | LifecycleState::Killed)
            }
            SafeguardGate::WhenKilled => self.state == LifecycleState::Killed,
        };
        if !allowed {
            return Err(RemittanceError::NotInSafeguardableState);
        }
        Ok(())
    }

    /// Record a completed sweep. The contract ends up Killed whatever gate
    /// allowed the sweep, since its records are no longer backed by funds.
    pub fn mark_safeguarded(&mut self) {
        self.state = LifecycleState::Killed;
        self.funds_safeguarded = true;
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}
