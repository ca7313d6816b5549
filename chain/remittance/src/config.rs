//! Per-deployment configuration
//!
//! Deployments disagree on who may claim and when funds may be swept. Each
//! deployment picks one rule for each and records it here.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Who may withdraw funds by presenting a recipient secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Any holder of the secret may claim.
    OpenClaim,
    /// Caller must be a registered exchange shop and hold the secret.
    RegisteredShop,
    /// Registered shop, recipient secret, and the shop's one-time
    /// credential, which is rotated on every claim.
    ShopCredential,
}

impl ClaimPolicy {
    pub fn requires_registration(&self) -> bool {
        !matches!(self, ClaimPolicy::OpenClaim)
    }

    pub fn requires_shop_credential(&self) -> bool {
        matches!(self, ClaimPolicy::ShopCredential)
    }
}

/// Lifecycle state required before the owner may sweep the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeguardGate {
    /// Paused or Killed
    WhenPaused,
    /// Killed only
    WhenKilled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemittanceConfig {
    pub claim_policy: ClaimPolicy,
    pub safeguard_gate: SafeguardGate,
    /// Shortest relative expiry accepted by `initiate_transfer`, in days.
    pub min_expiry_days: u32,
    /// Longest relative expiry accepted by `initiate_transfer`, in days.
    pub max_expiry_days: u32,
}

impl Default for RemittanceConfig {
    fn default() -> Self {
        Self {
            claim_policy: ClaimPolicy::RegisteredShop,
            safeguard_gate: SafeguardGate::WhenKilled,
            min_expiry_days: 1,
            max_expiry_days: 14,
        }
    }
}

impl RemittanceConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_expiry_days == 0 || self.min_expiry_days > self.max_expiry_days {
            return Err(ConfigError::InvalidExpiryWindow {
                min: self.min_expiry_days,
                max: self.max_expiry_days,
            });
        }
        Ok(())
    }

    pub fn with_claim_policy(mut self, claim_policy: ClaimPolicy) -> Self {
        self.claim_policy = claim_policy;
        self
    }

    pub fn with_safeguard_gate(mut self, safeguard_gate: SafeguardGate) -> Self {
        self.safeguard_gate = safeguard_gate;
        self
    }
}
