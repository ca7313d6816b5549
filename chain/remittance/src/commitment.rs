//! Password commitments
//!
//! A commitment is `SHA-256(domain || contract_address || secret)`. Binding
//! the contract's own address into the preimage means a secret hashed for
//! one deployment never matches a commitment stored by another.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use types::ids::Address;

use crate::errors::RemittanceError;

/// Domain separator for recipient and exchange-shop password commitments.
pub const COMMITMENT_DOMAIN: &[u8] = b"remittance.commitment.v1";

/// 32-byte commitment to a secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Commitment([u8; 32]);

impl Commitment {
    /// The degenerate all-zero hash. Never accepted as a key.
    pub const ZERO: Commitment = Commitment([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Derives commitments bound to one contract instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitmentHasher {
    contract: Address,
}

impl CommitmentHasher {
    pub fn new(contract: Address) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Hash a plaintext secret into a commitment.
    ///
    /// Rejects empty and whitespace-only secrets with `InvalidInput`.
    pub fn generate_hash(&self, secret: &[u8]) -> Result<Commitment, RemittanceError> {
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(RemittanceError::InvalidInput);
        }

        let mut hasher = Sha256::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(self.contract.as_bytes());
        hasher.update(secret);
        Ok(Commitment(hasher.finalize().into()))
    }
}
