//! Exchange shop registry
//!
//! Owner-maintained allow-list of cash-out agents. Depending on the claim
//! policy a shop may also hold a one-time credential commitment that is
//! rotated on every successful claim.

use std::collections::{HashMap, HashSet};
use types::ids::Address;

use crate::commitment::Commitment;
use crate::errors::RemittanceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopEntry {
    /// Current credential commitment, if the deployment uses credentials
    pub credential: Option<Commitment>,
    /// Credentials rotated away; presenting one again is a replay.
    ///
    /// Grows by one entry per credentialed claim and is never pruned while
    /// the shop stays registered: forgetting an entry would reopen it to
    /// replay. Deregistering the shop drops the set.
    retired: HashSet<Commitment>,
}

impl ShopEntry {
    pub fn is_retired(&self, credential: &Commitment) -> bool {
        self.retired.contains(credential)
    }

    /// Number of credentials this shop has used up.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeShopRegistry {
    shops: HashMap<Address, ShopEntry>,
}

impl ExchangeShopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `shop` to the registry.
    ///
    /// `require_credential` is set by deployments that rotate shop
    /// credentials; a degenerate or missing credential is then rejected.
    pub fn register(
        &mut self,
        shop: Address,
        credential: Option<Commitment>,
        require_credential: bool,
    ) -> Result<(), RemittanceError> {
        if shop.is_zero() {
            return Err(RemittanceError::ZeroAddress);
        }
        if self.shops.contains_key(&shop) {
            return Err(RemittanceError::AlreadyRegistered { address: shop });
        }
        match credential {
            Some(c) if c.is_zero() => return Err(RemittanceError::InvalidShopSecret),
            None if require_credential => return Err(RemittanceError::InvalidShopSecret),
            _ => {}
        }

        self.shops.insert(
            shop,
            ShopEntry {
                credential,
                retired: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Remove `shop` from the registry.
    pub fn deregister(&mut self, shop: &Address) -> Result<(), RemittanceError> {
        self.shops
            .remove(shop)
            .map(|_| ())
            .ok_or(RemittanceError::NotRegistered { address: *shop })
    }

    pub fn is_registered(&self, shop: &Address) -> bool {
        self.shops.contains_key(shop)
    }

    pub fn entry(&self, shop: &Address) -> Option<&ShopEntry> {
        self.shops.get(shop)
    }

    pub fn len(&self) -> usize {
        self.shops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shops.is_empty()
    }

    /// Check `presented` against the shop's current credential and replace
    /// it with `next`. Returns the credential that was consumed.
    pub fn verify_and_rotate(
        &mut self,
        shop: &Address,
        presented: Commitment,
        next: Commitment,
    ) -> Result<Commitment, RemittanceError> {
        let entry = self
            .shops
            .get_mut(shop)
            .ok_or(RemittanceError::CallerNotAuthorized { caller: *shop })?;

        if entry.credential != Some(presented) {
            if entry.is_retired(&presented) {
                return Err(RemittanceError::ShopCredentialAlreadyUsed);
            }
            return Err(RemittanceError::CallerNotAuthorized { caller: *shop });
        }
        if next.is_zero() || next == presented || entry.is_retired(&next) {
            return Err(RemittanceError::InvalidShopSecret);
        }

        entry.retired.insert(presented);
        entry.credential = Some(next);
        Ok(presented)
    }

    /// Undo a rotation made earlier in the same call.
    pub(crate) fn restore_credential(&mut self, shop: &Address, previous: Commitment) {
        if let Some(entry) = self.shops.get_mut(shop) {
            entry.retired.remove(&previous);
            entry.credential = Some(previous);
        }
    }
}
