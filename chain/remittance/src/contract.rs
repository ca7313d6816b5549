//! Remittance contract
//!
//! Ties the escrow book, exchange shop registry and lifecycle controller
//! together behind the externally callable operations.
//!
//! Every operation follows the same order:
//! 1. Lifecycle gate (Active required for money-moving and registry calls)
//! 2. Access control (owner-only calls)
//! 3. Reentrancy guard
//! 4. Validation and state transition
//! 5. Outbound value transfer, rolled back together with step 4 on failure
//! 6. Event emission

use std::sync::mpsc::Receiver;
use tracing::{info, warn};
use types::ids::{Address, TransferId};
use types::numeric::Amount;

use crate::clock::Clock;
use crate::commitment::{Commitment, CommitmentHasher};
use crate::config::RemittanceConfig;
use crate::errors::RemittanceError;
use crate::escrow::{EscrowBook, ExpiryInput, PendingTransfer};
use crate::events::{EventEnvelope, EventLog, RemittanceEvent};
use crate::ledger::Ledger;
use crate::lifecycle::{LifecycleController, LifecycleState};
use crate::registry::ExchangeShopRegistry;
use crate::security::{AccessControl, ReentrancyGuard};

/// Exchange shop's one-time credential presented alongside a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopProof {
    /// Plaintext of the shop's current credential
    pub secret: Vec<u8>,
    /// Commitment that replaces the current credential
    pub next_credential: Commitment,
}

/// Inputs to `withdraw_funds`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Recipient's plaintext password
    pub secret: Vec<u8>,
    pub shop_proof: Option<ShopProof>,
}

impl Claim {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            shop_proof: None,
        }
    }

    pub fn with_shop_proof(
        mut self,
        shop_secret: impl Into<Vec<u8>>,
        next_credential: Commitment,
    ) -> Self {
        self.shop_proof = Some(ShopProof {
            secret: shop_secret.into(),
            next_credential,
        });
        self
    }
}

/// Remittance escrow contract.
///
/// The contract's native-currency balance lives in the ledger under
/// `address`; while no safeguard sweep has happened it always equals the
/// sum of active escrowed amounts.
#[derive(Debug)]
pub struct Remittance<L: Ledger, C: Clock> {
    address: Address,
    config: RemittanceConfig,
    hasher: CommitmentHasher,
    access_control: AccessControl,
    lifecycle: LifecycleController,
    registry: ExchangeShopRegistry,
    escrow: EscrowBook,
    reentrancy_guard: ReentrancyGuard,
    ledger: L,
    clock: C,
    events: EventLog,
}

impl<L: Ledger, C: Clock> Remittance<L, C> {
    /// Deploy a contract at `address` owned by `owner`.
    pub fn new(
        address: Address,
        owner: Address,
        config: RemittanceConfig,
        ledger: L,
        clock: C,
    ) -> Result<Self, RemittanceError> {
        if address.is_zero() {
            return Err(RemittanceError::ZeroAddress);
        }
        config.validate()?;
        let access_control = AccessControl::new(owner)?;

        info!(
            contract = %address,
            %owner,
            claim_policy = ?config.claim_policy,
            safeguard_gate = ?config.safeguard_gate,
            "remittance contract deployed"
        );

        Ok(Self {
            address,
            config,
            hasher: CommitmentHasher::new(address),
            access_control,
            lifecycle: LifecycleController::new(),
            registry: ExchangeShopRegistry::new(),
            escrow: EscrowBook::new(),
            reentrancy_guard: ReentrancyGuard::new(),
            ledger,
            clock,
            events: EventLog::new(),
        })
    }

    // ───────────────────────── Commitments ─────────────────────────

    /// Commitment for `secret`, bound to this contract's address.
    pub fn generate_hash(&self, secret: &[u8]) -> Result<Commitment, RemittanceError> {
        self.hasher.generate_hash(secret)
    }

    // ───────────────────────── Escrow ─────────────────────────

    /// Lock `value` under `commitment` until claimed or cancelled.
    pub fn initiate_transfer(
        &mut self,
        caller: Address,
        commitment: Commitment,
        expiry: ExpiryInput,
        value: Amount,
    ) -> Result<TransferId, RemittanceError> {
        self.lifecycle.ensure_active()?;

        self.guarded(|this| {
            // The contract cannot fund itself: its deposit would be a no-op.
            if caller == this.address {
                return Err(RemittanceError::CallerNotAuthorized { caller });
            }
            if value.is_zero() {
                return Err(RemittanceError::NoFundsSent);
            }
            if commitment.is_zero() {
                return Err(RemittanceError::InvalidCommitment);
            }
            let now = this.clock.now();
            let expiration = expiry.resolve(
                now,
                this.config.min_expiry_days,
                this.config.max_expiry_days,
            )?;

            let transfer_id = this
                .escrow
                .open(commitment, caller, value, expiration, now)?;

            if let Err(e) = this.ledger.transfer(&caller, &this.address, value) {
                this.escrow.discard(&commitment);
                warn!(%caller, %value, error = %e, "deposit collection failed; transfer discarded");
                return Err(e.into());
            }

            this.emit(RemittanceEvent::TransferInitiated {
                transfer_id,
                sender: caller,
                amount: value,
                commitment,
                expiration,
            });
            info!(%transfer_id, sender = %caller, amount = %value, expiration, "transfer initiated");
            Ok(transfer_id)
        })
    }

    /// Claim the funds committed under the hash of `claim.secret`.
    ///
    /// Who may claim depends on the deployment's claim policy. Returns the
    /// amount paid to `caller`.
    pub fn withdraw_funds(
        &mut self,
        caller: Address,
        claim: &Claim,
    ) -> Result<Amount, RemittanceError> {
        self.lifecycle.ensure_active()?;

        self.guarded(|this| {
            if caller == this.address {
                return Err(RemittanceError::CallerNotAuthorized { caller });
            }
            let policy = this.config.claim_policy;
            if policy.requires_registration() && !this.registry.is_registered(&caller) {
                return Err(RemittanceError::CallerNotAuthorized { caller });
            }

            let commitment = this.hasher.generate_hash(&claim.secret)?;
            if !this.escrow.get(&commitment).is_some_and(PendingTransfer::is_active) {
                return Err(RemittanceError::NoFundsForCommitment);
            }

            // (consumed, next) when the shop credential was rotated
            let rotation = if policy.requires_shop_credential() {
                let proof = claim
                    .shop_proof
                    .as_ref()
                    .ok_or(RemittanceError::InvalidShopSecret)?;
                let presented = this.hasher.generate_hash(&proof.secret)?;
                let consumed =
                    this.registry
                        .verify_and_rotate(&caller, presented, proof.next_credential)?;
                Some((consumed, proof.next_credential))
            } else {
                None
            };

            let now = this.clock.now();
            let before = match this.escrow.settle_withdrawn(&commitment, caller, now) {
                Ok(before) => before,
                Err(e) => {
                    if let Some((previous, _)) = rotation {
                        this.registry.restore_credential(&caller, previous);
                    }
                    return Err(e);
                }
            };

            if let Err(e) = this.ledger.transfer(&this.address, &caller, before.amount) {
                let amount = before.amount;
                this.escrow.restore(commitment, before);
                if let Some((previous, _)) = rotation {
                    this.registry.restore_credential(&caller, previous);
                }
                warn!(%caller, %amount, error = %e, "payout failed; withdrawal rolled back");
                return Err(e.into());
            }

            if let Some((_, next)) = rotation {
                this.emit(RemittanceEvent::ExchangeShopCredentialRotated {
                    shop: caller,
                    credential: next,
                });
            }
            this.emit(RemittanceEvent::FundsWithdrawn {
                transfer_id: before.transfer_id,
                claimant: caller,
                amount: before.amount,
                commitment,
            });
            info!(
                transfer_id = %before.transfer_id,
                claimant = %caller,
                amount = %before.amount,
                "funds withdrawn"
            );
            Ok(before.amount)
        })
    }

    /// Refund an expired, unclaimed transfer to its sender.
    pub fn cancel_transfer(
        &mut self,
        caller: Address,
        commitment: Commitment,
    ) -> Result<Amount, RemittanceError> {
        self.lifecycle.ensure_active()?;

        self.guarded(|this| {
            let now = this.clock.now();
            let before = this.escrow.settle_cancelled(&commitment, &caller, now)?;

            if let Err(e) = this.ledger.transfer(&this.address, &before.sender, before.amount) {
                let amount = before.amount;
                this.escrow.restore(commitment, before);
                warn!(sender = %caller, %amount, error = %e, "refund failed; cancellation rolled back");
                return Err(e.into());
            }

            this.emit(RemittanceEvent::TransferCancelled {
                transfer_id: before.transfer_id,
                sender: before.sender,
                amount: before.amount,
                commitment,
                expiration: before.expiration,
            });
            info!(
                transfer_id = %before.transfer_id,
                sender = %before.sender,
                amount = %before.amount,
                "transfer cancelled"
            );
            Ok(before.amount)
        })
    }

    // ───────────────────────── Exchange Shops ─────────────────────────

    /// Register an exchange shop. Owner-only.
    ///
    /// `credential` is the shop's first one-time credential commitment and is
    /// mandatory under the `ShopCredential` claim policy.
    pub fn register_exchange_shop(
        &mut self,
        caller: Address,
        shop: Address,
        credential: Option<Commitment>,
    ) -> Result<(), RemittanceError> {
        self.lifecycle.ensure_active()?;
        self.ensure_owner(&caller, "register_exchange_shop")?;

        let require_credential = self.config.claim_policy.requires_shop_credential();
        self.registry.register(shop, credential, require_credential)?;

        self.emit(RemittanceEvent::ExchangeShopRegistered { shop });
        info!(%shop, "exchange shop registered");
        Ok(())
    }

    /// Remove an exchange shop. Owner-only.
    pub fn deregister_exchange_shop(
        &mut self,
        caller: Address,
        shop: Address,
    ) -> Result<(), RemittanceError> {
        self.lifecycle.ensure_active()?;
        self.ensure_owner(&caller, "deregister_exchange_shop")?;

        self.registry.deregister(&shop)?;

        self.emit(RemittanceEvent::ExchangeShopDeregistered { shop });
        info!(%shop, "exchange shop deregistered");
        Ok(())
    }

    // ───────────────────────── Lifecycle ─────────────────────────

    /// Halt money-moving and registry operations. Owner-only.
    pub fn pause(&mut self, caller: Address) -> Result<(), RemittanceError> {
        self.ensure_owner(&caller, "pause")?;
        self.lifecycle.pause()?;
        self.emit(RemittanceEvent::Paused { account: caller });
        info!(account = %caller, "contract paused");
        Ok(())
    }

    /// Resume a paused contract. Owner-only.
    pub fn unpause(&mut self, caller: Address) -> Result<(), RemittanceError> {
        self.ensure_owner(&caller, "unpause")?;
        self.lifecycle.unpause()?;
        self.emit(RemittanceEvent::Unpaused { account: caller });
        info!(account = %caller, "contract unpaused");
        Ok(())
    }

    /// Permanently stop a paused contract. Owner-only.
    pub fn kill(&mut self, caller: Address) -> Result<(), RemittanceError> {
        self.ensure_owner(&caller, "kill")?;
        self.lifecycle.kill()?;
        self.emit(RemittanceEvent::Killed { account: caller });
        warn!(account = %caller, "contract killed");
        Ok(())
    }

    /// Sweep the contract's entire balance to `recipient`. Owner-only,
    /// once, and only in the state the deployment's safeguard gate names.
    ///
    /// Escrow records are left untouched for off-chain reconciliation.
    pub fn safeguard_funds(
        &mut self,
        caller: Address,
        recipient: Address,
    ) -> Result<Amount, RemittanceError> {
        self.ensure_owner(&caller, "safeguard_funds")?;
        self.lifecycle
            .ensure_safeguardable(self.config.safeguard_gate)?;
        if recipient.is_zero() {
            return Err(RemittanceError::ZeroAddress);
        }
        if recipient == self.address {
            return Err(RemittanceError::InvalidRecipient { address: recipient });
        }

        self.guarded(|this| {
            let amount = this.ledger.balance_of(&this.address);
            let previous = this.lifecycle.clone();
            this.lifecycle.mark_safeguarded();

            if let Err(e) = this.ledger.transfer(&this.address, &recipient, amount) {
                this.lifecycle = previous;
                warn!(%recipient, %amount, error = %e, "safeguard sweep failed");
                return Err(e.into());
            }

            this.emit(RemittanceEvent::FundsSafeguarded { recipient, amount });
            warn!(%recipient, %amount, "funds safeguarded");
            Ok(amount)
        })
    }

    /// Bare invocation with no matching operation. Always rejected, with or
    /// without attached value.
    pub fn fallback(&self, caller: Address, value: Amount) -> Result<(), RemittanceError> {
        warn!(%caller, %value, "fallback invocation rejected");
        Err(RemittanceError::UnsupportedOperation {
            function: "fallback".to_string(),
        })
    }

    // ───────────────────────── Queries ─────────────────────────

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access_control.owner()
    }

    pub fn config(&self) -> &RemittanceConfig {
        &self.config
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn funds_safeguarded(&self) -> bool {
        self.lifecycle.funds_safeguarded()
    }

    pub fn pending_transfer(&self, commitment: &Commitment) -> Option<&PendingTransfer> {
        self.escrow.get(commitment)
    }

    pub fn is_exchange_shop(&self, shop: &Address) -> bool {
        self.registry.is_registered(shop)
    }

    pub fn registry(&self) -> &ExchangeShopRegistry {
        &self.registry
    }

    pub fn num_transactions(&self) -> u64 {
        self.escrow.num_transactions()
    }

    /// Native-currency balance held by the contract.
    pub fn contract_balance(&self) -> Amount {
        self.ledger.balance_of(&self.address)
    }

    /// Sum of all active escrowed amounts.
    pub fn escrowed_total(&self) -> Result<Amount, RemittanceError> {
        self.escrow.escrowed_total()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ───────────────────────── Events ─────────────────────────

    pub fn events(&self) -> &[EventEnvelope] {
        self.events.entries()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn subscribe(&mut self) -> Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    // ───────────────────────── Internal Guards ─────────────────────────

    fn ensure_owner(&self, caller: &Address, operation: &str) -> Result<(), RemittanceError> {
        self.access_control.ensure_owner(caller).inspect_err(|_| {
            warn!(%caller, operation, "owner-only operation rejected");
        })
    }

    /// Run `op` holding the reentrancy guard. The token releases the guard
    /// on every exit path, unwinding included.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, RemittanceError>,
    ) -> Result<T, RemittanceError> {
        let _token = self
            .reentrancy_guard
            .enter()
            .ok_or(RemittanceError::Reentrancy)?;
        op(self)
    }

    fn emit(&mut self, payload: RemittanceEvent) {
        let now = self.clock.now();
        self.events.append(self.address, now, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ClaimPolicy, SafeguardGate};
    use crate::errors::{ErrorKind, LedgerError};
    use crate::escrow::TransferStatus;
    use crate::ledger::InMemoryLedger;
    use types::numeric::SECONDS_PER_DAY;

    const NOW: u64 = 1_700_000_000;

    fn contract_addr() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn carol() -> Address {
        Address::repeat_byte(0xca)
    }

    fn mallory() -> Address {
        Address::repeat_byte(0x66)
    }

    fn deploy(config: RemittanceConfig) -> (Remittance<InMemoryLedger, ManualClock>, ManualClock) {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(alice(), Amount::from(10_000u64)).unwrap();
        let clock = ManualClock::new(NOW);
        let contract =
            Remittance::new(contract_addr(), owner(), config, ledger, clock.clone()).unwrap();
        (contract, clock)
    }

    fn funded(
        config: RemittanceConfig,
    ) -> (Remittance<InMemoryLedger, ManualClock>, ManualClock, Commitment) {
        let (mut c, clock) = deploy(config);
        let commitment = c.generate_hash(b"w5S2hsdN").unwrap();
        c.initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(2500u64))
            .unwrap();
        (c, clock, commitment)
    }

    #[test]
    fn test_deploy_rejects_zero_addresses() {
        let clock = ManualClock::new(NOW);
        let err = Remittance::new(
            Address::ZERO,
            owner(),
            RemittanceConfig::default(),
            InMemoryLedger::new(),
            clock.clone(),
        )
        .unwrap_err();
        assert_eq!(err, RemittanceError::ZeroAddress);

        let err = Remittance::new(
            contract_addr(),
            Address::ZERO,
            RemittanceConfig::default(),
            InMemoryLedger::new(),
            clock,
        )
        .unwrap_err();
        assert_eq!(err, RemittanceError::ZeroAddress);
    }

    #[test]
    fn test_deploy_rejects_bad_config() {
        let config = RemittanceConfig {
            min_expiry_days: 5,
            max_expiry_days: 2,
            ..RemittanceConfig::default()
        };
        let err = Remittance::new(
            contract_addr(),
            owner(),
            config,
            InMemoryLedger::new(),
            ManualClock::new(NOW),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_initiate_locks_funds() {
        let (c, _, commitment) = funded(RemittanceConfig::default());
        let record = c.pending_transfer(&commitment).unwrap();
        assert_eq!(record.sender, alice());
        assert_eq!(record.amount, Amount::from(2500u64));
        assert_eq!(record.expiration, NOW + SECONDS_PER_DAY);
        assert_eq!(c.contract_balance(), Amount::from(2500u64));
        assert_eq!(c.ledger().balance_of(&alice()), Amount::from(7500u64));
        assert_eq!(c.num_transactions(), 1);
        assert_eq!(c.events()[0].payload_type(), "TransferInitiated");
    }

    #[test]
    fn test_initiate_without_value() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        let commitment = c.generate_hash(b"pw").unwrap();
        assert_eq!(
            c.initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::ZERO),
            Err(RemittanceError::NoFundsSent)
        );
        assert_eq!(c.num_transactions(), 0);
    }

    #[test]
    fn test_initiate_duplicate_commitment() {
        let (mut c, _, commitment) = funded(RemittanceConfig::default());
        assert_eq!(
            c.initiate_transfer(alice(), commitment, ExpiryInput::Days(2), Amount::from(1u64)),
            Err(RemittanceError::CommitmentAlreadyUsed)
        );
        assert_eq!(c.contract_balance(), Amount::from(2500u64));
    }

    #[test]
    fn test_initiate_expiry_out_of_window() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        let commitment = c.generate_hash(b"pw").unwrap();
        let err = c
            .initiate_transfer(alice(), commitment, ExpiryInput::Days(15), Amount::from(1u64))
            .unwrap_err();
        assert!(matches!(err, RemittanceError::InvalidExpiryRange { days: 15, .. }));

        let err = c
            .initiate_transfer(alice(), commitment, ExpiryInput::At(NOW), Amount::from(1u64))
            .unwrap_err();
        assert!(matches!(err, RemittanceError::ExpirationNotInFuture { .. }));
    }

    #[test]
    fn test_initiate_insufficient_balance_rolls_back() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        let commitment = c.generate_hash(b"pw").unwrap();
        let err = c
            .initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(50_000u64))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert!(c.pending_transfer(&commitment).is_none());
        assert_eq!(c.num_transactions(), 0);
        assert!(c.events().is_empty());
    }

    #[test]
    fn test_withdraw_by_registered_shop() {
        let (mut c, _, commitment) = funded(RemittanceConfig::default());
        c.register_exchange_shop(owner(), carol(), None).unwrap();

        let paid = c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")).unwrap();
        assert_eq!(paid, Amount::from(2500u64));
        assert_eq!(c.ledger().balance_of(&carol()), Amount::from(2500u64));
        assert_eq!(c.contract_balance(), Amount::ZERO);

        let record = c.pending_transfer(&commitment).unwrap();
        assert!(!record.is_active());
        assert!(matches!(
            record.status,
            TransferStatus::Withdrawn { claimant, .. } if claimant == carol()
        ));

        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")),
            Err(RemittanceError::NoFundsForCommitment)
        );
    }

    #[test]
    fn test_withdraw_by_unregistered_caller() {
        let (mut c, _, _) = funded(RemittanceConfig::default());
        assert_eq!(
            c.withdraw_funds(mallory(), &Claim::new("w5S2hsdN")),
            Err(RemittanceError::CallerNotAuthorized { caller: mallory() })
        );
        assert_eq!(c.contract_balance(), Amount::from(2500u64));
    }

    #[test]
    fn test_withdraw_open_claim() {
        let config = RemittanceConfig::default().with_claim_policy(ClaimPolicy::OpenClaim);
        let (mut c, _, _) = funded(config);
        let paid = c.withdraw_funds(mallory(), &Claim::new("w5S2hsdN")).unwrap();
        assert_eq!(paid, Amount::from(2500u64));
    }

    #[test]
    fn test_withdraw_wrong_secret() {
        let (mut c, _, _) = funded(RemittanceConfig::default());
        c.register_exchange_shop(owner(), carol(), None).unwrap();
        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("guess")),
            Err(RemittanceError::NoFundsForCommitment)
        );
        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("  ")),
            Err(RemittanceError::InvalidInput)
        );
    }

    #[test]
    fn test_withdraw_after_expiry_still_allowed() {
        let (mut c, clock, _) = funded(RemittanceConfig::default());
        c.register_exchange_shop(owner(), carol(), None).unwrap();
        clock.advance(30 * SECONDS_PER_DAY);
        assert!(c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")).is_ok());
    }

    #[test]
    fn test_withdraw_payout_rejected_rolls_back() {
        let (mut c, _, commitment) = funded(RemittanceConfig::default());
        c.register_exchange_shop(owner(), carol(), None).unwrap();
        c.ledger_mut().reject_incoming(carol());
        let events_before = c.events().len();

        let err = c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert!(c.pending_transfer(&commitment).unwrap().is_active());
        assert_eq!(c.contract_balance(), Amount::from(2500u64));
        assert_eq!(c.events().len(), events_before);

        c.ledger_mut().accept_incoming(&carol());
        assert!(c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")).is_ok());
    }

    #[test]
    fn test_withdraw_with_shop_credential() {
        let config = RemittanceConfig::default().with_claim_policy(ClaimPolicy::ShopCredential);
        let (mut c, _, _) = funded(config);
        let first = c.generate_hash(b"shop-1").unwrap();
        let second = c.generate_hash(b"shop-2").unwrap();
        c.register_exchange_shop(owner(), carol(), Some(first)).unwrap();

        // Missing proof
        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")),
            Err(RemittanceError::InvalidShopSecret)
        );

        let claim = Claim::new("w5S2hsdN").with_shop_proof("shop-1", second);
        assert_eq!(c.withdraw_funds(carol(), &claim).unwrap(), Amount::from(2500u64));
        assert_eq!(c.registry().entry(&carol()).unwrap().credential, Some(second));

        let kinds: Vec<_> = c.events().iter().map(|e| e.payload_type()).collect();
        assert_eq!(
            &kinds[kinds.len() - 2..],
            &["ExchangeShopCredentialRotated", "FundsWithdrawn"]
        );
    }

    #[test]
    fn test_shop_credential_replay_rejected() {
        let config = RemittanceConfig::default().with_claim_policy(ClaimPolicy::ShopCredential);
        let (mut c, _) = deploy(config);
        let first = c.generate_hash(b"shop-1").unwrap();
        let second = c.generate_hash(b"shop-2").unwrap();
        let third = c.generate_hash(b"shop-3").unwrap();
        c.register_exchange_shop(owner(), carol(), Some(first)).unwrap();

        for pw in ["a", "b"] {
            let commitment = c.generate_hash(pw.as_bytes()).unwrap();
            c.initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(10u64))
                .unwrap();
        }

        c.withdraw_funds(carol(), &Claim::new("a").with_shop_proof("shop-1", second))
            .unwrap();
        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("b").with_shop_proof("shop-1", third)),
            Err(RemittanceError::ShopCredentialAlreadyUsed)
        );
    }

    #[test]
    fn test_failed_payout_restores_shop_credential() {
        let config = RemittanceConfig::default().with_claim_policy(ClaimPolicy::ShopCredential);
        let (mut c, _, _) = funded(config);
        let first = c.generate_hash(b"shop-1").unwrap();
        let second = c.generate_hash(b"shop-2").unwrap();
        c.register_exchange_shop(owner(), carol(), Some(first)).unwrap();
        c.ledger_mut().reject_incoming(carol());

        let claim = Claim::new("w5S2hsdN").with_shop_proof("shop-1", second);
        assert!(c.withdraw_funds(carol(), &claim).is_err());
        let entry = c.registry().entry(&carol()).unwrap();
        assert_eq!(entry.credential, Some(first));
        assert!(!entry.is_retired(&first));
    }

    #[test]
    fn test_cancel_after_expiry() {
        let (mut c, clock, commitment) = funded(RemittanceConfig::default());
        assert_eq!(
            c.cancel_transfer(alice(), commitment),
            Err(RemittanceError::NotYetExpired {
                expiration: NOW + SECONDS_PER_DAY
            })
        );

        clock.advance(SECONDS_PER_DAY + 1);
        assert_eq!(
            c.cancel_transfer(mallory(), commitment),
            Err(RemittanceError::CallerNotAuthorized { caller: mallory() })
        );
        assert_eq!(c.cancel_transfer(alice(), commitment).unwrap(), Amount::from(2500u64));
        assert_eq!(c.ledger().balance_of(&alice()), Amount::from(10_000u64));
        assert_eq!(
            c.cancel_transfer(alice(), commitment),
            Err(RemittanceError::InvalidOrAlreadySettled)
        );
    }

    #[test]
    fn test_cancel_unknown_commitment() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        assert_eq!(
            c.cancel_transfer(alice(), Commitment::from_bytes([7; 32])),
            Err(RemittanceError::InvalidOrAlreadySettled)
        );
    }

    #[test]
    fn test_registry_owner_only() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        assert_eq!(
            c.register_exchange_shop(mallory(), carol(), None),
            Err(RemittanceError::Unauthorized)
        );
        c.register_exchange_shop(owner(), carol(), None).unwrap();
        assert!(c.is_exchange_shop(&carol()));
        assert_eq!(
            c.deregister_exchange_shop(mallory(), carol()),
            Err(RemittanceError::Unauthorized)
        );
        c.deregister_exchange_shop(owner(), carol()).unwrap();
        assert!(!c.is_exchange_shop(&carol()));
    }

    #[test]
    fn test_pause_blocks_operations() {
        let (mut c, _, commitment) = funded(RemittanceConfig::default());
        c.register_exchange_shop(owner(), carol(), None).unwrap();
        c.pause(owner()).unwrap();

        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")),
            Err(RemittanceError::ContractPaused)
        );
        assert_eq!(
            c.cancel_transfer(alice(), commitment),
            Err(RemittanceError::ContractPaused)
        );
        assert_eq!(
            c.register_exchange_shop(owner(), mallory(), None),
            Err(RemittanceError::ContractPaused)
        );
        // Hashing is a pure query and stays available
        assert!(c.generate_hash(b"x").is_ok());

        c.unpause(owner()).unwrap();
        assert!(c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")).is_ok());
    }

    #[test]
    fn test_lifecycle_owner_only_and_ordering() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        assert_eq!(c.pause(mallory()), Err(RemittanceError::Unauthorized));
        assert_eq!(c.kill(owner()), Err(RemittanceError::NotPaused));
        assert_eq!(c.unpause(owner()), Err(RemittanceError::NotPaused));
        c.pause(owner()).unwrap();
        assert_eq!(c.pause(owner()), Err(RemittanceError::AlreadyPaused));
        c.kill(owner()).unwrap();
        assert_eq!(c.lifecycle_state(), LifecycleState::Killed);
        assert_eq!(c.unpause(owner()), Err(RemittanceError::ContractKilled));
        assert_eq!(c.pause(owner()), Err(RemittanceError::ContractKilled));
    }

    #[test]
    fn test_safeguard_sweeps_balance_once() {
        let (mut c, _, commitment) = funded(RemittanceConfig::default());
        let vault = Address::repeat_byte(0x5a);

        assert_eq!(
            c.safeguard_funds(owner(), vault),
            Err(RemittanceError::NotInSafeguardableState)
        );
        c.pause(owner()).unwrap();
        c.kill(owner()).unwrap();
        assert_eq!(
            c.safeguard_funds(mallory(), vault),
            Err(RemittanceError::Unauthorized)
        );
        assert_eq!(
            c.safeguard_funds(owner(), Address::ZERO),
            Err(RemittanceError::ZeroAddress)
        );

        assert_eq!(c.safeguard_funds(owner(), vault).unwrap(), Amount::from(2500u64));
        assert!(c.funds_safeguarded());
        assert_eq!(c.ledger().balance_of(&vault), Amount::from(2500u64));
        assert_eq!(c.contract_balance(), Amount::ZERO);
        // Records stay for reconciliation
        assert!(c.pending_transfer(&commitment).unwrap().is_active());

        assert_eq!(
            c.safeguard_funds(owner(), vault),
            Err(RemittanceError::NotInSafeguardableState)
        );
    }

    #[test]
    fn test_safeguard_when_paused_gate() {
        let config = RemittanceConfig::default().with_safeguard_gate(SafeguardGate::WhenPaused);
        let (mut c, _, _) = funded(config);
        let vault = Address::repeat_byte(0x5a);
        c.pause(owner()).unwrap();
        c.safeguard_funds(owner(), vault).unwrap();
        assert_eq!(c.lifecycle_state(), LifecycleState::Killed);
    }

    #[test]
    fn test_safeguard_failure_keeps_lifecycle() {
        let (mut c, _, _) = funded(RemittanceConfig::default());
        let vault = Address::repeat_byte(0x5a);
        c.pause(owner()).unwrap();
        c.kill(owner()).unwrap();
        c.ledger_mut().reject_incoming(vault);

        let err = c.safeguard_funds(owner(), vault).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert!(!c.funds_safeguarded());
        assert_eq!(c.contract_balance(), Amount::from(2500u64));
    }

    #[test]
    fn test_fallback_always_rejected() {
        let (c, _) = deploy(RemittanceConfig::default());
        assert_eq!(
            c.fallback(alice(), Amount::from(1u64)),
            Err(RemittanceError::UnsupportedOperation {
                function: "fallback".to_string()
            })
        );
    }

    #[test]
    fn test_contract_cannot_fund_itself() {
        let (mut c, _, _) = funded(RemittanceConfig::default());
        let phantom = c.generate_hash(b"phantom").unwrap();
        assert_eq!(
            c.initiate_transfer(
                contract_addr(),
                phantom,
                ExpiryInput::Days(1),
                Amount::from(2500u64)
            ),
            Err(RemittanceError::CallerNotAuthorized {
                caller: contract_addr()
            })
        );
        assert!(c.pending_transfer(&phantom).is_none());
        assert_eq!(c.num_transactions(), 1);
        assert_eq!(c.contract_balance(), c.escrowed_total().unwrap());
    }

    #[test]
    fn test_contract_cannot_claim_for_itself() {
        let config = RemittanceConfig::default().with_claim_policy(ClaimPolicy::OpenClaim);
        let (mut c, _, commitment) = funded(config);
        assert_eq!(
            c.withdraw_funds(contract_addr(), &Claim::new("w5S2hsdN")),
            Err(RemittanceError::CallerNotAuthorized {
                caller: contract_addr()
            })
        );
        assert!(c.pending_transfer(&commitment).unwrap().is_active());
        assert_eq!(c.contract_balance(), c.escrowed_total().unwrap());

        // The legitimate claimant is unaffected
        assert_eq!(
            c.withdraw_funds(carol(), &Claim::new("w5S2hsdN")).unwrap(),
            Amount::from(2500u64)
        );
    }

    #[test]
    fn test_safeguard_rejects_contract_as_recipient() {
        let (mut c, _, _) = funded(RemittanceConfig::default());
        c.pause(owner()).unwrap();
        c.kill(owner()).unwrap();

        assert_eq!(
            c.safeguard_funds(owner(), contract_addr()),
            Err(RemittanceError::InvalidRecipient {
                address: contract_addr()
            })
        );
        assert!(!c.funds_safeguarded());
        assert!(c.events().iter().all(|e| e.payload_type() != "FundsSafeguarded"));

        let vault = Address::repeat_byte(0x5a);
        assert_eq!(c.safeguard_funds(owner(), vault).unwrap(), Amount::from(2500u64));
        assert_eq!(c.contract_balance(), Amount::ZERO);
    }

    #[test]
    fn test_nested_entry_rejected() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        let commitment = c.generate_hash(b"pw").unwrap();
        let held = c.reentrancy_guard.enter().unwrap();
        assert_eq!(
            c.initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(1u64)),
            Err(RemittanceError::Reentrancy)
        );
        drop(held);
        assert!(c
            .initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(1u64))
            .is_ok());
    }

    /// Ledger whose payouts from the contract can be made to panic.
    #[derive(Debug, Default)]
    struct PanickingLedger {
        inner: InMemoryLedger,
        panic_on_payout: bool,
    }

    impl Ledger for PanickingLedger {
        fn balance_of(&self, account: &Address) -> Amount {
            self.inner.balance_of(account)
        }

        fn transfer(
            &mut self,
            from: &Address,
            to: &Address,
            amount: Amount,
        ) -> Result<(), LedgerError> {
            if self.panic_on_payout && *from == contract_addr() {
                panic!("ledger backend crashed");
            }
            self.inner.transfer(from, to, amount)
        }
    }

    #[test]
    fn test_guard_released_after_ledger_panic() {
        let mut ledger = PanickingLedger::default();
        ledger.inner.mint(alice(), Amount::from(1_000u64)).unwrap();
        let config = RemittanceConfig::default().with_claim_policy(ClaimPolicy::OpenClaim);
        let mut c = Remittance::new(
            contract_addr(),
            owner(),
            config,
            ledger,
            ManualClock::new(NOW),
        )
        .unwrap();
        let commitment = c.generate_hash(b"pw").unwrap();
        c.initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(10u64))
            .unwrap();

        c.ledger_mut().panic_on_payout = true;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            c.withdraw_funds(carol(), &Claim::new("pw"))
        }));
        assert!(result.is_err());
        assert!(!c.reentrancy_guard.is_locked());

        c.ledger_mut().panic_on_payout = false;
        let next = c.generate_hash(b"next").unwrap();
        assert!(c
            .initiate_transfer(alice(), next, ExpiryInput::Days(1), Amount::from(10u64))
            .is_ok());
    }

    #[test]
    fn test_guard_released_after_error() {
        let (mut c, _) = deploy(RemittanceConfig::default());
        let commitment = c.generate_hash(b"pw").unwrap();
        assert!(c
            .initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::ZERO)
            .is_err());
        assert!(!c.reentrancy_guard.is_locked());
        assert!(c
            .initiate_transfer(alice(), commitment, ExpiryInput::Days(1), Amount::from(1u64))
            .is_ok());
    }

    #[test]
    fn test_events_are_stamped_with_block_time() {
        let (mut c, clock) = deploy(RemittanceConfig::default());
        clock.advance(42);
        c.pause(owner()).unwrap();
        let event = &c.events()[0];
        assert_eq!(event.timestamp, NOW + 42);
        assert_eq!(event.contract, contract_addr());
        assert_eq!(event.sequence, 1);
    }
}
