//! Call dispatch
//!
//! The hosting environment submits calls as a function name, positional
//! arguments as JSON, a caller identity and optional attached value. This
//! module maps them onto contract operations and returns a receipt with the
//! outcome and the events that call emitted.
//!
//! `RemittanceService` wraps the contract in a single mutex so each call is
//! one critical section: check-then-act sequences never interleave.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use types::ids::Address;
use types::numeric::Amount;

use crate::clock::Clock;
use crate::commitment::Commitment;
use crate::contract::{Claim, Remittance};
use crate::errors::{ErrorKind, RemittanceError};
use crate::escrow::ExpiryInput;
use crate::events::EventEnvelope;
use crate::ledger::Ledger;

/// A call as submitted by the transaction layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Operation name, e.g. `initiateTransfer`. Empty for a bare call.
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub args: Value,
    pub caller: Address,
    /// Native currency attached to the call
    #[serde(default)]
    pub value: Amount,
}

impl CallRequest {
    pub fn new(function: impl Into<String>, caller: Address, args: Value) -> Self {
        Self {
            function: function.into(),
            args,
            caller,
            value: Amount::ZERO,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    /// Return value of the operation; `null` for operations returning nothing
    pub output: Value,
    /// Stable reason string on failure
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Events emitted by this call, in order
    pub events: Vec<EventEnvelope>,
}

impl Receipt {
    fn ok(output: Value, events: Vec<EventEnvelope>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            error_kind: None,
            events,
        }
    }

    fn failed(err: &RemittanceError) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GenerateHashArgs {
    secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RegisterShopArgs {
    shop: Address,
    #[serde(default)]
    credential: Option<Commitment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ShopArgs {
    shop: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct InitiateArgs {
    commitment: Commitment,
    expiry: ExpiryInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WithdrawArgs {
    secret: String,
    #[serde(default)]
    shop_secret: Option<String>,
    #[serde(default)]
    next_shop_credential: Option<Commitment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CommitmentArgs {
    commitment: Commitment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecipientArgs {
    recipient: Address,
}

#[derive(Debug)]
enum Operation {
    GenerateHash(GenerateHashArgs),
    RegisterExchangeShop(RegisterShopArgs),
    DeregisterExchangeShop(ShopArgs),
    InitiateTransfer(InitiateArgs),
    WithdrawFunds(WithdrawArgs),
    CancelTransfer(CommitmentArgs),
    Pause,
    Unpause,
    Kill,
    SafeguardFunds(RecipientArgs),
}

impl Operation {
    fn parse(function: &str, args: Value) -> Result<Self, RemittanceError> {
        Ok(match function {
            "generateHash" => Operation::GenerateHash(parse_args(function, args)?),
            "registerExchangeShop" => Operation::RegisterExchangeShop(parse_args(function, args)?),
            "deregisterExchangeShop" => {
                Operation::DeregisterExchangeShop(parse_args(function, args)?)
            }
            "initiateTransfer" => Operation::InitiateTransfer(parse_args(function, args)?),
            "withdrawFunds" => Operation::WithdrawFunds(parse_args(function, args)?),
            "cancelTransfer" => Operation::CancelTransfer(parse_args(function, args)?),
            "pause" => Operation::Pause,
            "unpause" => Operation::Unpause,
            "kill" => Operation::Kill,
            "safeguardFunds" => Operation::SafeguardFunds(parse_args(function, args)?),
            other => {
                return Err(RemittanceError::UnsupportedOperation {
                    function: other.to_string(),
                })
            }
        })
    }

    fn is_payable(&self) -> bool {
        matches!(self, Operation::InitiateTransfer(_))
    }
}

fn parse_args<T: DeserializeOwned>(function: &str, args: Value) -> Result<T, RemittanceError> {
    serde_json::from_value(args).map_err(|e| RemittanceError::InvalidArguments {
        function: function.to_string(),
        reason: e.to_string(),
    })
}

fn to_output<T: Serialize>(function: &str, value: T) -> Result<Value, RemittanceError> {
    serde_json::to_value(value).map_err(|e| RemittanceError::InvalidArguments {
        function: function.to_string(),
        reason: format!("unserializable output: {e}"),
    })
}

/// Execute one request against `contract`.
pub fn dispatch<L: Ledger, C: Clock>(
    contract: &mut Remittance<L, C>,
    request: CallRequest,
) -> Receipt {
    let since = contract.event_log().last_sequence();
    match execute(contract, request) {
        Ok(output) => {
            let events = contract.event_log().since(since).to_vec();
            Receipt::ok(output, events)
        }
        Err(e) => Receipt::failed(&e),
    }
}

fn execute<L: Ledger, C: Clock>(
    contract: &mut Remittance<L, C>,
    request: CallRequest,
) -> Result<Value, RemittanceError> {
    let CallRequest {
        function,
        args,
        caller,
        value,
    } = request;

    if function.is_empty() {
        contract.fallback(caller, value)?;
    }

    let operation = Operation::parse(&function, args)?;
    if !value.is_zero() && !operation.is_payable() {
        return Err(RemittanceError::UnsupportedOperation { function });
    }
    debug!(%caller, function = %function, %value, "dispatching call");

    let output = match operation {
        Operation::GenerateHash(a) => {
            to_output(&function, contract.generate_hash(a.secret.as_bytes())?)?
        }
        Operation::RegisterExchangeShop(a) => {
            contract.register_exchange_shop(caller, a.shop, a.credential)?;
            Value::Null
        }
        Operation::DeregisterExchangeShop(a) => {
            contract.deregister_exchange_shop(caller, a.shop)?;
            Value::Null
        }
        Operation::InitiateTransfer(a) => {
            let id = contract.initiate_transfer(caller, a.commitment, a.expiry, value)?;
            to_output(&function, id)?
        }
        Operation::WithdrawFunds(a) => {
            let mut claim = Claim::new(a.secret.into_bytes());
            match (a.shop_secret, a.next_shop_credential) {
                (Some(shop_secret), Some(next)) => {
                    claim = claim.with_shop_proof(shop_secret.into_bytes(), next);
                }
                (None, None) => {}
                _ => {
                    return Err(RemittanceError::InvalidArguments {
                        function,
                        reason: "shopSecret and nextShopCredential go together".to_string(),
                    })
                }
            }
            to_output(&function, contract.withdraw_funds(caller, &claim)?)?
        }
        Operation::CancelTransfer(a) => {
            to_output(&function, contract.cancel_transfer(caller, a.commitment)?)?
        }
        Operation::Pause => {
            contract.pause(caller)?;
            Value::Null
        }
        Operation::Unpause => {
            contract.unpause(caller)?;
            Value::Null
        }
        Operation::Kill => {
            contract.kill(caller)?;
            Value::Null
        }
        Operation::SafeguardFunds(a) => {
            to_output(&function, contract.safeguard_funds(caller, a.recipient)?)?
        }
    };
    Ok(output)
}

/// Thread-safe front for a deployed contract.
#[derive(Debug)]
pub struct RemittanceService<L: Ledger, C: Clock> {
    contract: Mutex<Remittance<L, C>>,
}

impl<L: Ledger, C: Clock> RemittanceService<L, C> {
    pub fn new(contract: Remittance<L, C>) -> Self {
        Self {
            contract: Mutex::new(contract),
        }
    }

    /// Run one call inside the critical section.
    ///
    /// Once a call has panicked the contract may hold a half-applied
    /// operation (e.g. a record settled without its payout), so every later
    /// call fails with `ServiceUnavailable` until an operator takes over.
    pub fn execute(&self, request: CallRequest) -> Receipt {
        match self.contract.lock() {
            Ok(mut contract) => dispatch(&mut contract, request),
            Err(_) => {
                warn!(
                    function = %request.function,
                    "call rejected: service poisoned by an earlier panic"
                );
                Receipt::failed(&RemittanceError::ServiceUnavailable)
            }
        }
    }

    /// Whether a call has panicked inside the critical section.
    pub fn is_poisoned(&self) -> bool {
        self.contract.is_poisoned()
    }

    /// Decode a JSON-encoded `CallRequest` and run it.
    pub fn execute_json(&self, request: &str) -> Receipt {
        match serde_json::from_str::<CallRequest>(request) {
            Ok(request) => self.execute(request),
            Err(e) => Receipt::failed(&RemittanceError::InvalidArguments {
                function: "request".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Read contract state under the lock. Poisoned state is still handed
    /// out so an operator can reconcile it.
    pub fn read<R>(&self, f: impl FnOnce(&Remittance<L, C>) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate collaborator state (e.g. the ledger) under the lock.
    pub fn with_contract<R>(&self, f: impl FnOnce(&mut Remittance<L, C>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn subscribe(&self) -> Receiver<EventEnvelope> {
        self.lock().subscribe()
    }

    pub fn into_inner(self) -> Remittance<L, C> {
        self.contract
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Remittance<L, C>> {
        self.contract.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
