//! Contract events
//!
//! Events are immutable records emitted by successful operations. They are
//! the only audit trail off-chain reconciliation sees, so the log is
//! append-only and subscribers receive every envelope without acknowledging.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;
use types::ids::{Address, TransferId};
use types::numeric::{Amount, Timestamp};
use uuid::Uuid;

use crate::commitment::Commitment;

/// Event-specific payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum RemittanceEvent {
    TransferInitiated {
        transfer_id: TransferId,
        sender: Address,
        amount: Amount,
        commitment: Commitment,
        expiration: Timestamp,
    },
    FundsWithdrawn {
        transfer_id: TransferId,
        claimant: Address,
        amount: Amount,
        commitment: Commitment,
    },
    TransferCancelled {
        transfer_id: TransferId,
        sender: Address,
        amount: Amount,
        commitment: Commitment,
        expiration: Timestamp,
    },
    ExchangeShopRegistered {
        shop: Address,
    },
    ExchangeShopDeregistered {
        shop: Address,
    },
    ExchangeShopCredentialRotated {
        shop: Address,
        credential: Commitment,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
    Killed {
        account: Address,
    },
    FundsSafeguarded {
        recipient: Address,
        amount: Amount,
    },
}

impl RemittanceEvent {
    /// Variant name, as written in the `event_type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            RemittanceEvent::TransferInitiated { .. } => "TransferInitiated",
            RemittanceEvent::FundsWithdrawn { .. } => "FundsWithdrawn",
            RemittanceEvent::TransferCancelled { .. } => "TransferCancelled",
            RemittanceEvent::ExchangeShopRegistered { .. } => "ExchangeShopRegistered",
            RemittanceEvent::ExchangeShopDeregistered { .. } => "ExchangeShopDeregistered",
            RemittanceEvent::ExchangeShopCredentialRotated { .. } => {
                "ExchangeShopCredentialRotated"
            }
            RemittanceEvent::Paused { .. } => "Paused",
            RemittanceEvent::Unpaused { .. } => "Unpaused",
            RemittanceEvent::Killed { .. } => "Killed",
            RemittanceEvent::FundsSafeguarded { .. } => "FundsSafeguarded",
        }
    }
}

/// Envelope around every emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUID v7)
    pub event_id: Uuid,
    /// Monotonic position in the contract's log, starting at 1
    pub sequence: u64,
    /// Block time at emission
    pub timestamp: Timestamp,
    /// Emitting contract
    pub contract: Address,
    pub payload: RemittanceEvent,
}

impl EventEnvelope {
    pub fn payload_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Append-only event log with fan-out to subscribers.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<EventEnvelope>,
    subscribers: Vec<Sender<EventEnvelope>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and notify subscribers. Disconnected subscribers
    /// are dropped.
    pub fn append(
        &mut self,
        contract: Address,
        timestamp: Timestamp,
        payload: RemittanceEvent,
    ) -> EventEnvelope {
        let envelope = EventEnvelope {
            event_id: Uuid::now_v7(),
            sequence: self.entries.len() as u64 + 1,
            timestamp,
            contract,
            payload,
        };
        self.entries.push(envelope.clone());

        let before = self.subscribers.len();
        self.subscribers
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        if self.subscribers.len() < before {
            debug!(
                dropped = before - self.subscribers.len(),
                "dropped disconnected event subscribers"
            );
        }
        debug!(sequence = envelope.sequence, payload = ?envelope.payload, "event emitted");
        envelope
    }

    /// Subscribe to events appended from now on.
    pub fn subscribe(&mut self) -> Receiver<EventEnvelope> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn entries(&self) -> &[EventEnvelope] {
        &self.entries
    }

    /// Events with a sequence number greater than `sequence`.
    pub fn since(&self, sequence: u64) -> &[EventEnvelope] {
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        &self.entries[start..]
    }

    pub fn last_sequence(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
