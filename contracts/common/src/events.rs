//! Ledger Events
//!
//! Every committed state change appends one event. Failed operations emit
//! nothing. Events are CBOR-encoded for storage or shipping to indexers.

use borsh::{BorshDeserialize, BorshSerialize};
use casper_types::U256;
use serde::{Deserialize, Serialize};

use crate::types::{Address, AssetId, Timestamp};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Vault Events (0x01 - 0x1F)
    VaultUpdated = 0x01,
    VaultClosed = 0x02,
    CollateralDeposited = 0x03,
    CollateralWithdrawn = 0x04,
    VaultConfiscated = 0x05,

    // Supply Events (0x20 - 0x3F)
    Accrued = 0x20,
    UnbackedDebtSettled = 0x21,

    // Currency Events (0x40 - 0x5F)
    CurrencyMoved = 0x40,
    CurrencyExternalized = 0x41,
    CurrencyInternalized = 0x42,

    // Governance Events (0x60 - 0x7F)
    AssetInitialized = 0x60,
    AssetUpdated = 0x61,
    InterestPolicyChanged = 0x62,

    // Bridge Events (0x80 - 0x9F)
    TransferSubmitted = 0x80,
    TransferDispatched = 0x81,
    TransferConfirmed = 0x82,
    TransferCancelled = 0x83,
}

/// Main event enum containing all ledger events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    // ============ Vault Events ============

    /// Emitted by `open_or_update` with the deltas and resulting balances
    VaultUpdated {
        owner: Address,
        asset: AssetId,
        collateral_delta: i128,
        debt_delta: i128,
        equity_delta: i128,
        collateral: U256,
        normalized_debt: U256,
        normalized_equity: U256,
        at: Timestamp,
    },

    VaultClosed {
        owner: Address,
        asset: AssetId,
        at: Timestamp,
    },

    CollateralDeposited {
        owner: Address,
        asset: AssetId,
        amount: U256,
        at: Timestamp,
    },

    CollateralWithdrawn {
        owner: Address,
        asset: AssetId,
        amount: U256,
        at: Timestamp,
    },

    /// Emitted when an unsafe vault is seized
    VaultConfiscated {
        owner: Address,
        asset: AssetId,
        keeper: Address,
        collateral_seized: U256,
        keeper_share: U256,
        debt_value: U256,
        equity_value: U256,
        at: Timestamp,
    },

    // ============ Supply Events ============

    Accrued {
        asset: AssetId,
        debt_accumulator: U256,
        equity_accumulator: U256,
        reserve_credit: U256,
        at: Timestamp,
    },

    UnbackedDebtSettled {
        amount: U256,
        remaining: U256,
        at: Timestamp,
    },

    // ============ Currency Events ============

    CurrencyMoved {
        from: Address,
        to: Address,
        amount: U256,
        at: Timestamp,
    },

    /// Ledger currency left as external token
    CurrencyExternalized {
        owner: Address,
        amount: U256,
        at: Timestamp,
    },

    /// External token came back as ledger currency
    CurrencyInternalized {
        owner: Address,
        amount: U256,
        at: Timestamp,
    },

    // ============ Governance Events ============

    AssetInitialized {
        asset: AssetId,
        version: u64,
        at: Timestamp,
    },

    AssetUpdated {
        asset: AssetId,
        version: u64,
        at: Timestamp,
    },

    InterestPolicyChanged {
        asset: AssetId,
        debt_rate_per_second: U256,
        protocol_fee_bps: u64,
        at: Timestamp,
    },

    // ============ Bridge Events ============

    TransferSubmitted {
        key: [u8; 32],
        sender: Address,
        destination: String,
        amount: u128,
        nonce: u64,
        at: Timestamp,
    },

    TransferDispatched {
        key: [u8; 32],
        at: Timestamp,
    },

    TransferConfirmed {
        key: [u8; 32],
        external_tx_id: String,
        at: Timestamp,
    },

    TransferCancelled {
        key: [u8; 32],
        at: Timestamp,
    },
}

impl LedgerEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::VaultUpdated { .. } => EventType::VaultUpdated,
            Self::VaultClosed { .. } => EventType::VaultClosed,
            Self::CollateralDeposited { .. } => EventType::CollateralDeposited,
            Self::CollateralWithdrawn { .. } => EventType::CollateralWithdrawn,
            Self::VaultConfiscated { .. } => EventType::VaultConfiscated,
            Self::Accrued { .. } => EventType::Accrued,
            Self::UnbackedDebtSettled { .. } => EventType::UnbackedDebtSettled,
            Self::CurrencyMoved { .. } => EventType::CurrencyMoved,
            Self::CurrencyExternalized { .. } => EventType::CurrencyExternalized,
            Self::CurrencyInternalized { .. } => EventType::CurrencyInternalized,
            Self::AssetInitialized { .. } => EventType::AssetInitialized,
            Self::AssetUpdated { .. } => EventType::AssetUpdated,
            Self::InterestPolicyChanged { .. } => EventType::InterestPolicyChanged,
            Self::TransferSubmitted { .. } => EventType::TransferSubmitted,
            Self::TransferDispatched { .. } => EventType::TransferDispatched,
            Self::TransferConfirmed { .. } => EventType::TransferConfirmed,
            Self::TransferCancelled { .. } => EventType::TransferCancelled,
        }
    }

    /// Ledger time the event was recorded at
    pub fn at(&self) -> Timestamp {
        match self {
            Self::VaultUpdated { at, .. }
            | Self::VaultClosed { at, .. }
            | Self::CollateralDeposited { at, .. }
            | Self::CollateralWithdrawn { at, .. }
            | Self::VaultConfiscated { at, .. }
            | Self::Accrued { at, .. }
            | Self::UnbackedDebtSettled { at, .. }
            | Self::CurrencyMoved { at, .. }
            | Self::CurrencyExternalized { at, .. }
            | Self::CurrencyInternalized { at, .. }
            | Self::AssetInitialized { at, .. }
            | Self::AssetUpdated { at, .. }
            | Self::InterestPolicyChanged { at, .. }
            | Self::TransferSubmitted { at, .. }
            | Self::TransferDispatched { at, .. }
            | Self::TransferConfirmed { at, .. }
            | Self::TransferCancelled { at, .. } => *at,
        }
    }

    /// Serialize event to CBOR bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match ciborium::into_writer(self, &mut buf) {
            Ok(()) => buf,
            Err(_) => Vec::new(),
        }
    }

    /// Deserialize event from CBOR bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        ciborium::from_reader(bytes).ok()
    }
}

/// Event log for collecting events emitted by a component
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&LedgerEvent> {
        self.events.iter().filter(|e| e.event_type() == event_type).collect()
    }

    /// Events recorded at or after `since`
    pub fn since(&self, since: Timestamp) -> Vec<&LedgerEvent> {
        self.events.iter().filter(|e| e.at() >= since).collect()
    }

    /// Take the accumulated events, leaving the log empty
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(at: Timestamp) -> LedgerEvent {
        LedgerEvent::VaultClosed { owner: [1u8; 32], asset: AssetId::new("XRP").unwrap(), at }
    }

    #[test]
    fn test_event_log_filters() {
        let mut log = EventLog::new();
        log.emit(closed(10));
        log.emit(LedgerEvent::TransferDispatched { key: [2u8; 32], at: 20 });
        log.emit(closed(30));

        assert_eq!(log.len(), 3);
        assert_eq!(log.filter_by_type(EventType::VaultClosed).len(), 2);
        assert_eq!(log.since(20).len(), 2);

        let drained = log.drain();
        assert_eq!(drained.len(), 3);
        assert!(log.is_empty());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let event = LedgerEvent::TransferSubmitted {
            key: [3u8; 32],
            sender: [4u8; 32],
            destination: "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh".into(),
            amount: 30,
            nonce: 1_700_000_000,
            at: 5,
        };
        let bytes = event.to_bytes();
        assert!(!bytes.is_empty());
        assert_eq!(LedgerEvent::from_bytes(&bytes), Some(event));
        assert_eq!(LedgerEvent::from_bytes(&[0xff, 0x00]), None);
    }

    #[test]
    fn test_event_type_discriminants_are_stable() {
        assert_eq!(borsh::to_vec(&EventType::VaultUpdated).unwrap(), vec![0x01]);
        assert_eq!(borsh::to_vec(&EventType::TransferCancelled).unwrap(), vec![0x83]);
    }
}
