//! Bridge state machine
//!
//! Records live here; currency lives in the Vault Engine. Each lifecycle
//! edge pairs a status change with at most one engine call:
//!
//! | edge                   | engine call                       |
//! |------------------------|-----------------------------------|
//! | submit                 | sender → escrow                   |
//! | Pending → InProgress   | none                              |
//! | InProgress → Completed | escrow → settlement               |
//! | * → Cancelled          | escrow → sender (refund)          |
//!
//! The engine call runs before the record is written, so a failed call
//! leaves the record as it was.

use casper_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use keel_common::{
    constants::{
        accounts::{BRIDGE_ESCROW, BRIDGE_SETTLEMENT},
        bridge::{DEFAULT_MAX_AMOUNT, DEFAULT_MIN_AMOUNT},
    },
    math::{self, Scale},
    Address, EventLog, ExecutionContext, KeelError, KeelResult, LedgerEvent, Role, Timestamp,
};
use keel_vault_engine::VaultEngine;

use crate::destination::validate_xrp_address;
use crate::record::{TransferKey, TransferRecord, TransferStatus};

// ============================================================================
// Config
// ============================================================================

/// Bridge limits and accounts. Amounts are unit scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub min_amount: u128,
    pub max_amount: u128,
    /// Require destinations to be well-formed classic XRP addresses
    pub validate_destination: bool,
    /// Holds currency for Pending and InProgress transfers
    pub escrow_account: Address,
    /// Receives currency once the external leg is confirmed
    pub settlement_account: Address,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let unit = 1_000_000_000_000_000_000u128;
        Self {
            enabled: true,
            min_amount: DEFAULT_MIN_AMOUNT * unit,
            max_amount: DEFAULT_MAX_AMOUNT * unit,
            validate_destination: true,
            escrow_account: BRIDGE_ESCROW,
            settlement_account: BRIDGE_SETTLEMENT,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> KeelResult<()> {
        if self.min_amount == 0 || self.min_amount > self.max_amount {
            return Err(KeelError::InvalidParameter(format!(
                "bridge amount range [{}, {}] is empty or starts at zero",
                self.min_amount, self.max_amount
            )));
        }
        if self.escrow_account == self.settlement_account {
            return Err(KeelError::InvalidParameter(
                "escrow and settlement accounts must differ".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of [`Bridge::confirm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// The record was already Completed; nothing was re-applied.
    AlreadyCompleted,
}

/// Transfer keys grouped by status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPartition {
    pub pending: Vec<TransferKey>,
    pub in_progress: Vec<TransferKey>,
    pub completed: Vec<TransferKey>,
    pub cancelled: Vec<TransferKey>,
}

// ============================================================================
// Bridge
// ============================================================================

/// Outbound transfer tracker. Its address must hold `Role::Bridge` so it
/// can move escrowed currency.
#[derive(Debug, Clone)]
pub struct Bridge {
    address: Address,
    config: BridgeConfig,
    records: BTreeMap<TransferKey, TransferRecord>,
    events: EventLog,
}

impl Bridge {
    pub fn new(address: Address, config: BridgeConfig) -> KeelResult<Self> {
        config.validate()?;
        Ok(Self { address, config, records: BTreeMap::new(), events: EventLog::new() })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Pause or resume new submissions (governance). In-flight records can
    /// still be dispatched, confirmed and cancelled.
    pub fn set_enabled(&mut self, ctx: &ExecutionContext<'_>, enabled: bool) -> KeelResult<()> {
        ctx.require_role(Role::Governance)?;
        self.config.enabled = enabled;
        info!(enabled, "bridge submissions toggled");
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Escrow `amount` from `sender` and open a Pending record. A Cancelled
    /// record with the same key is replaced; any other existing record is a
    /// duplicate.
    pub fn submit(
        &mut self,
        engine: &mut VaultEngine,
        ctx: &ExecutionContext<'_>,
        sender: Address,
        destination: &str,
        amount: u128,
        nonce: u64,
    ) -> KeelResult<TransferKey> {
        if !self.config.enabled {
            return Err(KeelError::BridgeDisabled);
        }
        ctx.require_owner(&sender, Role::Whitelisted)?;
        if amount < self.config.min_amount || amount > self.config.max_amount {
            return Err(KeelError::AmountOutOfRange {
                amount,
                min: self.config.min_amount,
                max: self.config.max_amount,
            });
        }
        if self.config.validate_destination {
            validate_xrp_address(destination)?;
        }

        let key = TransferKey::compute(destination, amount, nonce)?;
        if let Some(existing) = self.records.get(&key) {
            if existing.status != TransferStatus::Cancelled {
                warn!(%key, status = %existing.status, "duplicate transfer rejected");
                return Err(KeelError::DuplicateTransfer { key: key.0 });
            }
        }

        let value = escrow_value(amount)?;
        engine.move_currency(
            &ctx.acting_as(self.address),
            sender,
            self.config.escrow_account,
            value,
        )?;
        self.records.insert(
            key,
            TransferRecord::new(sender, destination.to_owned(), amount, nonce, ctx.now),
        );
        self.events.emit(LedgerEvent::TransferSubmitted {
            key: key.0,
            sender,
            destination: destination.to_owned(),
            amount,
            nonce,
            at: ctx.now,
        });
        info!(%key, amount, nonce, "transfer submitted");
        Ok(key)
    }

    /// Pending → InProgress (relay). Marks that a settlement attempt is in
    /// flight on the external chain.
    pub fn dispatch(&mut self, ctx: &ExecutionContext<'_>, key: &TransferKey) -> KeelResult<()> {
        ctx.require_role(Role::Relay)?;
        self.check_transition(key, TransferStatus::InProgress)?;

        self.set_status(key, TransferStatus::InProgress, ctx.now);
        self.events.emit(LedgerEvent::TransferDispatched { key: key.0, at: ctx.now });
        debug!(%key, "transfer dispatched");
        Ok(())
    }

    /// InProgress → Completed (relay). Confirming a Completed record again
    /// is a success that changes nothing.
    pub fn confirm(
        &mut self,
        engine: &mut VaultEngine,
        ctx: &ExecutionContext<'_>,
        key: &TransferKey,
        external_tx_id: &str,
    ) -> KeelResult<ConfirmOutcome> {
        ctx.require_role(Role::Relay)?;
        let record = self.record(key)?;
        if record.status == TransferStatus::Completed {
            debug!(%key, "transfer already completed");
            return Ok(ConfirmOutcome::AlreadyCompleted);
        }
        if external_tx_id.is_empty() {
            return Err(KeelError::InvalidParameter("empty external transaction id".into()));
        }
        self.check_transition(key, TransferStatus::Completed)?;

        let value = escrow_value(record.amount)?;
        engine.move_currency(
            &ctx.acting_as(self.address),
            self.config.escrow_account,
            self.config.settlement_account,
            value,
        )?;
        if let Some(record) = self.records.get_mut(key) {
            record.external_tx_id = Some(external_tx_id.to_owned());
        }
        self.set_status(key, TransferStatus::Completed, ctx.now);
        self.events.emit(LedgerEvent::TransferConfirmed {
            key: key.0,
            external_tx_id: external_tx_id.to_owned(),
            at: ctx.now,
        });
        info!(%key, external_tx_id, "transfer confirmed");
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Pending | InProgress → Cancelled (relay). Refunds the escrow and
    /// frees the key for resubmission.
    pub fn cancel(
        &mut self,
        engine: &mut VaultEngine,
        ctx: &ExecutionContext<'_>,
        key: &TransferKey,
    ) -> KeelResult<()> {
        ctx.require_role(Role::Relay)?;
        self.check_transition(key, TransferStatus::Cancelled)?;
        let record = self.record(key)?;

        let value = escrow_value(record.amount)?;
        engine.move_currency(
            &ctx.acting_as(self.address),
            self.config.escrow_account,
            record.sender,
            value,
        )?;
        self.set_status(key, TransferStatus::Cancelled, ctx.now);
        self.events.emit(LedgerEvent::TransferCancelled { key: key.0, at: ctx.now });
        info!(%key, "transfer cancelled");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, key: &TransferKey) -> Option<&TransferRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&TransferKey, &TransferRecord)> {
        self.records.iter()
    }

    pub fn pending(&self) -> Vec<(&TransferKey, &TransferRecord)> {
        self.with_status(TransferStatus::Pending)
    }

    pub fn in_progress(&self) -> Vec<(&TransferKey, &TransferRecord)> {
        self.with_status(TransferStatus::InProgress)
    }

    /// Every key, grouped by status, in one pass.
    pub fn partition(&self) -> TransferPartition {
        let mut out = TransferPartition::default();
        for (key, record) in &self.records {
            match record.status {
                TransferStatus::Pending => out.pending.push(*key),
                TransferStatus::InProgress => out.in_progress.push(*key),
                TransferStatus::Completed => out.completed.push(*key),
                TransferStatus::Cancelled => out.cancelled.push(*key),
            }
        }
        out
    }

    /// Currency that escrow should hold for the live records (currency scale)
    pub fn escrowed_value(&self) -> KeelResult<U256> {
        self.records
            .values()
            .filter(|r| r.status.holds_escrow())
            .try_fold(U256::zero(), |acc, r| math::add(acc, escrow_value(r.amount)?))
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Borsh encoding of every record, keyed.
    pub fn export_records(&self) -> KeelResult<Vec<u8>> {
        let entries: Vec<(TransferKey, TransferRecord)> =
            self.records.iter().map(|(k, r)| (*k, r.clone())).collect();
        borsh::to_vec(&entries)
            .map_err(|e| KeelError::InvalidParameter(format!("encode records: {e}")))
    }

    /// Replace the record set with a previous export (governance). Every
    /// key must match the hash of its record, and the live records must
    /// account for exactly what the engine holds in escrow.
    pub fn import_records(
        &mut self,
        engine: &VaultEngine,
        ctx: &ExecutionContext<'_>,
        bytes: &[u8],
    ) -> KeelResult<usize> {
        ctx.require_role(Role::Governance)?;
        let entries: Vec<(TransferKey, TransferRecord)> = borsh::from_slice(bytes)
            .map_err(|e| KeelError::InvalidParameter(format!("decode records: {e}")))?;
        let mut records = BTreeMap::new();
        let mut escrowed = U256::zero();
        for (key, record) in entries {
            if record.key()? != key {
                return Err(KeelError::InvalidParameter(format!(
                    "record under {key} does not hash to its key"
                )));
            }
            if record.status.holds_escrow() {
                escrowed = math::add(escrowed, escrow_value(record.amount)?)?;
            }
            records.insert(key, record);
        }
        let held = engine.currency_balance(&self.config.escrow_account);
        if escrowed != held {
            return Err(KeelError::InvalidParameter(format!(
                "imported records escrow {escrowed}, escrow account holds {held}"
            )));
        }

        let count = records.len();
        self.records = records;
        info!(count, "transfer records imported");
        Ok(count)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn record(&self, key: &TransferKey) -> KeelResult<TransferRecord> {
        self.records.get(key).cloned().ok_or(KeelError::TransferNotFound { key: key.0 })
    }

    fn check_transition(&self, key: &TransferKey, next: TransferStatus) -> KeelResult<()> {
        let current = self.record(key)?.status;
        if !current.can_become(next) {
            return Err(KeelError::InvalidStatusTransition {
                from: current.as_str(),
                to: next.as_str(),
            });
        }
        Ok(())
    }

    fn set_status(&mut self, key: &TransferKey, status: TransferStatus, at: Timestamp) {
        if let Some(record) = self.records.get_mut(key) {
            record.status = status;
            record.updated_at = at;
        }
    }

    fn with_status(&self, status: TransferStatus) -> Vec<(&TransferKey, &TransferRecord)> {
        self.records.iter().filter(|(_, r)| r.status == status).collect()
    }
}

/// Ledger currency backing a transfer of `amount` units
fn escrow_value(amount: u128) -> KeelResult<U256> {
    math::rescale(U256::from(amount), Scale::Unit, Scale::Currency)
}

/// Nonce for a submission made at `time`: whole seconds since the epoch.
pub fn nonce_from_unix_seconds(time: SystemTime) -> KeelResult<u64> {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|_| KeelError::InvalidParameter("time before the unix epoch".into()))
}
