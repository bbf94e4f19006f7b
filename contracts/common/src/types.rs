//! Core Types for the Keel ledger
//!
//! Identifiers and the per-vault record shared by every component.

use borsh::{BorshDeserialize, BorshSerialize};
use casper_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{KeelError, KeelResult};

/// Type alias for addresses (32-byte account hash)
pub type Address = [u8; 32];

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Longest symbol an [`AssetId`] can carry
pub const MAX_ASSET_SYMBOL_LEN: usize = 16;

/// Collateral asset identifier: a short ASCII symbol such as `XRP`.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
    Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId {
    bytes: [u8; MAX_ASSET_SYMBOL_LEN],
    len: u8,
}

impl AssetId {
    pub fn new(symbol: &str) -> KeelResult<Self> {
        if symbol.is_empty() || symbol.len() > MAX_ASSET_SYMBOL_LEN {
            return Err(KeelError::InvalidParameter(format!(
                "asset symbol must be 1..={MAX_ASSET_SYMBOL_LEN} bytes, got {:?}",
                symbol
            )));
        }
        if !symbol.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
            return Err(KeelError::InvalidParameter(format!(
                "asset symbol {symbol:?} contains unsupported characters"
            )));
        }
        let mut bytes = [0u8; MAX_ASSET_SYMBOL_LEN];
        bytes[..symbol.len()].copy_from_slice(symbol.as_bytes());
        Ok(Self { bytes, len: symbol.len() as u8 })
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII is ever stored.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("?")
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.as_str())
    }
}

impl TryFrom<String> for AssetId {
    type Error = KeelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.as_str().to_owned()
    }
}

// ============ Vault Types ============

/// Stored vault balances. Debt and equity are normalized amounts at unit
/// scale; multiply by the asset's accumulators for currency values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Locked collateral (unit scale)
    pub collateral: U256,
    /// Normalized debt (unit scale)
    pub normalized_debt: U256,
    /// Normalized equity (unit scale)
    pub normalized_equity: U256,
}

impl Vault {
    pub fn is_empty(&self) -> bool {
        self.collateral.is_zero()
            && self.normalized_debt.is_zero()
            && self.normalized_equity.is_zero()
    }
}

/// Read-only snapshot of a vault priced at a given pair of accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultView {
    pub owner: Address,
    pub asset: AssetId,
    pub collateral: U256,
    pub normalized_debt: U256,
    pub normalized_equity: U256,
    /// `normalized_debt × debt_accumulator` (currency scale)
    pub debt_value: U256,
    /// `normalized_equity × equity_accumulator` (currency scale)
    pub equity_value: U256,
    pub debt_accumulator: U256,
    pub equity_accumulator: U256,
    /// Accrual time the accumulators correspond to
    pub as_of: Timestamp,
}

impl VaultView {
    /// Currency value the collateral must cover.
    pub fn backed_value(&self) -> KeelResult<U256> {
        crate::math::add(self.debt_value, self.equity_value)
    }
}
