//! Error Types for the Keel ledger
//!
//! Every fallible ledger operation returns a [`KeelError`]. Invariant
//! violations are always detected before any write, so an `Err` means the
//! ledger was left exactly as it was.

use casper_types::U256;
use thiserror::Error;

use crate::access_control::Role;
use crate::types::{Address, AssetId};

/// Result type alias for Keel operations
pub type KeelResult<T> = Result<T, KeelError>;

/// Why an oracle price could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFault {
    /// The feed has no observation for the asset
    Missing,
    /// The feed reported a zero price
    Zero,
    /// The observation is older than the configured maximum age
    Stale { age_secs: u64, max_age_secs: u64 },
}

/// Main error enum for all Keel errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeelError {
    // ============ Authorization Errors ============
    /// Caller lacks the role required by the operation.
    #[error("address {} is not authorized for role {role:?}", short_address(.address))]
    Unauthorized {
        /// The address that was checked.
        address: Address,
        /// The role it was required to hold.
        role: Role,
    },

    // ============ Vault Errors ============
    /// Post-update collateral value does not back the vault's positions.
    #[error("insufficient collateral: value {collateral_value} < required {required}")]
    InsufficientCollateral {
        /// Collateral value at the adjusted price (currency scale).
        collateral_value: U256,
        /// Debt value plus equity value (currency scale).
        required: U256,
    },

    /// A global debt ceiling or the individual vault limit would be exceeded.
    #[error("debt ceiling exceeded: {attempted} > {limit}")]
    DebtCeilingExceeded { limit: U256, attempted: U256 },

    /// A non-zero position would sit below the asset's debt floor.
    #[error("position {position} below debt floor {floor}")]
    DebtFloorNotMet { floor: U256, position: U256 },

    /// Vault still holds collateral, debt or equity.
    #[error("vault is not empty")]
    VaultNotEmpty,

    /// No vault exists for the owner/asset pair.
    #[error("vault not found for asset {asset}")]
    VaultNotFound { asset: AssetId },

    // ============ Asset Errors ============
    #[error("asset {asset} is not registered")]
    AssetNotFound { asset: AssetId },

    #[error("asset {asset} is already registered")]
    AssetAlreadyExists { asset: AssetId },

    // ============ Balance Errors ============
    /// Ledger, standby or token balance is short of the requested amount.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: U256, requested: U256 },

    // ============ Oracle Errors ============
    #[error("price unavailable for {asset}: {reason:?}")]
    PriceUnavailable { asset: AssetId, reason: PriceFault },

    // ============ Bridge Errors ============
    /// A live transfer with the same identity already exists.
    #[error("duplicate transfer {}", short_address(.key))]
    DuplicateTransfer { key: [u8; 32] },

    /// The requested status change is not an edge of the transfer lifecycle.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: &'static str, to: &'static str },

    #[error("transfer {} not found", short_address(.key))]
    TransferNotFound { key: [u8; 32] },

    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("bridge is disabled")]
    BridgeDisabled,

    #[error("amount {amount} outside [{min}, {max}]")]
    AmountOutOfRange { amount: u128, min: u128, max: u128 },

    // ============ Arithmetic Errors ============
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("arithmetic underflow")]
    ArithmeticUnderflow,

    #[error("division by zero")]
    DivisionByZero,

    // ============ General Errors ============
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("configuration error: {0}")]
    Config(String),
}

fn short_address(bytes: &[u8; 32]) -> String {
    bytes[..4].iter().map(|b| format!("{b:02x}")).collect::<String>() + ".."
}

impl KeelError {
    /// Get error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E001_UNAUTHORIZED",
            Self::InsufficientCollateral { .. } => "E010_INSUFFICIENT_COLLATERAL",
            Self::DebtCeilingExceeded { .. } => "E011_DEBT_CEILING_EXCEEDED",
            Self::DebtFloorNotMet { .. } => "E012_DEBT_FLOOR_NOT_MET",
            Self::VaultNotEmpty => "E013_VAULT_NOT_EMPTY",
            Self::VaultNotFound { .. } => "E014_VAULT_NOT_FOUND",
            Self::AssetNotFound { .. } => "E020_ASSET_NOT_FOUND",
            Self::AssetAlreadyExists { .. } => "E021_ASSET_EXISTS",
            Self::InsufficientBalance { .. } => "E030_INSUFFICIENT_BALANCE",
            Self::PriceUnavailable { .. } => "E040_PRICE_UNAVAILABLE",
            Self::DuplicateTransfer { .. } => "E050_DUPLICATE_TRANSFER",
            Self::InvalidStatusTransition { .. } => "E051_INVALID_STATUS_TRANSITION",
            Self::TransferNotFound { .. } => "E052_TRANSFER_NOT_FOUND",
            Self::InvalidDestination(_) => "E053_INVALID_DESTINATION",
            Self::BridgeDisabled => "E054_BRIDGE_DISABLED",
            Self::AmountOutOfRange { .. } => "E055_AMOUNT_OUT_OF_RANGE",
            Self::ArithmeticOverflow => "E060_OVERFLOW",
            Self::ArithmeticUnderflow => "E061_UNDERFLOW",
            Self::DivisionByZero => "E062_DIVISION_BY_ZERO",
            Self::InvalidParameter(_) => "E070_INVALID_PARAMETER",
            Self::Config(_) => "E071_CONFIG",
        }
    }

    /// Check if error is recoverable (user can retry with different params)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCollateral { .. }
                | Self::InsufficientBalance { .. }
                | Self::DebtFloorNotMet { .. }
                | Self::PriceUnavailable { .. }
                | Self::AmountOutOfRange { .. }
        )
    }
}
