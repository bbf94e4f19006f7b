//! Keel Common Library
//!
//! Shared types, arithmetic and collaborator interfaces for the Keel
//! collateralized-debt ledger and its cross-chain bridge.
//!
//! ## Modules
//!
//! - **math**: fixed-point arithmetic over three precision tiers
//!   (unit 10^18, accumulator 10^27, currency 10^45), checked and truncating
//! - **errors**: the `KeelError` taxonomy shared by every component
//! - **asset**: versioned per-asset risk parameters, interest policy,
//!   native/token collateral backing and custody
//! - **access_control**: role registry consulted before privileged writes
//! - **oracle**: raw price → liquidation-adjusted price, staleness rules
//! - **token_ops**: the external currency token the Treasury mints and burns
//! - **events**: typed ledger events and the event log
//! - **context**: per-operation execution context (caller, time, collaborators)

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod asset;
pub mod access_control;
pub mod oracle;
pub mod token_ops;
pub mod events;
pub mod context;

// Re-exports for convenience
pub use access_control::{Registry, Role, RoleAssignment, RoleRegistry};
pub use asset::{
    AssetBacking, AssetConfig, AssetUpdate, CollateralCustody, CustodyBook, DebtLimit,
    InterestPolicy,
};
pub use casper_types::U256;
pub use context::ExecutionContext;
pub use errors::{KeelError, KeelResult, PriceFault};
pub use events::{EventLog, EventType, LedgerEvent};
pub use math::Scale;
pub use oracle::{OracleAdapter, PriceFeed, PriceObservation, StaticPriceFeed};
pub use token_ops::{CurrencyToken, LedgerToken, TokenSupply};
pub use types::{Address, AssetId, Timestamp, Vault, VaultView};
