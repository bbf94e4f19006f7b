//! Keel Vault Engine
//!
//! Owns every balance in the system: per-vault collateral, normalized debt
//! and normalized equity; standby collateral; system currency; unbacked
//! debt; and the bookkeeping of currency that has left the ledger as the
//! external token. The Teller (interest accrual) lives alongside it as the
//! only code that advances accumulators.
//!
//! ## Core Operations
//!
//! - **open_or_update**: apply collateral/debt/equity deltas, atomically
//! - **close**: remove an empty vault
//! - **read / preview**: pure vault views at stored or projected accumulators
//! - **accrue / set_interest_policy**: Teller
//! - **deposit_collateral / withdraw_collateral**: wallet <-> standby
//! - **move_currency / issue_external / redeem_external**: currency plumbing
//!   for the Treasury and Bridge
//! - **confiscate / settle_unbacked_debt**: liquidation support
//!
//! ## Supply identity
//!
//! After every operation:
//!
//! ```text
//! Σ debt_value − Σ equity_value + unbacked_debt
//!     == Σ currency balances + externalized currency
//! ```
//!
//! [`VaultEngine::supply_report`] exposes both sides.

pub mod engine;
pub mod state;
pub mod teller;
mod staging;


pub use engine::VaultEngine;
pub use state::{
    AssetRecord, Confiscation, EngineConfig, SupplyReport, SupplyState, VaultHealth,
};
pub use teller::{project as project_accrual, AccrualStep};
