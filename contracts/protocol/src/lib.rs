//! Keel Protocol
//!
//! Assembles the vault engine, liquidator, treasury and bridge into one
//! deployable unit configured from JSON.
//!
//! ## Modules
//!
//! - **config**: `KeelConfig`, human-unit JSON resolved into typed component
//!   configs
//! - **logging**: `tracing-subscriber` setup for processes hosting the protocol
//! - **keel**: the [`Keel`] facade
//!
//! ```text
//!            ┌──────────── Keel ────────────┐
//!  caller ──▶│ Treasury   Liquidator  Bridge│──▶ relay / XRP ledger
//!            │     └─────────┼─────────┘    │
//!            │          VaultEngine         │
//!            │  registry · prices · custody │
//!            └──────────────────────────────┘
//! ```

pub mod config;
pub mod keel;
pub mod logging;

#[cfg(test)]
mod integration_tests;

pub use config::{AssetParams, KeelConfig, ResolvedConfig};
pub use keel::Keel;
pub use logging::{init_logging, LogFormat, LoggingConfig};
