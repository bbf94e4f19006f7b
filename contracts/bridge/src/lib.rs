//! Keel Bridge
//!
//! Moves system currency from the ledger to the XRP ledger through
//! hash-keyed transfer records with an explicit lifecycle. Exactly-once
//! settlement under retries follows from two rules:
//!
//! - a transfer's key is the hash of `(destination, amount, nonce)`, so a
//!   retried submission finds the existing record instead of creating one;
//! - every status change is checked against the lifecycle, and confirming a
//!   completed transfer is acknowledged without being applied twice.
//!
//! The external leg itself (signing, submitting, watching the XRP ledger)
//! belongs to the relay that drives `dispatch`, `confirm` and `cancel`.

pub mod bridge;
pub mod destination;
pub mod record;


pub use bridge::{nonce_from_unix_seconds, Bridge, BridgeConfig, ConfirmOutcome, TransferPartition};
pub use destination::validate_xrp_address;
pub use record::{TransferKey, TransferRecord, TransferStatus};
