//! Transfer records and their identity
//!
//! A transfer is identified by the hash of what it does, not by where it is
//! stored:
//!
//! ```text
//! key = SHA-256( "keel.bridge.transfer.v1" ‖ borsh(destination, amount, nonce) )
//! ```
//!
//! Two submissions of the same triple therefore land on the same record,
//! which is what makes retries safe.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use keel_common::{
    constants::bridge::TRANSFER_KEY_DOMAIN, Address, KeelError, KeelResult, Timestamp,
};

// ============================================================================
// Status
// ============================================================================

/// Transfer lifecycle
///
/// ```text
/// Pending ──dispatch──▶ InProgress ──confirm──▶ Completed
///    │                      │
///    └────────cancel────────┴──────────────────▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "Pending",
            TransferStatus::InProgress => "InProgress",
            TransferStatus::Completed => "Completed",
            TransferStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle
    pub fn can_become(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, next) {
            (Pending, InProgress) | (InProgress, Completed) => true,
            (Pending | InProgress, Cancelled) => true,
            (Pending | InProgress | Completed | Cancelled, _) => false,
        }
    }

    /// Completed and Cancelled records never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }

    /// Escrowed currency is still held for the record
    pub fn holds_escrow(&self) -> bool {
        matches!(self, TransferStatus::Pending | TransferStatus::InProgress)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Key
// ============================================================================

/// Content-derived transfer identity
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct TransferKey(pub [u8; 32]);

impl TransferKey {
    pub fn compute(destination: &str, amount: u128, nonce: u64) -> KeelResult<Self> {
        let preimage = borsh::to_vec(&(destination.to_owned(), amount, nonce))
            .map_err(|e| KeelError::InvalidParameter(format!("transfer key preimage: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(TRANSFER_KEY_DOMAIN);
        hasher.update(&preimage);
        Ok(Self(hasher.finalize().into()))
    }

    pub fn from_hex(s: &str) -> KeelResult<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| KeelError::InvalidParameter(format!("transfer key {s:?}: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferKey({}..)", &self.to_hex()[..8])
    }
}

// ============================================================================
// Record
// ============================================================================

/// One outbound transfer to the XRP ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TransferRecord {
    /// Ledger account that funded the escrow
    pub sender: Address,
    /// Classic XRP address
    pub destination: String,
    /// Unit scale
    pub amount: u128,
    /// Caller-supplied, wall-clock seconds
    pub nonce: u64,
    /// Set once, when the external leg is confirmed
    pub external_tx_id: Option<String>,
    pub status: TransferStatus,
    pub submitted_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TransferRecord {
    pub fn new(
        sender: Address,
        destination: String,
        amount: u128,
        nonce: u64,
        at: Timestamp,
    ) -> Self {
        Self {
            sender,
            destination,
            amount,
            nonce,
            external_tx_id: None,
            status: TransferStatus::Pending,
            submitted_at: at,
            updated_at: at,
        }
    }

    /// Identity recomputed from the record's own fields
    pub fn key(&self) -> KeelResult<TransferKey> {
        TransferKey::compute(&self.destination, self.amount, self.nonce)
    }

    pub fn to_bytes(&self) -> KeelResult<Vec<u8>> {
        borsh::to_vec(self)
            .map_err(|e| KeelError::InvalidParameter(format!("encode transfer record: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> KeelResult<Self> {
        borsh::from_slice(bytes)
            .map_err(|e| KeelError::InvalidParameter(format!("decode transfer record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEST: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    #[test]
    fn test_key_is_deterministic_and_field_sensitive() {
        let key = TransferKey::compute(DEST, 30, 1_700_000_000).unwrap();
        assert_eq!(key, TransferKey::compute(DEST, 30, 1_700_000_000).unwrap());
        assert_ne!(key, TransferKey::compute(DEST, 31, 1_700_000_000).unwrap());
        assert_ne!(key, TransferKey::compute(DEST, 30, 1_700_000_001).unwrap());
        assert_ne!(
            key,
            TransferKey::compute("rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe", 30, 1_700_000_000).unwrap()
        );
    }

    #[test]
    fn test_distinct_triples_do_not_alias() {
        let a = TransferKey::compute("X1", 2, 3).unwrap();
        let b = TransferKey::compute("X", 12, 3).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_round_trip() {
        let key = TransferKey::compute("X", 30, 7).unwrap();
        assert_eq!(key.to_hex().len(), 64);
        assert_eq!(TransferKey::from_hex(&key.to_string()).unwrap(), key);
        assert!(TransferKey::from_hex("abc").is_err());
    }

    #[test]
    fn test_lifecycle_edges() {
        use TransferStatus::*;
        let all = [Pending, InProgress, Completed, Cancelled];
        let allowed: Vec<_> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_become(*to))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (Pending, InProgress),
                (Pending, Cancelled),
                (InProgress, Completed),
                (InProgress, Cancelled)
            ]
        );
        assert!(Completed.is_terminal() && Cancelled.is_terminal());
        assert!(!Completed.holds_escrow());
    }

    #[test]
    fn test_record_encoding() {
        let mut record = TransferRecord::new([1u8; 32], "X".into(), 30, 7, 100);
        record.external_tx_id =
            Some("E3FE6EA3D48F0C2B639448020EA4F03D4F4F8FFDB243A852A0F59177921B4879".into());
        let decoded = TransferRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.key().unwrap(), TransferKey::compute("X", 30, 7).unwrap());
    }
}
