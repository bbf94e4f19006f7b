//! XRP classic address validation
//!
//! A classic address is base58 in the Ripple alphabet over
//! `0x00 ‖ account_id[20] ‖ checksum[4]`, where the checksum is the first
//! four bytes of a double SHA-256 of the first 21 bytes.

use sha2::{Digest, Sha256};

use keel_common::{KeelError, KeelResult};

const ACCOUNT_ID_PREFIX: u8 = 0x00;
const PAYLOAD_LEN: usize = 21;
const DECODED_LEN: usize = PAYLOAD_LEN + 4;

/// Returns the 20-byte account id on success.
pub fn validate_xrp_address(address: &str) -> KeelResult<[u8; 20]> {
    let invalid = |reason: &str| KeelError::InvalidDestination(format!("{address:?}: {reason}"));

    if !address.starts_with('r') || !(25..=35).contains(&address.len()) {
        return Err(invalid("not a classic address"));
    }
    let decoded = bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .map_err(|_| invalid("not base58"))?;
    if decoded.len() != DECODED_LEN || decoded[0] != ACCOUNT_ID_PREFIX {
        return Err(invalid("wrong payload"));
    }

    let (payload, checksum) = decoded.split_at(PAYLOAD_LEN);
    let digest = Sha256::digest(Sha256::digest(payload));
    if &digest[..4] != checksum {
        return Err(invalid("checksum mismatch"));
    }

    let mut account_id = [0u8; 20];
    account_id.copy_from_slice(&payload[1..]);
    Ok(account_id)
}
