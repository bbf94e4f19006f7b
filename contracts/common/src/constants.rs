//! Protocol Constants for the Keel ledger

/// Fixed-point tiers
pub mod scale {
    /// Unit scale: collateral, prices, normalized amounts
    pub const UNIT_DECIMALS: usize = 18;
    /// Accumulator scale: rates and interest accumulators
    pub const ACCUMULATOR_DECIMALS: usize = 27;
    /// Currency scale: unit × accumulator
    pub const CURRENCY_DECIMALS: usize = UNIT_DECIMALS + ACCUMULATOR_DECIMALS;
}

/// Fee and penalty parameters
pub mod fees {
    /// Basis points denominator
    pub const BPS_DENOMINATOR: u64 = 10_000;
    /// Share of collateral paid to the liquidation keeper (13%)
    pub const DEFAULT_LIQUIDATION_PENALTY_BPS: u64 = 1_300;
    /// Share of accrued interest kept by the protocol reserve (10%)
    pub const DEFAULT_PROTOCOL_FEE_BPS: u64 = 1_000;
}

/// Oracle parameters
pub mod oracle {
    /// Observations older than this are stale (1 hour)
    pub const DEFAULT_MAX_PRICE_AGE_SECS: u64 = 3_600;
}

/// Bridge parameters
pub mod bridge {
    /// Prefix mixed into every transfer key preimage
    pub const TRANSFER_KEY_DOMAIN: &[u8] = b"keel.bridge.transfer.v1";
    /// Smallest transfer in whole units
    pub const DEFAULT_MIN_AMOUNT: u128 = 1;
    /// Largest transfer in whole units
    pub const DEFAULT_MAX_AMOUNT: u128 = 10_000_000;
}

/// Well-known ledger accounts
pub mod accounts {
    use crate::types::Address;

    /// Protocol reserve: interest spread, forfeited equity, seized collateral
    pub const RESERVE: Address = [0xEE; 32];
    /// Currency held against pending bridge transfers
    pub const BRIDGE_ESCROW: Address = [0xB1; 32];
    /// Currency whose external leg has settled
    pub const BRIDGE_SETTLEMENT: Address = [0xB2; 32];
}
