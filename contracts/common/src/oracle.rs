//! Price Oracle Adapter
//!
//! Normalizes an external price into the liquidation-adjusted price the
//! ledger uses for solvency checks:
//!
//! ```text
//! adjusted_price = raw_price / liquidation_ratio      (both unit scale)
//! ```
//!
//! A missing, zero or stale observation is never turned into a number; the
//! dependent operation fails with `PriceUnavailable` instead.

use casper_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::constants::oracle::DEFAULT_MAX_PRICE_AGE_SECS;
use crate::errors::{KeelError, KeelResult, PriceFault};
use crate::math;
use crate::types::{AssetId, Timestamp};

// ============================================================================
// Types
// ============================================================================

/// A raw price as reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Currency per unit of collateral (unit scale)
    pub price: U256,
    pub observed_at: Timestamp,
}

/// External price source
pub trait PriceFeed {
    fn current_price(&self, asset: &AssetId) -> Option<PriceObservation>;
}

/// Turns raw observations into adjusted prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAdapter {
    pub max_age_secs: u64,
}

impl Default for OracleAdapter {
    fn default() -> Self {
        Self { max_age_secs: DEFAULT_MAX_PRICE_AGE_SECS }
    }
}

impl OracleAdapter {
    pub fn new(max_age_secs: u64) -> Self {
        Self { max_age_secs }
    }

    /// Fresh, non-zero raw price or `PriceUnavailable`.
    pub fn fresh_price(
        &self,
        feed: &dyn PriceFeed,
        asset: &AssetId,
        now: Timestamp,
    ) -> KeelResult<U256> {
        let unavailable = |reason| KeelError::PriceUnavailable { asset: *asset, reason };

        let observation =
            feed.current_price(asset).ok_or_else(|| unavailable(PriceFault::Missing))?;
        if observation.price.is_zero() {
            return Err(unavailable(PriceFault::Zero));
        }
        let age_secs = now.saturating_sub(observation.observed_at);
        if age_secs > self.max_age_secs {
            warn!(%asset, age_secs, max_age_secs = self.max_age_secs, "stale price rejected");
            return Err(unavailable(PriceFault::Stale {
                age_secs,
                max_age_secs: self.max_age_secs,
            }));
        }
        Ok(observation.price)
    }

    /// `raw_price / liquidation_ratio`, truncated, at unit scale.
    pub fn adjusted_price(
        &self,
        feed: &dyn PriceFeed,
        asset: &AssetId,
        liquidation_ratio: U256,
        now: Timestamp,
    ) -> KeelResult<U256> {
        let raw = self.fresh_price(feed, asset, now)?;
        let adjusted = math::mul_div(raw, math::unit(), liquidation_ratio)?;
        if adjusted.is_zero() {
            return Err(KeelError::PriceUnavailable { asset: *asset, reason: PriceFault::Zero });
        }
        debug!(%asset, %raw, %adjusted, "adjusted price derived");
        Ok(adjusted)
    }
}

/// Feed holding operator-set observations. Used by the protocol facade
/// when prices are pushed in, and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    observations: BTreeMap<AssetId, PriceObservation>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, asset: AssetId, price: U256, observed_at: Timestamp) {
        self.observations.insert(asset, PriceObservation { price, observed_at });
    }

    pub fn remove(&mut self, asset: &AssetId) {
        self.observations.remove(asset);
    }
}

impl PriceFeed for StaticPriceFeed {
    fn current_price(&self, asset: &AssetId) -> Option<PriceObservation> {
        self.observations.get(asset).copied()
    }
}
