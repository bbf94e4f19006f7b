//! Collateral Asset Configuration
//!
//! Per-asset risk parameters are an explicit, versioned record. Governance
//! replaces the record through [`AssetUpdate`]; every accepted update bumps
//! `version`, so an operation can tell exactly which parameters it ran under.
//!
//! Native and token-backed collateral share one interface through
//! [`AssetBacking`]: custody (`deposit`/`withdraw` via [`CollateralCustody`])
//! and valuation (`collateral_value`).

use casper_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::fees::{BPS_DENOMINATOR, DEFAULT_PROTOCOL_FEE_BPS};
use crate::errors::{KeelError, KeelResult};
use crate::math;
use crate::types::{Address, AssetId};

// ============================================================================
// Types
// ============================================================================

/// How an asset's collateral is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetBacking {
    /// The ledger's own native asset
    Native,
    /// A fungible token contract
    Token { contract: Address },
}

impl AssetBacking {
    /// Currency value of `amount` at `adjusted_price`.
    pub fn collateral_value(&self, amount: U256, adjusted_price: U256) -> KeelResult<U256> {
        match self {
            AssetBacking::Native | AssetBacking::Token { .. } => {
                math::collateral_value(amount, adjusted_price)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetBacking::Native => "native",
            AssetBacking::Token { .. } => "token",
        }
    }
}

/// Per-vault debt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtLimit {
    #[default]
    Unlimited,
    /// Maximum debt value of a single vault (currency scale)
    Capped(U256),
}

impl DebtLimit {
    pub fn admits(&self, debt_value: U256) -> bool {
        match self {
            DebtLimit::Unlimited => true,
            DebtLimit::Capped(cap) => debt_value <= *cap,
        }
    }

    /// `DebtCeilingExceeded` when a vault at `debt_value` would break the cap.
    pub fn check(&self, debt_value: U256) -> KeelResult<()> {
        match self {
            DebtLimit::Capped(cap) if !self.admits(debt_value) => {
                Err(KeelError::DebtCeilingExceeded { limit: *cap, attempted: debt_value })
            }
            _ => Ok(()),
        }
    }
}

/// Risk parameters for one collateral asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub backing: AssetBacking,
    /// Total debt value allowed against this asset (currency scale)
    pub debt_ceiling: U256,
    /// Smallest non-zero debt or equity position (unit scale)
    pub debt_floor: U256,
    pub vault_limit: DebtLimit,
    /// Collateral-to-value ratio at which a vault becomes unsafe (unit scale, >= 1.0)
    pub liquidation_ratio: U256,
    /// Incremented by every governance update
    pub version: u64,
}

impl AssetConfig {
    pub fn validate(&self) -> KeelResult<()> {
        if self.debt_floor.is_zero() {
            return Err(KeelError::InvalidParameter("debt floor must be positive".into()));
        }
        if self.liquidation_ratio < math::unit() {
            return Err(KeelError::InvalidParameter(format!(
                "liquidation ratio {} below 1.0",
                self.liquidation_ratio
            )));
        }
        Ok(())
    }

    /// Floor lifted to currency scale for comparison with position values
    pub fn floor_value(&self) -> KeelResult<U256> {
        math::mul(self.debt_floor, math::ray())
    }
}

/// Governance change set. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpdate {
    pub debt_ceiling: Option<U256>,
    pub debt_floor: Option<U256>,
    pub vault_limit: Option<DebtLimit>,
    pub liquidation_ratio: Option<U256>,
}

impl AssetUpdate {
    pub fn is_empty(&self) -> bool {
        self.debt_ceiling.is_none()
            && self.debt_floor.is_none()
            && self.vault_limit.is_none()
            && self.liquidation_ratio.is_none()
    }

    /// Produce the next config version. The input is left untouched.
    pub fn apply_to(&self, config: &AssetConfig) -> KeelResult<AssetConfig> {
        if self.is_empty() {
            return Err(KeelError::InvalidParameter("empty asset update".into()));
        }
        let next = AssetConfig {
            backing: config.backing,
            debt_ceiling: self.debt_ceiling.unwrap_or(config.debt_ceiling),
            debt_floor: self.debt_floor.unwrap_or(config.debt_floor),
            vault_limit: self.vault_limit.unwrap_or(config.vault_limit),
            liquidation_ratio: self.liquidation_ratio.unwrap_or(config.liquidation_ratio),
            version: config.version + 1,
        };
        next.validate()?;
        Ok(next)
    }
}

/// Interest terms for an asset's debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestPolicy {
    /// Per-second growth factor of the debt accumulator (accumulator scale, >= 1.0)
    pub debt_rate_per_second: U256,
    /// Share of accrued interest kept by the reserve instead of paid to equity
    pub protocol_fee_bps: u64,
}

impl Default for InterestPolicy {
    fn default() -> Self {
        Self { debt_rate_per_second: math::ray(), protocol_fee_bps: DEFAULT_PROTOCOL_FEE_BPS }
    }
}

impl InterestPolicy {
    pub fn validate(&self) -> KeelResult<()> {
        if self.debt_rate_per_second < math::ray() {
            return Err(KeelError::InvalidParameter("debt rate below 1.0".into()));
        }
        if self.protocol_fee_bps > BPS_DENOMINATOR {
            return Err(KeelError::InvalidParameter(format!(
                "protocol fee {} bps exceeds 100%",
                self.protocol_fee_bps
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Custody
// ============================================================================

/// Moves collateral between an owner's wallet and ledger custody.
pub trait CollateralCustody {
    /// Pull `amount` from `from` into custody.
    fn deposit(
        &mut self,
        backing: &AssetBacking,
        asset: &AssetId,
        from: &Address,
        amount: U256,
    ) -> KeelResult<()>;

    /// Release `amount` from custody to `to`.
    fn withdraw(
        &mut self,
        backing: &AssetBacking,
        asset: &AssetId,
        to: &Address,
        amount: U256,
    ) -> KeelResult<()>;
}

/// In-memory custody: owner wallets plus pooled holdings per backing kind.
#[derive(Debug, Clone, Default)]
pub struct CustodyBook {
    wallets: BTreeMap<(Address, AssetId), U256>,
    native_pool: BTreeMap<AssetId, U256>,
    token_pools: BTreeMap<(Address, AssetId), U256>,
}

impl CustodyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fund a wallet from outside the ledger.
    pub fn fund(&mut self, owner: Address, asset: AssetId, amount: U256) -> KeelResult<()> {
        let slot = self.wallets.entry((owner, asset)).or_default();
        *slot = math::add(*slot, amount)?;
        Ok(())
    }

    pub fn wallet_balance(&self, owner: &Address, asset: &AssetId) -> U256 {
        self.wallets.get(&(*owner, *asset)).copied().unwrap_or_default()
    }

    /// Collateral currently held in custody for `asset` under `backing`.
    pub fn held(&self, backing: &AssetBacking, asset: &AssetId) -> U256 {
        match backing {
            AssetBacking::Native => self.native_pool.get(asset).copied(),
            AssetBacking::Token { contract } => self.token_pools.get(&(*contract, *asset)).copied(),
        }
        .unwrap_or_default()
    }

    fn pool_mut(&mut self, backing: &AssetBacking, asset: &AssetId) -> &mut U256 {
        match backing {
            AssetBacking::Native => self.native_pool.entry(*asset).or_default(),
            AssetBacking::Token { contract } => {
                self.token_pools.entry((*contract, *asset)).or_default()
            }
        }
    }
}

impl CollateralCustody for CustodyBook {
    fn deposit(
        &mut self,
        backing: &AssetBacking,
        asset: &AssetId,
        from: &Address,
        amount: U256,
    ) -> KeelResult<()> {
        let available = self.wallet_balance(from, asset);
        let remaining = math::sub(available, amount)
            .map_err(|_| KeelError::InsufficientBalance { available, requested: amount })?;
        let pooled = math::add(self.held(backing, asset), amount)?;

        self.wallets.insert((*from, *asset), remaining);
        *self.pool_mut(backing, asset) = pooled;
        debug!(%asset, backing = backing.label(), %amount, "collateral taken into custody");
        Ok(())
    }

    fn withdraw(
        &mut self,
        backing: &AssetBacking,
        asset: &AssetId,
        to: &Address,
        amount: U256,
    ) -> KeelResult<()> {
        let pooled = self.held(backing, asset);
        let remaining = math::sub(pooled, amount)
            .map_err(|_| KeelError::InsufficientBalance { available: pooled, requested: amount })?;
        let credited = math::add(self.wallet_balance(to, asset), amount)?;

        *self.pool_mut(backing, asset) = remaining;
        self.wallets.insert((*to, *asset), credited);
        debug!(%asset, backing = backing.label(), %amount, "collateral released from custody");
        Ok(())
    }
}
