//! Keel Liquidator
//!
//! Triggered externally by anyone who sees a vault whose collateral no longer
//! backs its positions:
//!
//! ```text
//! collateral × adjusted_price  <  debt_value + equity_value
//! ```
//!
//! The check is always re-run at trigger time against a fresh oracle price
//! and projected accrual. A vault that turned healthy in the meantime (a
//! repayment raced the keeper) is reported as [`LiquidationOutcome::Healthy`]
//! and nothing is written.
//!
//! ## Seizure
//!
//! ```text
//! collateral ──┬── penalty_bps ──▶ keeper standby
//!              └── remainder ────▶ reserve standby
//! debt value ─────────────────────▶ unbacked debt
//! equity value ───────────────────▶ reserve currency
//! ```

use casper_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keel_common::{
    constants::fees::{BPS_DENOMINATOR, DEFAULT_LIQUIDATION_PENALTY_BPS},
    Address, AssetId, ExecutionContext, KeelError, KeelResult, VaultView,
};
use keel_vault_engine::{Confiscation, VaultEngine, VaultHealth};

/// Liquidation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidatorConfig {
    /// Share of seized collateral paid to the keeper
    pub penalty_bps: u64,
}

impl Default for LiquidatorConfig {
    fn default() -> Self {
        Self { penalty_bps: DEFAULT_LIQUIDATION_PENALTY_BPS }
    }
}

impl LiquidatorConfig {
    pub fn validate(&self) -> KeelResult<()> {
        if self.penalty_bps > BPS_DENOMINATOR {
            return Err(KeelError::InvalidParameter(format!(
                "liquidation penalty {} bps exceeds 100%",
                self.penalty_bps
            )));
        }
        Ok(())
    }
}

/// Result of a liquidation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidationOutcome {
    /// The vault is backed at the current price; nothing was written.
    Healthy { collateral_value: U256, required: U256 },
    Liquidated(Confiscation),
}

/// A vault found underwater by [`Liquidator::scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub owner: Address,
    pub asset: AssetId,
    pub collateral_value: U256,
    pub required: U256,
}

/// Whether a health snapshot allows seizure. Empty vaults never do.
pub fn can_liquidate(health: &VaultHealth) -> bool {
    !health.required.is_zero() && !health.is_safe()
}

/// The liquidator component. Acts on the engine under its own address,
/// which must hold `Role::Liquidator`.
#[derive(Debug, Clone)]
pub struct Liquidator {
    address: Address,
    config: LiquidatorConfig,
}

impl Liquidator {
    pub fn new(address: Address, config: LiquidatorConfig) -> KeelResult<Self> {
        config.validate()?;
        Ok(Self { address, config })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn config(&self) -> &LiquidatorConfig {
        &self.config
    }

    /// Re-check `owner`'s vault at the current price and seize it if it is
    /// underwater. `keeper` receives the penalty share.
    pub fn liquidate(
        &self,
        engine: &mut VaultEngine,
        ctx: &ExecutionContext<'_>,
        keeper: Address,
        owner: Address,
        asset: AssetId,
    ) -> KeelResult<LiquidationOutcome> {
        let health = engine.health(ctx, &owner, &asset)?;
        if !can_liquidate(&health) {
            debug!(
                %asset,
                collateral_value = %health.collateral_value,
                required = %health.required,
                "vault healthy, nothing to seize"
            );
            return Ok(LiquidationOutcome::Healthy {
                collateral_value: health.collateral_value,
                required: health.required,
            });
        }

        let seized = engine.confiscate(
            &ctx.acting_as(self.address),
            owner,
            asset,
            keeper,
            self.config.penalty_bps,
        )?;
        info!(
            %asset,
            collateral = %seized.collateral_seized,
            keeper_share = %seized.keeper_share,
            debt_value = %seized.debt_value,
            "vault liquidated"
        );
        Ok(LiquidationOutcome::Liquidated(seized))
    }

    /// Liquidate every vault in `targets` that is underwater. Healthy vaults
    /// and vaults without a usable price are skipped.
    pub fn liquidate_batch(
        &self,
        engine: &mut VaultEngine,
        ctx: &ExecutionContext<'_>,
        keeper: Address,
        targets: &[(Address, AssetId)],
    ) -> Vec<(Address, AssetId, Confiscation)> {
        let mut seized = Vec::new();
        for (owner, asset) in targets {
            match self.liquidate(engine, ctx, keeper, *owner, *asset) {
                Ok(LiquidationOutcome::Liquidated(confiscation)) => {
                    seized.push((*owner, *asset, confiscation))
                }
                Ok(LiquidationOutcome::Healthy { .. }) => {}
                Err(err) => debug!(%asset, code = err.code(), "skipping vault"),
            }
        }
        seized
    }

    /// Read-only sweep for keepers: every vault that is underwater at the
    /// current price. Vaults whose asset has no usable price are left out.
    pub fn scan(&self, engine: &VaultEngine, ctx: &ExecutionContext<'_>) -> Vec<Candidate> {
        engine
            .vaults_page(0, engine.vault_count())
            .iter()
            .filter_map(|view: &VaultView| engine.health(ctx, &view.owner, &view.asset).ok())
            .filter(can_liquidate)
            .map(|health| Candidate {
                owner: health.view.owner,
                asset: health.view.asset,
                collateral_value: health.collateral_value,
                required: health.required,
            })
            .collect()
    }
}
