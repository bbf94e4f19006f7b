//! Teller - interest accrual
//!
//! Each asset carries a debt accumulator that compounds once per second at
//! the policy rate:
//!
//! ```text
//! debt_acc'   = debt_acc × rate^elapsed
//! Δdebt       = total_normalized_debt × (debt_acc' − debt_acc)
//! fee         = Δdebt × protocol_fee_bps / 10_000
//! equity_acc' = equity_acc + (Δdebt − fee) / total_normalized_equity
//! reserve    += Δdebt − total_normalized_equity × (equity_acc' − equity_acc)
//! ```
//!
//! Every value is exact or truncated downward, and the reserve absorbs the
//! rounding remainder, so accrual never breaks the supply identity.
//! Accrual is lazy: operations project it onto a staged copy before acting
//! and commit it together with their own writes.

use casper_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keel_common::{
    math, AssetId, ExecutionContext, InterestPolicy, KeelError, KeelResult, LedgerEvent, Role,
    Timestamp,
};

use crate::engine::VaultEngine;
use crate::state::SupplyState;

/// Outcome of one accrual step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualStep {
    pub elapsed: u64,
    /// Growth in total debt value (currency scale)
    pub debt_value_increase: U256,
    /// Protocol's cut of the growth
    pub fee: U256,
    /// Growth in total equity value (currency scale)
    pub equity_value_increase: U256,
    /// Currency credited to the reserve
    pub reserve_credit: U256,
}

impl AccrualStep {
    pub fn is_noop(&self) -> bool {
        self.elapsed == 0
    }
}

/// Supply state advanced to `now`. The input is not modified.
pub fn project(supply: &SupplyState, now: Timestamp) -> KeelResult<(SupplyState, AccrualStep)> {
    if now < supply.last_accrual {
        return Err(KeelError::InvalidParameter(format!(
            "accrual time {now} precedes last accrual {}",
            supply.last_accrual
        )));
    }
    let elapsed = now - supply.last_accrual;
    if elapsed == 0 {
        return Ok((supply.clone(), AccrualStep::default()));
    }

    let growth = math::rpow(supply.policy.debt_rate_per_second, elapsed)?;
    let debt_accumulator = math::rmul(supply.debt_accumulator, growth)?;
    let debt_value_increase = math::mul(
        supply.total_normalized_debt,
        math::sub(debt_accumulator, supply.debt_accumulator)?,
    )?;
    let fee = math::bps_of(debt_value_increase, supply.policy.protocol_fee_bps)?;

    let equity_accumulator_delta = if supply.total_normalized_equity.is_zero() {
        U256::zero()
    } else {
        math::div(math::sub(debt_value_increase, fee)?, supply.total_normalized_equity)?
    };
    let equity_value_increase =
        math::mul(supply.total_normalized_equity, equity_accumulator_delta)?;
    let reserve_credit = math::sub(debt_value_increase, equity_value_increase)?;

    let next = SupplyState {
        debt_accumulator,
        equity_accumulator: math::add(supply.equity_accumulator, equity_accumulator_delta)?,
        last_accrual: now,
        ..supply.clone()
    };
    let step =
        AccrualStep { elapsed, debt_value_increase, fee, equity_value_increase, reserve_credit };
    Ok((next, step))
}

impl VaultEngine {
    /// Bring `asset` up to `ctx.now`. Anyone may call this.
    pub fn accrue(
        &mut self,
        ctx: &ExecutionContext<'_>,
        asset: &AssetId,
    ) -> KeelResult<AccrualStep> {
        let record = self.asset_record(asset)?;
        let (supply, step) = project(&record.supply, ctx.now)?;
        self.commit_accrual(asset, supply, &step, ctx.now)?;
        Ok(step)
    }

    /// Install a new interest policy. Interest up to `ctx.now` accrues under
    /// the old policy first.
    pub fn set_interest_policy(
        &mut self,
        ctx: &ExecutionContext<'_>,
        asset: &AssetId,
        policy: InterestPolicy,
    ) -> KeelResult<AccrualStep> {
        ctx.require_role(Role::Governance)?;
        policy.validate()?;
        let record = self.asset_record(asset)?;
        let (mut supply, step) = project(&record.supply, ctx.now)?;
        supply.policy = policy;

        self.commit_accrual(asset, supply, &step, ctx.now)?;
        self.emit(LedgerEvent::InterestPolicyChanged {
            asset: *asset,
            debt_rate_per_second: policy.debt_rate_per_second,
            protocol_fee_bps: policy.protocol_fee_bps,
            at: ctx.now,
        });
        info!(
            %asset,
            rate = %policy.debt_rate_per_second,
            fee_bps = policy.protocol_fee_bps,
            "interest policy updated"
        );
        Ok(step)
    }

    fn commit_accrual(
        &mut self,
        asset: &AssetId,
        supply: SupplyState,
        step: &AccrualStep,
        now: Timestamp,
    ) -> KeelResult<()> {
        let reserve = self.config().reserve;
        let reserve_balance = math::add(self.currency_balance(&reserve), step.reserve_credit)?;

        self.set_currency(reserve, reserve_balance);
        self.record_accrual(asset, &supply, step, now);
        self.set_supply(asset, supply);
        if !step.is_noop() {
            debug!(
                %asset,
                elapsed = step.elapsed,
                reserve_credit = %step.reserve_credit,
                "accrued"
            );
        }
        Ok(())
    }
}
