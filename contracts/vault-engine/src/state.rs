//! Engine state records

use casper_types::U256;
use serde::{Deserialize, Serialize};

use keel_common::{
    constants::accounts,
    math, Address, AssetConfig, InterestPolicy, KeelResult, OracleAdapter, Timestamp,
};

/// Global supply and accrual state of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyState {
    /// Sum of vault normalized debt (unit scale)
    pub total_normalized_debt: U256,
    /// Sum of vault normalized equity (unit scale)
    pub total_normalized_equity: U256,
    /// Accumulator scale, starts at 1.0, never decreases
    pub debt_accumulator: U256,
    /// Accumulator scale, starts at 1.0
    pub equity_accumulator: U256,
    pub last_accrual: Timestamp,
    pub policy: InterestPolicy,
}

impl SupplyState {
    pub fn new(policy: InterestPolicy, now: Timestamp) -> Self {
        Self {
            total_normalized_debt: U256::zero(),
            total_normalized_equity: U256::zero(),
            debt_accumulator: math::ray(),
            equity_accumulator: math::ray(),
            last_accrual: now,
            policy,
        }
    }

    pub fn total_debt_value(&self) -> KeelResult<U256> {
        math::position_value(self.total_normalized_debt, self.debt_accumulator)
    }

    pub fn total_equity_value(&self) -> KeelResult<U256> {
        math::position_value(self.total_normalized_equity, self.equity_accumulator)
    }
}

/// Configuration plus supply state, stored per asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub config: AssetConfig,
    pub supply: SupplyState,
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account receiving interest spread, forfeited equity and seized collateral
    pub reserve: Address,
    pub oracle: OracleAdapter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { reserve: accounts::RESERVE, oracle: OracleAdapter::default() }
    }
}

/// Both sides of the conservation identity
///
/// `debt − equity + unbacked == ledger currency + externalized currency`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyReport {
    pub total_debt_value: U256,
    pub total_equity_value: U256,
    pub unbacked_debt: U256,
    pub ledger_currency: U256,
    pub externalized_currency: U256,
}

impl SupplyReport {
    pub fn is_balanced(&self) -> bool {
        let liabilities = self.total_debt_value.checked_add(self.unbacked_debt);
        let claims = self
            .total_equity_value
            .checked_add(self.ledger_currency)
            .and_then(|sum| sum.checked_add(self.externalized_currency));
        matches!((liabilities, claims), (Some(l), Some(c)) if l == c)
    }

    /// Currency issued in total, inside and outside the ledger
    pub fn outstanding_currency(&self) -> KeelResult<U256> {
        math::add(self.ledger_currency, self.externalized_currency)
    }
}

/// Result of `VaultEngine::health`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHealth {
    pub view: keel_common::VaultView,
    pub adjusted_price: U256,
    /// Collateral at the adjusted price (currency scale)
    pub collateral_value: U256,
    /// Debt value plus equity value (currency scale)
    pub required: U256,
}

impl VaultHealth {
    pub fn is_safe(&self) -> bool {
        self.collateral_value >= self.required
    }
}

/// What a confiscation moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confiscation {
    pub collateral_seized: U256,
    /// Paid to the keeper's standby balance
    pub keeper_share: U256,
    /// Paid to the reserve's standby balance
    pub reserve_share: U256,
    /// Debt moved to unbacked debt (currency scale)
    pub debt_value: U256,
    /// Equity forfeited to the reserve (currency scale)
    pub equity_value: U256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_supply_starts_at_one() {
        let supply = SupplyState::new(InterestPolicy::default(), 7);
        assert_eq!(supply.debt_accumulator, math::ray());
        assert_eq!(supply.equity_accumulator, math::ray());
        assert_eq!(supply.total_debt_value().unwrap(), U256::zero());
        assert_eq!(supply.last_accrual, 7);
    }

    #[test]
    fn test_report_balance() {
        let report = SupplyReport {
            total_debt_value: U256::from(100u64),
            total_equity_value: U256::from(40u64),
            unbacked_debt: U256::from(5u64),
            ledger_currency: U256::from(50u64),
            externalized_currency: U256::from(15u64),
        };
        assert!(report.is_balanced());
        assert_eq!(report.outstanding_currency().unwrap(), U256::from(65u64));

        let skewed = SupplyReport { unbacked_debt: U256::zero(), ..report };
        assert!(!skewed.is_balanced());
    }
}
