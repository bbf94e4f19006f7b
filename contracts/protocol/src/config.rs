//! Runtime configuration
//!
//! `KeelConfig` is the JSON document a deployment is started from. Amounts
//! are written in human units as decimal strings ("1.5", "1000000") and
//! converted to their fixed-point tier on [`KeelConfig::resolve`]:
//!
//! | field                   | tier        |
//! |-------------------------|-------------|
//! | `debt_ceiling`          | currency    |
//! | `vault_limit`           | currency    |
//! | `debt_floor`            | unit        |
//! | `liquidation_ratio`     | unit        |
//! | `debt_rate_per_second`  | accumulator |
//! | bridge `min_amount` etc | unit        |
//!
//! Addresses are 64 hex characters.

use casper_types::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;

use keel_bridge::BridgeConfig;
use keel_common::{
    constants::{
        accounts,
        bridge::{DEFAULT_MAX_AMOUNT, DEFAULT_MIN_AMOUNT},
        fees::{DEFAULT_LIQUIDATION_PENALTY_BPS, DEFAULT_PROTOCOL_FEE_BPS},
        oracle::DEFAULT_MAX_PRICE_AGE_SECS,
        scale::{ACCUMULATOR_DECIMALS, CURRENCY_DECIMALS, UNIT_DECIMALS},
    },
    math, Address, AssetBacking, AssetConfig, AssetId, DebtLimit, InterestPolicy, KeelError,
    KeelResult, OracleAdapter,
};
use keel_liquidator::LiquidatorConfig;
use keel_vault_engine::EngineConfig;

use crate::logging::LoggingConfig;

/// Component addresses used when a section leaves them out
pub mod default_addresses {
    use keel_common::Address;

    pub const TREASURY: Address = [0xA1; 32];
    pub const LIQUIDATOR: Address = [0xA2; 32];
    pub const BRIDGE: Address = [0xA3; 32];
}

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeelConfig {
    /// Initial holder of `Role::Governance`. Required.
    pub governor: String,
    pub logging: LoggingConfig,
    pub engine: EngineSection,
    pub assets: Vec<AssetSection>,
    pub liquidator: LiquidatorSection,
    pub treasury: TreasurySection,
    pub bridge: BridgeSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Defaults to the well-known reserve account
    pub reserve: Option<String>,
    pub max_price_age_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { reserve: None, max_price_age_secs: DEFAULT_MAX_PRICE_AGE_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackingSection {
    Native,
    Token { contract: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetSection {
    pub symbol: String,
    #[serde(default = "native_backing")]
    pub backing: BackingSection,
    pub debt_ceiling: String,
    pub debt_floor: String,
    /// Absent means no per-vault limit
    #[serde(default)]
    pub vault_limit: Option<String>,
    pub liquidation_ratio: String,
    #[serde(default = "flat_rate")]
    pub debt_rate_per_second: String,
    #[serde(default = "default_fee")]
    pub protocol_fee_bps: u64,
}

fn native_backing() -> BackingSection {
    BackingSection::Native
}

fn flat_rate() -> String {
    "1".into()
}

fn default_fee() -> u64 {
    DEFAULT_PROTOCOL_FEE_BPS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiquidatorSection {
    pub address: Option<String>,
    pub penalty_bps: u64,
}

impl Default for LiquidatorSection {
    fn default() -> Self {
        Self { address: None, penalty_bps: DEFAULT_LIQUIDATION_PENALTY_BPS }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreasurySection {
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSection {
    pub address: Option<String>,
    pub enabled: bool,
    pub min_amount: String,
    pub max_amount: String,
    pub validate_destination: bool,
    pub escrow_account: Option<String>,
    pub settlement_account: Option<String>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            address: None,
            enabled: true,
            min_amount: DEFAULT_MIN_AMOUNT.to_string(),
            max_amount: DEFAULT_MAX_AMOUNT.to_string(),
            validate_destination: true,
            escrow_account: None,
            settlement_account: None,
        }
    }
}

// ============================================================================
// Resolved form
// ============================================================================

/// One asset ready for `VaultEngine::init_asset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetParams {
    pub id: AssetId,
    pub config: AssetConfig,
    pub policy: InterestPolicy,
}

/// Typed, scaled and validated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub governor: Address,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub assets: Vec<AssetParams>,
    pub liquidator_address: Address,
    pub liquidator: LiquidatorConfig,
    pub treasury_address: Address,
    pub bridge_address: Address,
    pub bridge: BridgeConfig,
}

impl KeelConfig {
    pub fn from_json(json: &str) -> KeelResult<Self> {
        serde_json::from_str(json).map_err(|e| KeelError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> KeelResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| KeelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> KeelResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| KeelError::Config(e.to_string()))
    }

    /// Parse every field into its typed form and validate each section.
    pub fn resolve(&self) -> KeelResult<ResolvedConfig> {
        let governor = parse_address("governor", &self.governor)?;

        let engine = EngineConfig {
            reserve: optional_address("engine.reserve", &self.engine.reserve, accounts::RESERVE)?,
            oracle: OracleAdapter::new(self.engine.max_price_age_secs),
        };

        let assets = self.assets.iter().map(AssetSection::resolve).collect::<KeelResult<Vec<_>>>()?;

        let liquidator = LiquidatorConfig { penalty_bps: self.liquidator.penalty_bps };
        liquidator.validate()?;

        let bridge = BridgeConfig {
            enabled: self.bridge.enabled,
            min_amount: parse_unit_u128("bridge.min_amount", &self.bridge.min_amount)?,
            max_amount: parse_unit_u128("bridge.max_amount", &self.bridge.max_amount)?,
            validate_destination: self.bridge.validate_destination,
            escrow_account: optional_address(
                "bridge.escrow_account",
                &self.bridge.escrow_account,
                accounts::BRIDGE_ESCROW,
            )?,
            settlement_account: optional_address(
                "bridge.settlement_account",
                &self.bridge.settlement_account,
                accounts::BRIDGE_SETTLEMENT,
            )?,
        };
        bridge.validate()?;

        Ok(ResolvedConfig {
            governor,
            logging: self.logging.clone(),
            engine,
            assets,
            liquidator_address: optional_address(
                "liquidator.address",
                &self.liquidator.address,
                default_addresses::LIQUIDATOR,
            )?,
            liquidator,
            treasury_address: optional_address(
                "treasury.address",
                &self.treasury.address,
                default_addresses::TREASURY,
            )?,
            bridge_address: optional_address(
                "bridge.address",
                &self.bridge.address,
                default_addresses::BRIDGE,
            )?,
            bridge,
        })
    }
}

impl AssetSection {
    fn resolve(&self) -> KeelResult<AssetParams> {
        let id = AssetId::new(&self.symbol)?;
        let field = |name: &str| format!("assets.{}.{name}", self.symbol);

        let backing = match &self.backing {
            BackingSection::Native => AssetBacking::Native,
            BackingSection::Token { contract } => {
                let contract = parse_address(&field("backing.contract"), contract)?;
                AssetBacking::Token { contract }
            }
        };
        let vault_limit = match &self.vault_limit {
            None => DebtLimit::Unlimited,
            Some(limit) => {
                DebtLimit::Capped(parse_amount(&field("vault_limit"), limit, CURRENCY_DECIMALS)?)
            }
        };
        let config = AssetConfig {
            backing,
            debt_ceiling: parse_amount(
                &field("debt_ceiling"),
                &self.debt_ceiling,
                CURRENCY_DECIMALS,
            )?,
            debt_floor: parse_amount(&field("debt_floor"), &self.debt_floor, UNIT_DECIMALS)?,
            vault_limit,
            liquidation_ratio: parse_amount(
                &field("liquidation_ratio"),
                &self.liquidation_ratio,
                UNIT_DECIMALS,
            )?,
            version: 0,
        };
        config.validate()?;

        let policy = InterestPolicy {
            debt_rate_per_second: parse_amount(
                &field("debt_rate_per_second"),
                &self.debt_rate_per_second,
                ACCUMULATOR_DECIMALS,
            )?,
            protocol_fee_bps: self.protocol_fee_bps,
        };
        policy.validate()?;

        Ok(AssetParams { id, config, policy })
    }
}

// ============================================================================
// Field parsing
// ============================================================================

/// Decimal string in human units to a fixed-point value with `decimals`
/// fractional digits. Extra precision is rejected, not rounded.
pub fn parse_amount(field: &str, value: &str, decimals: usize) -> KeelResult<U256> {
    let invalid = |reason: &str| KeelError::Config(format!("{field}: {value:?} {reason}"));

    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("is empty"));
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("is not a non-negative decimal"));
    }
    if fraction.len() > decimals {
        return Err(invalid(&format!("has more than {decimals} decimal places")));
    }

    let digits = format!("{whole}{fraction:0<decimals$}");
    U256::from_dec_str(&digits).map_err(|_| invalid("is out of range"))
}

fn parse_unit_u128(field: &str, value: &str) -> KeelResult<u128> {
    let amount = parse_amount(field, value, UNIT_DECIMALS)?;
    math::to_u128(amount)
        .map_err(|_| KeelError::Config(format!("{field}: {value:?} is out of range")))
}

pub fn parse_address(field: &str, value: &str) -> KeelResult<Address> {
    let mut address = [0u8; 32];
    hex::decode_to_slice(value.trim_start_matches("0x"), &mut address)
        .map_err(|e| KeelError::Config(format!("{field}: {value:?}: {e}")))?;
    Ok(address)
}

fn optional_address(field: &str, value: &Option<String>, default: Address) -> KeelResult<Address> {
    value.as_deref().map_or(Ok(default), |v| parse_address(field, v))
}
