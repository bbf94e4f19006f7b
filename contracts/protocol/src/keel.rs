//! The assembled protocol
//!
//! [`Keel`] owns one instance of every component together with the
//! in-memory collaborators they consult (role registry, price feed,
//! collateral custody, external token) and builds the per-call
//! [`ExecutionContext`] from a caller address and a timestamp.

use casper_types::U256;
use tracing::info;

use keel_bridge::{Bridge, ConfirmOutcome, TransferKey, TransferRecord};
use keel_common::{
    math, Address, AssetConfig, AssetId, AssetUpdate, CurrencyToken, CustodyBook, ExecutionContext,
    InterestPolicy, KeelResult, LedgerEvent, LedgerToken, Registry, Role, RoleRegistry,
    StaticPriceFeed, Timestamp, VaultView,
};
use keel_liquidator::{Candidate, LiquidationOutcome, Liquidator};
use keel_treasury::Treasury;
use keel_vault_engine::{AccrualStep, Confiscation, SupplyReport, VaultEngine};

use crate::config::{KeelConfig, ResolvedConfig};
use crate::logging::{self, LoggingConfig};

/// Context for `$caller` at `$now` over the facade's registry and feed.
/// Borrows only those two fields so components stay mutably borrowable.
macro_rules! ctx {
    ($keel:expr, $caller:expr, $now:expr) => {
        ExecutionContext::new($caller, $now, &$keel.registry, &$keel.prices)
    };
}

pub struct Keel {
    logging: LoggingConfig,
    registry: RoleRegistry,
    prices: StaticPriceFeed,
    custody: CustodyBook,
    token: LedgerToken,
    engine: VaultEngine,
    liquidator: Liquidator,
    treasury: Treasury,
    bridge: Bridge,
}

impl Keel {
    pub fn from_config(config: &KeelConfig, now: Timestamp) -> KeelResult<Self> {
        Self::from_resolved(config.resolve()?, now)
    }

    /// Grant the system roles to the component addresses, reserve the
    /// bridge accounts and register every configured asset under the
    /// governor.
    pub fn from_resolved(config: ResolvedConfig, now: Timestamp) -> KeelResult<Self> {
        let governor = config.governor;
        let mut registry = RoleRegistry::new(governor, now);
        registry.grant(&governor, config.treasury_address, Role::Treasury, now)?;
        registry.grant(&governor, config.liquidator_address, Role::Liquidator, now)?;
        registry.grant(&governor, config.bridge_address, Role::Bridge, now)?;

        let prices = StaticPriceFeed::new();
        let mut engine = VaultEngine::new(config.engine);
        {
            let ctx = ExecutionContext::new(governor, now, &registry, &prices);
            engine.reserve_bridge_account(&ctx, config.bridge.escrow_account)?;
            engine.reserve_bridge_account(&ctx, config.bridge.settlement_account)?;
            for asset in &config.assets {
                engine.init_asset(&ctx, asset.id, asset.config.clone(), asset.policy)?;
            }
        }

        info!(assets = config.assets.len(), "keel assembled");
        Ok(Self {
            logging: config.logging,
            registry,
            prices,
            custody: CustodyBook::new(),
            token: LedgerToken::new(config.treasury_address),
            engine,
            liquidator: Liquidator::new(config.liquidator_address, config.liquidator)?,
            treasury: Treasury::new(config.treasury_address),
            bridge: Bridge::new(config.bridge_address, config.bridge)?,
        })
    }

    /// Install the process-wide subscriber from the `logging` section.
    /// Only the first call in a process succeeds.
    pub fn init_logging(&self) -> KeelResult<()> {
        logging::init_logging(&self.logging)
    }

    // ========================================================================
    // Governance
    // ========================================================================

    pub fn grant_role(
        &mut self,
        caller: Address,
        address: Address,
        role: Role,
        now: Timestamp,
    ) -> KeelResult<()> {
        self.registry.grant(&caller, address, role, now)
    }

    pub fn revoke_role(
        &mut self,
        caller: Address,
        address: Address,
        role: Role,
    ) -> KeelResult<bool> {
        self.registry.revoke(&caller, &address, role)
    }

    /// Post a raw price observation (governance operates the feed).
    pub fn post_price(
        &mut self,
        caller: Address,
        asset: AssetId,
        price: U256,
        now: Timestamp,
    ) -> KeelResult<()> {
        self.registry.require(&caller, Role::Governance)?;
        self.prices.set_price(asset, price, now);
        Ok(())
    }

    pub fn init_asset(
        &mut self,
        caller: Address,
        asset: AssetId,
        config: AssetConfig,
        policy: InterestPolicy,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.engine.init_asset(&ctx, asset, config, policy)
    }

    pub fn update_asset(
        &mut self,
        caller: Address,
        asset: AssetId,
        update: &AssetUpdate,
        now: Timestamp,
    ) -> KeelResult<u64> {
        let ctx = ctx!(self, caller, now);
        self.engine.update_asset(&ctx, &asset, update)
    }

    pub fn set_interest_policy(
        &mut self,
        caller: Address,
        asset: AssetId,
        policy: InterestPolicy,
        now: Timestamp,
    ) -> KeelResult<AccrualStep> {
        let ctx = ctx!(self, caller, now);
        self.engine.set_interest_policy(&ctx, &asset, policy)
    }

    pub fn settle_unbacked_debt(
        &mut self,
        caller: Address,
        amount: U256,
        now: Timestamp,
    ) -> KeelResult<U256> {
        let ctx = ctx!(self, caller, now);
        self.engine.settle_unbacked_debt(&ctx, amount)
    }

    pub fn set_bridge_enabled(
        &mut self,
        caller: Address,
        enabled: bool,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.bridge.set_enabled(&ctx, enabled)
    }

    // ========================================================================
    // Vaults
    // ========================================================================

    /// Credit an owner's wallet with collateral arriving from outside.
    pub fn fund_wallet(&mut self, owner: Address, asset: AssetId, amount: U256) -> KeelResult<()> {
        self.custody.fund(owner, asset, amount)
    }

    pub fn deposit_collateral(
        &mut self,
        caller: Address,
        asset: AssetId,
        amount: U256,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.engine.deposit_collateral(&ctx, &mut self.custody, caller, asset, amount)
    }

    pub fn withdraw_collateral(
        &mut self,
        caller: Address,
        asset: AssetId,
        amount: U256,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.engine.withdraw_collateral(&ctx, &mut self.custody, caller, asset, amount)
    }

    /// Signed unit-scale deltas on the caller's vault.
    pub fn open_or_update(
        &mut self,
        caller: Address,
        asset: AssetId,
        collateral_delta: i128,
        debt_delta: i128,
        equity_delta: i128,
        now: Timestamp,
    ) -> KeelResult<VaultView> {
        let ctx = ctx!(self, caller, now);
        self.engine.open_or_update(&ctx, caller, asset, collateral_delta, debt_delta, equity_delta)
    }

    pub fn close(&mut self, caller: Address, asset: AssetId, now: Timestamp) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.engine.close(&ctx, caller, asset)
    }

    pub fn accrue(
        &mut self,
        caller: Address,
        asset: AssetId,
        now: Timestamp,
    ) -> KeelResult<AccrualStep> {
        let ctx = ctx!(self, caller, now);
        self.engine.accrue(&ctx, &asset)
    }

    // ========================================================================
    // Currency
    // ========================================================================

    /// Ledger currency → external token, `amount` in units.
    pub fn withdraw_currency(
        &mut self,
        caller: Address,
        amount: U256,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.treasury.withdraw_currency(&mut self.engine, &mut self.token, &ctx, caller, amount)
    }

    /// External token → ledger currency, `amount` in units.
    pub fn deposit_currency(
        &mut self,
        caller: Address,
        amount: U256,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.treasury.deposit_currency(&mut self.engine, &mut self.token, &ctx, caller, amount)
    }

    pub fn transfer_currency(
        &mut self,
        caller: Address,
        to: Address,
        amount: U256,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.treasury.transfer_currency(&mut self.engine, &ctx, caller, to, amount)
    }

    /// Move external token between wallets; the ledger is not involved.
    pub fn transfer_token(&mut self, from: Address, to: Address, amount: U256) -> KeelResult<()> {
        self.token.transfer(&from, &to, amount)
    }

    // ========================================================================
    // Liquidation
    // ========================================================================

    /// `caller` is the keeper and receives the penalty share.
    pub fn liquidate(
        &mut self,
        caller: Address,
        owner: Address,
        asset: AssetId,
        now: Timestamp,
    ) -> KeelResult<LiquidationOutcome> {
        let ctx = ctx!(self, caller, now);
        self.liquidator.liquidate(&mut self.engine, &ctx, caller, owner, asset)
    }

    pub fn liquidate_batch(
        &mut self,
        caller: Address,
        targets: &[(Address, AssetId)],
        now: Timestamp,
    ) -> Vec<(Address, AssetId, Confiscation)> {
        let ctx = ctx!(self, caller, now);
        self.liquidator.liquidate_batch(&mut self.engine, &ctx, caller, targets)
    }

    pub fn scan(&self, now: Timestamp) -> Vec<Candidate> {
        let ctx = ctx!(self, *self.liquidator.address(), now);
        self.liquidator.scan(&self.engine, &ctx)
    }

    // ========================================================================
    // Bridge
    // ========================================================================

    pub fn submit_transfer(
        &mut self,
        caller: Address,
        destination: &str,
        amount: u128,
        nonce: u64,
        now: Timestamp,
    ) -> KeelResult<TransferKey> {
        let ctx = ctx!(self, caller, now);
        self.bridge.submit(&mut self.engine, &ctx, caller, destination, amount, nonce)
    }

    pub fn dispatch_transfer(
        &mut self,
        caller: Address,
        key: &TransferKey,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.bridge.dispatch(&ctx, key)
    }

    pub fn confirm_transfer(
        &mut self,
        caller: Address,
        key: &TransferKey,
        external_tx_id: &str,
        now: Timestamp,
    ) -> KeelResult<ConfirmOutcome> {
        let ctx = ctx!(self, caller, now);
        self.bridge.confirm(&mut self.engine, &ctx, key, external_tx_id)
    }

    pub fn cancel_transfer(
        &mut self,
        caller: Address,
        key: &TransferKey,
        now: Timestamp,
    ) -> KeelResult<()> {
        let ctx = ctx!(self, caller, now);
        self.bridge.cancel(&mut self.engine, &ctx, key)
    }

    pub fn transfer(&self, key: &TransferKey) -> Option<&TransferRecord> {
        self.bridge.get(key)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn read(&self, owner: &Address, asset: &AssetId) -> KeelResult<VaultView> {
        self.engine.read(owner, asset)
    }

    pub fn preview(
        &self,
        owner: &Address,
        asset: &AssetId,
        now: Timestamp,
    ) -> KeelResult<VaultView> {
        self.engine.preview(owner, asset, now)
    }

    pub fn supply_report(&self) -> KeelResult<SupplyReport> {
        self.engine.supply_report()
    }

    /// The supply identity holds, the external token matches the
    /// externalized amount, and the bridge escrow is exactly funded.
    pub fn is_consistent(&self) -> KeelResult<bool> {
        let report = self.engine.supply_report()?;
        let externalized_units = math::currency_to_unit(report.externalized_currency)?;
        let escrow = self.engine.currency_balance(&self.bridge.config().escrow_account);
        Ok(report.is_balanced()
            && externalized_units == self.token.total_supply()
            && escrow == self.bridge.escrowed_value()?)
    }

    pub fn engine(&self) -> &VaultEngine {
        &self.engine
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn liquidator(&self) -> &Liquidator {
        &self.liquidator
    }

    pub fn token(&self) -> &LedgerToken {
        &self.token
    }

    pub fn custody(&self) -> &CustodyBook {
        &self.custody
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    /// Engine and bridge events since the last drain, ordered by time.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        let mut events = self.engine.events_mut().drain();
        events.extend(self.bridge.events_mut().drain());
        events.sort_by_key(LedgerEvent::at);
        events
    }
}
