//! Vault Engine
//!
//! Single source of truth for collateral, debt, equity and system currency.
//! Every mutating operation follows the same shape:
//!
//! 1. authorize the caller
//! 2. project accrual for the asset onto a staged supply copy
//! 3. stage every balance change and run every check
//! 4. commit all staged writes at once
//!
//! A failure in steps 1-3 returns before anything is written, so callers
//! never observe a partial update (accrual included).

use casper_types::U256;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use keel_common::{
    math, Address, AssetConfig, AssetId, AssetUpdate, CollateralCustody, EventLog,
    ExecutionContext, InterestPolicy, KeelError, KeelResult, LedgerEvent, Role, Timestamp, Vault,
    VaultView,
};

use crate::staging::{commit, Staged};
use crate::state::{
    AssetRecord, Confiscation, EngineConfig, SupplyReport, SupplyState, VaultHealth,
};
use crate::teller::{self, AccrualStep};

type VaultKey = (Address, AssetId);

/// The ledger
#[derive(Debug, Clone, Default)]
pub struct VaultEngine {
    config: EngineConfig,
    assets: BTreeMap<AssetId, AssetRecord>,
    vaults: BTreeMap<VaultKey, Vault>,
    /// Insertion order, for display paging only
    vault_index: Vec<VaultKey>,
    /// Collateral held by the engine outside any vault (unit scale)
    standby: BTreeMap<VaultKey, U256>,
    /// System currency balances (currency scale)
    currency: BTreeMap<Address, U256>,
    /// Debt taken over from confiscated vaults (currency scale)
    unbacked_debt: U256,
    /// Currency living outside the ledger as the external token (currency scale)
    externalized: U256,
    /// Accounts only the bridge may credit
    bridge_accounts: BTreeSet<Address>,
    events: EventLog,
}

impl VaultEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, ..Default::default() }
    }

    // ========================================================================
    // Governance
    // ========================================================================

    /// Register a collateral asset with its risk parameters and interest policy.
    pub fn init_asset(
        &mut self,
        ctx: &ExecutionContext<'_>,
        asset: AssetId,
        config: AssetConfig,
        policy: InterestPolicy,
    ) -> KeelResult<()> {
        ctx.require_role(Role::Governance)?;
        if self.assets.contains_key(&asset) {
            return Err(KeelError::AssetAlreadyExists { asset });
        }
        config.validate()?;
        policy.validate()?;

        let version = config.version;
        self.assets
            .insert(asset, AssetRecord { config, supply: SupplyState::new(policy, ctx.now) });
        self.emit(LedgerEvent::AssetInitialized { asset, version, at: ctx.now });
        info!(%asset, version, "asset initialized");
        Ok(())
    }

    /// Apply a governance change set; returns the new config version.
    pub fn update_asset(
        &mut self,
        ctx: &ExecutionContext<'_>,
        asset: &AssetId,
        update: &AssetUpdate,
    ) -> KeelResult<u64> {
        ctx.require_role(Role::Governance)?;
        let next = update.apply_to(&self.asset_record(asset)?.config)?;
        let version = next.version;

        if let Some(record) = self.assets.get_mut(asset) {
            record.config = next;
        }
        self.emit(LedgerEvent::AssetUpdated { asset: *asset, version, at: ctx.now });
        info!(%asset, version, "asset config updated");
        Ok(version)
    }

    /// Reserve `account` for the bridge: from now on only a `Role::Bridge`
    /// caller may move currency into it.
    pub fn reserve_bridge_account(
        &mut self,
        ctx: &ExecutionContext<'_>,
        account: Address,
    ) -> KeelResult<()> {
        ctx.require_role(Role::Governance)?;
        self.bridge_accounts.insert(account);
        Ok(())
    }

    // ========================================================================
    // Vault operations
    // ========================================================================

    /// Apply signed deltas (unit scale) to the caller's vault.
    ///
    /// * `collateral_delta` moves collateral between standby and the vault.
    /// * `debt_delta` draws (credits the owner `delta × debt_accumulator`
    ///   currency) or repays (debits it).
    /// * `equity_delta` supplies (debits `delta × equity_accumulator`) or
    ///   withdraws (credits it).
    ///
    /// Updates that add risk (more debt or equity, less collateral) are
    /// priced at a fresh oracle price and must stay fully backed.
    pub fn open_or_update(
        &mut self,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        asset: AssetId,
        collateral_delta: i128,
        debt_delta: i128,
        equity_delta: i128,
    ) -> KeelResult<VaultView> {
        ctx.require_owner(&owner, Role::Whitelisted)?;
        let record = self.asset_record(&asset)?;
        let config = &record.config;
        let (mut supply, step) = teller::project(&record.supply, ctx.now)?;

        let key = (owner, asset);
        let before = self.vaults.get(&key).cloned().unwrap_or_default();
        let mut standby = Staged::new(&self.standby);
        let mut currency = Staged::new(&self.currency);
        currency.credit(self.config.reserve, step.reserve_credit)?;

        // Collateral: standby <-> vault
        let collateral = shift(before.collateral, collateral_delta)?;
        if collateral_delta > 0 {
            standby.debit(key, magnitude(collateral_delta))?;
        } else {
            standby.credit(key, magnitude(collateral_delta))?;
        }

        // Positions
        let normalized_debt = shift(before.normalized_debt, debt_delta)?;
        let normalized_equity = shift(before.normalized_equity, equity_delta)?;
        supply.total_normalized_debt = math::apply_delta(supply.total_normalized_debt, debt_delta)?;
        supply.total_normalized_equity =
            math::apply_delta(supply.total_normalized_equity, equity_delta)?;

        // Currency legs: credits first so a draw can fund a supply in one call
        let debt_cash = math::position_value(magnitude(debt_delta), supply.debt_accumulator)?;
        let equity_cash = math::position_value(magnitude(equity_delta), supply.equity_accumulator)?;
        if debt_delta > 0 {
            currency.credit(owner, debt_cash)?;
        }
        if equity_delta < 0 {
            currency.credit(owner, equity_cash)?;
        }
        if debt_delta < 0 {
            currency.debit(owner, debt_cash)?;
        }
        if equity_delta > 0 {
            currency.debit(owner, equity_cash)?;
        }

        // Caps
        let debt_value = math::position_value(normalized_debt, supply.debt_accumulator)?;
        let equity_value = math::position_value(normalized_equity, supply.equity_accumulator)?;
        if debt_delta > 0 {
            let total = supply.total_debt_value()?;
            if total > config.debt_ceiling {
                return Err(KeelError::DebtCeilingExceeded {
                    limit: config.debt_ceiling,
                    attempted: total,
                });
            }
            config.vault_limit.check(debt_value)?;
        }
        let floor = config.floor_value()?;
        for (delta, value) in [(debt_delta, debt_value), (equity_delta, equity_value)] {
            if delta != 0 && !value.is_zero() && value < floor {
                return Err(KeelError::DebtFloorNotMet { floor, position: value });
            }
        }

        // Backing
        let adds_risk = debt_delta > 0 || equity_delta > 0 || collateral_delta < 0;
        let required = math::add(debt_value, equity_value)?;
        if adds_risk && !required.is_zero() {
            if collateral.is_zero() {
                return Err(KeelError::InsufficientCollateral {
                    collateral_value: U256::zero(),
                    required,
                });
            }
            let price = self.config.oracle.adjusted_price(
                ctx.prices,
                &asset,
                config.liquidation_ratio,
                ctx.now,
            )?;
            let collateral_value = config.backing.collateral_value(collateral, price)?;
            if collateral_value < required {
                return Err(KeelError::InsufficientCollateral { collateral_value, required });
            }
        }

        // Commit
        let vault = Vault { collateral, normalized_debt, normalized_equity };
        let view = self.view_of(owner, asset, &vault, &supply)?;
        let standby_changes = standby.into_changes();
        let currency_changes = currency.into_changes();

        commit(&mut self.standby, standby_changes);
        commit(&mut self.currency, currency_changes);
        self.record_accrual(&asset, &supply, &step, ctx.now);
        self.set_supply(&asset, supply);
        if !self.vaults.contains_key(&key) {
            self.vault_index.push(key);
        }
        self.vaults.insert(key, vault.clone());
        self.emit(LedgerEvent::VaultUpdated {
            owner,
            asset,
            collateral_delta,
            debt_delta,
            equity_delta,
            collateral: vault.collateral,
            normalized_debt: vault.normalized_debt,
            normalized_equity: vault.normalized_equity,
            at: ctx.now,
        });
        info!(%asset, collateral_delta, debt_delta, equity_delta, "vault updated");
        Ok(view)
    }

    /// Remove an empty vault.
    pub fn close(
        &mut self,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        asset: AssetId,
    ) -> KeelResult<()> {
        ctx.require_owner(&owner, Role::Whitelisted)?;
        let key = (owner, asset);
        let vault = self.vaults.get(&key).ok_or(KeelError::VaultNotFound { asset })?;
        if !vault.is_empty() {
            return Err(KeelError::VaultNotEmpty);
        }

        self.vaults.remove(&key);
        self.vault_index.retain(|k| k != &key);
        self.emit(LedgerEvent::VaultClosed { owner, asset, at: ctx.now });
        info!(%asset, "vault closed");
        Ok(())
    }

    /// Vault as stored, valued at the last committed accumulators.
    pub fn read(&self, owner: &Address, asset: &AssetId) -> KeelResult<VaultView> {
        let record = self.asset_record(asset)?;
        let vault = self
            .vaults
            .get(&(*owner, *asset))
            .ok_or(KeelError::VaultNotFound { asset: *asset })?;
        self.view_of(*owner, *asset, vault, &record.supply)
    }

    /// Vault valued as if accrual ran at `now`. Writes nothing.
    pub fn preview(
        &self,
        owner: &Address,
        asset: &AssetId,
        now: Timestamp,
    ) -> KeelResult<VaultView> {
        let record = self.asset_record(asset)?;
        let vault = self
            .vaults
            .get(&(*owner, *asset))
            .ok_or(KeelError::VaultNotFound { asset: *asset })?;
        let (supply, _) = teller::project(&record.supply, now)?;
        self.view_of(*owner, *asset, vault, &supply)
    }

    /// Projected vault against a fresh adjusted price. Writes nothing.
    pub fn health(
        &self,
        ctx: &ExecutionContext<'_>,
        owner: &Address,
        asset: &AssetId,
    ) -> KeelResult<VaultHealth> {
        let view = self.preview(owner, asset, ctx.now)?;
        let config = &self.asset_record(asset)?.config;
        let adjusted_price = self.config.oracle.adjusted_price(
            ctx.prices,
            asset,
            config.liquidation_ratio,
            ctx.now,
        )?;
        let collateral_value = config.backing.collateral_value(view.collateral, adjusted_price)?;
        let required = view.backed_value()?;
        Ok(VaultHealth { view, adjusted_price, collateral_value, required })
    }

    // ========================================================================
    // Standby collateral
    // ========================================================================

    /// Pull collateral from the owner's wallet into standby.
    pub fn deposit_collateral(
        &mut self,
        ctx: &ExecutionContext<'_>,
        custody: &mut dyn CollateralCustody,
        owner: Address,
        asset: AssetId,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_owner(&owner, Role::Whitelisted)?;
        let backing = self.asset_record(&asset)?.config.backing;
        let key = (owner, asset);
        let next = math::add(self.standby_collateral(&owner, &asset), amount)?;

        custody.deposit(&backing, &asset, &owner, amount)?;
        self.standby.insert(key, next);
        self.emit(LedgerEvent::CollateralDeposited { owner, asset, amount, at: ctx.now });
        debug!(%asset, %amount, "collateral deposited");
        Ok(())
    }

    /// Release standby collateral back to the owner's wallet.
    pub fn withdraw_collateral(
        &mut self,
        ctx: &ExecutionContext<'_>,
        custody: &mut dyn CollateralCustody,
        owner: Address,
        asset: AssetId,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_owner(&owner, Role::Whitelisted)?;
        let backing = self.asset_record(&asset)?.config.backing;
        let mut standby = Staged::new(&self.standby);
        standby.debit((owner, asset), amount)?;
        let changes = standby.into_changes();

        custody.withdraw(&backing, &asset, &owner, amount)?;
        commit(&mut self.standby, changes);
        self.emit(LedgerEvent::CollateralWithdrawn { owner, asset, amount, at: ctx.now });
        debug!(%asset, %amount, "collateral withdrawn");
        Ok(())
    }

    // ========================================================================
    // Currency
    // ========================================================================

    /// Move currency (currency scale) between ledger accounts. The caller
    /// must be `from` or a treasury/bridge component.
    pub fn move_currency(
        &mut self,
        ctx: &ExecutionContext<'_>,
        from: Address,
        to: Address,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_owner_or_any(&from, &[Role::Treasury, Role::Bridge])?;
        if self.bridge_accounts.contains(&to) {
            ctx.require_role(Role::Bridge)?;
        }
        let mut currency = Staged::new(&self.currency);
        currency.debit(from, amount)?;
        currency.credit(to, amount)?;
        let changes = currency.into_changes();

        commit(&mut self.currency, changes);
        self.emit(LedgerEvent::CurrencyMoved { from, to, amount, at: ctx.now });
        debug!(%amount, "currency moved");
        Ok(())
    }

    /// Externalized total after `owner` sends `amount` out, or the error
    /// [`Self::issue_external`] would return. Writes nothing.
    pub fn check_external_issue(&self, owner: &Address, amount: U256) -> KeelResult<U256> {
        let available = self.currency_balance(owner);
        if available < amount {
            return Err(KeelError::InsufficientBalance { available, requested: amount });
        }
        math::add(self.externalized, amount)
    }

    /// Debit ledger currency that is leaving as external token (treasury only).
    pub fn issue_external(
        &mut self,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_role(Role::Treasury)?;
        let externalized = self.check_external_issue(&owner, amount)?;
        let mut currency = Staged::new(&self.currency);
        currency.debit(owner, amount)?;
        let changes = currency.into_changes();

        commit(&mut self.currency, changes);
        self.externalized = externalized;
        self.emit(LedgerEvent::CurrencyExternalized { owner, amount, at: ctx.now });
        Ok(())
    }

    /// Credit ledger currency for external token that came back (treasury only).
    pub fn redeem_external(
        &mut self,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_role(Role::Treasury)?;
        let externalized = math::sub(self.externalized, amount)
            .map_err(|_| KeelError::InsufficientBalance {
                available: self.externalized,
                requested: amount,
            })?;
        let mut currency = Staged::new(&self.currency);
        currency.credit(owner, amount)?;
        let changes = currency.into_changes();

        commit(&mut self.currency, changes);
        self.externalized = externalized;
        self.emit(LedgerEvent::CurrencyInternalized { owner, amount, at: ctx.now });
        Ok(())
    }

    // ========================================================================
    // Liquidation support
    // ========================================================================

    /// Seize a vault (liquidator only). The collateral is split between the
    /// keeper (`penalty_bps`) and the reserve; debt becomes unbacked debt;
    /// equity value is forfeited to the reserve. Health is the liquidator's
    /// call, not checked here.
    pub fn confiscate(
        &mut self,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        asset: AssetId,
        keeper: Address,
        penalty_bps: u64,
    ) -> KeelResult<Confiscation> {
        ctx.require_role(Role::Liquidator)?;
        let record = self.asset_record(&asset)?;
        let (mut supply, step) = teller::project(&record.supply, ctx.now)?;
        let key = (owner, asset);
        let vault = self.vaults.get(&key).cloned().ok_or(KeelError::VaultNotFound { asset })?;

        let collateral_seized = vault.collateral;
        let keeper_share = math::bps_of(collateral_seized, penalty_bps)?;
        let reserve_share = math::sub(collateral_seized, keeper_share)?;
        let debt_value = math::position_value(vault.normalized_debt, supply.debt_accumulator)?;
        let equity_value =
            math::position_value(vault.normalized_equity, supply.equity_accumulator)?;
        supply.total_normalized_debt =
            math::sub(supply.total_normalized_debt, vault.normalized_debt)?;
        supply.total_normalized_equity =
            math::sub(supply.total_normalized_equity, vault.normalized_equity)?;
        let unbacked_debt = math::add(self.unbacked_debt, debt_value)?;

        let reserve = self.config.reserve;
        let mut standby = Staged::new(&self.standby);
        standby.credit((keeper, asset), keeper_share)?;
        standby.credit((reserve, asset), reserve_share)?;
        let mut currency = Staged::new(&self.currency);
        currency.credit(reserve, step.reserve_credit)?;
        currency.credit(reserve, equity_value)?;
        let standby_changes = standby.into_changes();
        let currency_changes = currency.into_changes();

        commit(&mut self.standby, standby_changes);
        commit(&mut self.currency, currency_changes);
        self.unbacked_debt = unbacked_debt;
        self.record_accrual(&asset, &supply, &step, ctx.now);
        self.set_supply(&asset, supply);
        self.vaults.insert(key, Vault::default());

        let outcome = Confiscation {
            collateral_seized,
            keeper_share,
            reserve_share,
            debt_value,
            equity_value,
        };
        self.emit(LedgerEvent::VaultConfiscated {
            owner,
            asset,
            keeper,
            collateral_seized,
            keeper_share,
            debt_value,
            equity_value,
            at: ctx.now,
        });
        warn!(%asset, %collateral_seized, %debt_value, "vault confiscated");
        Ok(outcome)
    }

    /// Burn reserve currency against unbacked debt (governance only).
    pub fn settle_unbacked_debt(
        &mut self,
        ctx: &ExecutionContext<'_>,
        amount: U256,
    ) -> KeelResult<U256> {
        ctx.require_role(Role::Governance)?;
        if amount > self.unbacked_debt {
            return Err(KeelError::InvalidParameter(format!(
                "settlement {amount} exceeds unbacked debt {}",
                self.unbacked_debt
            )));
        }
        let mut currency = Staged::new(&self.currency);
        currency.debit(self.config.reserve, amount)?;
        let changes = currency.into_changes();
        let remaining = self.unbacked_debt - amount;

        commit(&mut self.currency, changes);
        self.unbacked_debt = remaining;
        self.emit(LedgerEvent::UnbackedDebtSettled { amount, remaining, at: ctx.now });
        info!(%amount, %remaining, "unbacked debt settled");
        Ok(remaining)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn asset(&self, asset: &AssetId) -> Option<&AssetRecord> {
        self.assets.get(asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, &AssetRecord)> {
        self.assets.iter()
    }

    pub fn currency_balance(&self, owner: &Address) -> U256 {
        self.currency.get(owner).copied().unwrap_or_default()
    }

    pub fn standby_collateral(&self, owner: &Address, asset: &AssetId) -> U256 {
        self.standby.get(&(*owner, *asset)).copied().unwrap_or_default()
    }

    pub fn unbacked_debt(&self) -> U256 {
        self.unbacked_debt
    }

    pub fn externalized_currency(&self) -> U256 {
        self.externalized
    }

    pub fn vault_count(&self) -> usize {
        self.vault_index.len()
    }

    /// Vaults in opening order, `limit` at a time from `offset`.
    pub fn vaults_page(&self, offset: usize, limit: usize) -> Vec<VaultView> {
        self.vault_index
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(owner, asset)| self.read(owner, asset).ok())
            .collect()
    }

    /// Both sides of the supply identity at the committed accumulators.
    pub fn supply_report(&self) -> KeelResult<SupplyReport> {
        let mut total_debt_value = U256::zero();
        let mut total_equity_value = U256::zero();
        for record in self.assets.values() {
            total_debt_value = math::add(total_debt_value, record.supply.total_debt_value()?)?;
            total_equity_value =
                math::add(total_equity_value, record.supply.total_equity_value()?)?;
        }
        let mut ledger_currency = U256::zero();
        for balance in self.currency.values() {
            ledger_currency = math::add(ledger_currency, *balance)?;
        }
        Ok(SupplyReport {
            total_debt_value,
            total_equity_value,
            unbacked_debt: self.unbacked_debt,
            ledger_currency,
            externalized_currency: self.externalized,
        })
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    // ========================================================================
    // Internal
    // ========================================================================

    pub(crate) fn asset_record(&self, asset: &AssetId) -> KeelResult<&AssetRecord> {
        self.assets.get(asset).ok_or(KeelError::AssetNotFound { asset: *asset })
    }

    pub(crate) fn set_supply(&mut self, asset: &AssetId, supply: SupplyState) {
        if let Some(record) = self.assets.get_mut(asset) {
            record.supply = supply;
        }
    }

    pub(crate) fn set_currency(&mut self, owner: Address, balance: U256) {
        if balance.is_zero() {
            self.currency.remove(&owner);
        } else {
            self.currency.insert(owner, balance);
        }
    }

    pub(crate) fn record_accrual(
        &mut self,
        asset: &AssetId,
        supply: &SupplyState,
        step: &AccrualStep,
        now: Timestamp,
    ) {
        if step.is_noop() {
            return;
        }
        self.emit(LedgerEvent::Accrued {
            asset: *asset,
            debt_accumulator: supply.debt_accumulator,
            equity_accumulator: supply.equity_accumulator,
            reserve_credit: step.reserve_credit,
            at: now,
        });
    }

    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        self.events.emit(event);
    }

    fn view_of(
        &self,
        owner: Address,
        asset: AssetId,
        vault: &Vault,
        supply: &SupplyState,
    ) -> KeelResult<VaultView> {
        Ok(VaultView {
            owner,
            asset,
            collateral: vault.collateral,
            normalized_debt: vault.normalized_debt,
            normalized_equity: vault.normalized_equity,
            debt_value: math::position_value(vault.normalized_debt, supply.debt_accumulator)?,
            equity_value: math::position_value(vault.normalized_equity, supply.equity_accumulator)?,
            debt_accumulator: supply.debt_accumulator,
            equity_accumulator: supply.equity_accumulator,
            as_of: supply.last_accrual,
        })
    }
}

fn magnitude(delta: i128) -> U256 {
    U256::from(delta.unsigned_abs())
}

/// Apply a delta to a vault balance; taking more than the vault holds is a
/// balance error, not an arithmetic one.
fn shift(balance: U256, delta: i128) -> KeelResult<U256> {
    math::apply_delta(balance, delta).map_err(|err| match err {
        KeelError::ArithmeticUnderflow => {
            KeelError::InsufficientBalance { available: balance, requested: magnitude(delta) }
        }
        other => other,
    })
}
