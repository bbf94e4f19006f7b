//! Keel Treasury
//!
//! Bridges ledger currency and the external currency token. Amounts at this
//! boundary are unit scale; the engine holds currency scale, so every amount
//! is lifted by the accumulator factor (`× 10^27`) on the way in.
//!
//! ```text
//! deposit:   token.burn(owner, amount)   then  engine.redeem_external(owner, amount × A)
//! withdraw:  engine.issue_external(owner, amount × A)  then  token.mint(owner, amount)
//! transfer:  engine.move_currency(from, to, amount × A)
//! ```
//!
//! Ledger checks always run before the token is touched, and the token call
//! that can fail runs before the ledger write, so neither side is left
//! half-applied.

use casper_types::U256;
use tracing::info;

use keel_common::{
    math, Address, AssetId, CurrencyToken, ExecutionContext, KeelError, KeelResult, Role,
};
use keel_vault_engine::VaultEngine;

/// The treasury component. Its address must hold `Role::Treasury` in the
/// registry and be the minter of the external token.
#[derive(Debug, Clone)]
pub struct Treasury {
    address: Address,
}

impl Treasury {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Turn `amount` external tokens held by `owner` into ledger currency.
    pub fn deposit_currency(
        &self,
        engine: &mut VaultEngine,
        token: &mut dyn CurrencyToken,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_owner(&owner, Role::Whitelisted)?;
        ctx.registry.require(&self.address, Role::Treasury)?;
        let value = math::unit_to_currency(amount)?;
        let externalized = engine.externalized_currency();
        if value > externalized {
            return Err(KeelError::InsufficientBalance {
                available: externalized,
                requested: value,
            });
        }

        token.burn(&self.address, &owner, amount)?;
        engine.redeem_external(&ctx.acting_as(self.address), owner, value)?;
        info!(%amount, "currency deposited");
        Ok(())
    }

    /// Turn `amount` of `owner`'s ledger currency into external tokens.
    pub fn withdraw_currency(
        &self,
        engine: &mut VaultEngine,
        token: &mut dyn CurrencyToken,
        ctx: &ExecutionContext<'_>,
        owner: Address,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_owner(&owner, Role::Whitelisted)?;
        ctx.registry.require(&self.address, Role::Treasury)?;
        let value = math::unit_to_currency(amount)?;
        engine.check_external_issue(&owner, value)?;

        token.mint(&self.address, &owner, amount)?;
        engine.issue_external(&ctx.acting_as(self.address), owner, value)?;
        info!(%amount, "currency withdrawn");
        Ok(())
    }

    /// Move `amount` of ledger currency from the caller to `to`.
    pub fn transfer_currency(
        &self,
        engine: &mut VaultEngine,
        ctx: &ExecutionContext<'_>,
        from: Address,
        to: Address,
        amount: U256,
    ) -> KeelResult<()> {
        ctx.require_owner(&from, Role::Whitelisted)?;
        let value = math::unit_to_currency(amount)?;
        engine.move_currency(&ctx.acting_as(self.address), from, to, value)
    }

    /// Ledger currency held by `owner`, at unit scale (truncated).
    pub fn balance_of(&self, engine: &VaultEngine, owner: &Address) -> KeelResult<U256> {
        math::currency_to_unit(engine.currency_balance(owner))
    }

    /// Value of `owner`'s equity position in `asset` (currency scale), at the
    /// last committed accumulator.
    pub fn equity_of(
        &self,
        engine: &VaultEngine,
        owner: &Address,
        asset: &AssetId,
    ) -> KeelResult<U256> {
        Ok(engine.read(owner, asset)?.equity_value)
    }
}
