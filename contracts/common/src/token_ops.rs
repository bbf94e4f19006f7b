//! External Currency Token
//!
//! The Treasury's counterpart: a fungible token representing system
//! currency that has left the ledger. Amounts are unit scale. Mint and burn
//! are restricted to the token's minter and revert on insufficient balance.

use casper_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::{KeelError, KeelResult};
use crate::math;
use crate::types::Address;

/// Fungible token interface used by the Treasury
pub trait CurrencyToken {
    fn mint(&mut self, caller: &Address, to: &Address, amount: U256) -> KeelResult<()>;
    fn burn(&mut self, caller: &Address, from: &Address, amount: U256) -> KeelResult<()>;
    fn balance_of(&self, owner: &Address) -> U256;
    fn total_supply(&self) -> U256;
}

/// Token supply tracking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSupply {
    pub total_supply: U256,
    pub total_minted: U256,
    pub total_burned: U256,
}

/// In-memory token with a single minter
#[derive(Debug, Clone)]
pub struct LedgerToken {
    minter: Address,
    balances: BTreeMap<Address, U256>,
    supply: TokenSupply,
}

impl LedgerToken {
    pub fn new(minter: Address) -> Self {
        Self { minter, balances: BTreeMap::new(), supply: TokenSupply::default() }
    }

    pub fn minter(&self) -> &Address {
        &self.minter
    }

    pub fn supply(&self) -> &TokenSupply {
        &self.supply
    }

    /// Holder-initiated transfer between wallets.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> KeelResult<()> {
        let available = self.balance_of(from);
        let remaining = math::sub(available, amount)
            .map_err(|_| KeelError::InsufficientBalance { available, requested: amount })?;
        self.balances.insert(*from, remaining);
        let credited = math::add(self.balance_of(to), amount)?;
        self.balances.insert(*to, credited);
        Ok(())
    }

    fn require_minter(&self, caller: &Address) -> KeelResult<()> {
        if caller != &self.minter {
            return Err(KeelError::Unauthorized {
                address: *caller,
                role: crate::access_control::Role::Treasury,
            });
        }
        Ok(())
    }
}

impl CurrencyToken for LedgerToken {
    fn mint(&mut self, caller: &Address, to: &Address, amount: U256) -> KeelResult<()> {
        self.require_minter(caller)?;
        let total_supply = math::add(self.supply.total_supply, amount)?;
        let balance = math::add(self.balance_of(to), amount)?;

        self.supply.total_supply = total_supply;
        self.supply.total_minted = math::add(self.supply.total_minted, amount)?;
        self.balances.insert(*to, balance);
        debug!(%amount, "token minted");
        Ok(())
    }

    fn burn(&mut self, caller: &Address, from: &Address, amount: U256) -> KeelResult<()> {
        self.require_minter(caller)?;
        let available = self.balance_of(from);
        let balance = math::sub(available, amount)
            .map_err(|_| KeelError::InsufficientBalance { available, requested: amount })?;
        let total_supply = math::sub(self.supply.total_supply, amount)?;

        self.supply.total_supply = total_supply;
        self.supply.total_burned = math::add(self.supply.total_burned, amount)?;
        self.balances.insert(*from, balance);
        debug!(%amount, "token burned");
        Ok(())
    }

    fn balance_of(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    fn total_supply(&self) -> U256 {
        self.supply.total_supply
    }
}
