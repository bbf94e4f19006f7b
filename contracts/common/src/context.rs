//! Execution Context
//!
//! The host environment hands every operation its caller, the ledger time,
//! and the two external collaborators the core consults: the role registry
//! and the price feed.

use crate::access_control::{Registry, Role};
use crate::errors::{KeelError, KeelResult};
use crate::oracle::PriceFeed;
use crate::types::{Address, Timestamp};

#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub caller: Address,
    pub now: Timestamp,
    pub registry: &'a dyn Registry,
    pub prices: &'a dyn PriceFeed,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        caller: Address,
        now: Timestamp,
        registry: &'a dyn Registry,
        prices: &'a dyn PriceFeed,
    ) -> Self {
        Self { caller, now, registry, prices }
    }

    /// Same environment, different caller. Components use this to act
    /// under their own system identity.
    pub fn acting_as(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }

    /// Caller must hold `role`.
    pub fn require_role(&self, role: Role) -> KeelResult<()> {
        self.registry.require(&self.caller, role)
    }

    /// Caller must be `owner` itself, and `owner` must hold `role`.
    pub fn require_owner(&self, owner: &Address, role: Role) -> KeelResult<()> {
        if &self.caller != owner {
            return Err(KeelError::Unauthorized { address: self.caller, role });
        }
        self.registry.require(owner, role)
    }

    /// Caller is `owner`, or holds one of the system `roles`.
    pub fn require_owner_or_any(&self, owner: &Address, roles: &[Role]) -> KeelResult<()> {
        if &self.caller == owner {
            return Ok(());
        }
        if roles.iter().any(|role| self.registry.is_authorized(&self.caller, *role)) {
            return Ok(());
        }
        Err(KeelError::Unauthorized {
            address: self.caller,
            role: roles.first().copied().unwrap_or(Role::Governance),
        })
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("caller", &self.caller)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}
