//! Access Control for the Keel ledger
//!
//! Privileged operations consult a [`Registry`] before touching state. The
//! ledger only ever asks one question, `is_authorized(address, role)`; how
//! roles are granted is the registry's business. [`RoleRegistry`] is the
//! in-process implementation used by the protocol facade and tests.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::errors::{KeelError, KeelResult};
use crate::types::{Address, Timestamp};

// ============================================================================
// Types
// ============================================================================

/// Protocol roles
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub enum Role {
    /// Asset configuration, interest policy, role administration
    Governance,
    /// Users allowed to open and manage vaults
    Whitelisted,
    /// The treasury component (mints and burns against ledger balances)
    Treasury,
    /// The liquidator component (confiscates unsafe vaults)
    Liquidator,
    /// The bridge component (escrows and settles transfer currency)
    Bridge,
    /// Off-ledger relay driving bridge transfers through their lifecycle
    Relay,
}

/// Role-gated permission lookups.
pub trait Registry {
    fn is_authorized(&self, address: &Address, role: Role) -> bool;

    /// `Ok(())` when `address` holds `role`, `Unauthorized` otherwise.
    fn require(&self, address: &Address, role: Role) -> KeelResult<()> {
        if self.is_authorized(address, role) {
            Ok(())
        } else {
            Err(KeelError::Unauthorized { address: *address, role })
        }
    }
}

/// A single role grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub granted_by: Address,
    pub granted_at: Timestamp,
}

/// In-memory registry with governance-controlled grants
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    assignments: BTreeMap<(Address, Role), RoleAssignment>,
}

impl RoleRegistry {
    /// Registry whose only member is `governor`, holding `Governance`.
    pub fn new(governor: Address, at: Timestamp) -> Self {
        let mut assignments = BTreeMap::new();
        assignments.insert(
            (governor, Role::Governance),
            RoleAssignment { granted_by: governor, granted_at: at },
        );
        Self { assignments }
    }

    pub fn grant(
        &mut self,
        caller: &Address,
        address: Address,
        role: Role,
        at: Timestamp,
    ) -> KeelResult<()> {
        self.require(caller, Role::Governance)?;
        self.assignments
            .entry((address, role))
            .or_insert(RoleAssignment { granted_by: *caller, granted_at: at });
        info!(?role, address = %hex_prefix(&address), "role granted");
        Ok(())
    }

    pub fn revoke(&mut self, caller: &Address, address: &Address, role: Role) -> KeelResult<bool> {
        self.require(caller, Role::Governance)?;
        if role == Role::Governance && address == caller && self.count(Role::Governance) == 1 {
            return Err(KeelError::InvalidParameter(
                "cannot revoke the last governance grant".into(),
            ));
        }
        let removed = self.assignments.remove(&(*address, role)).is_some();
        if removed {
            info!(?role, address = %hex_prefix(address), "role revoked");
        }
        Ok(removed)
    }

    pub fn assignment(&self, address: &Address, role: Role) -> Option<&RoleAssignment> {
        self.assignments.get(&(*address, role))
    }

    /// Roles currently held by `address`
    pub fn roles_of(&self, address: &Address) -> Vec<Role> {
        self.assignments
            .keys()
            .filter(|(holder, _)| holder == address)
            .map(|(_, role)| *role)
            .collect()
    }

    fn count(&self, role: Role) -> usize {
        self.assignments.keys().filter(|(_, r)| *r == role).count()
    }
}

impl Registry for RoleRegistry {
    fn is_authorized(&self, address: &Address, role: Role) -> bool {
        self.assignments.contains_key(&(*address, role))
    }
}

fn hex_prefix(address: &Address) -> String {
    address[..4].iter().map(|b| format!("{b:02x}")).collect()
}
