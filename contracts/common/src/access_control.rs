//! Access Control Module
//!
//! Role-based access control for the aUSD protocol. One `AccessControlConfig`
//! is shared by every component through `SharedAccessControl`; components
//! never store role membership themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{AusdError, AusdResult};
use crate::types::AccountId;

// ============================================================================
// Types
// ============================================================================

/// Protocol roles
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum Role {
    /// Deployer; grants and revokes every role
    Owner = 0,
    /// Governance; tunes pool parameters and withdraws surplus
    Gov = 1,
    /// Global settlement module
    ShowStopper = 2,
    /// Liquidation engine; may confiscate positions
    LiquidationEngine = 3,
    /// Price oracle; writes price with safety margin
    PriceOracle = 4,
    /// Token adapter; credits and debits free collateral
    Adapter = 5,
    /// May mint unbacked stablecoin and stablecoin tokens
    Mintable = 6,
}

/// Role lookup used by every component
pub trait AccessControl: Debug + Send + Sync {
    fn has_role(&self, role: Role, account: &AccountId) -> bool;
}

/// Handle shared by every component
pub type SharedAccessControl = Arc<dyn AccessControl + Send + Sync>;

/// In-memory role table
#[derive(Debug, Default)]
pub struct AccessControlConfig {
    roles: RwLock<BTreeMap<Role, BTreeSet<AccountId>>>,
}

impl AccessControlConfig {
    /// Create a role table with a single owner
    pub fn new(owner: AccountId) -> Self {
        let config = Self::default();
        config
            .roles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(Role::Owner)
            .or_default()
            .insert(owner);
        config
    }

    /// Grant `role` to `account`; owner only, idempotent
    pub fn grant_role(&self, caller: &AccountId, role: Role, account: AccountId) -> AusdResult<()> {
        require_role(self, Role::Owner, caller)?;
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "role grantee is zero" });
        }
        let inserted = self
            .roles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role)
            .or_default()
            .insert(account);
        if inserted {
            info!(?role, %account, "role granted");
        }
        Ok(())
    }

    /// Revoke `role` from `account`; owner only
    pub fn revoke_role(&self, caller: &AccountId, role: Role, account: &AccountId) -> AusdResult<()> {
        require_role(self, Role::Owner, caller)?;
        if role == Role::Owner && caller == account {
            return Err(AusdError::InvalidParameter {
                param: "role",
                reason: "owner cannot revoke itself",
            });
        }
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(members) = roles.get_mut(&role) {
            if members.remove(account) {
                info!(?role, %account, "role revoked");
            }
        }
        Ok(())
    }

    /// All roles held by `account`
    pub fn roles_of(&self, account: &AccountId) -> Vec<Role> {
        self.roles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, members)| members.contains(account))
            .map(|(role, _)| *role)
            .collect()
    }
}

impl AccessControl for AccessControlConfig {
    fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.roles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .is_some_and(|members| members.contains(account))
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Fails unless `caller` holds `role`
pub fn require_role<A: AccessControl + ?Sized>(access: &A, role: Role, caller: &AccountId) -> AusdResult<()> {
    if access.has_role(role, caller) {
        Ok(())
    } else {
        Err(AusdError::MissingRole { role, caller: *caller })
    }
}

/// Fails unless `caller` holds at least one of `roles`
pub fn require_any_role<A: AccessControl + ?Sized>(
    access: &A,
    roles: &'static [Role],
    caller: &AccountId,
) -> AusdResult<()> {
    if roles.iter().any(|role| access.has_role(*role, caller)) {
        Ok(())
    } else {
        Err(AusdError::MissingAnyRole { roles, caller: *caller })
    }
}

pub fn require_owner_or_gov<A: AccessControl + ?Sized>(access: &A, caller: &AccountId) -> AusdResult<()> {
    require_any_role(access, &[Role::Owner, Role::Gov], caller)
}

pub fn require_owner_or_show_stopper<A: AccessControl + ?Sized>(
    access: &A,
    caller: &AccountId,
) -> AusdResult<()> {
    require_any_role(access, &[Role::Owner, Role::ShowStopper], caller)
}
