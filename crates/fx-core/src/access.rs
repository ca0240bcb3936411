// crates/fx-core/src/access.rs
//
// Capability-based authorization.
//
// Each component owns an AccessControl table mapping principals to the set of
// capabilities explicitly granted to them. A single super-admin may grant and
// revoke; nothing is inherited, so the super-admin itself must be granted
// `Admin` before it can call configuration setters.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FxError;
use crate::identity::Principal;

/// Operation tags gating privileged entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Configuration setters.
    Admin,
    /// One-shot `initialize_protocol`.
    ProtocolInitializer,
    /// Treasury mint/redeem; held by the Market, never by end users.
    Market,
    /// `settle`.
    SettleWhitelist,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Admin => write!(f, "Admin"),
            Capability::ProtocolInitializer => write!(f, "ProtocolInitializer"),
            Capability::Market => write!(f, "Market"),
            Capability::SettleWhitelist => write!(f, "SettleWhitelist"),
        }
    }
}

/// Principal -> granted capabilities, administered by one super-admin.
#[derive(Debug, Clone)]
pub struct AccessControl {
    super_admin: Principal,
    grants: HashMap<Principal, HashSet<Capability>>,
}

impl AccessControl {
    /// Create an empty table administered by `super_admin`.
    ///
    /// # Errors
    /// Returns `FxError::ZeroAddress` if `super_admin` is the zero principal.
    pub fn new(super_admin: Principal) -> Result<Self, FxError> {
        Ok(Self {
            super_admin: super_admin.non_zero()?,
            grants: HashMap::new(),
        })
    }

    pub fn super_admin(&self) -> Principal {
        self.super_admin
    }

    /// Whether `principal` has been granted `capability`.
    pub fn can(&self, principal: &Principal, capability: Capability) -> bool {
        self.grants
            .get(principal)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }

    /// Fail closed unless `principal` holds `capability`.
    pub fn require(&self, principal: &Principal, capability: Capability) -> Result<(), FxError> {
        if self.can(principal, capability) {
            Ok(())
        } else {
            tracing::warn!(%principal, %capability, "rejected unauthorized call");
            Err(FxError::Unauthorized {
                principal: *principal,
                capability,
            })
        }
    }

    /// Grant `capability` to `principal`. Only the super-admin may grant.
    pub fn grant(
        &mut self,
        by: &Principal,
        principal: Principal,
        capability: Capability,
    ) -> Result<(), FxError> {
        self.require_super_admin(by)?;
        let principal = principal.non_zero()?;
        self.grants.entry(principal).or_default().insert(capability);
        tracing::info!(%principal, %capability, "capability granted");
        Ok(())
    }

    /// Revoke `capability` from `principal`. Revoking an absent grant is a no-op.
    pub fn revoke(
        &mut self,
        by: &Principal,
        principal: Principal,
        capability: Capability,
    ) -> Result<(), FxError> {
        self.require_super_admin(by)?;
        if let Some(caps) = self.grants.get_mut(&principal) {
            caps.remove(&capability);
            if caps.is_empty() {
                self.grants.remove(&principal);
            }
        }
        tracing::info!(%principal, %capability, "capability revoked");
        Ok(())
    }

    fn require_super_admin(&self, by: &Principal) -> Result<(), FxError> {
        if *by == self.super_admin {
            Ok(())
        } else {
            Err(FxError::NotSuperAdmin { principal: *by })
        }
    }
}
