/// Roles
///
/// Roles are a set-valued mapping `role -> account -> bool` kept in ledger
/// storage, checked at the start of each privileged operation. Every role is
/// administered by `DefaultAdmin`, which administers itself.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};

/// Enumerated role identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleId {
    #[serde(rename = "DEFAULT_ADMIN_ROLE")]
    DefaultAdmin,
    #[serde(rename = "MINTER_ROLE")]
    Minter,
    #[serde(rename = "AUDIT_ROLE")]
    Audit,
}

impl RoleId {
    pub const ALL: [RoleId; 3] = [RoleId::DefaultAdmin, RoleId::Minter, RoleId::Audit];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::DefaultAdmin => "DEFAULT_ADMIN_ROLE",
            RoleId::Minter => "MINTER_ROLE",
            RoleId::Audit => "AUDIT_ROLE",
        }
    }

    /// Storage key of the role: zero for the admin role, otherwise the
    /// keccak-256 of its name.
    pub fn key(&self) -> B256 {
        match self {
            RoleId::DefaultAdmin => B256::ZERO,
            other => keccak256(other.as_str().as_bytes()),
        }
    }

    /// The role whose members may grant and revoke this one.
    pub fn admin_role(&self) -> RoleId {
        RoleId::DefaultAdmin
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleId::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role {:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_key_is_zero() {
        assert_eq!(RoleId::DefaultAdmin.key(), B256::ZERO);
        assert_ne!(RoleId::Minter.key(), RoleId::Audit.key());
    }

    #[test]
    fn every_role_is_admin_administered() {
        for role in RoleId::ALL {
            assert_eq!(role.admin_role(), RoleId::DefaultAdmin);
        }
    }

    #[test]
    fn parse_round_trip() {
        for role in RoleId::ALL {
            assert_eq!(role.as_str().parse::<RoleId>().unwrap(), role);
        }
        assert!("OWNER".parse::<RoleId>().is_err());
    }

    #[test]
    fn serde_uses_role_names() {
        assert_eq!(
            serde_json::to_string(&RoleId::Audit).unwrap(),
            "\"AUDIT_ROLE\""
        );
    }
}
