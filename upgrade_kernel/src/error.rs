/// Kernel Error Types
///
/// Every failure is returned synchronously to the caller of the operation
/// that produced it. A returned error always means no state was committed.

use alloy_primitives::Address;
use thiserror::Error;

use crate::arithmetic::Amount;
use crate::layout::CompatibilityVerdict;
use crate::roles::RoleId;

/// Failures of ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unauthorized: account {account} is missing role {role}")]
    Unauthorized { account: Address, role: RoleId },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error(
        "mint exceeds audit: total supply {total_supply} + {amount} would exceed audited {total_audited}"
    )]
    MintExceedsAudit {
        total_supply: Amount,
        amount: Amount,
        total_audited: Amount,
    },

    #[error("insufficient balance: account {account} holds {available}, needs {required}")]
    InsufficientBalance {
        account: Address,
        available: Amount,
        required: Amount,
    },

    #[error("operation {operation} is not supported by ledger logic v{version}")]
    UnsupportedOperation {
        operation: &'static str,
        version: u32,
    },

    #[error("invariant violation: [INVARIANT:{invariant}] {message}")]
    InvariantViolation {
        invariant: &'static str,
        message: String,
    },

    #[error("ledger already initialized")]
    AlreadyInitialized,
}

/// Failures while validating a schema or binding ledger fields to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema {schema}: duplicate field name {name:?}")]
    DuplicateField { schema: String, name: String },

    #[error("schema {schema}: field {name:?} has invalid width {width} for type {semantic_type}")]
    InvalidWidth {
        schema: String,
        name: String,
        semantic_type: String,
        width: u32,
    },

    #[error("schema {schema}: field {name:?} at slot {slot} overlaps or precedes the previous field")]
    Misordered {
        schema: String,
        name: String,
        slot: u64,
    },

    #[error("schema {schema}: required field {name:?} is missing")]
    MissingField { schema: String, name: String },

    #[error("schema {schema}: field {name:?} has type {found}, expected {expected}")]
    FieldTypeMismatch {
        schema: String,
        name: String,
        expected: String,
        found: String,
    },

    #[error("schema {schema}: field {name:?} is not enforced by logic {logic}")]
    UnenforcedField {
        schema: String,
        name: String,
        logic: String,
    },
}

/// Failures of `MigrationCoordinator` deployment and upgrade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("New storage layout is incompatible: {}", .0.reason.as_deref().unwrap_or("unspecified"))]
    IncompatibleLayout(Box<CompatibilityVerdict>),

    #[error("implementation {implementation} is not upgrade safe: {reason}")]
    NotUpgradeSafe {
        implementation: String,
        reason: String,
    },

    #[error("ledger was deployed without upgrade support")]
    NotUpgradeable,

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("initialization failed: {0}")]
    Initialization(#[from] LedgerError),
}

impl UpgradeError {
    /// The rejecting verdict, if this error came from the layout checker.
    pub fn verdict(&self) -> Option<&CompatibilityVerdict> {
        match self {
            UpgradeError::IncompatibleLayout(verdict) => Some(&**verdict),
            _ => None,
        }
    }
}

/// Failure of a dispatched `Operation`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error("unknown implementation: {0}")]
    UnknownImplementation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn mint_exceeds_audit_display() {
        let err = LedgerError::MintExceedsAudit {
            total_supply: U256::from(2u64),
            amount: U256::from(1000u64),
            total_audited: U256::from(1000u64),
        };
        let s = err.to_string();
        assert!(s.contains("1000"));
        assert!(s.contains("exceed audited"));
    }

    #[test]
    fn unauthorized_names_role() {
        let err = LedgerError::Unauthorized {
            account: Address::repeat_byte(0x11),
            role: RoleId::Minter,
        };
        assert!(err.to_string().contains("MINTER_ROLE"));
    }

    #[test]
    fn not_upgradeable_display() {
        assert!(UpgradeError::NotUpgradeable
            .to_string()
            .contains("without upgrade support"));
    }
}
