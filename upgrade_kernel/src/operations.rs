/// Operations
///
/// Operations are pure data describing one mutating call: who calls, what,
/// with which arguments. They carry no logic; `apply_operation` dispatches
/// them to the coordinator. Upgrades name their implementation, which the
/// registry resolves.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::arithmetic::{amount_serde, Amount};
use crate::coordinator::MigrationCoordinator;
use crate::error::OperationError;
use crate::implementations::ImplementationRegistry;
use crate::roles::RoleId;

/// One mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Mint {
        caller: Address,
        target: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    AuditReport {
        caller: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Transfer {
        caller: Address,
        to: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    GrantRole {
        caller: Address,
        role: RoleId,
        account: Address,
    },
    RevokeRole {
        caller: Address,
        role: RoleId,
        account: Address,
    },
    RenounceRole {
        caller: Address,
        role: RoleId,
    },
    Upgrade {
        implementation: String,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Mint { .. } => "mint",
            Operation::AuditReport { .. } => "audit_report",
            Operation::Transfer { .. } => "transfer",
            Operation::GrantRole { .. } => "grant_role",
            Operation::RevokeRole { .. } => "revoke_role",
            Operation::RenounceRole { .. } => "renounce_role",
            Operation::Upgrade { .. } => "upgrade",
        }
    }
}

/// An operation with its position in a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    pub sequence: u64,
    #[serde(flatten)]
    pub operation: Operation,
}

/// Apply one operation to the coordinator.
pub fn apply_operation(
    coordinator: &MigrationCoordinator,
    registry: &ImplementationRegistry,
    operation: &Operation,
) -> Result<(), OperationError> {
    match operation {
        Operation::Mint {
            caller,
            target,
            amount,
        } => coordinator.mint(*caller, *target, *amount)?,
        Operation::AuditReport { caller, amount } => coordinator.audit_report(*caller, *amount)?,
        Operation::Transfer { caller, to, amount } => coordinator.transfer(*caller, *to, *amount)?,
        Operation::GrantRole {
            caller,
            role,
            account,
        } => coordinator.grant_role(*caller, *role, *account)?,
        Operation::RevokeRole {
            caller,
            role,
            account,
        } => coordinator.revoke_role(*caller, *role, *account)?,
        Operation::RenounceRole { caller, role } => coordinator.renounce_role(*caller, *role)?,
        Operation::Upgrade { implementation } => {
            let target = registry
                .get(implementation)
                .ok_or_else(|| OperationError::UnknownImplementation(implementation.clone()))?;
            coordinator.upgrade(target.schema.clone(), target.logic.clone())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LedgerError, UpgradeError};
    use crate::implementations::{token_v1_schema, TOKEN_UPGRADEABLE_V2, TOKEN_UPGRADEABLE_V2_WRONG};
    use crate::logic::TokenV1;
    use alloy_primitives::U256;
    use std::sync::Arc;

    fn minter() -> Address {
        Address::repeat_byte(0x0a)
    }

    #[test]
    fn json_shape_is_tagged_and_amounts_are_decimal() {
        let op = Operation::Mint {
            caller: minter(),
            target: minter(),
            amount: U256::from(1000u64),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "mint");
        assert_eq!(value["amount"], "1000");
        let back: Operation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn envelope_flattens_operation() {
        let json = r#"{"sequence":3,"op":"upgrade","implementation":"TokenUpgradeableV2"}"#;
        let env: OperationEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.sequence, 3);
        assert_eq!(env.operation.kind(), "upgrade");
    }

    #[test]
    fn dispatch_routes_to_coordinator() {
        let registry = ImplementationRegistry::builtin();
        let c = MigrationCoordinator::deploy(token_v1_schema(), Arc::new(TokenV1), minter()).unwrap();

        apply_operation(
            &c,
            &registry,
            &Operation::Mint {
                caller: minter(),
                target: minter(),
                amount: U256::from(2u64),
            },
        )
        .unwrap();
        assert_eq!(c.total_supply(), U256::from(2u64));

        let err = apply_operation(
            &c,
            &registry,
            &Operation::Upgrade {
                implementation: TOKEN_UPGRADEABLE_V2_WRONG.to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::Upgrade(UpgradeError::IncompatibleLayout(_))));

        apply_operation(
            &c,
            &registry,
            &Operation::Upgrade {
                implementation: TOKEN_UPGRADEABLE_V2.to_string(),
            },
        )
        .unwrap();
        assert_eq!(c.version(), 2);

        let err = apply_operation(
            &c,
            &registry,
            &Operation::AuditReport {
                caller: minter(),
                amount: U256::from(1u64),
            },
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::Ledger(LedgerError::Unauthorized { .. })));
    }

    #[test]
    fn unknown_implementation_is_reported() {
        let c = MigrationCoordinator::deploy(token_v1_schema(), Arc::new(TokenV1), minter()).unwrap();
        let err = apply_operation(
            &c,
            &ImplementationRegistry::new(),
            &Operation::Upgrade {
                implementation: "Nope".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err, OperationError::UnknownImplementation("Nope".to_string()));
    }
}
