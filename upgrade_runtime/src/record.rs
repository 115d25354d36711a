//! Log records: what the operation log stores.
//!
//! Every log starts with exactly one `Deploy` record at sequence 1; every
//! later record is a committed kernel `Operation`.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use upgrade_kernel::error::OperationError;
use upgrade_kernel::{ImplementationRegistry, MigrationCoordinator, Operation};

/// Genesis of a ledger: which implementation, who deployed it, and
/// whether it sits behind the upgradeable coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deployment {
    pub implementation: String,
    pub deployer: Address,
    #[serde(default = "default_upgradeable")]
    pub upgradeable: bool,
}

fn default_upgradeable() -> bool {
    true
}

impl Deployment {
    /// Resolve the implementation and deploy a fresh coordinator.
    pub fn deploy(&self, registry: &ImplementationRegistry) -> Result<MigrationCoordinator, OperationError> {
        let implementation = registry
            .get(&self.implementation)
            .ok_or_else(|| OperationError::UnknownImplementation(self.implementation.clone()))?;
        let schema = implementation.schema.clone();
        let logic = implementation.logic.clone();
        let coordinator = if self.upgradeable {
            MigrationCoordinator::deploy(schema, logic, self.deployer)?
        } else {
            MigrationCoordinator::deploy_fixed(schema, logic, self.deployer)?
        };
        Ok(coordinator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Deploy(Deployment),
    Operation(Operation),
}

/// A record with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEnvelope {
    pub sequence: u64,
    pub record: LogRecord,
}

impl LogEnvelope {
    pub fn deploy(deployment: Deployment) -> Self {
        Self {
            sequence: 1,
            record: LogRecord::Deploy(deployment),
        }
    }

    pub fn operation(sequence: u64, operation: Operation) -> Self {
        Self {
            sequence,
            record: LogRecord::Operation(operation),
        }
    }
}
