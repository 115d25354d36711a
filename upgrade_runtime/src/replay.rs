//! Replay orchestrator: rebuild a ledger from its operation log.
//!
//! Delegates all ledger logic to the kernel. The log holds only committed
//! operations, so any rejection during replay means the log and the kernel
//! disagree and is reported, never skipped.

use thiserror::Error;
use tracing::info;

use upgrade_kernel::error::OperationError;
use upgrade_kernel::{apply_operation, ImplementationRegistry, MigrationCoordinator};

use crate::record::{LogEnvelope, LogRecord};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("operation log is empty or does not start with a deployment")]
    MissingDeployment,

    #[error("unexpected deployment record at sequence {sequence}")]
    UnexpectedDeployment { sequence: u64 },

    #[error("deployment failed: {0}")]
    Deploy(#[source] OperationError),

    #[error("replay rejected record {sequence}: {source}")]
    Rejected {
        sequence: u64,
        #[source]
        source: OperationError,
    },

    #[error(
        "DETERMINISM FAILURE: two replays produced different fingerprints.\n\
         Run 1: {first}\n\
         Run 2: {second}"
    )]
    Nondeterministic { first: String, second: String },
}

/// Rebuild a ledger from a complete log.
///
/// 1. Deploy from the genesis record
/// 2. Pass each operation sequentially to the kernel
/// 3. Return (coordinator, fingerprint)
pub fn rebuild_state(
    records: &[LogEnvelope],
    registry: &ImplementationRegistry,
) -> Result<(MigrationCoordinator, String), ReplayError> {
    let (genesis, rest) = records.split_first().ok_or(ReplayError::MissingDeployment)?;
    let LogRecord::Deploy(deployment) = &genesis.record else {
        return Err(ReplayError::MissingDeployment);
    };

    let coordinator = deployment.deploy(registry).map_err(ReplayError::Deploy)?;
    apply_records(&coordinator, rest, registry)?;

    let fingerprint = coordinator.fingerprint();
    info!(records = records.len(), %fingerprint, "log replayed");
    Ok((coordinator, fingerprint))
}

/// Rebuild and return only the fingerprint.
pub fn rebuild_hash(records: &[LogEnvelope], registry: &ImplementationRegistry) -> Result<String, ReplayError> {
    rebuild_state(records, registry).map(|(_, hash)| hash)
}

/// Apply operation records on top of an existing ledger (a restored
/// snapshot, or a fresh deployment).
pub fn apply_records(
    coordinator: &MigrationCoordinator,
    records: &[LogEnvelope],
    registry: &ImplementationRegistry,
) -> Result<(), ReplayError> {
    for envelope in records {
        match &envelope.record {
            LogRecord::Deploy(_) => {
                return Err(ReplayError::UnexpectedDeployment {
                    sequence: envelope.sequence,
                })
            }
            LogRecord::Operation(operation) => {
                apply_operation(coordinator, registry, operation).map_err(|source| {
                    ReplayError::Rejected {
                        sequence: envelope.sequence,
                        source,
                    }
                })?;
            }
        }
    }
    Ok(())
}
