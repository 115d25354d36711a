//! Proto ↔ record conversion bridge.
//!
//! Encoding is total. Decoding checks every byte field's length and every
//! role name, so a damaged frame surfaces as a `DecodeError` instead of a
//! silently different operation.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use upgrade_kernel::{Amount, Operation, RoleId};

use crate::proto_types::{self as pb, ProtoLogRecord, RecordKind};
use crate::record::{Deployment, LogEnvelope, LogRecord};

/// A frame that parsed as protobuf but does not describe a valid record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record {sequence} has no kind")]
    MissingKind { sequence: u64 },

    #[error("record {sequence}: field {field} has {found} bytes, expected {expected}")]
    InvalidLength {
        sequence: u64,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("record {sequence}: unknown role {role:?}")]
    UnknownRole { sequence: u64, role: String },
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn amount_bytes(amount: &Amount) -> Vec<u8> {
    amount.to_be_bytes::<32>().to_vec()
}

fn account_bytes(account: &Address) -> Vec<u8> {
    account.as_slice().to_vec()
}

/// Convert a log record to its protobuf form.
pub fn record_to_proto(envelope: &LogEnvelope) -> ProtoLogRecord {
    let kind = match &envelope.record {
        LogRecord::Deploy(deployment) => RecordKind::Deploy(pb::Deploy {
            implementation: deployment.implementation.clone(),
            deployer: account_bytes(&deployment.deployer),
            upgradeable: deployment.upgradeable,
        }),
        LogRecord::Operation(operation) => operation_to_proto(operation),
    };
    ProtoLogRecord {
        sequence: envelope.sequence,
        kind: Some(kind),
    }
}

fn operation_to_proto(operation: &Operation) -> RecordKind {
    match operation {
        Operation::Mint {
            caller,
            target,
            amount,
        } => RecordKind::Mint(pb::Mint {
            caller: account_bytes(caller),
            target: account_bytes(target),
            amount: amount_bytes(amount),
        }),
        Operation::AuditReport { caller, amount } => RecordKind::AuditReport(pb::AuditReport {
            caller: account_bytes(caller),
            amount: amount_bytes(amount),
        }),
        Operation::Transfer { caller, to, amount } => RecordKind::Transfer(pb::Transfer {
            caller: account_bytes(caller),
            to: account_bytes(to),
            amount: amount_bytes(amount),
        }),
        Operation::GrantRole {
            caller,
            role,
            account,
        } => RecordKind::GrantRole(pb::RoleChange {
            caller: account_bytes(caller),
            role: role.as_str().to_string(),
            account: account_bytes(account),
        }),
        Operation::RevokeRole {
            caller,
            role,
            account,
        } => RecordKind::RevokeRole(pb::RoleChange {
            caller: account_bytes(caller),
            role: role.as_str().to_string(),
            account: account_bytes(account),
        }),
        Operation::RenounceRole { caller, role } => RecordKind::RenounceRole(pb::RenounceRole {
            caller: account_bytes(caller),
            role: role.as_str().to_string(),
        }),
        Operation::Upgrade { implementation } => RecordKind::Upgrade(pb::Upgrade {
            implementation: implementation.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Field-level decoding for one record.
struct Fields {
    sequence: u64,
}

impl Fields {
    fn account(&self, field: &'static str, bytes: &[u8]) -> Result<Address, DecodeError> {
        if bytes.len() != 20 {
            return Err(DecodeError::InvalidLength {
                sequence: self.sequence,
                field,
                expected: 20,
                found: bytes.len(),
            });
        }
        Ok(Address::from_slice(bytes))
    }

    fn amount(&self, bytes: &[u8]) -> Result<Amount, DecodeError> {
        let word: [u8; 32] = bytes.try_into().map_err(|_| DecodeError::InvalidLength {
            sequence: self.sequence,
            field: "amount",
            expected: 32,
            found: bytes.len(),
        })?;
        Ok(U256::from_be_bytes(word))
    }

    fn role(&self, name: &str) -> Result<RoleId, DecodeError> {
        name.parse().map_err(|_| DecodeError::UnknownRole {
            sequence: self.sequence,
            role: name.to_string(),
        })
    }
}

/// Convert a protobuf record back to a log record.
pub fn proto_to_record(proto: &ProtoLogRecord) -> Result<LogEnvelope, DecodeError> {
    let f = Fields {
        sequence: proto.sequence,
    };
    let kind = proto
        .kind
        .as_ref()
        .ok_or(DecodeError::MissingKind {
            sequence: proto.sequence,
        })?;

    let record = match kind {
        RecordKind::Deploy(d) => LogRecord::Deploy(Deployment {
            implementation: d.implementation.clone(),
            deployer: f.account("deployer", &d.deployer)?,
            upgradeable: d.upgradeable,
        }),
        RecordKind::Mint(m) => LogRecord::Operation(Operation::Mint {
            caller: f.account("caller", &m.caller)?,
            target: f.account("target", &m.target)?,
            amount: f.amount(&m.amount)?,
        }),
        RecordKind::AuditReport(a) => LogRecord::Operation(Operation::AuditReport {
            caller: f.account("caller", &a.caller)?,
            amount: f.amount(&a.amount)?,
        }),
        RecordKind::Transfer(t) => LogRecord::Operation(Operation::Transfer {
            caller: f.account("caller", &t.caller)?,
            to: f.account("to", &t.to)?,
            amount: f.amount(&t.amount)?,
        }),
        RecordKind::GrantRole(g) => LogRecord::Operation(Operation::GrantRole {
            caller: f.account("caller", &g.caller)?,
            role: f.role(&g.role)?,
            account: f.account("account", &g.account)?,
        }),
        RecordKind::RevokeRole(r) => LogRecord::Operation(Operation::RevokeRole {
            caller: f.account("caller", &r.caller)?,
            role: f.role(&r.role)?,
            account: f.account("account", &r.account)?,
        }),
        RecordKind::RenounceRole(r) => LogRecord::Operation(Operation::RenounceRole {
            caller: f.account("caller", &r.caller)?,
            role: f.role(&r.role)?,
        }),
        RecordKind::Upgrade(u) => LogRecord::Operation(Operation::Upgrade {
            implementation: u.implementation.clone(),
        }),
    };

    Ok(LogEnvelope {
        sequence: proto.sequence,
        record,
    })
}
