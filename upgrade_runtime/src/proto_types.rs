//! Hand-written protobuf types for the operation log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Accounts are 20 raw bytes, amounts 32 bytes big-endian, roles their
//! canonical names.

use prost::Message;

// ── Record Envelope ────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoLogRecord {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(oneof = "RecordKind", tags = "2, 3, 4, 5, 6, 7, 8, 9")]
    pub kind: Option<RecordKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum RecordKind {
    #[prost(message, tag = "2")]
    Deploy(Deploy),
    #[prost(message, tag = "3")]
    Mint(Mint),
    #[prost(message, tag = "4")]
    AuditReport(AuditReport),
    #[prost(message, tag = "5")]
    Transfer(Transfer),
    #[prost(message, tag = "6")]
    GrantRole(RoleChange),
    #[prost(message, tag = "7")]
    RevokeRole(RoleChange),
    #[prost(message, tag = "8")]
    RenounceRole(RenounceRole),
    #[prost(message, tag = "9")]
    Upgrade(Upgrade),
}

// ── Genesis ────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Deploy {
    #[prost(string, tag = "1")]
    pub implementation: String,
    #[prost(bytes = "vec", tag = "2")]
    pub deployer: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub upgradeable: bool,
}

// ── Ledger Operations ──────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Mint {
    #[prost(bytes = "vec", tag = "1")]
    pub caller: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub target: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub amount: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuditReport {
    #[prost(bytes = "vec", tag = "1")]
    pub caller: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub amount: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Transfer {
    #[prost(bytes = "vec", tag = "1")]
    pub caller: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub to: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub amount: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RoleChange {
    #[prost(bytes = "vec", tag = "1")]
    pub caller: Vec<u8>,
    #[prost(string, tag = "2")]
    pub role: String,
    #[prost(bytes = "vec", tag = "3")]
    pub account: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RenounceRole {
    #[prost(bytes = "vec", tag = "1")]
    pub caller: Vec<u8>,
    #[prost(string, tag = "2")]
    pub role: String,
}

// ── Migration ──────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Upgrade {
    #[prost(string, tag = "1")]
    pub implementation: String,
}
