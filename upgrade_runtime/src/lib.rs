#![forbid(unsafe_code)]

//! Runtime for the upgrade kernel.
//!
//! Wraps the kernel with persistence, replay, snapshots, session
//! management and drift detection. No ledger logic lives here: every
//! operation and invariant is delegated to the kernel.

pub mod proto_types;
pub mod proto_bridge;
pub mod record;
pub mod operation_store;
pub mod replay;
pub mod snapshot;
pub mod session;
pub mod drift;
pub mod config;
pub mod scenario;
