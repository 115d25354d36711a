#![forbid(unsafe_code)]

/// Kernel v1. Bumping this changes every fingerprint.
pub const KERNEL_VERSION: u32 = 1;

pub mod arithmetic;
pub mod error;
pub mod storage;
pub mod schema;
pub mod layout;
pub mod roles;
pub mod ledger;
pub mod invariants;
pub mod logic;
pub mod implementations;
pub mod coordinator;
pub mod operations;
pub mod hashing;

pub use arithmetic::Amount;
pub use coordinator::{LedgerSnapshot, MigrationCoordinator, UpgradeRecord};
pub use error::{LedgerError, OperationError, SchemaError, UpgradeError};
pub use implementations::{Implementation, ImplementationRegistry};
pub use layout::{check, CompatibilityVerdict, LayoutRule, Outcome, Violation};
pub use logic::{Initialization, LedgerLogic};
pub use operations::{apply_operation, Operation, OperationEnvelope};
pub use roles::RoleId;
pub use schema::{FieldDescriptor, SchemaDescriptor, SemanticType};
pub use storage::{SlotStorage, StorageWord};
