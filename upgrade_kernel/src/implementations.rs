/// Implementations
///
/// An implementation pairs a storage schema with the logic that runs over
/// it. The registry resolves implementations by name, so logged upgrade
/// operations can be replayed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ledger::field_names::{BALANCES, INITIALIZED, ROLES, TOTAL_AUDITED, TOTAL_SUPPLY};
use crate::logic::{FixedToken, LedgerLogic, TokenV1, TokenV2};
use crate::schema::{SchemaDescriptor, SemanticType};

pub const TOKEN: &str = "Token";
pub const TOKEN_UPGRADEABLE_V1: &str = "TokenUpgradeableV1";
pub const TOKEN_UPGRADEABLE_V2: &str = "TokenUpgradeableV2";
pub const TOKEN_UPGRADEABLE_V2_WRONG: &str = "TokenUpgradeableV2Wrong";

fn balances_type() -> SemanticType {
    SemanticType::mapping(SemanticType::Address, SemanticType::Uint256)
}

fn roles_type() -> SemanticType {
    SemanticType::mapping(
        SemanticType::Bytes32,
        SemanticType::mapping(SemanticType::Address, SemanticType::Bool),
    )
}

// ── Layouts ────────────────────────────────────────────────────────

/// Version 1 layout.
pub fn token_v1_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder(TOKEN_UPGRADEABLE_V1, 1)
        .field(INITIALIZED, SemanticType::Uint8)
        .field(BALANCES, balances_type())
        .field(TOTAL_SUPPLY, SemanticType::Uint256)
        .field(ROLES, roles_type())
        .build()
}

/// Version 2 layout: version 1 plus the audited counter, appended.
pub fn token_v2_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder(TOKEN_UPGRADEABLE_V2, 2)
        .field(INITIALIZED, SemanticType::Uint8)
        .field(BALANCES, balances_type())
        .field(TOTAL_SUPPLY, SemanticType::Uint256)
        .field(ROLES, roles_type())
        .field(TOTAL_AUDITED, SemanticType::Uint256)
        .build()
}

/// Broken version 2 layout: the audited counter is declared before the
/// total supply, shifting every later field.
pub fn token_v2_wrong_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder(TOKEN_UPGRADEABLE_V2_WRONG, 2)
        .field(INITIALIZED, SemanticType::Uint8)
        .field(BALANCES, balances_type())
        .field(TOTAL_AUDITED, SemanticType::Uint256)
        .field(TOTAL_SUPPLY, SemanticType::Uint256)
        .field(ROLES, roles_type())
        .build()
}

/// Layout of the non-upgradeable token.
pub fn token_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder(TOKEN, 1)
        .field(INITIALIZED, SemanticType::Uint8)
        .field(BALANCES, balances_type())
        .field(TOTAL_SUPPLY, SemanticType::Uint256)
        .field(ROLES, roles_type())
        .build()
}

// ── Registry ───────────────────────────────────────────────────────

/// A named schema + logic pair.
#[derive(Debug, Clone)]
pub struct Implementation {
    pub name: String,
    pub schema: SchemaDescriptor,
    pub logic: Arc<dyn LedgerLogic>,
}

impl Implementation {
    pub fn new(name: impl Into<String>, schema: SchemaDescriptor, logic: Arc<dyn LedgerLogic>) -> Self {
        Self {
            name: name.into(),
            schema,
            logic,
        }
    }
}

/// Implementations known to the process, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ImplementationRegistry {
    entries: BTreeMap<String, Implementation>,
}

impl ImplementationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four token implementations.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Implementation::new(TOKEN, token_schema(), Arc::new(FixedToken)));
        registry.register(Implementation::new(
            TOKEN_UPGRADEABLE_V1,
            token_v1_schema(),
            Arc::new(TokenV1),
        ));
        registry.register(Implementation::new(
            TOKEN_UPGRADEABLE_V2,
            token_v2_schema(),
            Arc::new(TokenV2),
        ));
        registry.register(Implementation::new(
            TOKEN_UPGRADEABLE_V2_WRONG,
            token_v2_wrong_schema(),
            Arc::new(TokenV2),
        ));
        registry
    }

    /// Add or replace an implementation.
    pub fn register(&mut self, implementation: Implementation) {
        self.entries.insert(implementation.name.clone(), implementation);
    }

    pub fn get(&self, name: &str) -> Option<&Implementation> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
