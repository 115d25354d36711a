/// Ledger State Access
///
/// Interprets raw slot storage as ledger state through field bindings
/// resolved from the active schema. Reads go through `LedgerRead`;
/// mutations are staged in a `Transaction` and only reach storage when the
/// coordinator commits the write set.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};

use crate::arithmetic::Amount;
use crate::error::SchemaError;
use crate::roles::RoleId;
use crate::schema::{SchemaDescriptor, SemanticType};
use crate::storage::{address_key, mapping_slot, Slot, SlotStorage, WriteSet};

/// Field names the ledger logic binds to.
pub mod field_names {
    pub const INITIALIZED: &str = "_initialized";
    pub const BALANCES: &str = "_balances";
    pub const TOTAL_SUPPLY: &str = "_totalSupply";
    pub const ROLES: &str = "_roles";
    pub const TOTAL_AUDITED: &str = "_totalAudited";
}

// ── Bindings ───────────────────────────────────────────────────────

/// Base slots of the ledger's fields under one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBindings {
    pub initialized: Slot,
    pub balances: Slot,
    pub total_supply: Slot,
    pub roles: Slot,
    /// Present only when the schema declares the audited counter.
    pub total_audited: Option<Slot>,
}

impl FieldBindings {
    /// Resolve every ledger field by name, checking declared types.
    pub fn resolve(schema: &SchemaDescriptor, require_audit: bool) -> Result<Self, SchemaError> {
        let balances_type = SemanticType::mapping(SemanticType::Address, SemanticType::Uint256);
        let roles_type = SemanticType::mapping(
            SemanticType::Bytes32,
            SemanticType::mapping(SemanticType::Address, SemanticType::Bool),
        );

        let total_audited = match schema.field(field_names::TOTAL_AUDITED) {
            Some(_) => Some(bind(schema, field_names::TOTAL_AUDITED, &SemanticType::Uint256)?),
            None if require_audit => {
                return Err(SchemaError::MissingField {
                    schema: schema.name().to_string(),
                    name: field_names::TOTAL_AUDITED.to_string(),
                })
            }
            None => None,
        };

        Ok(Self {
            initialized: bind(schema, field_names::INITIALIZED, &SemanticType::Uint8)?,
            balances: bind(schema, field_names::BALANCES, &balances_type)?,
            total_supply: bind(schema, field_names::TOTAL_SUPPLY, &SemanticType::Uint256)?,
            roles: bind(schema, field_names::ROLES, &roles_type)?,
            total_audited,
        })
    }

    pub fn balance_slot(&self, account: Address) -> Slot {
        mapping_slot(self.balances, address_key(account))
    }

    pub fn role_slot(&self, role: RoleId, account: Address) -> Slot {
        mapping_slot(mapping_slot(self.roles, role.key()), address_key(account))
    }
}

fn bind(schema: &SchemaDescriptor, name: &str, expected: &SemanticType) -> Result<Slot, SchemaError> {
    let field = schema.field(name).ok_or_else(|| SchemaError::MissingField {
        schema: schema.name().to_string(),
        name: name.to_string(),
    })?;
    if field.semantic_type() != expected {
        return Err(SchemaError::FieldTypeMismatch {
            schema: schema.name().to_string(),
            name: name.to_string(),
            expected: expected.to_string(),
            found: field.semantic_type().to_string(),
        });
    }
    Ok(U256::from(field.slot_index()))
}

// ── Reads ──────────────────────────────────────────────────────────

/// Typed reads over any word source.
pub trait LedgerRead {
    fn load(&self, slot: Slot) -> U256;
    fn fields(&self) -> &FieldBindings;

    fn balance_of(&self, account: Address) -> Amount {
        self.load(self.fields().balance_slot(account))
    }

    fn total_supply(&self) -> Amount {
        self.load(self.fields().total_supply)
    }

    /// `None` when the active schema has no audited counter.
    fn total_audited(&self) -> Option<Amount> {
        self.fields().total_audited.map(|slot| self.load(slot))
    }

    fn has_role(&self, role: RoleId, account: Address) -> bool {
        !self.load(self.fields().role_slot(role, account)).is_zero()
    }

    fn is_initialized(&self) -> bool {
        !self.load(self.fields().initialized).is_zero()
    }
}

/// Read-only view of committed storage.
pub struct LedgerView<'a> {
    storage: &'a SlotStorage,
    fields: &'a FieldBindings,
}

impl<'a> LedgerView<'a> {
    pub fn new(storage: &'a SlotStorage, fields: &'a FieldBindings) -> Self {
        Self { storage, fields }
    }
}

impl LedgerRead for LedgerView<'_> {
    fn load(&self, slot: Slot) -> U256 {
        self.storage.load(slot)
    }

    fn fields(&self) -> &FieldBindings {
        self.fields
    }
}

// ── Staged writes ──────────────────────────────────────────────────

/// A staged mutation over committed storage.
///
/// Reads see the transaction's own writes. Nothing touches the underlying
/// storage; the coordinator applies `into_write_set()` after the invariant
/// gate passes, or drops the transaction on any error.
pub struct Transaction<'a> {
    base: &'a SlotStorage,
    fields: &'a FieldBindings,
    writes: WriteSet,
    /// Balance of every touched account before this transaction.
    balances_before: BTreeMap<Address, Amount>,
}

impl<'a> Transaction<'a> {
    pub fn begin(base: &'a SlotStorage, fields: &'a FieldBindings) -> Self {
        Self {
            base,
            fields,
            writes: WriteSet::new(),
            balances_before: BTreeMap::new(),
        }
    }

    /// Committed (pre-transaction) view.
    pub fn committed(&self) -> LedgerView<'a> {
        LedgerView::new(self.base, self.fields)
    }

    pub fn set_balance(&mut self, account: Address, value: Amount) {
        let before = self.base.load(self.fields.balance_slot(account));
        self.balances_before.entry(account).or_insert(before);
        self.writes.insert(self.fields.balance_slot(account), value);
    }

    pub fn set_total_supply(&mut self, value: Amount) {
        self.writes.insert(self.fields.total_supply, value);
    }

    /// Returns false when the schema has no audited counter.
    pub fn set_total_audited(&mut self, value: Amount) -> bool {
        match self.fields.total_audited {
            Some(slot) => {
                self.writes.insert(slot, value);
                true
            }
            None => false,
        }
    }

    pub fn set_role(&mut self, role: RoleId, account: Address, member: bool) {
        let value = if member { U256::from(1u8) } else { U256::ZERO };
        self.writes.insert(self.fields.role_slot(role, account), value);
    }

    pub fn set_initialized(&mut self) {
        self.writes.insert(self.fields.initialized, U256::from(1u8));
    }

    /// `(account, before, after)` for every balance this transaction wrote.
    pub fn balance_changes(&self) -> Vec<(Address, Amount, Amount)> {
        self.balances_before
            .iter()
            .map(|(account, before)| (*account, *before, self.balance_of(*account)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_write_set(self) -> WriteSet {
        self.writes
    }
}

impl LedgerRead for Transaction<'_> {
    fn load(&self, slot: Slot) -> U256 {
        self.writes
            .get(&slot)
            .copied()
            .unwrap_or_else(|| self.base.load(slot))
    }

    fn fields(&self) -> &FieldBindings {
        self.fields
    }
}
