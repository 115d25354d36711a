/// Migration Coordinator
///
/// Single owner of the active schema, the active logic, their field
/// bindings and the ledger storage. Every operation runs under one
/// `RwLock`: mutations and upgrades hold the write lock from first read to
/// commit, reads hold the read lock and only ever see committed states.
///
/// Lifecycle: Running(S) -> Migrating -> Running(S'). Migrating exists only
/// inside `upgrade` while the write lock is held, so no caller observes it.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arithmetic::Amount;
use crate::error::{LedgerError, UpgradeError};
use crate::hashing::canonical_hash;
use crate::invariants::validate_transaction;
use crate::layout::{check, CompatibilityVerdict};
use crate::ledger::{FieldBindings, LedgerRead, LedgerView, Transaction};
use crate::logic::{Initialization, LedgerLogic};
use crate::roles::RoleId;
use crate::schema::{FieldDescriptor, SchemaDescriptor, SemanticType};
use crate::storage::SlotStorage;

/// One completed migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeRecord {
    pub from_implementation: String,
    pub from_version: u32,
    pub to_implementation: String,
    pub to_version: u32,
    pub appended_fields: Vec<FieldDescriptor>,
}

/// Everything the coordinator owns, swapped and mutated as a unit.
struct Active {
    schema: Arc<SchemaDescriptor>,
    logic: Arc<dyn LedgerLogic>,
    fields: FieldBindings,
    storage: SlotStorage,
    history: Vec<UpgradeRecord>,
}

/// Owned, consistent copy of the coordinator's state.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub schema: SchemaDescriptor,
    pub logic: Arc<dyn LedgerLogic>,
    pub storage: SlotStorage,
    pub history: Vec<UpgradeRecord>,
    pub upgradeable: bool,
}

/// Owns one ledger and mediates every operation on it.
pub struct MigrationCoordinator {
    inner: RwLock<Active>,
    upgradeable: bool,
}

impl MigrationCoordinator {
    // ── Construction ──────────────────────────────────────────────

    /// Deploy behind the upgradeable coordinator. The logic must use an
    /// initializer; constructor-initialized logic is rejected.
    pub fn deploy(
        schema: SchemaDescriptor,
        logic: Arc<dyn LedgerLogic>,
        deployer: Address,
    ) -> Result<Self, UpgradeError> {
        require_upgrade_safe(logic.as_ref())?;
        Self::deploy_inner(schema, logic, deployer, true)
    }

    /// Deploy without upgrade support. Any logic is accepted; `upgrade`
    /// always fails with `NotUpgradeable`.
    pub fn deploy_fixed(
        schema: SchemaDescriptor,
        logic: Arc<dyn LedgerLogic>,
        deployer: Address,
    ) -> Result<Self, UpgradeError> {
        Self::deploy_inner(schema, logic, deployer, false)
    }

    fn deploy_inner(
        schema: SchemaDescriptor,
        logic: Arc<dyn LedgerLogic>,
        deployer: Address,
        upgradeable: bool,
    ) -> Result<Self, UpgradeError> {
        schema.validate()?;
        let fields = logic.bind(&schema)?;

        let mut storage = SlotStorage::new();
        let writes = {
            let mut tx = Transaction::begin(&storage, &fields);
            logic.initialize(&mut tx, deployer)?;
            validate_transaction(&tx, fields.total_audited.is_some())?;
            tx.into_write_set()
        };
        storage.apply(writes);

        info!(
            implementation = logic.name(),
            version = logic.version(),
            upgradeable,
            %deployer,
            "ledger deployed"
        );

        Ok(Self {
            inner: RwLock::new(Active {
                schema: Arc::new(schema),
                logic,
                fields,
                storage,
                history: Vec::new(),
            }),
            upgradeable,
        })
    }

    /// Rebuild a coordinator around existing storage (snapshot restore).
    /// The storage must already be initialized under `schema`.
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, UpgradeError> {
        if snapshot.upgradeable {
            require_upgrade_safe(snapshot.logic.as_ref())?;
        }
        snapshot.schema.validate()?;
        let fields = snapshot.logic.bind(&snapshot.schema)?;
        if !LedgerView::new(&snapshot.storage, &fields).is_initialized() {
            return Err(UpgradeError::Initialization(LedgerError::InvariantViolation {
                invariant: "initialized",
                message: format!("storage for {} was never initialized", snapshot.schema.name()),
            }));
        }

        Ok(Self {
            inner: RwLock::new(Active {
                schema: Arc::new(snapshot.schema),
                logic: snapshot.logic,
                fields,
                storage: snapshot.storage,
                history: snapshot.history,
            }),
            upgradeable: snapshot.upgradeable,
        })
    }

    // ── Migration ─────────────────────────────────────────────────

    /// Dry run of `upgrade`: the layout verdict, with no state change.
    pub fn validate_upgrade(&self, new_schema: &SchemaDescriptor) -> CompatibilityVerdict {
        let active = self.read();
        check(&active.schema, new_schema)
    }

    /// Switch to a new schema and logic in place.
    ///
    /// 1. verdict = check(active schema, new schema)
    /// 2. REJECT: return `IncompatibleLayout`; nothing changes
    /// 3. ALLOW: validate, bind, zero appended slots, swap all at once
    pub fn upgrade(
        &self,
        new_schema: SchemaDescriptor,
        new_logic: Arc<dyn LedgerLogic>,
    ) -> Result<UpgradeRecord, UpgradeError> {
        if !self.upgradeable {
            return Err(UpgradeError::NotUpgradeable);
        }
        require_upgrade_safe(new_logic.as_ref())?;

        let mut active = self.write();

        let verdict = check(&active.schema, &new_schema);
        if !verdict.is_allowed() {
            warn!(
                from = active.schema.name(),
                to = new_schema.name(),
                reason = verdict.reason.as_deref().unwrap_or(""),
                "upgrade rejected"
            );
            return Err(UpgradeError::IncompatibleLayout(Box::new(verdict)));
        }

        // Staged: nothing below touches `active` until every step succeeded.
        new_schema.validate()?;
        let fields = new_logic.bind(&new_schema)?;
        let mut storage = active.storage.clone();
        clear_appended_fields(&mut storage, &verdict.appended_fields);

        let record = UpgradeRecord {
            from_implementation: active.schema.name().to_string(),
            from_version: active.schema.version(),
            to_implementation: new_schema.name().to_string(),
            to_version: new_schema.version(),
            appended_fields: verdict.appended_fields,
        };

        active.schema = Arc::new(new_schema);
        active.logic = new_logic;
        active.fields = fields;
        active.storage = storage;
        active.history.push(record.clone());

        info!(
            from = %record.from_implementation,
            to = %record.to_implementation,
            appended = record.appended_fields.len(),
            "upgrade committed"
        );
        Ok(record)
    }

    // ── Ledger operations ─────────────────────────────────────────

    pub fn mint(&self, caller: Address, target: Address, amount: Amount) -> Result<(), LedgerError> {
        self.execute("mint", |logic, tx| logic.mint(tx, caller, target, amount))
    }

    pub fn audit_report(&self, caller: Address, amount: Amount) -> Result<(), LedgerError> {
        self.execute("audit_report", |logic, tx| logic.audit_report(tx, caller, amount))
    }

    pub fn transfer(&self, caller: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        self.execute("transfer", |logic, tx| logic.transfer(tx, caller, to, amount))
    }

    pub fn grant_role(&self, caller: Address, role: RoleId, account: Address) -> Result<(), LedgerError> {
        self.execute("grant_role", |logic, tx| logic.grant_role(tx, caller, role, account))
    }

    pub fn revoke_role(&self, caller: Address, role: RoleId, account: Address) -> Result<(), LedgerError> {
        self.execute("revoke_role", |logic, tx| logic.revoke_role(tx, caller, role, account))
    }

    pub fn renounce_role(&self, caller: Address, role: RoleId) -> Result<(), LedgerError> {
        self.execute("renounce_role", |logic, tx| logic.renounce_role(tx, caller, role))
    }

    /// Stage, gate, commit. Any error drops the staged writes.
    fn execute<F>(&self, operation: &'static str, op: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&dyn LedgerLogic, &mut Transaction<'_>) -> Result<(), LedgerError>,
    {
        let mut active = self.write();
        let Active {
            logic,
            fields,
            storage,
            ..
        } = &mut *active;

        let staged = {
            let mut tx = Transaction::begin(storage, fields);
            op(&**logic, &mut tx)
                .and_then(|()| validate_transaction(&tx, fields.total_audited.is_some()))
                .map(|()| tx.into_write_set())
        };

        match staged {
            Ok(writes) => {
                debug!(operation, words = writes.len(), "operation committed");
                storage.apply(writes);
                Ok(())
            }
            Err(err) => {
                warn!(operation, error = %err, "operation rejected");
                Err(err)
            }
        }
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn balance_of(&self, account: Address) -> Amount {
        let active = self.read();
        LedgerView::new(&active.storage, &active.fields).balance_of(account)
    }

    pub fn total_supply(&self) -> Amount {
        let active = self.read();
        LedgerView::new(&active.storage, &active.fields).total_supply()
    }

    /// `None` until a schema with the audited counter is active.
    pub fn total_audited(&self) -> Option<Amount> {
        let active = self.read();
        LedgerView::new(&active.storage, &active.fields).total_audited()
    }

    pub fn has_role(&self, role: RoleId, account: Address) -> bool {
        let active = self.read();
        LedgerView::new(&active.storage, &active.fields).has_role(role, account)
    }

    pub fn active_schema(&self) -> SchemaDescriptor {
        self.read().schema.as_ref().clone()
    }

    /// Registry name of the active implementation (its schema name).
    pub fn implementation(&self) -> String {
        self.read().schema.name().to_string()
    }

    /// Version of the active schema.
    pub fn version(&self) -> u32 {
        self.read().schema.version()
    }

    pub fn is_upgradeable(&self) -> bool {
        self.upgradeable
    }

    pub fn history(&self) -> Vec<UpgradeRecord> {
        self.read().history.clone()
    }

    /// SHA-256 fingerprint of the active schema identity and storage.
    pub fn fingerprint(&self) -> String {
        let active = self.read();
        canonical_hash(&active.schema, &active.storage)
    }

    /// Consistent copy of the whole state, taken under one read lock.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let active = self.read();
        LedgerSnapshot {
            schema: active.schema.as_ref().clone(),
            logic: Arc::clone(&active.logic),
            storage: active.storage.clone(),
            history: active.history.clone(),
            upgradeable: self.upgradeable,
        }
    }

    // Commits are a single `apply` of a fully staged write set, so a
    // poisoned lock never guards a partially written state.
    fn read(&self) -> RwLockReadGuard<'_, Active> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Active> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn require_upgrade_safe(logic: &dyn LedgerLogic) -> Result<(), UpgradeError> {
    match logic.initialization() {
        Initialization::Initializer => Ok(()),
        Initialization::Constructor => Err(UpgradeError::NotUpgradeSafe {
            implementation: logic.name().to_string(),
            reason: "state is set up in a constructor; use an initializer".to_string(),
        }),
    }
}

/// Zero the inline slots of appended value fields. Mapping entries live at
/// hashed slots that no earlier layout could have addressed.
fn clear_appended_fields(storage: &mut SlotStorage, fields: &[FieldDescriptor]) {
    for field in fields
        .iter()
        .filter(|f| !matches!(f.semantic_type(), SemanticType::Mapping { .. }))
    {
        storage.clear_range(U256::from(field.slot_index()), U256::from(field.slot_end()));
    }
}
