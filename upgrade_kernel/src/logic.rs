/// Ledger Logic
///
/// The swappable half of an implementation. Logic never owns state: every
/// operation receives a staged `Transaction` and either stages a complete
/// change or returns an error, in which case the coordinator drops it.
///
/// Role checks are explicit membership lookups at the top of each
/// operation. Versions differ only in the methods they override.

use std::fmt;

use alloy_primitives::{Address, U256};

use crate::arithmetic::{checked_add, checked_sub, require_positive, Amount};
use crate::error::{LedgerError, SchemaError};
use crate::ledger::{field_names, FieldBindings, LedgerRead, Transaction};
use crate::roles::RoleId;
use crate::schema::SchemaDescriptor;

/// How an implementation sets up its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialization {
    /// A callable initializer runs against proxied storage. Upgrade safe.
    Initializer,
    /// State is set up at construction time, which a proxy never runs.
    Constructor,
}

/// Operation semantics of one implementation version.
pub trait LedgerLogic: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    fn initialization(&self) -> Initialization {
        Initialization::Initializer
    }

    /// Whether this logic handles the audited counter. It must match the
    /// schema: a schema that declares the counter caps every mint.
    fn enforces_audit_cap(&self) -> bool {
        false
    }

    /// Resolve this logic's fields in `schema`.
    fn bind(&self, schema: &SchemaDescriptor) -> Result<FieldBindings, SchemaError> {
        let fields = FieldBindings::resolve(schema, self.enforces_audit_cap())?;
        if fields.total_audited.is_some() && !self.enforces_audit_cap() {
            return Err(SchemaError::UnenforcedField {
                schema: schema.name().to_string(),
                name: field_names::TOTAL_AUDITED.to_string(),
                logic: self.name().to_string(),
            });
        }
        Ok(fields)
    }

    /// One-time setup: the deployer becomes admin and minter.
    fn initialize(&self, tx: &mut Transaction<'_>, deployer: Address) -> Result<(), LedgerError> {
        if tx.is_initialized() {
            return Err(LedgerError::AlreadyInitialized);
        }
        tx.set_initialized();
        tx.set_role(RoleId::DefaultAdmin, deployer, true);
        tx.set_role(RoleId::Minter, deployer, true);
        Ok(())
    }

    fn mint(
        &self,
        tx: &mut Transaction<'_>,
        caller: Address,
        target: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        require_role(tx, RoleId::Minter, caller)?;
        require_positive(amount)?;
        require_within_audit(tx, amount)?;
        credit(tx, target, amount)
    }

    fn audit_report(
        &self,
        _tx: &mut Transaction<'_>,
        _caller: Address,
        _amount: Amount,
    ) -> Result<(), LedgerError> {
        Err(LedgerError::UnsupportedOperation {
            operation: "audit_report",
            version: self.version(),
        })
    }

    fn transfer(
        &self,
        tx: &mut Transaction<'_>,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        require_positive(amount)?;
        let available = tx.balance_of(caller);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: caller,
                available,
                required: amount,
            });
        }
        tx.set_balance(caller, checked_sub(available, amount)?);
        let received = checked_add(tx.balance_of(to), amount)?;
        tx.set_balance(to, received);
        Ok(())
    }

    fn grant_role(
        &self,
        tx: &mut Transaction<'_>,
        caller: Address,
        role: RoleId,
        account: Address,
    ) -> Result<(), LedgerError> {
        require_role(tx, role.admin_role(), caller)?;
        tx.set_role(role, account, true);
        Ok(())
    }

    fn revoke_role(
        &self,
        tx: &mut Transaction<'_>,
        caller: Address,
        role: RoleId,
        account: Address,
    ) -> Result<(), LedgerError> {
        require_role(tx, role.admin_role(), caller)?;
        tx.set_role(role, account, false);
        Ok(())
    }

    fn renounce_role(
        &self,
        tx: &mut Transaction<'_>,
        caller: Address,
        role: RoleId,
    ) -> Result<(), LedgerError> {
        tx.set_role(role, caller, false);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

/// Authorization predicate: `account` must be a member of `role`.
pub fn require_role(tx: &Transaction<'_>, role: RoleId, account: Address) -> Result<(), LedgerError> {
    if tx.has_role(role, account) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized { account, role })
    }
}

/// Cap check: with an audited counter in the schema, the supply after
/// minting `amount` may not exceed it.
fn require_within_audit(tx: &Transaction<'_>, amount: Amount) -> Result<(), LedgerError> {
    let Some(total_audited) = tx.total_audited() else {
        return Ok(());
    };
    let total_supply = tx.total_supply();
    let exceeds = match total_supply.checked_add(amount) {
        Some(next) => next > total_audited,
        None => true,
    };
    if exceeds {
        return Err(LedgerError::MintExceedsAudit {
            total_supply,
            amount,
            total_audited,
        });
    }
    Ok(())
}

/// Add `amount` to `target` and to the total supply.
fn credit(tx: &mut Transaction<'_>, target: Address, amount: Amount) -> Result<(), LedgerError> {
    require_positive(amount)?;
    let balance = checked_add(tx.balance_of(target), amount)?;
    let supply = checked_add(tx.total_supply(), amount)?;
    tx.set_balance(target, balance);
    tx.set_total_supply(supply);
    Ok(())
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// First upgradeable version: uncapped minting, no auditing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenV1;

impl LedgerLogic for TokenV1 {
    fn name(&self) -> &str {
        "TokenUpgradeableV1"
    }

    fn version(&self) -> u32 {
        1
    }
}

/// Second version: audit reports raise the cap that minting may not exceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenV2;

impl LedgerLogic for TokenV2 {
    fn name(&self) -> &str {
        "TokenUpgradeableV2"
    }

    fn version(&self) -> u32 {
        2
    }

    fn enforces_audit_cap(&self) -> bool {
        true
    }

    fn audit_report(
        &self,
        tx: &mut Transaction<'_>,
        caller: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        require_role(tx, RoleId::Audit, caller)?;
        if amount.is_zero() {
            return Ok(());
        }
        let current = tx.total_audited().unwrap_or(U256::ZERO);
        let next = checked_add(current, amount)?;
        if !tx.set_total_audited(next) {
            return Err(LedgerError::UnsupportedOperation {
                operation: "audit_report",
                version: self.version(),
            });
        }
        Ok(())
    }
}

/// Non-upgradeable token: same operations as V1, state set up by a
/// constructor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedToken;

impl LedgerLogic for FixedToken {
    fn name(&self) -> &str {
        "Token"
    }

    fn version(&self) -> u32 {
        1
    }

    fn initialization(&self) -> Initialization {
        Initialization::Constructor
    }
}
