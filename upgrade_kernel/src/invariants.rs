/// Ledger Invariant Gate
///
/// Run against every staged transaction before commit. A failure aborts
/// the transaction; storage never sees a write set that breaks these.
///
///   supply_conservation : Σ balance deltas == total supply delta
///   audit_cap           : a supply increase leaves supply <= audited
///   audit_monotonic     : the audited counter never decreases

use crate::arithmetic::{checked_add, Amount};
use crate::error::LedgerError;
use crate::ledger::{LedgerRead, Transaction};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check a staged transaction. `cap_enforced` is true for logic versions
/// that gate minting on the audited amount.
pub fn validate_transaction(tx: &Transaction<'_>, cap_enforced: bool) -> Result<(), LedgerError> {
    check_supply_conservation(tx)?;
    check_audit_monotonic(tx)?;
    if cap_enforced {
        check_audit_cap(tx)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

/// Checked incrementally: `Σ before + supply_after == Σ after + supply_before`.
/// Rearranged so no subtraction can underflow.
fn check_supply_conservation(tx: &Transaction<'_>) -> Result<(), LedgerError> {
    let mut sum_before = Amount::ZERO;
    let mut sum_after = Amount::ZERO;
    for (_, before, after) in tx.balance_changes() {
        sum_before = checked_add(sum_before, before)?;
        sum_after = checked_add(sum_after, after)?;
    }

    let supply_before = tx.committed().total_supply();
    let supply_after = tx.total_supply();

    let lhs = checked_add(sum_before, supply_after)?;
    let rhs = checked_add(sum_after, supply_before)?;
    if lhs != rhs {
        return Err(LedgerError::InvariantViolation {
            invariant: "supply_conservation",
            message: format!(
                "balances moved from {} to {} while total supply moved from {} to {}",
                sum_before, sum_after, supply_before, supply_after
            ),
        });
    }
    Ok(())
}

/// Supply carried over from before auditing existed is not retroactively
/// judged; only transactions that raise the supply must stay under the cap.
fn check_audit_cap(tx: &Transaction<'_>) -> Result<(), LedgerError> {
    let supply_before = tx.committed().total_supply();
    let supply_after = tx.total_supply();
    if supply_after <= supply_before {
        return Ok(());
    }
    let audited = tx.total_audited().ok_or(LedgerError::InvariantViolation {
        invariant: "audit_cap",
        message: "cap enforced but the schema has no audited counter".to_string(),
    })?;
    if supply_after > audited {
        return Err(LedgerError::InvariantViolation {
            invariant: "audit_cap",
            message: format!(
                "total supply {} exceeds audited amount {}",
                supply_after, audited
            ),
        });
    }
    Ok(())
}

fn check_audit_monotonic(tx: &Transaction<'_>) -> Result<(), LedgerError> {
    if let (Some(before), Some(after)) = (tx.committed().total_audited(), tx.total_audited()) {
        if after < before {
            return Err(LedgerError::InvariantViolation {
                invariant: "audit_monotonic",
                message: format!("audited amount decreased from {} to {}", before, after),
            });
        }
    }
    Ok(())
}
