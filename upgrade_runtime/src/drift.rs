//! Drift detection: determinism verification and ledger comparison.

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use serde::Serialize;

use upgrade_kernel::{Amount, ImplementationRegistry, MigrationCoordinator, RoleId};

use crate::record::LogEnvelope;
use crate::replay::{self, ReplayError};

/// Replay the same log twice and require identical fingerprints.
/// Returns the fingerprint.
pub fn verify_determinism(
    records: &[LogEnvelope],
    registry: &ImplementationRegistry,
) -> Result<String, ReplayError> {
    let first = replay::rebuild_hash(records, registry)?;
    let second = replay::rebuild_hash(records, registry)?;
    if first != second {
        return Err(ReplayError::Nondeterministic { first, second });
    }
    Ok(first)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub account: Address,
    pub balance_a: Amount,
    pub balance_b: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDrift {
    pub account: Address,
    pub role: RoleId,
    pub member_a: bool,
    pub member_b: bool,
}

/// Structured comparison of two ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub fingerprint_a: String,
    pub fingerprint_b: String,
    pub implementation_a: String,
    pub implementation_b: String,
    pub total_supply_a: Amount,
    pub total_supply_b: Amount,
    pub total_audited_a: Option<Amount>,
    pub total_audited_b: Option<Amount>,
    /// Storage words present only in `b`, only in `a`, or in both with
    /// different values.
    pub words_added: usize,
    pub words_removed: usize,
    pub words_changed: usize,
    pub balance_changes: Vec<BalanceDrift>,
    pub role_changes: Vec<RoleDrift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.fingerprint_a == self.fingerprint_b
    }
}

/// Compare two ledgers. Balances and roles are only known for the
/// `accounts` given; storage words are compared exhaustively.
pub fn compare_states(a: &MigrationCoordinator, b: &MigrationCoordinator, accounts: &[Address]) -> DriftReport {
    let snap_a = a.snapshot();
    let snap_b = b.snapshot();

    let slots: BTreeSet<&U256> = snap_a
        .storage
        .iter()
        .chain(snap_b.storage.iter())
        .map(|(slot, _)| slot)
        .collect();
    let (mut words_added, mut words_removed, mut words_changed) = (0, 0, 0);
    for slot in slots {
        let (va, vb) = (snap_a.storage.load(*slot), snap_b.storage.load(*slot));
        match (va.is_zero(), vb.is_zero()) {
            (true, false) => words_added += 1,
            (false, true) => words_removed += 1,
            _ if va != vb => words_changed += 1,
            _ => {}
        }
    }

    let accounts: BTreeSet<Address> = accounts.iter().copied().collect();
    let balance_changes = accounts
        .iter()
        .filter_map(|account| {
            let (balance_a, balance_b) = (a.balance_of(*account), b.balance_of(*account));
            (balance_a != balance_b).then_some(BalanceDrift {
                account: *account,
                balance_a,
                balance_b,
            })
        })
        .collect();
    let role_changes = accounts
        .iter()
        .flat_map(|account| RoleId::ALL.into_iter().map(move |role| (*account, role)))
        .filter_map(|(account, role)| {
            let (member_a, member_b) = (a.has_role(role, account), b.has_role(role, account));
            (member_a != member_b).then_some(RoleDrift {
                account,
                role,
                member_a,
                member_b,
            })
        })
        .collect();

    DriftReport {
        fingerprint_a: a.fingerprint(),
        fingerprint_b: b.fingerprint(),
        implementation_a: a.implementation(),
        implementation_b: b.implementation(),
        total_supply_a: a.total_supply(),
        total_supply_b: b.total_supply(),
        total_audited_a: a.total_audited(),
        total_audited_b: b.total_audited(),
        words_added,
        words_removed,
        words_changed,
        balance_changes,
        role_changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use upgrade_kernel::implementations::{token_v1_schema, token_v2_schema};
    use upgrade_kernel::logic::{TokenV1, TokenV2};

    fn deployer() -> Address {
        Address::repeat_byte(0x11)
    }

    fn v1() -> MigrationCoordinator {
        MigrationCoordinator::deploy(token_v1_schema(), Arc::new(TokenV1), deployer()).unwrap()
    }

    #[test]
    fn identical_ledgers_are_clean() {
        let (a, b) = (v1(), v1());
        let report = compare_states(&a, &b, &[deployer()]);
        assert!(report.is_clean());
        assert_eq!(report.words_added + report.words_removed + report.words_changed, 0);
        assert!(report.balance_changes.is_empty());
    }

    #[test]
    fn drift_is_itemized() {
        let (a, b) = (v1(), v1());
        let holder = Address::repeat_byte(0x33);
        b.mint(deployer(), holder, U256::from(4u64)).unwrap();
        b.grant_role(deployer(), RoleId::Minter, holder).unwrap();
        b.upgrade(token_v2_schema(), Arc::new(TokenV2)).unwrap();

        let report = compare_states(&a, &b, &[deployer(), holder, holder]);
        assert!(!report.is_clean());
        assert_eq!(report.total_supply_b, U256::from(4u64));
        assert_eq!(report.total_audited_a, None);
        assert_eq!(report.total_audited_b, Some(U256::ZERO));
        assert_eq!(report.implementation_b, "TokenUpgradeableV2");
        // balance, supply, role membership
        assert_eq!(report.words_added, 3);
        assert_eq!(
            report.balance_changes,
            vec![BalanceDrift {
                account: holder,
                balance_a: U256::ZERO,
                balance_b: U256::from(4u64),
            }]
        );
        assert_eq!(report.role_changes.len(), 1);
        assert_eq!(report.role_changes[0].role, RoleId::Minter);
    }
}
