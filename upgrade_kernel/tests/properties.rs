//! Property tests for the layout checker and the capped ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use proptest::prelude::*;
use upgrade_kernel::implementations::{token_v1_schema, token_v2_schema};
use upgrade_kernel::logic::{TokenV1, TokenV2};
use upgrade_kernel::{
    check, LayoutRule, LedgerError, MigrationCoordinator, RoleId, SchemaDescriptor, SemanticType,
};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn type_pool() -> Vec<SemanticType> {
    vec![
        SemanticType::Uint8,
        SemanticType::Uint64,
        SemanticType::Uint128,
        SemanticType::Uint256,
        SemanticType::Int256,
        SemanticType::Address,
        SemanticType::Bool,
        SemanticType::Bytes32,
        SemanticType::mapping(SemanticType::Address, SemanticType::Uint256),
    ]
}

/// Indexes into `type_pool`, one per field.
fn arb_field_types(min: usize, max: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..type_pool().len(), min..max)
}

fn build_schema(name: &str, version: u32, types: &[usize]) -> SchemaDescriptor {
    let pool = type_pool();
    types
        .iter()
        .enumerate()
        .fold(SchemaDescriptor::builder(name, version), |b, (i, t)| {
            b.field(format!("f{}", i), pool[*t].clone())
        })
        .build()
}

fn minter() -> Address {
    Address::repeat_byte(0x11)
}

fn auditor() -> Address {
    Address::repeat_byte(0x22)
}

#[derive(Debug, Clone)]
enum LedgerStep {
    Mint { target: u8, amount: u64 },
    Audit { amount: u64 },
}

fn arb_steps() -> impl Strategy<Value = Vec<LedgerStep>> {
    prop::collection::vec(
        prop_oneof![
            (0u8..4, 1u64..1_000).prop_map(|(target, amount)| LedgerStep::Mint { target, amount }),
            (0u64..1_000).prop_map(|amount| LedgerStep::Audit { amount }),
        ],
        1..40,
    )
}

// ---------------------------------------------------------------------------
// Layout checker
// ---------------------------------------------------------------------------

proptest! {
    /// A layout is always compatible with itself and appends nothing.
    #[test]
    fn identical_layouts_allow(types in arb_field_types(1, 12)) {
        let schema = build_schema("S", 1, &types);
        let verdict = check(&schema, &schema);
        prop_assert!(verdict.is_allowed());
        prop_assert!(verdict.appended_fields.is_empty());
    }

    /// Adding fields after the existing ones is always allowed.
    #[test]
    fn append_only_allows(
        base in arb_field_types(1, 8),
        extra in arb_field_types(1, 5),
    ) {
        let old = build_schema("S", 1, &base);
        let mut all = base.clone();
        all.extend(extra.iter().copied());
        let new = build_schema("S", 2, &all);

        let verdict = check(&old, &new);
        prop_assert!(verdict.is_allowed());
        prop_assert_eq!(verdict.appended_fields.len(), extra.len());
    }

    /// Swapping two neighbours moves the first of them.
    #[test]
    fn reordering_rejects_with_that_field(
        types in arb_field_types(2, 10),
        pick in any::<prop::sample::Index>(),
    ) {
        let old = build_schema("S", 1, &types);
        let i = pick.index(types.len() - 1);

        let mut fields = old.fields().to_vec();
        fields.swap(i, i + 1);
        let new = fields
            .iter()
            .fold(SchemaDescriptor::builder("S", 2), |b, f| {
                b.field(f.name(), f.semantic_type().clone())
            })
            .build();

        let verdict = check(&old, &new);
        prop_assert!(!verdict.is_allowed());
        prop_assert_eq!(verdict.rule, Some(LayoutRule::PreservedField));
        let field = verdict.conflicting_field.unwrap();
        let expected_name = format!("f{}", i);
        prop_assert_eq!(field.name(), expected_name.as_str());
    }

    /// Changing one field's type rejects with that field.
    #[test]
    fn retyping_rejects_with_that_field(
        types in arb_field_types(1, 10),
        pick in any::<prop::sample::Index>(),
        shift in 1usize..9,
    ) {
        let old = build_schema("S", 1, &types);
        let i = pick.index(types.len());
        let mut changed = types.clone();
        changed[i] = (types[i] + shift) % type_pool().len();
        let new = build_schema("S", 2, &changed);

        let verdict = check(&old, &new);
        prop_assert!(!verdict.is_allowed());
        prop_assert_eq!(verdict.rule, Some(LayoutRule::PreservedField));
        let field = verdict.conflicting_field.unwrap();
        let expected_name = format!("f{}", i);
        prop_assert_eq!(field.name(), expected_name.as_str());
    }

    /// The checker is a pure function of its inputs.
    #[test]
    fn check_is_deterministic(a in arb_field_types(0, 8), b in arb_field_types(0, 8)) {
        let old = build_schema("A", 1, &a);
        let new = build_schema("B", 2, &b);
        prop_assert_eq!(check(&old, &new), check(&old, &new));
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Supply equals the sum of successful mints, per account too.
    #[test]
    fn supply_is_the_sum_of_mints(steps in arb_steps()) {
        let ledger = MigrationCoordinator::deploy(token_v1_schema(), Arc::new(TokenV1), minter()).unwrap();
        let mut expected: BTreeMap<u8, U256> = BTreeMap::new();

        for step in &steps {
            if let LedgerStep::Mint { target, amount } = step {
                let to = Address::repeat_byte(0xa0 + target);
                ledger.mint(minter(), to, U256::from(*amount)).unwrap();
                *expected.entry(*target).or_default() += U256::from(*amount);
            }
        }

        let total = expected.values().fold(U256::ZERO, |acc, v| acc + *v);
        prop_assert_eq!(ledger.total_supply(), total);
        for (target, amount) in &expected {
            prop_assert_eq!(ledger.balance_of(Address::repeat_byte(0xa0 + target)), *amount);
        }
    }

    /// After the upgrade, no committed mint leaves supply above the audited
    /// amount, and rejected mints change nothing.
    #[test]
    fn cap_holds_after_upgrade(steps in arb_steps()) {
        let ledger = MigrationCoordinator::deploy(token_v1_schema(), Arc::new(TokenV1), minter()).unwrap();
        ledger.upgrade(token_v2_schema(), Arc::new(TokenV2)).unwrap();
        ledger.grant_role(minter(), RoleId::Audit, auditor()).unwrap();

        for step in &steps {
            let before = ledger.fingerprint();
            let result = match step {
                LedgerStep::Mint { target, amount } => {
                    ledger.mint(minter(), Address::repeat_byte(0xa0 + target), U256::from(*amount))
                }
                LedgerStep::Audit { amount } => ledger.audit_report(auditor(), U256::from(*amount)),
            };
            match result {
                Ok(()) => {}
                Err(LedgerError::MintExceedsAudit { .. }) => {
                    prop_assert_eq!(ledger.fingerprint(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            let audited = ledger.total_audited().unwrap();
            prop_assert!(ledger.total_supply() <= audited);
        }
    }
}
