/// Layout Compatibility Checker
///
/// Decides whether storage written under one schema can be reinterpreted
/// under another without corrupting existing data or changing the meaning
/// of existing fields.
///
/// Rules, applied in order; the first violation rejects:
///   1. preserved_field : every old field keeps its name, slot, type, width
///   2. append_only     : new fields start after every slot the old layout used
///   3. no_overlap      : new fields do not overlap, in declaration order
///
/// Pure and deterministic. No side effects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{FieldDescriptor, SchemaDescriptor};

/// ALLOW / REJECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Reject,
}

/// The rule a rejected layout violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutRule {
    PreservedField,
    AppendOnly,
    NoOverlap,
}

impl fmt::Display for LayoutRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutRule::PreservedField => write!(f, "preserved_field"),
            LayoutRule::AppendOnly => write!(f, "append_only"),
            LayoutRule::NoOverlap => write!(f, "no_overlap"),
        }
    }
}

/// What exactly went wrong with the conflicting field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Removed,
    Renamed { to: String },
    Moved { from: u64, to: u64 },
    Retyped { from: String, to: String },
    Resized { from: u32, to: u32 },
    Inserted { below: u64 },
    Overlap { with: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Removed => write!(f, "removed"),
            Violation::Renamed { to } => write!(f, "renamed to {:?}", to),
            Violation::Moved { from, to } => write!(f, "moved from slot {} to slot {}", from, to),
            Violation::Retyped { from, to } => write!(f, "retyped from {} to {}", from, to),
            Violation::Resized { from, to } => {
                write!(f, "resized from {} to {} bytes", from, to)
            }
            Violation::Inserted { below } => {
                write!(f, "inserted below the end of the existing layout (slot {})", below)
            }
            Violation::Overlap { with } => write!(f, "overlaps field {:?}", with),
        }
    }
}

/// Result of one compatibility check. Produced fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityVerdict {
    pub outcome: Outcome,
    pub reason: Option<String>,
    pub conflicting_field: Option<FieldDescriptor>,
    pub rule: Option<LayoutRule>,
    pub violation: Option<Violation>,
    /// Fields the new layout adds. Empty on reject.
    pub appended_fields: Vec<FieldDescriptor>,
}

impl CompatibilityVerdict {
    fn allow(appended_fields: Vec<FieldDescriptor>) -> Self {
        Self {
            outcome: Outcome::Allow,
            reason: None,
            conflicting_field: None,
            rule: None,
            violation: None,
            appended_fields,
        }
    }

    fn reject(rule: LayoutRule, field: &FieldDescriptor, violation: Violation) -> Self {
        let reason = format!(
            "[LAYOUT:{}] storage slot reinterpreted incompatibly: field {:?} {}",
            rule,
            field.name(),
            violation
        );
        Self {
            outcome: Outcome::Reject,
            reason: Some(reason),
            conflicting_field: Some(field.clone()),
            rule: Some(rule),
            violation: Some(violation),
            appended_fields: Vec::new(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compare `old` against `new` and decide whether `new` may take over
/// storage written under `old`.
pub fn check(old: &SchemaDescriptor, new: &SchemaDescriptor) -> CompatibilityVerdict {
    if old.is_empty() {
        return CompatibilityVerdict::allow(new.fields().to_vec());
    }

    if let Some((field, violation)) = check_preserved_fields(old, new) {
        return CompatibilityVerdict::reject(LayoutRule::PreservedField, field, violation);
    }

    let appended: Vec<&FieldDescriptor> = new
        .fields()
        .iter()
        .filter(|f| old.field(f.name()).is_none())
        .collect();

    if let Some((field, violation)) = check_append_only(old, &appended) {
        return CompatibilityVerdict::reject(LayoutRule::AppendOnly, field, violation);
    }

    if let Some((field, violation)) = check_no_overlap(new) {
        return CompatibilityVerdict::reject(LayoutRule::NoOverlap, field, violation);
    }

    CompatibilityVerdict::allow(appended.into_iter().cloned().collect())
}

// ---------------------------------------------------------------------------
// Individual rules (private)
// ---------------------------------------------------------------------------

/// Rule 1. Returns the first old field that is not carried over intact.
fn check_preserved_fields<'a>(
    old: &'a SchemaDescriptor,
    new: &SchemaDescriptor,
) -> Option<(&'a FieldDescriptor, Violation)> {
    for field in old.fields() {
        let Some(candidate) = new.field(field.name()) else {
            // Same storage under another name is still a silent meaning change.
            let violation = match new.fields().iter().find(|f| f.same_shape(field)) {
                Some(renamed) => Violation::Renamed {
                    to: renamed.name().to_string(),
                },
                None => Violation::Removed,
            };
            return Some((field, violation));
        };

        if candidate.slot_index() != field.slot_index() {
            return Some((
                field,
                Violation::Moved {
                    from: field.slot_index(),
                    to: candidate.slot_index(),
                },
            ));
        }

        if candidate.semantic_type() != field.semantic_type() {
            let violation = if candidate.semantic_type().same_family(field.semantic_type()) {
                Violation::Resized {
                    from: field.byte_width(),
                    to: candidate.byte_width(),
                }
            } else {
                Violation::Retyped {
                    from: field.semantic_type().to_string(),
                    to: candidate.semantic_type().to_string(),
                }
            };
            return Some((field, violation));
        }

        if candidate.byte_width() != field.byte_width() {
            return Some((
                field,
                Violation::Resized {
                    from: field.byte_width(),
                    to: candidate.byte_width(),
                },
            ));
        }
    }
    None
}

/// Rule 2. Added fields must start at or after the old layout's end.
fn check_append_only<'a>(
    old: &SchemaDescriptor,
    appended: &[&'a FieldDescriptor],
) -> Option<(&'a FieldDescriptor, Violation)> {
    let old_end = old.slot_end();
    appended
        .iter()
        .find(|f| f.slot_index() < old_end)
        .map(|f| (*f, Violation::Inserted { below: old_end }))
}

/// Rule 3. Each field must begin at or after the end of the one before it.
fn check_no_overlap(new: &SchemaDescriptor) -> Option<(&FieldDescriptor, Violation)> {
    new.fields().windows(2).find_map(|pair| {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.slot_index() < prev.slot_end() {
            Some((
                next,
                Violation::Overlap {
                    with: prev.name().to_string(),
                },
            ))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SemanticType;

    fn balances() -> SemanticType {
        SemanticType::mapping(SemanticType::Address, SemanticType::Uint256)
    }

    fn v1() -> SchemaDescriptor {
        SchemaDescriptor::builder("V1", 1)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .field("_totalSupply", SemanticType::Uint256)
            .build()
    }

    #[test]
    fn empty_old_always_allows() {
        let verdict = check(&SchemaDescriptor::empty(), &v1());
        assert!(verdict.is_allowed());
        assert_eq!(verdict.appended_fields.len(), 3);
    }

    #[test]
    fn identical_schema_allows() {
        let verdict = check(&v1(), &v1());
        assert!(verdict.is_allowed());
        assert!(verdict.appended_fields.is_empty());
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn append_allows_and_reports_new_fields() {
        let v2 = SchemaDescriptor::builder("V2", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .field("_totalSupply", SemanticType::Uint256)
            .field("_totalAudited", SemanticType::Uint256)
            .build();
        let verdict = check(&v1(), &v2);
        assert!(verdict.is_allowed());
        assert_eq!(verdict.appended_fields.len(), 1);
        assert_eq!(verdict.appended_fields[0].name(), "_totalAudited");
        assert_eq!(verdict.appended_fields[0].slot_index(), 3);
    }

    #[test]
    fn reorder_rejects_with_first_moved_field() {
        let reordered = SchemaDescriptor::builder("V2", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_totalSupply", SemanticType::Uint256)
            .field("_balances", balances())
            .build();
        let verdict = check(&v1(), &reordered);
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert_eq!(verdict.rule, Some(LayoutRule::PreservedField));
        assert_eq!(verdict.conflicting_field.as_ref().unwrap().name(), "_balances");
        assert_eq!(verdict.violation, Some(Violation::Moved { from: 1, to: 2 }));
        assert!(verdict.reason.unwrap().contains("preserved_field"));
    }

    #[test]
    fn insert_in_middle_rejects_on_shifted_field() {
        let inserted = SchemaDescriptor::builder("V2Wrong", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .field("_totalAudited", SemanticType::Uint256)
            .field("_totalSupply", SemanticType::Uint256)
            .build();
        let verdict = check(&v1(), &inserted);
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert_eq!(
            verdict.conflicting_field.unwrap().name(),
            "_totalSupply"
        );
    }

    #[test]
    fn retype_rejects() {
        let retyped = SchemaDescriptor::builder("V2", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .field("_totalSupply", SemanticType::Int256)
            .build();
        let verdict = check(&v1(), &retyped);
        assert!(matches!(verdict.violation, Some(Violation::Retyped { .. })));
        assert_eq!(verdict.conflicting_field.unwrap().name(), "_totalSupply");
    }

    #[test]
    fn shrinking_an_integer_is_a_resize() {
        let shrunk = SchemaDescriptor::builder("V2", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .field("_totalSupply", SemanticType::Uint128)
            .build();
        let verdict = check(&v1(), &shrunk);
        assert_eq!(verdict.violation, Some(Violation::Resized { from: 32, to: 16 }));
    }

    #[test]
    fn width_change_without_type_change_is_a_resize() {
        let mut fields = v1().fields().to_vec();
        fields[2] = FieldDescriptor::with_width("_totalSupply", SemanticType::Uint256, 2, 16);
        let verdict = check(&v1(), &SchemaDescriptor::new("Odd", 2, fields));
        assert_eq!(verdict.violation, Some(Violation::Resized { from: 32, to: 16 }));
    }

    #[test]
    fn removal_and_rename_are_distinguished() {
        let removed = SchemaDescriptor::builder("V2", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .build();
        assert_eq!(check(&v1(), &removed).violation, Some(Violation::Removed));

        let renamed = SchemaDescriptor::builder("V2", 2)
            .field("_initialized", SemanticType::Uint8)
            .field("_balances", balances())
            .field("_supply", SemanticType::Uint256)
            .build();
        assert_eq!(
            check(&v1(), &renamed).violation,
            Some(Violation::Renamed {
                to: "_supply".to_string()
            })
        );
    }

    #[test]
    fn appended_field_inside_old_range_rejects() {
        let mut fields = v1().fields().to_vec();
        fields.push(FieldDescriptor::new("_late", SemanticType::Uint256, 1));
        let verdict = check(&v1(), &SchemaDescriptor::new("V2", 2, fields));
        assert_eq!(verdict.rule, Some(LayoutRule::AppendOnly));
        assert_eq!(verdict.violation, Some(Violation::Inserted { below: 3 }));
        assert_eq!(verdict.conflicting_field.unwrap().name(), "_late");
    }

    #[test]
    fn overlapping_appended_fields_reject() {
        let mut fields = v1().fields().to_vec();
        fields.push(FieldDescriptor::new("_gap", SemanticType::array(SemanticType::Uint256, 4), 3));
        fields.push(FieldDescriptor::new("_after", SemanticType::Uint256, 5));
        let verdict = check(&v1(), &SchemaDescriptor::new("V2", 2, fields));
        assert_eq!(verdict.rule, Some(LayoutRule::NoOverlap));
        assert_eq!(verdict.conflicting_field.unwrap().name(), "_after");
        assert_eq!(
            verdict.violation,
            Some(Violation::Overlap {
                with: "_gap".to_string()
            })
        );
    }

    #[test]
    fn check_is_deterministic() {
        let reordered = SchemaDescriptor::builder("V2", 2)
            .field("_totalSupply", SemanticType::Uint256)
            .build();
        assert_eq!(check(&v1(), &reordered), check(&v1(), &reordered));
    }
}
