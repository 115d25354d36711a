/// Schema Descriptors
///
/// Pure data describing the declared storage shape of one implementation
/// version: which named field lives at which slot, with which type and
/// width. Descriptors are immutable once built.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::storage::WORD_BYTES;

// ── Semantic types ─────────────────────────────────────────────────

/// Declared type of a storage field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Uint8,
    Uint64,
    Uint128,
    Uint256,
    Int256,
    Address,
    Bool,
    Bytes32,
    /// Hashed mapping. Occupies one base slot; entries live elsewhere.
    Mapping {
        key: Box<SemanticType>,
        value: Box<SemanticType>,
    },
    /// Fixed-length array laid out inline from its base slot.
    Array {
        element: Box<SemanticType>,
        length: u32,
    },
}

impl SemanticType {
    pub fn mapping(key: SemanticType, value: SemanticType) -> Self {
        SemanticType::Mapping {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn array(element: SemanticType, length: u32) -> Self {
        SemanticType::Array {
            element: Box::new(element),
            length,
        }
    }

    /// Width in bytes this type occupies in the slot space. `None` when an
    /// array is too large for a `u32` width.
    pub fn natural_width(&self) -> Option<u32> {
        match self {
            SemanticType::Uint8 | SemanticType::Bool => Some(1),
            SemanticType::Uint64 => Some(8),
            SemanticType::Uint128 => Some(16),
            SemanticType::Address => Some(20),
            SemanticType::Uint256
            | SemanticType::Int256
            | SemanticType::Bytes32
            | SemanticType::Mapping { .. } => Some(WORD_BYTES),
            SemanticType::Array { element, length } => element.natural_width()?.checked_mul(*length),
        }
    }

    /// Two types differ only in size: unsigned integers of different
    /// widths, or arrays of the same element with different lengths.
    pub fn same_family(&self, other: &SemanticType) -> bool {
        match (self, other) {
            (
                SemanticType::Array { element: a, .. },
                SemanticType::Array { element: b, .. },
            ) => a == b,
            _ => self.is_unsigned() && other.is_unsigned(),
        }
    }

    fn is_unsigned(&self) -> bool {
        matches!(
            self,
            SemanticType::Uint8
                | SemanticType::Uint64
                | SemanticType::Uint128
                | SemanticType::Uint256
        )
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Uint8 => write!(f, "uint8"),
            SemanticType::Uint64 => write!(f, "uint64"),
            SemanticType::Uint128 => write!(f, "uint128"),
            SemanticType::Uint256 => write!(f, "uint256"),
            SemanticType::Int256 => write!(f, "int256"),
            SemanticType::Address => write!(f, "address"),
            SemanticType::Bool => write!(f, "bool"),
            SemanticType::Bytes32 => write!(f, "bytes32"),
            SemanticType::Mapping { key, value } => write!(f, "mapping({} => {})", key, value),
            SemanticType::Array { element, length } => write!(f, "{}[{}]", element, length),
        }
    }
}

// ── Fields ─────────────────────────────────────────────────────────

/// One declared storage field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    name: String,
    semantic_type: SemanticType,
    slot_index: u64,
    byte_width: u32,
}

impl FieldDescriptor {
    /// Field with the type's natural width. A type with no representable
    /// width gets width 0, which `validate` rejects.
    pub fn new(name: impl Into<String>, semantic_type: SemanticType, slot_index: u64) -> Self {
        let byte_width = semantic_type.natural_width().unwrap_or(0);
        Self::with_width(name, semantic_type, slot_index, byte_width)
    }

    /// Field with an explicit width. Not validated here.
    pub fn with_width(
        name: impl Into<String>,
        semantic_type: SemanticType,
        slot_index: u64,
        byte_width: u32,
    ) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            slot_index,
            byte_width,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic_type(&self) -> &SemanticType {
        &self.semantic_type
    }

    pub fn slot_index(&self) -> u64 {
        self.slot_index
    }

    pub fn byte_width(&self) -> u32 {
        self.byte_width
    }

    /// Number of whole slots this field occupies (at least one).
    pub fn slot_span(&self) -> u64 {
        u64::from(self.byte_width.div_ceil(WORD_BYTES).max(1))
    }

    /// One past the last slot this field occupies.
    pub fn slot_end(&self) -> u64 {
        self.slot_index.saturating_add(self.slot_span())
    }

    /// Same slot, type and width. The name is not compared.
    pub fn same_shape(&self, other: &FieldDescriptor) -> bool {
        self.slot_index == other.slot_index
            && self.semantic_type == other.semantic_type
            && self.byte_width == other.byte_width
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ slot {} ({} bytes)",
            self.semantic_type, self.name, self.slot_index, self.byte_width
        )
    }
}

// ── Schemas ────────────────────────────────────────────────────────

/// Declared storage shape of one implementation version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDescriptor {
    name: String,
    version: u32,
    fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    /// Assemble a descriptor from raw fields. Call `validate` before use.
    pub fn new(name: impl Into<String>, version: u32, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            version,
            fields,
        }
    }

    /// Empty layout: what exists before the first deployment.
    pub fn empty() -> Self {
        Self::new("empty", 0, Vec::new())
    }

    pub fn builder(name: impl Into<String>, version: u32) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            version,
            fields: Vec::new(),
            next_slot: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// One past the highest slot used by any field; 0 when empty.
    pub fn slot_end(&self) -> u64 {
        self.fields.iter().map(FieldDescriptor::slot_end).max().unwrap_or(0)
    }

    /// Check the descriptor invariants:
    /// unique names, natural widths, strictly increasing non-overlapping slots.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        let mut next_free: u64 = 0;

        for (i, field) in self.fields.iter().enumerate() {
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    name: field.name.clone(),
                });
            }

            let natural = field.semantic_type.natural_width();
            let nested_mapping = matches!(
                &field.semantic_type,
                SemanticType::Array { element, .. } if matches!(**element, SemanticType::Mapping { .. })
            );
            if field.byte_width == 0 || natural != Some(field.byte_width) || nested_mapping {
                return Err(SchemaError::InvalidWidth {
                    schema: self.name.clone(),
                    name: field.name.clone(),
                    semantic_type: field.semantic_type.to_string(),
                    width: field.byte_width,
                });
            }

            if i > 0 && field.slot_index < next_free {
                return Err(SchemaError::Misordered {
                    schema: self.name.clone(),
                    name: field.name.clone(),
                    slot: field.slot_index,
                });
            }
            next_free = field.slot_end();
        }
        Ok(())
    }
}

/// Builds a valid descriptor by assigning contiguous slots in
/// declaration order.
pub struct SchemaBuilder {
    name: String,
    version: u32,
    fields: Vec<FieldDescriptor>,
    next_slot: u64,
}

impl SchemaBuilder {
    /// Append a field at the next free slot.
    pub fn field(mut self, name: impl Into<String>, semantic_type: SemanticType) -> Self {
        let field = FieldDescriptor::new(name, semantic_type, self.next_slot);
        self.next_slot = field.slot_end();
        self.fields.push(field);
        self
    }

    /// Leave `slots` unused slots before the next field.
    pub fn skip(mut self, slots: u64) -> Self {
        self.next_slot = self.next_slot.saturating_add(slots);
        self
    }

    pub fn build(self) -> SchemaDescriptor {
        SchemaDescriptor::new(self.name, self.version, self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaDescriptor {
        SchemaDescriptor::builder("Sample", 1)
            .field("flag", SemanticType::Bool)
            .field(
                "ledger",
                SemanticType::mapping(SemanticType::Address, SemanticType::Uint256),
            )
            .field("gap", SemanticType::array(SemanticType::Uint256, 3))
            .field("owner", SemanticType::Address)
            .build()
    }

    #[test]
    fn builder_assigns_contiguous_slots() {
        let s = sample();
        let slots: Vec<u64> = s.fields().iter().map(|f| f.slot_index()).collect();
        assert_eq!(slots, vec![0, 1, 2, 5]);
        assert_eq!(s.slot_end(), 6);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn array_spans_multiple_slots() {
        let f = FieldDescriptor::new("gap", SemanticType::array(SemanticType::Uint256, 50), 10);
        assert_eq!(f.byte_width(), 1600);
        assert_eq!(f.slot_span(), 50);
        assert_eq!(f.slot_end(), 60);
    }

    #[test]
    fn oversized_array_is_invalid_not_truncated() {
        let huge = SemanticType::array(SemanticType::Uint256, 200_000_000);
        assert_eq!(huge.natural_width(), None);

        let s = SchemaDescriptor::builder("Huge", 1)
            .skip(4)
            .field("gap", huge)
            .build();
        assert_eq!(s.fields()[0].byte_width(), 0);
        assert!(matches!(s.validate(), Err(SchemaError::InvalidWidth { width: 0, .. })));
    }

    #[test]
    fn largest_representable_array_keeps_its_span() {
        let t = SemanticType::array(SemanticType::Uint256, u32::MAX / WORD_BYTES);
        let f = FieldDescriptor::new("gap", t, 0);
        assert_eq!(f.slot_span(), u64::from(u32::MAX / WORD_BYTES));
    }

    #[test]
    fn small_types_still_take_a_whole_slot() {
        let f = FieldDescriptor::new("flag", SemanticType::Bool, 4);
        assert_eq!(f.slot_span(), 1);
    }

    #[test]
    fn duplicate_names_are_invalid() {
        let s = SchemaDescriptor::new(
            "Dup",
            1,
            vec![
                FieldDescriptor::new("a", SemanticType::Uint256, 0),
                FieldDescriptor::new("a", SemanticType::Uint256, 1),
            ],
        );
        assert!(matches!(s.validate(), Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn overlapping_fields_are_invalid() {
        let s = SchemaDescriptor::new(
            "Overlap",
            1,
            vec![
                FieldDescriptor::new("arr", SemanticType::array(SemanticType::Uint256, 2), 0),
                FieldDescriptor::new("b", SemanticType::Uint256, 1),
            ],
        );
        assert!(matches!(s.validate(), Err(SchemaError::Misordered { slot: 1, .. })));
    }

    #[test]
    fn wrong_width_is_invalid() {
        let s = SchemaDescriptor::new(
            "Width",
            1,
            vec![FieldDescriptor::with_width("a", SemanticType::Uint256, 0, 16)],
        );
        assert!(matches!(s.validate(), Err(SchemaError::InvalidWidth { .. })));
    }

    #[test]
    fn type_display() {
        let t = SemanticType::mapping(
            SemanticType::Bytes32,
            SemanticType::mapping(SemanticType::Address, SemanticType::Bool),
        );
        assert_eq!(t.to_string(), "mapping(bytes32 => mapping(address => bool))");
    }

    #[test]
    fn schema_json_shape() {
        let s = sample();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"slot_index\":5"));
        let back: SchemaDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
