/// Slot Storage
///
/// Version-agnostic persistent storage: an addressable space of 32-byte
/// words. Schemas are index maps over this space; storage itself knows
/// nothing about fields, types or versions.
///
/// Unwritten slots read as zero. Writing zero removes the slot, so two
/// storages holding the same values compare equal regardless of history.

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Address of a storage word.
pub type Slot = U256;

/// Width of one storage word in bytes.
pub const WORD_BYTES: u32 = 32;

/// Pending writes of a transaction, applied all at once on commit.
pub type WriteSet = BTreeMap<Slot, U256>;

/// A single (slot, value) pair, the on-disk form of a storage word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageWord {
    pub slot: Slot,
    pub value: U256,
}

/// Word-addressed storage arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotStorage {
    words: BTreeMap<Slot, U256>,
}

impl SlotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a word. Absent slots are zero.
    pub fn load(&self, slot: Slot) -> U256 {
        self.words.get(&slot).copied().unwrap_or(U256::ZERO)
    }

    /// Write a word. Zero clears the slot.
    pub fn store(&mut self, slot: Slot, value: U256) {
        if value.is_zero() {
            self.words.remove(&slot);
        } else {
            self.words.insert(slot, value);
        }
    }

    /// Clear every word in `start..end`. Visits only stored words, so the
    /// cost does not depend on the width of the range.
    pub fn clear_range(&mut self, start: Slot, end: Slot) {
        if start >= end {
            return;
        }
        let stale: Vec<Slot> = self.words.range(start..end).map(|(slot, _)| *slot).collect();
        for slot in stale {
            self.words.remove(&slot);
        }
    }

    /// Apply a transaction's write set.
    pub fn apply(&mut self, writes: WriteSet) {
        for (slot, value) in writes {
            self.store(slot, value);
        }
    }

    /// Number of non-zero words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Non-zero words in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &U256)> {
        self.words.iter()
    }

    /// Export as an ordered list of words.
    pub fn to_words(&self) -> Vec<StorageWord> {
        self.words
            .iter()
            .map(|(slot, value)| StorageWord {
                slot: *slot,
                value: *value,
            })
            .collect()
    }

    /// Rebuild from exported words. Zero-valued words are dropped.
    pub fn from_words(words: &[StorageWord]) -> Self {
        let mut storage = Self::new();
        for w in words {
            storage.store(w.slot, w.value);
        }
        storage
    }
}

/// Slot of `mapping[key]` for a mapping whose base slot is `base`:
/// `keccak256(key ++ base)`, both as 32-byte big-endian words.
pub fn mapping_slot(base: Slot, key: B256) -> Slot {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(key.as_slice());
    preimage[32..].copy_from_slice(&base.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(preimage).0)
}

/// Left-pad an account into a mapping key.
pub fn address_key(account: Address) -> B256 {
    account.into_word()
}
