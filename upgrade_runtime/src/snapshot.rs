//! Snapshot layer: deterministic ledger snapshots.
//!
//! A snapshot carries the ledger image as canonical JSON, the SHA-256 of
//! that JSON, and the kernel fingerprint of the ledger it encodes. No
//! timestamps in snapshot content.
//!
//! Restoring checks, in order: the hash, the kernel version, the image
//! (strict decode), the implementation against the registry, and finally
//! the fingerprint of the rebuilt ledger. Any mismatch means the snapshot
//! is discarded and the session falls back to a full replay.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use upgrade_kernel::error::UpgradeError;
use upgrade_kernel::hashing::hex_digest;
use upgrade_kernel::{
    ImplementationRegistry, LedgerSnapshot, MigrationCoordinator, SchemaDescriptor, SlotStorage,
    StorageWord, UpgradeRecord, KERNEL_VERSION,
};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot {sequence}: content hash mismatch")]
    HashMismatch { sequence: u64 },

    #[error("snapshot {sequence}: written by kernel v{found}, this is kernel v{expected}")]
    KernelVersion {
        sequence: u64,
        found: u32,
        expected: u32,
    },

    #[error("snapshot {sequence}: unknown implementation {implementation}")]
    UnknownImplementation { sequence: u64, implementation: String },

    #[error("snapshot {sequence}: stored layout differs from registered {implementation}")]
    SchemaMismatch { sequence: u64, implementation: String },

    #[error("snapshot {sequence}: restored fingerprint {actual} does not match {expected}")]
    FingerprintMismatch {
        sequence: u64,
        expected: String,
        actual: String,
    },

    #[error("snapshot restore failed: {0}")]
    Restore(#[from] UpgradeError),
}

/// Everything needed to rebuild a coordinator, in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerImage {
    /// Registry name of the active implementation.
    pub implementation: String,
    pub upgradeable: bool,
    pub schema: SchemaDescriptor,
    pub history: Vec<UpgradeRecord>,
    /// Non-zero words in ascending slot order.
    pub storage: Vec<StorageWord>,
}

impl LedgerImage {
    pub fn capture(coordinator: &MigrationCoordinator) -> Self {
        let snapshot = coordinator.snapshot();
        Self {
            implementation: snapshot.schema.name().to_string(),
            upgradeable: snapshot.upgradeable,
            schema: snapshot.schema,
            history: snapshot.history,
            storage: snapshot.storage.to_words(),
        }
    }
}

/// Snapshot on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Sequence number of the last record the snapshot includes.
    pub sequence: u64,
    /// Kernel version at snapshot time.
    pub kernel_version: u32,
    /// Kernel fingerprint of the ledger.
    pub fingerprint: String,
    /// Canonical JSON of the `LedgerImage` (UTF-8).
    pub canonical_json: String,
    /// SHA-256 of `canonical_json`.
    pub hash: String,
}

impl Snapshot {
    /// Capture the coordinator's current state.
    pub fn capture(sequence: u64, coordinator: &MigrationCoordinator) -> Result<Self, SnapshotError> {
        let image = LedgerImage::capture(coordinator);
        let canonical_json = serde_json::to_string(&image)?;
        let hash = hex_digest(canonical_json.as_bytes());
        Ok(Self {
            sequence,
            kernel_version: KERNEL_VERSION,
            fingerprint: coordinator.fingerprint(),
            canonical_json,
            hash,
        })
    }
}

fn snapshot_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("snapshot_{:06}.json", sequence))
}

/// Save a deterministic snapshot of the coordinator's current state.
pub fn save_snapshot(
    dir: &Path,
    sequence: u64,
    coordinator: &MigrationCoordinator,
) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;

    let snap = Snapshot::capture(sequence, coordinator)?;
    let path = snapshot_path(dir, sequence);
    let content = serde_json::to_string(&snap)?;

    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    info!(sequence, fingerprint = %snap.fingerprint, path = %path.display(), "snapshot saved");
    Ok(path)
}

/// Load the snapshot at a specific sequence number, if any.
pub fn load_snapshot(dir: &Path, sequence: u64) -> Result<Option<Snapshot>, SnapshotError> {
    let path = snapshot_path(dir, sequence);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Sequence numbers of all snapshots in a directory, ascending.
pub fn list_snapshots(dir: &Path) -> Result<Vec<u64>, SnapshotError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut sequences = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let seq = name
            .to_string_lossy()
            .strip_prefix("snapshot_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(seq) = seq {
            sequences.push(seq);
        }
    }
    sequences.sort_unstable();
    Ok(sequences)
}

/// Load the latest snapshot in a directory.
pub fn load_latest_snapshot(dir: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    match list_snapshots(dir)?.last() {
        Some(seq) => load_snapshot(dir, *seq),
        None => Ok(None),
    }
}

/// True if the hash matches the canonical JSON content.
pub fn verify_snapshot_hash(snap: &Snapshot) -> bool {
    hex_digest(snap.canonical_json.as_bytes()) == snap.hash
}

/// Verify a snapshot and rebuild the coordinator it encodes.
pub fn restore_snapshot(
    snap: &Snapshot,
    registry: &ImplementationRegistry,
) -> Result<MigrationCoordinator, SnapshotError> {
    let sequence = snap.sequence;
    if !verify_snapshot_hash(snap) {
        return Err(SnapshotError::HashMismatch { sequence });
    }
    if snap.kernel_version != KERNEL_VERSION {
        return Err(SnapshotError::KernelVersion {
            sequence,
            found: snap.kernel_version,
            expected: KERNEL_VERSION,
        });
    }

    let image: LedgerImage = serde_json::from_str(&snap.canonical_json)?;
    let implementation = registry.get(&image.implementation).ok_or_else(|| {
        SnapshotError::UnknownImplementation {
            sequence,
            implementation: image.implementation.clone(),
        }
    })?;
    if implementation.schema != image.schema {
        return Err(SnapshotError::SchemaMismatch {
            sequence,
            implementation: image.implementation,
        });
    }

    let coordinator = MigrationCoordinator::restore(LedgerSnapshot {
        schema: image.schema,
        logic: implementation.logic.clone(),
        storage: SlotStorage::from_words(&image.storage),
        history: image.history,
        upgradeable: image.upgradeable,
    })?;

    let actual = coordinator.fingerprint();
    if actual != snap.fingerprint {
        return Err(SnapshotError::FingerprintMismatch {
            sequence,
            expected: snap.fingerprint.clone(),
            actual,
        });
    }
    Ok(coordinator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use std::sync::Arc;
    use upgrade_kernel::implementations::{token_v1_schema, token_v2_schema};
    use upgrade_kernel::logic::{TokenV1, TokenV2};

    fn deployer() -> Address {
        Address::repeat_byte(0x11)
    }

    fn ledger() -> MigrationCoordinator {
        let c = MigrationCoordinator::deploy(token_v1_schema(), Arc::new(TokenV1), deployer()).unwrap();
        c.mint(deployer(), deployer(), U256::from(9u64)).unwrap();
        c.upgrade(token_v2_schema(), Arc::new(TokenV2)).unwrap();
        c
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("upgrade_snapshot_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn capture_is_deterministic() {
        let c = ledger();
        let a = Snapshot::capture(3, &c).unwrap();
        let b = Snapshot::capture(3, &c).unwrap();
        assert_eq!(a.canonical_json, b.canonical_json);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert!(verify_snapshot_hash(&a));
    }

    #[test]
    fn save_load_restore_round_trip() {
        let dir = temp_dir("round_trip");
        let c = ledger();
        save_snapshot(&dir, 3, &c).unwrap();

        let snap = load_latest_snapshot(&dir).unwrap().unwrap();
        assert_eq!(snap.sequence, 3);
        let restored = restore_snapshot(&snap, &ImplementationRegistry::builtin()).unwrap();
        assert_eq!(restored.fingerprint(), c.fingerprint());
        assert_eq!(restored.history(), c.history());
        assert_eq!(restored.total_audited(), Some(U256::ZERO));
        assert!(restored.is_upgradeable());
    }

    #[test]
    fn latest_snapshot_wins() {
        let dir = temp_dir("latest");
        let c = ledger();
        save_snapshot(&dir, 2, &c).unwrap();
        save_snapshot(&dir, 10, &c).unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();
        assert_eq!(list_snapshots(&dir).unwrap(), vec![2, 10]);
        assert_eq!(load_latest_snapshot(&dir).unwrap().unwrap().sequence, 10);
    }

    #[test]
    fn tampered_content_is_rejected() {
        let mut snap = Snapshot::capture(1, &ledger()).unwrap();
        snap.canonical_json = snap.canonical_json.replace("TokenUpgradeableV2", "TokenUpgradeableV1");
        assert!(!verify_snapshot_hash(&snap));
        assert!(matches!(
            restore_snapshot(&snap, &ImplementationRegistry::builtin()),
            Err(SnapshotError::HashMismatch { sequence: 1 })
        ));
    }

    #[test]
    fn unknown_implementation_is_rejected() {
        let snap = Snapshot::capture(1, &ledger()).unwrap();
        assert!(matches!(
            restore_snapshot(&snap, &ImplementationRegistry::new()),
            Err(SnapshotError::UnknownImplementation { .. })
        ));
    }

    #[test]
    fn wrong_fingerprint_is_rejected() {
        let mut snap = Snapshot::capture(1, &ledger()).unwrap();
        snap.fingerprint = "0".repeat(64);
        assert!(matches!(
            restore_snapshot(&snap, &ImplementationRegistry::builtin()),
            Err(SnapshotError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_file_is_a_json_error() {
        let dir = temp_dir("corrupted");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("snapshot_000004.json"), b"{ not valid json !!!}").unwrap();
        assert!(matches!(load_snapshot(&dir, 4), Err(SnapshotError::Json(_))));
    }
}
