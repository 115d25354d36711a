//! Append-only operation store: binary protobuf log.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only: no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Sequence strictly increasing from 1 (validated on append and load)
//!   - Only committed operations are appended

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use thiserror::Error;
use tracing::debug;

use crate::proto_bridge::{proto_to_record, record_to_proto, DecodeError};
use crate::proto_types::ProtoLogRecord;
use crate::record::LogEnvelope;

/// Largest accepted frame.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("operation store I/O: {0}")]
    Io(#[from] io::Error),

    #[error("sequence violation in operation store: expected {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },

    #[error("invalid frame length {len} at offset {offset}")]
    InvalidFrame { len: usize, offset: u64 },

    #[error("truncated frame at offset {offset}")]
    Truncated { offset: u64 },

    #[error("protobuf decode error at offset {offset}: {source}")]
    Protobuf {
        offset: u64,
        #[source]
        source: prost::DecodeError,
    },

    #[error(transparent)]
    Record(#[from] DecodeError),
}

/// Append-only operation log backed by a binary file.
pub struct OperationStore {
    path: PathBuf,
    last_sequence: u64,
}

impl OperationStore {
    /// Open or create a log at the given path.
    /// Reads existing frames to determine the last sequence number.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            let frames = Self::read_all_from_file(path)?;
            frames.last().map(|r| r.sequence).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    /// Append a single record: next sequence only, length-prefixed, fsynced.
    pub fn append(&mut self, envelope: &LogEnvelope) -> Result<(), StoreError> {
        let expected = self.last_sequence + 1;
        if envelope.sequence != expected {
            return Err(StoreError::SequenceViolation {
                expected,
                got: envelope.sequence,
            });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let buf = record_to_proto(envelope).encode_to_vec();
        let len = buf.len() as u32;

        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.last_sequence = envelope.sequence;
        debug!(sequence = envelope.sequence, bytes = buf.len(), "record appended");
        Ok(())
    }

    /// Load and decode all records in sequence order.
    pub fn load_all(&self) -> Result<Vec<LogEnvelope>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all_from_file(&self.path)?
            .iter()
            .map(|frame| proto_to_record(frame).map_err(StoreError::from))
            .collect()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all frames from a file, validating frame integrity and sequence.
    fn read_all_from_file(path: &Path) -> Result<Vec<ProtoLogRecord>, StoreError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut frames = Vec::new();
        let mut len_buf = [0u8; 4];
        let mut offset: u64 = 0;

        loop {
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_BYTES {
                return Err(StoreError::InvalidFrame { len, offset });
            }

            let mut frame = vec![0u8; len];
            reader
                .read_exact(&mut frame)
                .map_err(|_| StoreError::Truncated { offset })?;

            let record = ProtoLogRecord::decode(frame.as_slice())
                .map_err(|source| StoreError::Protobuf { offset, source })?;

            let expected = frames.len() as u64 + 1;
            if record.sequence != expected {
                return Err(StoreError::SequenceViolation {
                    expected,
                    got: record.sequence,
                });
            }

            frames.push(record);
            offset += 4 + len as u64;
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use upgrade_kernel::Operation;

    use crate::record::Deployment;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("upgrade_operation_store_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir.join("operations.log")
    }

    fn genesis() -> LogEnvelope {
        LogEnvelope::deploy(Deployment {
            implementation: "TokenUpgradeableV1".to_string(),
            deployer: Address::repeat_byte(0x11),
            upgradeable: true,
        })
    }

    fn mint(sequence: u64) -> LogEnvelope {
        LogEnvelope::operation(
            sequence,
            Operation::Mint {
                caller: Address::repeat_byte(0x11),
                target: Address::repeat_byte(0x33),
                amount: U256::from(sequence),
            },
        )
    }

    #[test]
    fn append_then_reopen() {
        let path = temp_path("reopen");
        {
            let mut store = OperationStore::open(&path).unwrap();
            store.append(&genesis()).unwrap();
            store.append(&mint(2)).unwrap();
        }
        let store = OperationStore::open(&path).unwrap();
        assert_eq!(store.last_sequence(), 2);
        let records = store.load_all().unwrap();
        assert_eq!(records, vec![genesis(), mint(2)]);
    }

    #[test]
    fn gaps_are_refused() {
        let path = temp_path("gaps");
        let mut store = OperationStore::open(&path).unwrap();
        store.append(&genesis()).unwrap();
        let err = store.append(&mint(3)).unwrap_err();
        assert!(matches!(err, StoreError::SequenceViolation { expected: 2, got: 3 }));
        assert_eq!(store.last_sequence(), 1);
    }

    #[test]
    fn truncated_tail_is_detected() {
        let path = temp_path("truncated");
        {
            let mut store = OperationStore::open(&path).unwrap();
            store.append(&genesis()).unwrap();
            store.append(&mint(2)).unwrap();
        }
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(
            OperationStore::open(&path),
            Err(StoreError::Truncated { .. })
        ));
    }

    #[test]
    fn zero_length_frame_is_invalid() {
        let path = temp_path("zero_frame");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, 0u32.to_le_bytes()).unwrap();
        assert!(matches!(
            OperationStore::open(&path),
            Err(StoreError::InvalidFrame { len: 0, offset: 0 })
        ));
    }
}
