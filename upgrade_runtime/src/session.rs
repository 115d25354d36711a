//! Session manager: isolated ledgers with apply-then-persist semantics.
//!
//! Each session gets its own directory with an operation log and snapshots.
//! Concurrency: Mutex for write serialization, no global mutable state.
//!
//! Apply-then-persist order:
//!   1. kernel applies the operation; a rejection returns here, nothing logged
//!   2. operation_store.append(): only if step 1 committed
//!   3. snapshot if the interval is reached
//!
//! A failed append leaves the ledger ahead of its log. The session then
//! rebuilds from the log and refuses writes until that rebuild succeeds.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{info, warn};

use upgrade_kernel::error::OperationError;
use upgrade_kernel::{apply_operation, ImplementationRegistry, MigrationCoordinator, Operation};

use crate::config::RuntimeConfig;
use crate::operation_store::{OperationStore, StoreError};
use crate::record::{Deployment, LogEnvelope, LogRecord};
use crate::replay::{self, ReplayError};
use crate::snapshot::{self, SnapshotError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session {0} already has an operation log")]
    AlreadyExists(String),

    #[error("session {0} has no operation log")]
    NotFound(String),

    #[error(transparent)]
    Rejected(#[from] OperationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("session {session} was deployed as {logged}, not {requested}")]
    DeploymentMismatch {
        session: String,
        logged: String,
        requested: String,
    },

    #[error("session {0} is out of step with its operation log; replay it before applying more")]
    Diverged(String),

    #[error("session lock poisoned")]
    LockPoisoned,
}

/// An isolated ledger with its own operation log and snapshots.
pub struct Session {
    session_id: String,
    base_dir: PathBuf,
    registry: ImplementationRegistry,
    coordinator: MigrationCoordinator,
    store: OperationStore,
    snapshot_interval: u64,
    current_sequence: u64,
    /// Set when a committed operation could not be logged.
    diverged: bool,
}

impl Session {
    /// Start a new session by deploying a ledger.
    ///
    /// Directory structure:
    ///   <base_dir>/<session_id>/operations.log
    ///   <base_dir>/<session_id>/snapshots/
    pub fn create(
        base_dir: &Path,
        session_id: &str,
        snapshot_interval: u64,
        registry: ImplementationRegistry,
        deployment: Deployment,
    ) -> Result<Self, SessionError> {
        let session_dir = base_dir.join(session_id);
        let mut store = OperationStore::open(&session_dir.join("operations.log"))?;
        if store.last_sequence() > 0 {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }

        let coordinator = deployment.deploy(&registry)?;
        store.append(&LogEnvelope::deploy(deployment))?;
        info!(session = session_id, "session created");

        Ok(Self {
            session_id: session_id.to_string(),
            base_dir: session_dir,
            registry,
            coordinator,
            store,
            snapshot_interval,
            current_sequence: 1,
            diverged: false,
        })
    }

    /// Reopen an existing session.
    ///
    /// Restores the latest snapshot that verifies and replays the log tail
    /// after it. A snapshot that fails verification is skipped in favor of
    /// a full replay.
    pub fn open(
        base_dir: &Path,
        session_id: &str,
        snapshot_interval: u64,
        registry: ImplementationRegistry,
    ) -> Result<Self, SessionError> {
        let session_dir = base_dir.join(session_id);
        let store = OperationStore::open(&session_dir.join("operations.log"))?;
        let last_sequence = store.last_sequence();
        if last_sequence == 0 {
            return Err(SessionError::NotFound(session_id.to_string()));
        }

        let records = store.load_all()?;
        let coordinator = match Self::from_snapshot(&session_dir, &records, &registry) {
            Ok(Some(coordinator)) => coordinator,
            Ok(None) => replay::rebuild_state(&records, &registry)?.0,
            Err(err) => {
                warn!(session = session_id, error = %err, "snapshot unusable, replaying full log");
                replay::rebuild_state(&records, &registry)?.0
            }
        };
        info!(session = session_id, sequence = last_sequence, "session opened");

        Ok(Self {
            session_id: session_id.to_string(),
            base_dir: session_dir,
            registry,
            coordinator,
            store,
            snapshot_interval,
            current_sequence: last_sequence,
            diverged: false,
        })
    }

    /// Open the configured session, creating it with `deployment` if its
    /// log does not exist yet. An existing session must have been deployed
    /// with the same `deployment`.
    pub fn open_or_create(
        config: &RuntimeConfig,
        registry: ImplementationRegistry,
        deployment: Deployment,
    ) -> Result<Self, SessionError> {
        match Self::open(&config.data_dir, &config.session_id, config.snapshot_interval, registry.clone()) {
            Err(SessionError::NotFound(_)) => Self::create(
                &config.data_dir,
                &config.session_id,
                config.snapshot_interval,
                registry,
                deployment,
            ),
            Err(err) => Err(err),
            Ok(session) => {
                let logged = session.deployment()?;
                if logged != deployment {
                    return Err(SessionError::DeploymentMismatch {
                        session: config.session_id.clone(),
                        logged: describe(&logged),
                        requested: describe(&deployment),
                    });
                }
                Ok(session)
            }
        }
    }

    fn from_snapshot(
        session_dir: &Path,
        records: &[LogEnvelope],
        registry: &ImplementationRegistry,
    ) -> Result<Option<MigrationCoordinator>, SessionError> {
        let Some(snap) = snapshot::load_latest_snapshot(&session_dir.join("snapshots"))? else {
            return Ok(None);
        };
        if snap.sequence > records.len() as u64 {
            return Ok(None);
        }
        let coordinator = snapshot::restore_snapshot(&snap, registry)?;
        let tail = &records[snap.sequence as usize..];
        replay::apply_records(&coordinator, tail, registry)?;
        Ok(Some(coordinator))
    }

    /// Apply a single operation: commit through the kernel, then persist.
    ///
    /// Returns the sequence number the operation was logged under.
    pub fn apply(&mut self, operation: &Operation) -> Result<u64, SessionError> {
        if self.diverged {
            return Err(SessionError::Diverged(self.session_id.clone()));
        }

        // Step 1: kernel. A rejection leaves ledger and log untouched.
        apply_operation(&self.coordinator, &self.registry, operation)?;

        // Step 2: persist.
        let sequence = self.current_sequence + 1;
        if let Err(err) = self
            .store
            .append(&LogEnvelope::operation(sequence, operation.clone()))
        {
            self.diverged = true;
            warn!(session = %self.session_id, sequence, error = %err, "append failed, rebuilding from log");
            if let Err(replay_err) = self.replay_full() {
                warn!(session = %self.session_id, error = %replay_err, "rebuild failed, session stays read-only");
            }
            return Err(err.into());
        }
        self.current_sequence = sequence;

        // Step 3: auto-snapshot at interval.
        if self.snapshot_interval > 0 && sequence % self.snapshot_interval == 0 {
            self.snapshot()?;
        }
        Ok(sequence)
    }

    /// Write a snapshot at the current sequence.
    pub fn snapshot(&self) -> Result<PathBuf, SessionError> {
        let dir = self.base_dir.join("snapshots");
        Ok(snapshot::save_snapshot(&dir, self.current_sequence, &self.coordinator)?)
    }

    /// Full replay from the log: rebuild the ledger and replace the live one.
    /// Clears a diverged session.
    pub fn replay_full(&mut self) -> Result<String, SessionError> {
        let records = self.store.load_all()?;
        let (coordinator, hash) = replay::rebuild_state(&records, &self.registry)?;
        self.coordinator = coordinator;
        self.current_sequence = records.last().map(|r| r.sequence).unwrap_or(0);
        self.diverged = false;
        Ok(hash)
    }

    /// Whether a failed append left the ledger ahead of its log.
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    /// All records in the log.
    pub fn records(&self) -> Result<Vec<LogEnvelope>, SessionError> {
        Ok(self.store.load_all()?)
    }

    /// The genesis record of this session.
    pub fn deployment(&self) -> Result<Deployment, SessionError> {
        match self.records()?.into_iter().next().map(|r| r.record) {
            Some(LogRecord::Deploy(deployment)) => Ok(deployment),
            _ => Err(ReplayError::MissingDeployment.into()),
        }
    }

    pub fn coordinator(&self) -> &MigrationCoordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &ImplementationRegistry {
        &self.registry
    }

    pub fn current_hash(&self) -> String {
        self.coordinator.fingerprint()
    }

    pub fn current_sequence(&self) -> u64 {
        self.current_sequence
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn describe(deployment: &Deployment) -> String {
    format!(
        "{} by {}{}",
        deployment.implementation,
        deployment.deployer,
        if deployment.upgradeable { "" } else { " (fixed)" }
    )
}

/// Thread-safe session handle using Mutex.
pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    // A panic between kernel commit and log append would leave the two
    // out of step, so a poisoned session is not handed out again.
    fn lock(&self) -> Result<MutexGuard<'_, Session>, SessionError> {
        self.inner.lock().map_err(|_| SessionError::LockPoisoned)
    }

    /// Apply an operation under lock.
    pub fn apply(&self, operation: &Operation) -> Result<u64, SessionError> {
        self.lock()?.apply(operation)
    }

    pub fn current_hash(&self) -> Result<String, SessionError> {
        Ok(self.lock()?.current_hash())
    }

    pub fn current_sequence(&self) -> Result<u64, SessionError> {
        Ok(self.lock()?.current_sequence())
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, SessionError> {
        Ok(f(&mut *self.lock()?))
    }
}
