//! Scenario files: a deployment plus a list of operations, run through a
//! session. Rejected operations are expected outcomes, not failures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use upgrade_kernel::Operation;

use crate::record::Deployment;
use crate::session::{Session, SessionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub deployment: Deployment,
    pub operations: Vec<Operation>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ScenarioError {
    #[error("scenario I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happened to one scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Committed { sequence: u64 },
    Rejected { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// End state of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub implementation: String,
    pub version: u32,
    /// Decimal amounts.
    pub total_supply: String,
    pub total_audited: Option<String>,
    pub sequence: u64,
    pub fingerprint: String,
}

impl ScenarioReport {
    pub fn rejected(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Rejected { .. }))
            .count()
    }
}

/// Run every operation; kernel rejections are recorded and the run goes on.
/// Persistence failures abort the run.
pub fn run(session: &mut Session, operations: &[Operation]) -> Result<ScenarioReport, SessionError> {
    let mut steps = Vec::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate() {
        let outcome = match session.apply(operation) {
            Ok(sequence) => StepOutcome::Committed { sequence },
            Err(SessionError::Rejected(err)) => StepOutcome::Rejected {
                error: err.to_string(),
            },
            Err(other) => return Err(other),
        };
        steps.push(StepReport {
            index,
            op: operation.kind(),
            outcome,
        });
    }

    let ledger = session.coordinator();
    let report = ScenarioReport {
        steps,
        implementation: ledger.implementation(),
        version: ledger.version(),
        total_supply: ledger.total_supply().to_string(),
        total_audited: ledger.total_audited().map(|a| a.to_string()),
        sequence: session.current_sequence(),
        fingerprint: session.current_hash(),
    };
    info!(
        steps = report.steps.len(),
        rejected = report.rejected(),
        fingerprint = %report.fingerprint,
        "scenario finished"
    );
    Ok(report)
}
