//! Driving Ports (API - Inbound)

use crate::domain::{Epoch, ValidatorGroup, ValidatorIndex, WindowSummary};
use crate::error::DetectionResult;
use async_trait::async_trait;
use serde::Serialize;

/// Why a check produced the decision it did.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// The window was evaluated in full
    Evaluated(WindowSummary),
    /// Another active window holds one of the group's validators
    RaceDetected {
        validator_index: ValidatorIndex,
        epoch: Epoch,
    },
}

/// Conclusive answer to a check request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckDecision {
    pub start: bool,
    pub reason: DecisionReason,
}

impl CheckDecision {
    pub fn race(validator_index: ValidatorIndex, epoch: Epoch) -> Self {
        Self {
            start: false,
            reason: DecisionReason::RaceDetected {
                validator_index,
                epoch,
            },
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub epoch: Epoch,
    /// Rows returned to idle by this pass
    pub cleared: Vec<ValidatorIndex>,
    /// Rows whose window is still open
    pub still_active: usize,
}

/// Primary detection API
///
/// Driven by the HTTP check endpoint and the periodic sweep task.
#[async_trait]
pub trait DoppelgangerApi: Send + Sync {
    /// Decide whether the group's validator client may start.
    ///
    /// Inconclusive and failed checks are errors, never `start = true`.
    async fn evaluate_group(&self, group: &ValidatorGroup) -> DetectionResult<CheckDecision>;

    /// Close expired windows.
    async fn sweep(&self) -> DetectionResult<SweepReport>;
}
