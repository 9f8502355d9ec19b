//! Trials and the runs that produce them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::search::Parameterization;

/// Index of a trial within its owning experiment.
pub type TrialIndex = usize;

/// Lifecycle status of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Candidate,
    Staged,
    Running,
    Completed,
    Failed,
    Abandoned,
    EarlyStopped,
}

impl TrialStatus {
    /// Whether the trial has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Abandoned | Self::EarlyStopped
        )
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let member = match self {
            Self::Candidate => "Candidate",
            Self::Staged => "Staged",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Abandoned => "Abandoned",
            Self::EarlyStopped => "EarlyStopped",
        };
        write!(f, "TrialStatus::{member}")
    }
}

/// A single trial (one parameterization proposed by a generation step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: TrialIndex,
    pub arm_name: String,
    pub parameters: Parameterization,
    pub status: TrialStatus,
    /// Index of the generation step that produced this trial.
    pub generation_step: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Trial {
    pub fn new(
        index: TrialIndex,
        parameters: Parameterization,
        generation_step: Option<usize>,
    ) -> Self {
        Self {
            index,
            arm_name: format!("{index}_0"),
            parameters,
            status: TrialStatus::Candidate,
            generation_step,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            reason: None,
        }
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn mark_staged(&mut self) -> &mut Self {
        self.status = TrialStatus::Staged;
        self
    }

    pub fn mark_running(&mut self) -> &mut Self {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
        self
    }

    pub fn mark_completed(&mut self) -> &mut Self {
        self.finish(TrialStatus::Completed, None)
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> &mut Self {
        self.finish(TrialStatus::Failed, Some(reason.into()))
    }

    pub fn mark_abandoned(&mut self, reason: impl Into<String>) -> &mut Self {
        self.finish(TrialStatus::Abandoned, Some(reason.into()))
    }

    pub fn mark_early_stopped(&mut self) -> &mut Self {
        self.finish(TrialStatus::EarlyStopped, None)
    }

    fn finish(&mut self, status: TrialStatus, reason: Option<String>) -> &mut Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.reason = reason;
        self
    }
}

/// Output of one generation call: the candidates a step's model proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorRun {
    pub id: Uuid,
    /// Index of the step whose model produced the candidates.
    pub generation_step: usize,
    pub model_name: String,
    pub candidates: Vec<Parameterization>,
    pub created_at: DateTime<Utc>,
}

impl GeneratorRun {
    pub fn new(
        generation_step: usize,
        model_name: impl Into<String>,
        candidates: Vec<Parameterization>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation_step,
            model_name: model_name.into(),
            candidates,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
