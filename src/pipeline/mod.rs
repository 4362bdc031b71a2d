//! Resumable multi-stage pipeline.
//!
//! Stages run strictly in order. Completion is recorded per stage in the
//! state document, so a rerun skips everything already done and retries the
//! stage that failed. Stages that want finer-grained resume keep their own
//! row cursor (see [`cursor::ResumableCursor`]).

pub mod cursor;
pub mod orchestrator;
pub mod stages;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::state::StateStore;

pub use cursor::ResumableCursor;
pub use orchestrator::StepOrchestrator;
pub use stages::{build_stages, ClusterStage, CommandStage, FilterStage, SummariesStage};

/// A unit of pipeline work. `Ok` means the stage finished and may be
/// recorded as complete; `Err` aborts the run.
pub trait Stage {
    fn name(&self) -> &str;

    /// Run the stage. The state store is handed in so the stage can persist
    /// its own cursor between units of work.
    fn run(&mut self, state: &StateStore) -> Result<()>;
}

/// Lifecycle of a stage within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    /// Recorded complete by an earlier run.
    Skipped,
    Completed,
    Failed(String),
}

impl StageStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, StageStatus::Skipped | StageStatus::Completed)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("stage {stage} failed: {reason}")]
    Failed { stage: String, reason: String },
    #[error("stage name {0:?} appears more than once")]
    DuplicateName(String),
    #[error("stage {0:?} has no program to run")]
    MissingProgram(String),
}

/// What happened to one stage during a run.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageOutcome {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<StageOutcome>,
    /// Set when a stage failed and the run stopped.
    pub failure: Option<StageError>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.outcomes.iter().all(|o| o.status.is_done())
    }

    pub fn status_of(&self, name: &str) -> Option<&StageStatus> {
        self.outcomes.iter().find(|o| o.name == name).map(|o| &o.status)
    }

    /// Names of stages that actually executed (successfully or not).
    pub fn executed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StageStatus::Completed | StageStatus::Failed(_)))
            .map(|o| o.name.as_str())
            .collect()
    }
}
