use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;

use super::{RunReport, Stage, StageError, StageOutcome, StageStatus};
use crate::state::{step_key, StateStore};

/// Sequences stages against a state store.
///
/// Completion is exactly-once at stage granularity only. Concurrent
/// orchestrators over the same state document are not supported.
pub struct StepOrchestrator {
    state: StateStore,
}

impl StepOrchestrator {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run `stages` in order, skipping those already recorded complete.
    ///
    /// A failing stage stops the run without being marked complete; the next
    /// call retries it. `Err` is only returned when the state document itself
    /// cannot be written.
    pub fn run_stages(&self, stages: &mut [Box<dyn Stage>]) -> Result<RunReport> {
        let mut outcomes: Vec<StageOutcome> =
            stages.iter().map(|s| StageOutcome::pending(s.name())).collect();

        let mut seen = HashSet::new();
        for stage in stages.iter() {
            if !seen.insert(stage.name().to_string()) {
                let error = StageError::DuplicateName(stage.name().to_string());
                tracing::error!(error = %error, "Refusing to run pipeline");
                return Ok(RunReport {
                    outcomes,
                    failure: Some(error),
                });
            }
        }

        for (stage, outcome) in stages.iter_mut().zip(outcomes.iter_mut()) {
            let key = step_key(stage.name());

            if self.state.flag(&key) {
                tracing::info!(stage = %stage.name(), "Skipping stage (already completed)");
                outcome.status = StageStatus::Skipped;
                continue;
            }

            tracing::info!(stage = %stage.name(), "Running stage");
            outcome.status = StageStatus::Running;
            outcome.started_at = Some(Utc::now());

            let result = stage.run(&self.state);
            outcome.finished_at = Some(Utc::now());

            match result {
                Ok(()) => {
                    self.state.set(&key, true)?;
                    outcome.status = StageStatus::Completed;
                    tracing::info!(
                        stage = %stage.name(),
                        elapsed_ms = outcome.elapsed().map(|d| d.num_milliseconds()).unwrap_or(0),
                        "Stage completed"
                    );
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    tracing::error!(
                        stage = %stage.name(),
                        error = %reason,
                        "Stage failed - stopping. Re-run to resume from this stage."
                    );
                    outcome.status = StageStatus::Failed(reason.clone());
                    return Ok(RunReport {
                        outcomes,
                        failure: Some(StageError::Failed {
                            stage: stage.name().to_string(),
                            reason,
                        }),
                    });
                }
            }
        }

        tracing::info!("Pipeline complete");
        Ok(RunReport {
            outcomes,
            failure: None,
        })
    }
}
