use crate::data::{DataError, Employee, School, ScenarioOverrides};
use crate::distance::DistanceMatrix;
use crate::model::{ModelVariant, Problem, build_problem};
use crate::report::{PlanReport, interpret};
use crate::scenario::{EffectiveInputs, ScenarioSummary, build_effective_inputs, summarize};
use crate::solver::{EngineError, Solution};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Complete input snapshot for one planning round. Schools and employees
/// arrive in the order the distance matrix was built for.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInputs {
    pub schools: Vec<School>,
    pub employees: Vec<Employee>,
    pub distances: DistanceMatrix,
    #[serde(default)]
    pub scenario: ScenarioOverrides,
    #[serde(default)]
    pub variant: ModelVariant,
}

/// Everything derived from one accepted input snapshot. Solves read from
/// this; a newer snapshot never mutates an older one.
#[derive(Debug, Clone)]
pub struct PlanSnapshot {
    pub effective: EffectiveInputs,
    pub distances: DistanceMatrix,
    pub variant: ModelVariant,
    pub problem: Problem,
    pub summary: ScenarioSummary,
}

/// Merge, validate and build in one step. Any `DataError` leaves no
/// partially built snapshot behind.
pub fn build_snapshot(inputs: &PlanInputs) -> Result<PlanSnapshot, DataError> {
    let effective = build_effective_inputs(&inputs.schools, &inputs.employees, &inputs.scenario)?;
    let problem = build_problem(&effective, &inputs.distances, inputs.variant)?;
    let summary = summarize(&effective);
    Ok(PlanSnapshot {
        effective,
        distances: inputs.distances.clone(),
        variant: inputs.variant,
        problem,
        summary,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Ready,
    Solving,
    Solved,
    Failed,
}

/// Result of a finished solve as applied to the session. A completed run
/// carries its report even for non-usable verdicts; an engine fault only
/// carries the message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SolveOutcome {
    Completed {
        #[serde(flatten)]
        report: PlanReport,
    },
    EngineFailed {
        message: String,
    },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StartSolveError {
    #[error("no plan inputs are loaded; submit inputs before solving")]
    NoProblem,
}

/// Claim on one solve run: the snapshot to solve and the generation that
/// must still be current when the result comes back.
#[derive(Debug, Clone)]
pub struct SolveTicket {
    pub generation: u64,
    pub snapshot: Arc<PlanSnapshot>,
}

/// Compact description of the built program for status replies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDigest {
    pub name: String,
    pub variant: ModelVariant,
    pub variables: usize,
    pub constraints: usize,
    pub mixed_integer: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: Phase,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SolveOutcome>,
}

/// One optimization session: latest accepted inputs, lifecycle phase and
/// the outcome of the most recent applied solve.
///
/// Every update moves the generation forward, accepted or not, so a solve
/// still in flight can never write its result over newer inputs; it is
/// discarded when it reports back under an old generation.
#[derive(Debug)]
pub struct PlanSession {
    generation: u64,
    phase: Phase,
    snapshot: Option<Arc<PlanSnapshot>>,
    outcome: Option<SolveOutcome>,
}

impl PlanSession {
    pub fn new() -> Self {
        Self {
            generation: 0,
            phase: Phase::Idle,
            snapshot: None,
            outcome: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn outcome(&self) -> Option<&SolveOutcome> {
        self.outcome.as_ref()
    }

    /// Replaces the session's inputs and rebuilds the program from scratch,
    /// returning the freshly built snapshot. A rejected snapshot leaves the
    /// session idle with no program; the previous outcome is cleared either
    /// way.
    pub fn update(&mut self, inputs: &PlanInputs) -> Result<Arc<PlanSnapshot>, DataError> {
        self.generation += 1;
        self.outcome = None;
        match build_snapshot(inputs) {
            Ok(snapshot) => {
                info!(
                    "Inputs accepted at generation {}: {} schools, {} employees, {} variables",
                    self.generation,
                    snapshot.effective.schools.len(),
                    snapshot.effective.employees.len(),
                    snapshot.problem.variable_count()
                );
                let snapshot = Arc::new(snapshot);
                self.snapshot = Some(snapshot.clone());
                self.phase = Phase::Ready;
                Ok(snapshot)
            }
            Err(e) => {
                self.snapshot = None;
                self.phase = Phase::Idle;
                Err(e)
            }
        }
    }

    /// Claims the current program for a solve run. Starting a new run while
    /// an older one is still in flight is allowed; the older one will miss
    /// the generation check when it reports back.
    pub fn begin_solve(&mut self) -> Result<SolveTicket, StartSolveError> {
        let snapshot = self.snapshot.clone().ok_or(StartSolveError::NoProblem)?;
        self.phase = Phase::Solving;
        info!("Solve started for generation {}", self.generation);
        Ok(SolveTicket {
            generation: self.generation,
            snapshot,
        })
    }

    /// Applies a finished solve unless its ticket is stale. Returns whether
    /// the result was applied.
    pub fn finish_solve(
        &mut self,
        ticket: &SolveTicket,
        result: Result<Solution, EngineError>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Discarding solve result for generation {}; session is at {}",
                ticket.generation, self.generation
            );
            return false;
        }
        match result {
            Ok(solution) => {
                let report = interpret(
                    &solution,
                    &ticket.snapshot.effective,
                    &ticket.snapshot.distances,
                    ticket.snapshot.variant,
                );
                info!(
                    "Solve finished for generation {}: {}",
                    ticket.generation, report.status
                );
                self.phase = if report.status.is_usable() {
                    Phase::Solved
                } else {
                    Phase::Failed
                };
                self.outcome = Some(SolveOutcome::Completed { report });
            }
            Err(e) => {
                info!("Solve failed for generation {}: {}", ticket.generation, e);
                self.phase = Phase::Failed;
                self.outcome = Some(SolveOutcome::EngineFailed {
                    message: e.to_string(),
                });
            }
        }
        true
    }

    pub fn status(&self) -> SessionStatus {
        let problem = self.snapshot.as_ref().map(|s| ProblemDigest {
            name: s.problem.name.clone(),
            variant: s.variant,
            variables: s.problem.variable_count(),
            constraints: s.problem.constraint_count(),
            mixed_integer: s.problem.is_mixed_integer(),
        });
        let scenario = self.snapshot.as_ref().map(|s| s.summary.clone());
        SessionStatus {
            phase: self.phase,
            generation: self.generation,
            problem,
            scenario,
            outcome: self.outcome.clone(),
        }
    }
}

impl Default for PlanSession {
    fn default() -> Self {
        Self::new()
    }
}
