use crate::model::{Bound, Constraint, Problem, VariableKey};
use good_lp::variable;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution as LpSolution, SolverModel, Variable,
    constraint, default_solver,
};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Values closer to zero than this count as zero when reading a solution.
pub const VALUE_EPSILON: f64 = 1e-6;

/// Terminal engine verdict. Infeasible, unbounded and undefined are answers
/// about the program, not faults, and travel inside the `Solution`.
///
/// `Feasible` is reserved for engines reporting an incumbent without an
/// optimality proof; the bundled HiGHS backend always proves or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    Undefined,
}

impl SolveStatus {
    /// Whether the variable values carry an actual assignment.
    pub fn is_usable(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::Undefined => "undefined",
        };
        write!(f, "{label}")
    }
}

/// Engine answer for one submitted program. `values` is empty unless the
/// status is usable; the objective is recomputed from the program's own
/// coefficients so it always agrees with `values`.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    pub values: HashMap<VariableKey, f64>,
    pub objective: f64,
    pub elapsed: Duration,
}

impl Solution {
    pub fn value(&self, key: &VariableKey) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }
}

/// Faults of the engine itself, as opposed to verdicts about the program.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("solver engine is not available: {0}")]
    Unavailable(String),

    #[error("constraint '{constraint}' references unknown variable {key}")]
    UnknownVariable { constraint: String, key: VariableKey },

    #[error("solver engine crashed: {0}")]
    Crashed(String),
}

/// Handle to the bundled HiGHS engine. Obtained once through `probe` and
/// reused for every solve; the engine keeps no state between calls.
#[derive(Debug)]
pub struct SolverEngine(());

impl SolverEngine {
    /// Verifies the engine by solving a one-variable program end to end.
    /// Until a probe succeeds, solving stays disabled at the boundary.
    pub fn probe() -> Result<Self, EngineError> {
        let key = VariableKey::new("probe", "probe");
        let tiny = Problem {
            name: "engine probe".to_string(),
            objective: vec![(key.clone(), 1.0)],
            constraints: vec![Constraint {
                name: "probe_floor".to_string(),
                terms: vec![(key.clone(), 1.0)],
                bound: Bound::AtLeast(1.0),
            }],
            binaries: None,
        };
        let solution = run(&tiny)?;
        if solution.status != SolveStatus::Optimal || (solution.value(&key) - 1.0).abs() > VALUE_EPSILON
        {
            return Err(EngineError::Unavailable(format!(
                "probe ended {} with value {}",
                solution.status,
                solution.value(&key)
            )));
        }
        info!("Solver engine probe succeeded in {:.2?}", solution.elapsed);
        Ok(SolverEngine(()))
    }

    /// Submits a program without blocking the async caller. The program is
    /// never mutated; infeasible or unbounded verdicts come back as data.
    pub async fn solve(&self, problem: &Problem) -> Result<Solution, EngineError> {
        let problem = problem.clone();
        match tokio::task::spawn_blocking(move || run(&problem)).await {
            Ok(result) => result,
            Err(join) => Err(EngineError::Crashed(join.to_string())),
        }
    }
}

fn run(problem: &Problem) -> Result<Solution, EngineError> {
    let start_time = Instant::now();
    info!(
        "Translating {} with {} variables and {} constraints for the engine...",
        problem.name,
        problem.variable_count(),
        problem.constraint_count()
    );

    // decision variables, one per objective entry, in emission order
    let mut vars = ProblemVariables::new();
    let mut by_key: HashMap<&VariableKey, Variable> =
        HashMap::with_capacity(problem.variable_count());
    for (key, _) in &problem.objective {
        let var = if problem.is_binary(key) {
            vars.add(variable().binary())
        } else {
            vars.add(variable().min(0.0))
        };
        by_key.insert(key, var);
    }

    let objective: Expression = problem
        .objective
        .iter()
        .map(|(key, coef)| *coef * by_key[key])
        .sum();

    let mut model = vars
        .minimise(objective)
        .using(default_solver)
        .set_option("threads", 1) // limit to 1 thread for reproducibility
        .set_option("random_seed", 1234) //set seed for reproducibility
        .set_option("log_to_console", "false");

    for c in &problem.constraints {
        let mut terms = Vec::with_capacity(c.terms.len());
        for (key, coef) in &c.terms {
            let var = by_key
                .get(key)
                .copied()
                .ok_or_else(|| EngineError::UnknownVariable {
                    constraint: c.name.clone(),
                    key: key.clone(),
                })?;
            terms.push(*coef * var);
        }
        let lhs: Expression = terms.into_iter().sum();
        match c.bound {
            Bound::Fixed(v) => {
                model.add_constraint(constraint!(lhs == v));
            }
            Bound::AtLeast(v) => {
                model.add_constraint(constraint!(lhs >= v));
            }
            Bound::Between(lo, hi) => {
                let upper = lhs.clone();
                model.add_constraint(constraint!(lhs >= lo));
                model.add_constraint(constraint!(upper <= hi));
            }
        }
    }

    info!("Starting engine run for {}...", problem.name);
    let (status, values) = match model.solve() {
        Ok(solved) => {
            let values: HashMap<VariableKey, f64> = problem
                .objective
                .iter()
                .map(|(key, _)| (key.clone(), solved.value(by_key[key])))
                .collect();
            (SolveStatus::Optimal, values)
        }
        Err(ResolutionError::Infeasible) => (SolveStatus::Infeasible, HashMap::new()),
        Err(ResolutionError::Unbounded) => (SolveStatus::Unbounded, HashMap::new()),
        Err(e) => {
            warn!("Engine gave no verdict for {}: {}", problem.name, e);
            (SolveStatus::Undefined, HashMap::new())
        }
    };

    // objective recomputed from the emitted coefficients and values
    let objective_value: f64 = problem
        .objective
        .iter()
        .map(|(key, coef)| coef * values.get(key).copied().unwrap_or(0.0))
        .sum();

    let elapsed = start_time.elapsed();
    info!("Engine finished {} as {} in {:.2?}", problem.name, status, elapsed);

    Ok(Solution {
        status,
        values,
        objective: objective_value,
        elapsed,
    })
}
