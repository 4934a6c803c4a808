use crate::data::{DataError, EmployeeId, Role, SchoolId};
use crate::distance::DistanceMatrix;
use crate::scenario::EffectiveInputs;
use itertools::iproduct;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identity of one decision variable. Exactly one variable exists per
/// (school, employee) pair; structural equality means two distinct pairs
/// can never silently share a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableKey {
    pub school: SchoolId,
    pub employee: EmployeeId,
}

impl VariableKey {
    pub fn new(school: &str, employee: &str) -> Self {
        Self {
            school: school.to_string(),
            employee: employee.to_string(),
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.school, self.employee)
    }
}

/// Variable semantics of the generated program.
///
/// `AssignChildren` lets each pair carry a fractional child count. The
/// constraint structure is a bipartite transportation network, whose LP
/// relaxation has integral optimal extreme points, so fractional answers
/// only appear at degenerate ties.
///
/// `AssignSchools` makes each pair an all-or-nothing binary link and the
/// program a true MIP; child counts move into the coefficients instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelVariant {
    #[default]
    AssignChildren,
    AssignSchools,
}

impl ModelVariant {
    /// Contribution of one unit of x(school, employee) to coverage and
    /// capacity rows, and the distance multiplier in the objective.
    pub fn unit(self, children: u32) -> f64 {
        match self {
            ModelVariant::AssignChildren => 1.0,
            ModelVariant::AssignSchools => f64::from(children),
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, ModelVariant::AssignSchools)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::AssignChildren => write!(f, "assign children"),
            ModelVariant::AssignSchools => write!(f, "assign schools"),
        }
    }
}

/// Row bound, both ends inclusive where two are given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Fixed(f64),
    AtLeast(f64),
    Between(f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VariableKey, f64)>,
    pub bound: Bound,
}

/// Solver-ready program; the objective is always minimized. The variable
/// set is exactly the keys named in `objective`; `binaries` restricts those
/// keys to {0, 1} when present, otherwise every variable is continuous and
/// non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub name: String,
    pub objective: Vec<(VariableKey, f64)>,
    pub constraints: Vec<Constraint>,
    pub binaries: Option<HashSet<VariableKey>>,
}

impl Problem {
    pub fn variable_count(&self) -> usize {
        self.objective.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_mixed_integer(&self) -> bool {
        self.binaries.is_some()
    }

    pub fn is_binary(&self, key: &VariableKey) -> bool {
        self.binaries.as_ref().is_some_and(|b| b.contains(key))
    }
}

/// Builds the staffing program for one input snapshot.
///
/// Both variants share one generation procedure; the variant only decides
/// the per-pair unit (1 or the school's child count) and whether the
/// variables are binary. Rows come out in a fixed order (physician
/// coverage, assistant coverage, employee load, forced pairs) and every
/// list is walked in master order, so identical inputs always yield an
/// identical `Problem`.
pub fn build_problem(
    inputs: &EffectiveInputs,
    distances: &DistanceMatrix,
    variant: ModelVariant,
) -> Result<Problem, DataError> {
    distances.check_shape(inputs.schools.len(), inputs.employees.len())?;

    // Any key collision across the full cross product means a duplicated
    // master id; proceeding would merge two unrelated variables.
    let mut keys = HashSet::with_capacity(inputs.schools.len() * inputs.employees.len());
    for (s, e) in iproduct!(&inputs.schools, &inputs.employees) {
        if !keys.insert(VariableKey::new(&s.school.id, &e.employee.id)) {
            return Err(DataError::DuplicateVariableKey {
                school: s.school.id.clone(),
                employee: e.employee.id.clone(),
            });
        }
    }

    let mut objective = Vec::with_capacity(keys.len());
    for (si, s) in inputs.schools.iter().enumerate() {
        let unit = variant.unit(s.children);
        for (ei, e) in inputs.employees.iter().enumerate() {
            objective.push((
                VariableKey::new(&s.school.id, &e.employee.id),
                distances.between(si, ei) * unit,
            ));
        }
    }

    let mut constraints = Vec::new();

    for role in [Role::Physician, Role::Assistant] {
        for s in &inputs.schools {
            let unit = variant.unit(s.children);
            let terms = inputs
                .employees
                .iter()
                .filter(|e| e.employee.role == role)
                .map(|e| (VariableKey::new(&s.school.id, &e.employee.id), unit))
                .collect();
            constraints.push(Constraint {
                name: format!("cover_{role}_{}", s.school.id),
                terms,
                bound: Bound::Fixed(f64::from(s.children)),
            });
        }
    }

    for e in &inputs.employees {
        let terms = inputs
            .schools
            .iter()
            .map(|s| {
                (
                    VariableKey::new(&s.school.id, &e.employee.id),
                    variant.unit(s.children),
                )
            })
            .collect();
        let bound = if e.range.min < e.range.max {
            Bound::Between(f64::from(e.range.min), f64::from(e.range.max))
        } else {
            Bound::Fixed(f64::from(e.range.min))
        };
        constraints.push(Constraint {
            name: format!("load_{}", e.employee.id),
            terms,
            bound,
        });
    }

    let children_by_id: HashMap<&str, u32> = inputs
        .schools
        .iter()
        .map(|s| (s.school.id.as_str(), s.children))
        .collect();
    let employee_ids: HashSet<&str> = inputs
        .employees
        .iter()
        .map(|e| e.employee.id.as_str())
        .collect();

    for pair in &inputs.forced {
        let Some(&children) = children_by_id.get(pair.school.as_str()) else {
            return Err(DataError::UnknownForcedSchool(pair.school.clone()));
        };
        if !employee_ids.contains(pair.employee.as_str()) {
            return Err(DataError::UnknownForcedEmployee(pair.employee.clone()));
        }
        // A forced pair pins the employee to the whole school: at least the
        // full child count in the continuous variant, exactly the binary
        // link in the school-level variant.
        let bound = match variant {
            ModelVariant::AssignChildren => Bound::AtLeast(f64::from(children)),
            ModelVariant::AssignSchools => Bound::Fixed(1.0),
        };
        constraints.push(Constraint {
            name: format!("forced_{}_{}", pair.school, pair.employee),
            terms: vec![(VariableKey::new(&pair.school, &pair.employee), 1.0)],
            bound,
        });
    }

    let problem = Problem {
        name: format!("school staffing ({variant})"),
        objective,
        constraints,
        binaries: variant.is_binary().then_some(keys),
    };
    info!(
        "Built {} with {} variables and {} constraints",
        problem.name,
        problem.variable_count(),
        problem.constraint_count()
    );
    Ok(problem)
}
