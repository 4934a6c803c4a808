use crate::data::{EmployeeId, Role, SchoolId};
use crate::distance::DistanceMatrix;
use crate::model::{ModelVariant, VariableKey};
use crate::scenario::EffectiveInputs;
use crate::solver::{Solution, SolveStatus, VALUE_EPSILON};
use serde::Serialize;

/// One nonzero school-employee assignment, in children.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRow {
    pub school: SchoolId,
    pub school_name: String,
    pub employee: EmployeeId,
    pub employee_name: String,
    pub role: Role,
    pub children: f64,
    pub distance: f64,
}

/// Workload summary for one employee with at least one assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeLoadRow {
    pub employee: EmployeeId,
    pub employee_name: String,
    pub role: Role,
    pub min: u32,
    pub max: u32,
    pub children: f64,
    pub average_distance: f64,
}

/// Employee-to-school line for spatial rendering; coordinates are
/// (lon, lat) pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLink {
    pub school: SchoolId,
    pub employee: EmployeeId,
    pub role: Role,
    pub from: [f64; 2],
    pub to: [f64; 2],
    pub children: f64,
}

/// Presentation-ready view of one engine answer. For non-usable statuses
/// the tables are empty and only the verdict carries information.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub status: SolveStatus,
    pub objective: f64,
    pub solve_millis: u64,
    pub assignments: Vec<AssignmentRow>,
    pub employees: Vec<EmployeeLoadRow>,
    pub links: Vec<MapLink>,
}

/// Turns raw variable values back into domain quantities.
///
/// The variant that built the program decides the reading: raw values are
/// child counts directly, or binary links multiplied by the school's child
/// count. Pairs at or below the numeric tolerance are dropped here, not in
/// the presentation layer; they carry no information.
pub fn interpret(
    solution: &Solution,
    inputs: &EffectiveInputs,
    distances: &DistanceMatrix,
    variant: ModelVariant,
) -> PlanReport {
    let solve_millis = solution.elapsed.as_millis() as u64;
    if !solution.status.is_usable() {
        return PlanReport {
            status: solution.status,
            objective: solution.objective,
            solve_millis,
            assignments: Vec::new(),
            employees: Vec::new(),
            links: Vec::new(),
        };
    }

    let mut assignments = Vec::new();
    let mut links = Vec::new();
    let mut assigned = vec![vec![0.0; inputs.employees.len()]; inputs.schools.len()];

    for (si, s) in inputs.schools.iter().enumerate() {
        for (ei, e) in inputs.employees.iter().enumerate() {
            let raw = solution.value(&VariableKey::new(&s.school.id, &e.employee.id));
            let children = match variant {
                ModelVariant::AssignChildren => raw,
                ModelVariant::AssignSchools => raw * f64::from(s.children),
            };
            if children.abs() <= VALUE_EPSILON {
                continue;
            }
            assigned[si][ei] = children;
            assignments.push(AssignmentRow {
                school: s.school.id.clone(),
                school_name: s.school.name.clone(),
                employee: e.employee.id.clone(),
                employee_name: e.employee.name.clone(),
                role: e.employee.role,
                children,
                distance: distances.between(si, ei),
            });
            links.push(MapLink {
                school: s.school.id.clone(),
                employee: e.employee.id.clone(),
                role: e.employee.role,
                from: [e.employee.lon, e.employee.lat],
                to: [s.school.lon, s.school.lat],
                children,
            });
        }
    }

    let mut employees = Vec::new();
    for (ei, e) in inputs.employees.iter().enumerate() {
        let mut total = 0.0;
        let mut weighted = 0.0;
        for si in 0..inputs.schools.len() {
            total += assigned[si][ei];
            weighted += assigned[si][ei] * distances.between(si, ei);
        }
        // employees without work stay out of the table; this also keeps the
        // average well-defined
        if total <= VALUE_EPSILON {
            continue;
        }
        employees.push(EmployeeLoadRow {
            employee: e.employee.id.clone(),
            employee_name: e.employee.name.clone(),
            role: e.employee.role,
            min: e.range.min,
            max: e.range.max,
            children: total,
            average_distance: weighted / total,
        });
    }

    PlanReport {
        status: solution.status,
        objective: solution.objective,
        solve_millis,
        assignments,
        employees,
        links,
    }
}
