use crate::data::{
    CapacityRange, DataError, Employee, ForcedPair, Role, ScenarioOverrides, School,
};
use log::debug;
use serde::Serialize;
use std::collections::HashSet;

/// A school with its effective child count for the scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolPlan {
    pub school: School,
    pub children: u32,
}

/// An employee with their effective workload range for the scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeePlan {
    pub employee: Employee,
    pub range: CapacityRange,
}

/// Master data merged with one scenario's overrides. The plan lists contain
/// every master record in master order; this is what keeps row/column
/// positions aligned with the distance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveInputs {
    pub schools: Vec<SchoolPlan>,
    pub employees: Vec<EmployeePlan>,
    pub forced: Vec<ForcedPair>,
}

/// Merges master records with scenario overrides into one aligned input set.
///
/// Every master record appears in the output, in master order, with missing
/// overrides defaulted to 0 children and a (0, 0) range. Records are never
/// dropped; output positions must keep matching the distance matrix rows and
/// columns.
pub fn build_effective_inputs(
    schools: &[School],
    employees: &[Employee],
    overrides: &ScenarioOverrides,
) -> Result<EffectiveInputs, DataError> {
    let school_plans: Vec<SchoolPlan> = schools
        .iter()
        .map(|s| SchoolPlan {
            school: s.clone(),
            children: overrides
                .children_per_school
                .get(&s.id)
                .copied()
                .unwrap_or(0),
        })
        .collect();

    let mut employee_plans = Vec::with_capacity(employees.len());
    for e in employees {
        let range = overrides
            .capacity_per_employee
            .get(&e.id)
            .copied()
            .unwrap_or(CapacityRange::new(0, 0));
        if range.min > range.max {
            return Err(DataError::InvalidCapacityRange {
                employee: e.id.clone(),
                min: range.min,
                max: range.max,
            });
        }
        employee_plans.push(EmployeePlan {
            employee: e.clone(),
            range,
        });
    }

    let school_ids: HashSet<&str> = schools.iter().map(|s| s.id.as_str()).collect();
    let employee_ids: HashSet<&str> = employees.iter().map(|e| e.id.as_str()).collect();

    // Forced pairs are a set: duplicates collapse, first occurrence keeps its
    // position so constraint emission stays deterministic.
    let mut seen = HashSet::new();
    let mut forced = Vec::new();
    for pair in &overrides.forced_pairs {
        if !school_ids.contains(pair.school.as_str()) {
            return Err(DataError::UnknownForcedSchool(pair.school.clone()));
        }
        if !employee_ids.contains(pair.employee.as_str()) {
            return Err(DataError::UnknownForcedEmployee(pair.employee.clone()));
        }
        if seen.insert(pair.clone()) {
            forced.push(pair.clone());
        } else {
            debug!(
                "dropping duplicate forced pair {} -> {}",
                pair.school, pair.employee
            );
        }
    }

    Ok(EffectiveInputs {
        schools: school_plans,
        employees: employee_plans,
        forced,
    })
}

/// Aggregate capacity of one role against the total child count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleLoad {
    pub min_children: u64,
    pub max_children: u64,
    /// The role's combined minimum exceeds the children available to examine.
    pub min_exceeds_children: bool,
    /// The role's combined maximum cannot cover all children.
    pub max_below_children: bool,
}

/// Quick plausibility view of a scenario: does each role's combined capacity
/// bracket the total number of children? Informational only; the solver is
/// the authority on feasibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub total_children: u64,
    pub physicians: RoleLoad,
    pub assistants: RoleLoad,
}

pub fn summarize(inputs: &EffectiveInputs) -> ScenarioSummary {
    let total_children: u64 = inputs.schools.iter().map(|s| u64::from(s.children)).sum();
    ScenarioSummary {
        total_children,
        physicians: role_load(inputs, Role::Physician, total_children),
        assistants: role_load(inputs, Role::Assistant, total_children),
    }
}

fn role_load(inputs: &EffectiveInputs, role: Role, total_children: u64) -> RoleLoad {
    let mut min_children = 0u64;
    let mut max_children = 0u64;
    for e in inputs.employees.iter().filter(|e| e.employee.role == role) {
        min_children += u64::from(e.range.min);
        max_children += u64::from(e.range.max);
    }
    RoleLoad {
        min_children,
        max_children,
        min_exceeds_children: min_children > total_children,
        max_below_children: max_children < total_children,
    }
}
