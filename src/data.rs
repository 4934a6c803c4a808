use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// Master records are identified by the ids used in the source registers,
// which are free-form strings rather than numbers.
pub type SchoolId = String;
pub type EmployeeId = String;

/// Staff role. Every school is visited by one unit of each role; the two
/// roles are planned independently against the same distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Physician,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Physician => write!(f, "physician"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// School master record. Immutable input; coordinates are WGS84 degrees.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

/// Employee master record. Immutable input; coordinates are WGS84 degrees.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub role: Role,
}

/// Inclusive workload range for one employee, in children per planning round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CapacityRange {
    pub min: u32,
    pub max: u32,
}

impl CapacityRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Scenario-level requirement that a specific employee serves a specific school.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ForcedPair {
    pub school: SchoolId,
    pub employee: EmployeeId,
}

/// Per-scenario overrides on top of the master data. Any school or employee
/// without an entry participates with the defaults (0 children, (0, 0) range);
/// records are never dropped, so positions stay aligned with the distance
/// matrix.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOverrides {
    #[serde(default)]
    pub children_per_school: HashMap<SchoolId, u32>,
    #[serde(default)]
    pub capacity_per_employee: HashMap<EmployeeId, CapacityRange>,
    #[serde(default)]
    pub forced_pairs: Vec<ForcedPair>,
}

/// Input faults that make model construction impossible. These block the
/// build entirely; nothing is submitted to the solver.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("school '{school}' and employee '{employee}' produce a duplicate assignment variable; master ids must be unique")]
    DuplicateVariableKey {
        school: SchoolId,
        employee: EmployeeId,
    },

    #[error("forced pair references unknown school '{0}'")]
    UnknownForcedSchool(SchoolId),

    #[error("forced pair references unknown employee '{0}'")]
    UnknownForcedEmployee(EmployeeId),

    #[error("capacity range for employee '{employee}' has min {min} greater than max {max}")]
    InvalidCapacityRange {
        employee: EmployeeId,
        min: u32,
        max: u32,
    },

    #[error("distance matrix is {rows}x{cols} but the master data has {expected_rows} schools and {expected_cols} employees")]
    MatrixShape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("distance matrix row {row} has {len} entries, expected {expected}")]
    RaggedMatrix {
        row: usize,
        len: usize,
        expected: usize,
    },

    #[error("distance at row {row}, column {col} is not a finite non-negative number")]
    InvalidDistance { row: usize, col: usize },
}
