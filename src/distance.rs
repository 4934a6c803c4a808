use crate::data::{DataError, Employee, School};
use serde::{Deserialize, Serialize, Serializer};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Rectangular distance table in meters. Row i belongs to the i-th school and
/// column j to the j-th employee of the master lists, strictly by position;
/// no id lookup happens anywhere downstream. Entries are validated finite and
/// non-negative on construction, so the objective can never absorb a NaN.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>")]
pub struct DistanceMatrix {
    entries: Vec<Vec<f64>>,
    cols: usize,
}

impl DistanceMatrix {
    pub fn new(entries: Vec<Vec<f64>>) -> Result<Self, DataError> {
        let cols = entries.first().map_or(0, Vec::len);
        for (row, values) in entries.iter().enumerate() {
            if values.len() != cols {
                return Err(DataError::RaggedMatrix {
                    row,
                    len: values.len(),
                    expected: cols,
                });
            }
            for (col, value) in values.iter().enumerate() {
                if !value.is_finite() || *value < 0.0 {
                    return Err(DataError::InvalidDistance { row, col });
                }
            }
        }
        Ok(Self { entries, cols })
    }

    pub fn rows(&self) -> usize {
        self.entries.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Distance between the school at row `school` and the employee at column
    /// `employee`. Callers keep indices inside the shape they checked.
    pub fn between(&self, school: usize, employee: usize) -> f64 {
        self.entries[school][employee]
    }

    /// Verifies the table matches the master lists it claims to describe.
    /// A mismatch means the positional contract is broken and every
    /// coefficient built from the table would be wrong.
    pub fn check_shape(&self, schools: usize, employees: usize) -> Result<(), DataError> {
        if self.rows() != schools || (schools > 0 && self.cols() != employees) {
            return Err(DataError::MatrixShape {
                rows: self.rows(),
                cols: self.cols(),
                expected_rows: schools,
                expected_cols: employees,
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<Vec<f64>>> for DistanceMatrix {
    type Error = DataError;

    fn try_from(entries: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl Serialize for DistanceMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

/// Builds the straight-line ("airline") distance matrix from master
/// coordinates, rows = schools, columns = employees. This is the bundled
/// stand-in for an external routing collaborator; swapping in road distances
/// only requires supplying a different table of the same shape.
pub fn airline_matrix(schools: &[School], employees: &[Employee]) -> Result<DistanceMatrix, DataError> {
    let entries = schools
        .iter()
        .map(|s| {
            employees
                .iter()
                .map(|e| haversine_m(s.lat, s.lon, e.lat, e.lon))
                .collect()
        })
        .collect();
    DistanceMatrix::new(entries)
}

/// Great-circle distance in meters between two WGS84 points.
fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}
