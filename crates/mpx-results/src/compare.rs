use crate::SolutionRecord;
use std::fmt;

pub const DEFAULT_PLACES: u32 = 2;

/// Decimal places two objective values must agree to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    places: u32,
}

impl Tolerance {
    #[must_use]
    pub fn places(places: u32) -> Self {
        Self { places }
    }

    #[must_use]
    pub fn decimal_places(self) -> u32 {
        self.places
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::places(DEFAULT_PLACES)
    }
}

/// `expected` and `actual` agree once their difference is rounded to
/// `places` decimals, with exact halves rounding to even. Identical values
/// (including infinities) always agree; NaN never does.
#[must_use]
pub fn almost_equal(expected: f64, actual: f64, places: u32) -> bool {
    if expected == actual {
        return true;
    }
    let scale = 10f64.powi(i32::try_from(places).unwrap_or(i32::MAX));
    ((expected - actual) * scale).round_ties_even() == 0.0
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveMismatch {
    SolutionCount {
        expected: usize,
        actual: usize,
    },
    ObjectiveCount {
        solution: usize,
        expected: usize,
        actual: usize,
    },
    MissingObjective {
        solution: usize,
        name: String,
    },
    Value {
        solution: usize,
        name: String,
        expected: f64,
        actual: f64,
        places: u32,
    },
}

impl ObjectiveMismatch {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::SolutionCount { .. } => "objective_solution_count_mismatch",
            Self::ObjectiveCount { .. } => "objective_key_count_mismatch",
            Self::MissingObjective { .. } => "objective_missing",
            Self::Value { .. } => "objective_value_mismatch",
        }
    }
}

impl fmt::Display for ObjectiveMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SolutionCount { expected, actual } => write!(
                f,
                "solution count mismatch expected={expected} actual={actual}"
            ),
            Self::ObjectiveCount {
                solution,
                expected,
                actual,
            } => write!(
                f,
                "objective count mismatch in solution {solution} expected={expected} actual={actual}"
            ),
            Self::MissingObjective { solution, name } => {
                write!(f, "objective `{name}` missing from solution {solution}")
            }
            Self::Value {
                solution,
                name,
                expected,
                actual,
                places,
            } => write!(
                f,
                "objective `{name}` in solution {solution} differs: expected={expected} actual={actual} (not equal to {places} places)"
            ),
        }
    }
}

impl std::error::Error for ObjectiveMismatch {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonSummary {
    pub solutions: usize,
    pub values_compared: usize,
    pub max_abs_error: f64,
}

/// Checks `candidate` against `reference`, stopping at the first violation.
pub fn compare_objectives(
    reference: &[SolutionRecord],
    candidate: &[SolutionRecord],
    tolerance: Tolerance,
) -> Result<ComparisonSummary, ObjectiveMismatch> {
    if reference.len() != candidate.len() {
        return Err(ObjectiveMismatch::SolutionCount {
            expected: reference.len(),
            actual: candidate.len(),
        });
    }

    let mut summary = ComparisonSummary {
        solutions: reference.len(),
        values_compared: 0,
        max_abs_error: 0.0,
    };

    for (solution, (expected, actual)) in reference.iter().zip(candidate).enumerate() {
        if expected.len() != actual.len() {
            return Err(ObjectiveMismatch::ObjectiveCount {
                solution,
                expected: expected.len(),
                actual: actual.len(),
            });
        }

        for (name, expected_value) in expected {
            let Some(actual_value) = actual.get(name) else {
                return Err(ObjectiveMismatch::MissingObjective {
                    solution,
                    name: name.clone(),
                });
            };
            if !almost_equal(
                expected_value.value,
                actual_value.value,
                tolerance.decimal_places(),
            ) {
                return Err(ObjectiveMismatch::Value {
                    solution,
                    name: name.clone(),
                    expected: expected_value.value,
                    actual: actual_value.value,
                    places: tolerance.decimal_places(),
                });
            }

            let abs_err = (expected_value.value - actual_value.value).abs();
            if abs_err.is_finite() && abs_err > summary.max_abs_error {
                summary.max_abs_error = abs_err;
            }
            summary.values_compared += 1;
        }
    }

    Ok(summary)
}
