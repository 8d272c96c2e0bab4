use serde::{Deserialize, Serialize};

use super::error::{HouseholdError, HouseholdResult};

/// A per-period exogenous input: the same value every period (steady state)
/// or one value per remaining period (transition path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Profile {
    Constant(f64),
    Path(Vec<f64>),
}

impl Profile {
    /// Expands the profile to exactly `periods` values.
    ///
    /// A constant is broadcast; a path must already have `periods` entries.
    pub fn resolve(&self, name: &'static str, periods: usize) -> HouseholdResult<Vec<f64>> {
        match self {
            Profile::Constant(value) => Ok(vec![*value; periods]),
            Profile::Path(values) if values.len() == periods => Ok(values.clone()),
            Profile::Path(values) => Err(HouseholdError::ShapeMismatch {
                name,
                expected: periods,
                found: values.len(),
            }),
        }
    }

    /// Drops the first `count` periods of a path. Constants are unchanged.
    pub fn skip_periods(&self, count: usize) -> Profile {
        match self {
            Profile::Constant(value) => Profile::Constant(*value),
            Profile::Path(values) => {
                Profile::Path(values.iter().skip(count).copied().collect())
            }
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            Profile::Constant(value) => std::slice::from_ref(value),
            Profile::Path(values) => values.as_slice(),
        }
    }
}

impl From<f64> for Profile {
    fn from(value: f64) -> Self {
        Profile::Constant(value)
    }
}

impl From<Vec<f64>> for Profile {
    fn from(values: Vec<f64>) -> Self {
        Profile::Path(values)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EulerScaling {
    /// `beta * (1 + r) * u'(c_{t+1}) - u'(c_t)`
    #[default]
    #[serde(alias = "absolute")]
    AbsoluteDifference,
    /// `beta * (1 + r) * u'(c_{t+1}) / u'(c_t) - 1`
    #[serde(alias = "percent")]
    PercentDifference,
}

#[derive(Debug, Clone)]
pub struct HouseholdProblem {
    /// Remaining periods of life, including the current one.
    pub periods: usize,
    pub beta: f64,
    pub sigma: f64,
    pub initial_wealth: f64,
    pub labor: Profile,
    pub interest: Profile,
    pub wage: Profile,
    pub scaling: EulerScaling,
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub tolerance: f64,
    pub max_iterations: u32,
    pub max_backtracks: u32,
    pub initial_guess: Option<Vec<f64>>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
            max_backtracks: 30,
            initial_guess: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub max_abs_error: f64,
    pub step_scale: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsSolution {
    pub savings: Vec<f64>,
    pub consumption: Vec<f64>,
    pub euler_errors: Vec<f64>,
    pub iterations: u32,
    pub history: Vec<SolveIteration>,
    pub converged: bool,
    pub max_abs_error: f64,
    pub message: String,
}
