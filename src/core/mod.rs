mod budget;
mod error;
mod euler;
mod solver;
mod types;
mod utility;

pub use budget::consumption;
pub use error::{HouseholdError, HouseholdResult};
pub use euler::euler_residuals;
pub use solver::solve_savings;
pub use types::{
    EulerScaling, HouseholdProblem, Profile, SavingsSolution, SolveIteration, SolverConfig,
};
pub use utility::{
    CurvePoint, EPSILON, JsonCurveWriter, StitchCoefficients, StitchCurve, StitchRenderer,
    marginal_utility, marginal_utility_vec, marginal_utility_with_diagnostics,
};
