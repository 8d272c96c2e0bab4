use thiserror::Error;

pub type HouseholdResult<T> = Result<T, HouseholdError>;

#[derive(Debug, Error)]
pub enum HouseholdError {
    /// A per-period input does not line up with the number of periods being solved.
    #[error("{name} has {found} entries, expected {expected}")]
    ShapeMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    /// An Euler error needs a pair of consecutive periods.
    #[error("consumption path needs at least 2 periods to form an Euler error, got {found}")]
    TooFewPeriods { found: usize },

    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Euler error Jacobian is singular at iteration {iteration}")]
    SingularJacobian { iteration: u32 },

    #[error("Euler errors are not finite at iteration {iteration}")]
    NonFiniteResidual { iteration: u32 },

    #[error("failed to write stitch diagnostics: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize stitch diagnostics: {0}")]
    Serialize(#[from] serde_json::Error),
}
