use tracing::{debug, info, warn};

use super::budget::consumption;
use super::error::{HouseholdError, HouseholdResult};
use super::euler::euler_residuals;
use super::types::{HouseholdProblem, Profile, SavingsSolution, SolveIteration, SolverConfig};

/// Solves for the savings path whose Euler errors are zero.
///
/// Damped Newton iteration on the `periods - 1` unknown savings, with a
/// forward-difference Jacobian and step halving until the largest Euler
/// error does not grow. Trial paths may imply non-positive consumption;
/// the stitched marginal utility keeps every evaluation finite.
///
/// Running out of iterations is not an error: the best iterate is returned
/// with `converged == false`.
pub fn solve_savings(
    problem: &HouseholdProblem,
    config: &SolverConfig,
) -> HouseholdResult<SavingsSolution> {
    validate_problem(problem)?;
    validate_config(config)?;

    let evaluator = Evaluator::new(problem);
    let unknowns = problem.periods - 1;
    let mut savings = match &config.initial_guess {
        Some(guess) if guess.len() != unknowns => {
            return Err(HouseholdError::ShapeMismatch {
                name: "initial_guess",
                expected: unknowns,
                found: guess.len(),
            });
        }
        Some(guess) => guess.clone(),
        None => default_guess(problem)?,
    };

    if unknowns == 0 {
        let consumption = evaluator.consumption(&savings)?;
        return Ok(SavingsSolution {
            savings,
            consumption,
            euler_errors: Vec::new(),
            iterations: 0,
            history: Vec::new(),
            converged: true,
            max_abs_error: 0.0,
            message: "Final period of life; consumes all resources.".to_string(),
        });
    }

    let mut errors = evaluator.euler_errors(&savings)?;
    if !all_finite(&errors) {
        return Err(HouseholdError::NonFiniteResidual { iteration: 0 });
    }
    let mut max_abs_error = sup_norm(&errors);
    let mut history = Vec::new();
    let mut converged = max_abs_error <= config.tolerance;
    let mut stalled = false;
    let mut it = 0;

    while !converged && it < config.max_iterations {
        it += 1;
        let jacobian = evaluator.jacobian(&savings, &errors, it)?;
        let rhs: Vec<f64> = errors.iter().map(|e| -e).collect();
        let Some(step) = solve_linear_system(jacobian, rhs) else {
            return Err(HouseholdError::SingularJacobian { iteration: it });
        };

        let mut step_scale = 1.0;
        let mut accepted = None;
        for _ in 0..=config.max_backtracks {
            let trial: Vec<f64> = savings
                .iter()
                .zip(&step)
                .map(|(b, d)| b + step_scale * d)
                .collect();
            let trial_errors = evaluator.euler_errors(&trial)?;
            if all_finite(&trial_errors) {
                let trial_max = sup_norm(&trial_errors);
                if trial_max <= max_abs_error {
                    accepted = Some((trial, trial_errors, trial_max));
                    break;
                }
            }
            step_scale *= 0.5;
        }

        let Some((trial, trial_errors, trial_max)) = accepted else {
            warn!(
                iteration = it,
                max_abs_error, "line search could not reduce Euler errors"
            );
            stalled = true;
            break;
        };
        savings = trial;
        errors = trial_errors;
        max_abs_error = trial_max;
        history.push(SolveIteration {
            iteration: it,
            max_abs_error,
            step_scale,
        });
        debug!(iteration = it, max_abs_error, step_scale, "newton step accepted");

        converged = max_abs_error <= config.tolerance;
    }
    let iterations = history.len() as u32;

    let message = if converged {
        "Solved household savings path.".to_string()
    } else if stalled {
        "Line search failed to reduce Euler errors; returning best estimate.".to_string()
    } else {
        "Reached max iterations before tolerance was met; returning best estimate.".to_string()
    };
    if converged {
        info!(periods = problem.periods, iterations, max_abs_error, "household solved");
    } else {
        warn!(periods = problem.periods, iterations, max_abs_error, "{message}");
    }

    let consumption = evaluator.consumption(&savings)?;
    Ok(SavingsSolution {
        savings,
        consumption,
        euler_errors: errors,
        iterations,
        history,
        converged,
        max_abs_error,
        message,
    })
}

struct Evaluator<'a> {
    problem: &'a HouseholdProblem,
    euler_interest: Profile,
}

impl<'a> Evaluator<'a> {
    fn new(problem: &'a HouseholdProblem) -> Self {
        Self {
            problem,
            euler_interest: problem.interest.skip_periods(1),
        }
    }

    fn consumption(&self, savings: &[f64]) -> HouseholdResult<Vec<f64>> {
        consumption(
            savings,
            self.problem.initial_wealth,
            &self.problem.labor,
            &self.problem.interest,
            &self.problem.wage,
        )
    }

    fn euler_errors(&self, savings: &[f64]) -> HouseholdResult<Vec<f64>> {
        let cvec = self.consumption(savings)?;
        euler_residuals(
            &cvec,
            self.problem.beta,
            self.problem.sigma,
            &self.euler_interest,
            self.problem.scaling,
        )
    }

    /// Row `i`, column `j` is `d error_i / d savings_j`.
    fn jacobian(
        &self,
        savings: &[f64],
        errors: &[f64],
        iteration: u32,
    ) -> HouseholdResult<Vec<Vec<f64>>> {
        let n = savings.len();
        let mut jacobian = vec![vec![0.0; n]; n];
        let mut bumped = savings.to_vec();
        for j in 0..n {
            let h = f64::EPSILON.sqrt() * savings[j].abs().max(1.0);
            bumped[j] = savings[j] + h;
            let shifted = self.euler_errors(&bumped)?;
            bumped[j] = savings[j];
            if !all_finite(&shifted) {
                return Err(HouseholdError::NonFiniteResidual { iteration });
            }
            for (row, (e_h, e)) in jacobian.iter_mut().zip(shifted.iter().zip(errors)) {
                row[j] = (e_h - e) / h;
            }
        }
        Ok(jacobian)
    }
}

fn default_guess(problem: &HouseholdProblem) -> HouseholdResult<Vec<f64>> {
    let labor = problem.labor.resolve("labor", problem.periods)?;
    let wage = problem.wage.resolve("wage", problem.periods)?;
    Ok(labor
        .iter()
        .zip(&wage)
        .take(problem.periods - 1)
        .map(|(n, w)| 0.1 * w * n)
        .collect())
}

/// Gaussian elimination with partial pivoting. `None` when the matrix is
/// numerically singular.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !scale.is_finite() || scale == 0.0 {
        return None;
    }
    let pivot_floor = scale * f64::EPSILON * n as f64;

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &k| a[i][col].abs().total_cmp(&a[k][col].abs()))?;
        if a[pivot_row][col].abs() <= pivot_floor {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn sup_norm(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn validate_problem(problem: &HouseholdProblem) -> HouseholdResult<()> {
    if problem.periods == 0 {
        return Err(HouseholdError::InvalidParameter {
            name: "periods",
            value: 0.0,
            reason: "must be >= 1",
        });
    }
    if !problem.beta.is_finite() || problem.beta <= 0.0 || problem.beta >= 1.0 {
        return Err(HouseholdError::InvalidParameter {
            name: "beta",
            value: problem.beta,
            reason: "must be between 0 and 1 (exclusive)",
        });
    }
    if !problem.sigma.is_finite() || problem.sigma <= 0.0 {
        return Err(HouseholdError::InvalidParameter {
            name: "sigma",
            value: problem.sigma,
            reason: "must be > 0",
        });
    }
    if !problem.initial_wealth.is_finite() {
        return Err(HouseholdError::InvalidParameter {
            name: "initial_wealth",
            value: problem.initial_wealth,
            reason: "must be finite",
        });
    }
    for (name, profile) in [
        ("labor", &problem.labor),
        ("interest", &problem.interest),
        ("wage", &problem.wage),
    ] {
        profile.resolve(name, problem.periods)?;
        if let Some(&value) = profile.values().iter().find(|v| !v.is_finite()) {
            return Err(HouseholdError::InvalidParameter {
                name,
                value,
                reason: "must be finite",
            });
        }
    }
    if let Some(&value) = problem.interest.values().iter().find(|r| **r <= -1.0) {
        return Err(HouseholdError::InvalidParameter {
            name: "interest",
            value,
            reason: "must be > -1 in every period",
        });
    }
    Ok(())
}

fn validate_config(config: &SolverConfig) -> HouseholdResult<()> {
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(HouseholdError::InvalidParameter {
            name: "tolerance",
            value: config.tolerance,
            reason: "must be > 0",
        });
    }
    if config.max_iterations == 0 {
        return Err(HouseholdError::InvalidParameter {
            name: "max_iterations",
            value: 0.0,
            reason: "must be > 0",
        });
    }
    Ok(())
}
