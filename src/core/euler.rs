use super::error::{HouseholdError, HouseholdResult};
use super::types::{EulerScaling, Profile};
use super::utility::StitchCoefficients;

/// Euler errors between each pair of consecutive periods of `consumption`.
///
/// `interest` is aligned to the error index: entry `t` is the return earned
/// between period `t` and `t + 1`. The result has `consumption.len() - 1`
/// entries and is zero exactly when `u'(c_t) = beta * (1 + r_{t+1}) * u'(c_{t+1})`
/// holds for every pair.
pub fn euler_residuals(
    consumption: &[f64],
    beta: f64,
    sigma: f64,
    interest: &Profile,
    scaling: EulerScaling,
) -> HouseholdResult<Vec<f64>> {
    if consumption.len() < 2 {
        return Err(HouseholdError::TooFewPeriods {
            found: consumption.len(),
        });
    }
    let pairs = consumption.len() - 1;
    let interest = interest.resolve("interest", pairs)?;
    let coefficients = StitchCoefficients::new(sigma);

    Ok(consumption
        .windows(2)
        .zip(interest)
        .map(|(pair, r)| {
            let mu_now = coefficients.marginal_utility(pair[0]);
            let mu_next = coefficients.marginal_utility(pair[1]);
            let discounted_next = beta * (1.0 + r) * mu_next;
            match scaling {
                EulerScaling::AbsoluteDifference => discounted_next - mu_now,
                EulerScaling::PercentDifference => discounted_next / mu_now - 1.0,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utility::marginal_utility;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-10;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn optimal_pair(c1: f64, beta: f64, r: f64, sigma: f64) -> [f64; 2] {
        [c1, c1 * (beta * (1.0 + r)).powf(1.0 / sigma)]
    }

    #[test]
    fn exact_crra_optimum_has_zero_absolute_error() {
        for sigma in [1.5, 2.0, 3.0] {
            let path = optimal_pair(0.8, 0.96, 0.05, sigma);
            let errors = euler_residuals(
                &path,
                0.96,
                sigma,
                &Profile::Constant(0.05),
                EulerScaling::AbsoluteDifference,
            )
            .expect("two periods");
            assert_eq!(errors.len(), 1);
            assert_approx(errors[0], 0.0);
        }
    }

    #[test]
    fn exact_crra_optimum_has_zero_percent_error() {
        let path = optimal_pair(1.3, 0.9, 0.02, 2.0);
        let errors = euler_residuals(
            &path,
            0.9,
            2.0,
            &Profile::Constant(0.02),
            EulerScaling::PercentDifference,
        )
        .expect("two periods");
        assert_approx(errors[0], 0.0);
    }

    #[test]
    fn errors_follow_formulas_for_each_scaling() {
        let cvec = [1.0, 0.5, -0.2];
        let rates = vec![0.03, 0.07];
        let (beta, sigma) = (0.95, 2.0);
        let absolute = euler_residuals(
            &cvec,
            beta,
            sigma,
            &Profile::Path(rates.clone()),
            EulerScaling::AbsoluteDifference,
        )
        .expect("valid");
        let percent = euler_residuals(
            &cvec,
            beta,
            sigma,
            &Profile::Path(rates.clone()),
            EulerScaling::PercentDifference,
        )
        .expect("valid");
        assert_eq!(absolute.len(), 2);
        assert_eq!(percent.len(), 2);

        for t in 0..2 {
            let mu_now = marginal_utility(cvec[t], sigma);
            let mu_next = marginal_utility(cvec[t + 1], sigma);
            let expected_abs = beta * (1.0 + rates[t]) * mu_next - mu_now;
            let expected_pct = beta * (1.0 + rates[t]) * mu_next / mu_now - 1.0;
            assert!((absolute[t] - expected_abs).abs() <= 1e-9 * expected_abs.abs().max(1.0));
            assert!((percent[t] - expected_pct).abs() <= 1e-9 * expected_pct.abs().max(1.0));
        }
    }

    #[test]
    fn negative_consumption_yields_finite_errors() {
        let errors = euler_residuals(
            &[-3.0, 0.0, 2.0, -0.5],
            0.96,
            3.0,
            &Profile::Constant(0.04),
            EulerScaling::PercentDifference,
        )
        .expect("valid");
        assert!(errors.iter().all(|e| e.is_finite()));
    }

    #[test]
    fn single_period_path_is_rejected() {
        for cvec in [vec![], vec![1.0]] {
            let err = euler_residuals(
                &cvec,
                0.96,
                2.0,
                &Profile::Constant(0.05),
                EulerScaling::AbsoluteDifference,
            )
            .expect_err("degenerate path");
            assert!(matches!(err, HouseholdError::TooFewPeriods { found } if found == cvec.len()));
        }
    }

    #[test]
    fn interest_path_must_align_with_error_index() {
        let err = euler_residuals(
            &[1.0, 1.0, 1.0],
            0.96,
            2.0,
            &Profile::Path(vec![0.05, 0.05, 0.05]),
            EulerScaling::AbsoluteDifference,
        )
        .expect_err("interest path one too long");
        assert!(matches!(
            err,
            HouseholdError::ShapeMismatch {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_scalings_share_sign_and_zero_set(
            c_now in 0.01f64..5.0,
            c_next in 0.01f64..5.0,
            beta in 0.8f64..0.999,
            rate_bp in -200i32..1000,
            sigma in 1.0f64..4.0,
        ) {
            let r = Profile::Constant(rate_bp as f64 / 10_000.0);
            let absolute = euler_residuals(&[c_now, c_next], beta, sigma, &r, EulerScaling::AbsoluteDifference)
                .expect("valid")[0];
            let percent = euler_residuals(&[c_now, c_next], beta, sigma, &r, EulerScaling::PercentDifference)
                .expect("valid")[0];
            // percent = absolute / u'(c_now), and u'(c_now) > 0
            let mu_now = marginal_utility(c_now, sigma);
            prop_assert!((percent * mu_now - absolute).abs() <= 1e-9 * absolute.abs().max(mu_now));
        }
    }
}
