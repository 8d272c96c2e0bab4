use std::iter;

use super::error::HouseholdResult;
use super::types::Profile;

/// Consumption implied by the period budget constraint
/// `c_t = (1 + r_t) * b_t + w_t * n_t - b_{t+1}`.
///
/// `savings` holds end-of-period assets for every remaining period except
/// the last, so the path covers `savings.len() + 1` periods. Assets carried
/// into the first period are `initial_wealth`; assets left after the last
/// period are zero. Non-positive consumption is returned as is.
pub fn consumption(
    savings: &[f64],
    initial_wealth: f64,
    labor: &Profile,
    interest: &Profile,
    wage: &Profile,
) -> HouseholdResult<Vec<f64>> {
    let periods = savings.len() + 1;
    let labor = labor.resolve("labor", periods)?;
    let interest = interest.resolve("interest", periods)?;
    let wage = wage.resolve("wage", periods)?;

    let assets_in = iter::once(initial_wealth).chain(savings.iter().copied());
    let assets_out = savings.iter().copied().chain(iter::once(0.0));

    Ok(assets_in
        .zip(assets_out)
        .enumerate()
        .map(|(t, (b, b_next))| (1.0 + interest[t]) * b + wage[t] * labor[t] - b_next)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HouseholdError;
    use proptest::collection::vec;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn final_period_consumes_all_wealth_and_income() {
        let c = consumption(
            &[],
            2.0,
            &Profile::Constant(0.2),
            &Profile::Constant(0.05),
            &Profile::Constant(1.5),
        )
        .expect("valid inputs");
        assert_eq!(c.len(), 1);
        assert_approx(c[0], 1.05 * 2.0 + 1.5 * 0.2);
    }

    #[test]
    fn three_period_path_matches_hand_calculation() {
        let c = consumption(
            &[0.3, 0.5],
            0.1,
            &Profile::Path(vec![1.0, 1.0, 0.2]),
            &Profile::Path(vec![0.04, 0.05, 0.06]),
            &Profile::Constant(1.2),
        )
        .expect("valid inputs");
        assert_eq!(c.len(), 3);
        assert_approx(c[0], 1.04 * 0.1 + 1.2 - 0.3);
        assert_approx(c[1], 1.05 * 0.3 + 1.2 - 0.5);
        assert_approx(c[2], 1.06 * 0.5 + 1.2 * 0.2);
    }

    #[test]
    fn infeasible_savings_yield_negative_consumption() {
        let c = consumption(
            &[5.0],
            0.0,
            &Profile::Constant(1.0),
            &Profile::Constant(0.0),
            &Profile::Constant(1.0),
        )
        .expect("no feasibility check");
        assert_approx(c[0], -4.0);
        assert_approx(c[1], 6.0);
    }

    #[test]
    fn misaligned_interest_path_is_rejected() {
        let err = consumption(
            &[0.3, 0.5],
            0.0,
            &Profile::Constant(1.0),
            &Profile::Path(vec![0.05, 0.05]),
            &Profile::Constant(1.0),
        )
        .expect_err("interest path too short");
        assert!(matches!(
            err,
            HouseholdError::ShapeMismatch {
                name: "interest",
                expected: 3,
                found: 2
            }
        ));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_consumption_satisfies_budget_identity(
            savings in vec(-5.0f64..5.0, 0..12),
            initial_wealth in -2.0f64..10.0,
            rate_bp in -300i32..1200,
            wage in 0.0f64..3.0,
            labor_seed in vec(0.0f64..1.0, 13),
        ) {
            let periods = savings.len() + 1;
            let r = rate_bp as f64 / 10_000.0;
            let labor: Vec<f64> = labor_seed[..periods].to_vec();
            let c = consumption(
                &savings,
                initial_wealth,
                &Profile::Path(labor.clone()),
                &Profile::Constant(r),
                &Profile::Constant(wage),
            ).expect("aligned inputs");
            prop_assert_eq!(c.len(), periods);

            for t in 0..periods {
                let asset_in = if t == 0 { initial_wealth } else { savings[t - 1] };
                let asset_out = if t + 1 == periods { 0.0 } else { savings[t] };
                let gap = (1.0 + r) * asset_in + wage * labor[t] - asset_out - c[t];
                prop_assert!(gap.abs() <= 1e-9, "period {} gap {}", t, gap);
            }
        }
    }
}
