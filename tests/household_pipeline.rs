use olg_household::core::{
    EPSILON, EulerScaling, HouseholdError, HouseholdProblem, Profile, SolverConfig,
    StitchCoefficients, consumption, euler_residuals, marginal_utility, solve_savings,
};

fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual}, tolerance {tol}"
    );
}

#[test]
fn trial_savings_with_negative_consumption_still_produce_finite_errors() {
    // Saving more than current income drives first-period consumption below zero.
    let cvec = consumption(
        &[2.0, 0.5],
        0.0,
        &Profile::Constant(1.0),
        &Profile::Constant(0.05),
        &Profile::Constant(1.0),
    )
    .expect("aligned inputs");
    assert!(cvec[0] < 0.0);

    for scaling in [
        EulerScaling::AbsoluteDifference,
        EulerScaling::PercentDifference,
    ] {
        let errors = euler_residuals(&cvec, 0.96, 2.0, &Profile::Constant(0.05), scaling)
            .expect("three periods");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.is_finite()), "{scaling:?}: {errors:?}");
    }
}

#[test]
fn solved_path_round_trips_through_budget_and_euler_operations() {
    let problem = HouseholdProblem {
        periods: 5,
        beta: 0.96,
        sigma: 2.5,
        initial_wealth: 0.2,
        labor: Profile::Path(vec![1.0, 1.0, 1.0, 0.6, 0.2]),
        interest: Profile::Path(vec![0.05, 0.05, 0.04, 0.045, 0.05]),
        wage: Profile::Constant(1.0),
        scaling: EulerScaling::PercentDifference,
    };
    let solution = solve_savings(&problem, &SolverConfig::default()).expect("must solve");
    assert!(solution.converged, "{}", solution.message);

    let cvec = consumption(
        &solution.savings,
        problem.initial_wealth,
        &problem.labor,
        &problem.interest,
        &problem.wage,
    )
    .expect("aligned inputs");
    assert_eq!(cvec, solution.consumption);

    let errors = euler_residuals(
        &cvec,
        problem.beta,
        problem.sigma,
        &problem.interest.skip_periods(1),
        EulerScaling::AbsoluteDifference,
    )
    .expect("five periods");
    for e in errors {
        assert_close(e, 0.0, 1e-8);
    }
}

#[test]
fn cached_coefficients_agree_with_free_function() {
    let coefficients = StitchCoefficients::new(3.0);
    for c in [-2.0, 0.0, EPSILON / 2.0, EPSILON, 0.7] {
        assert_eq!(coefficients.marginal_utility(c), marginal_utility(c, 3.0));
    }
}

#[test]
fn degenerate_inputs_surface_typed_errors() {
    assert!(matches!(
        euler_residuals(
            &[0.9],
            0.96,
            2.0,
            &Profile::Constant(0.05),
            EulerScaling::AbsoluteDifference,
        ),
        Err(HouseholdError::TooFewPeriods { found: 1 })
    ));
    assert!(matches!(
        consumption(
            &[0.1, 0.2],
            0.0,
            &Profile::Path(vec![1.0; 4]),
            &Profile::Constant(0.05),
            &Profile::Constant(1.0),
        ),
        Err(HouseholdError::ShapeMismatch {
            name: "labor",
            expected: 3,
            found: 4
        })
    ));
}
