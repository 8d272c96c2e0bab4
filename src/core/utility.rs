//! Marginal utility of consumption under CRRA preferences, stitched below a
//! small positive floor so it is defined on the whole real line.
//!
//! ```text
//! u'(c) = c^(-sigma)           if c >= EPSILON
//!       = 2 * b2 * c + b1      if c <  EPSILON
//! ```
//!
//! `b1` and `b2` are chosen so the quadratic extension `g(c) = b2 c^2 + b1 c + b0`
//! has the same marginal utility and the same slope of marginal utility as
//! the CRRA function at `EPSILON`. A root-finder probing infeasible savings
//! therefore sees a smooth, strictly decreasing, positive-near-the-floor
//! function instead of `NaN` or a sign flip.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use super::error::HouseholdResult;

/// Consumption floor below which the quadratic extension replaces `c^(-sigma)`.
pub const EPSILON: f64 = 1e-4;

const CRRA_CURVE_POINTS: usize = 1000;
const STITCH_CURVE_POINTS: usize = 500;
const STITCH_CURVE_LOWER: f64 = -0.00005;

/// Quadratic-extension coefficients for a given `sigma`.
///
/// Building one per `sigma` and evaluating through it avoids recomputing the
/// powers of `epsilon`; the free functions below rebuild it on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StitchCoefficients {
    pub sigma: f64,
    pub epsilon: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

impl StitchCoefficients {
    pub fn new(sigma: f64) -> Self {
        let epsilon = EPSILON;
        let b2 = -sigma * epsilon.powf(-sigma - 1.0) / 2.0;
        let b1 = epsilon.powf(-sigma) - 2.0 * b2 * epsilon;
        let b0 = crra_utility(epsilon, sigma) - b2 * epsilon * epsilon - b1 * epsilon;
        Self {
            sigma,
            epsilon,
            b0,
            b1,
            b2,
        }
    }

    pub fn marginal_utility(&self, c: f64) -> f64 {
        if c < self.epsilon {
            self.extension_marginal_utility(c)
        } else {
            c.powf(-self.sigma)
        }
    }

    /// `g'(c)`, the derivative of the quadratic extension, for any `c`.
    pub fn extension_marginal_utility(&self, c: f64) -> f64 {
        2.0 * self.b2 * c + self.b1
    }
}

fn crra_utility(c: f64, sigma: f64) -> f64 {
    if (sigma - 1.0).abs() < 1e-12 {
        c.ln()
    } else {
        (c.powf(1.0 - sigma) - 1.0) / (1.0 - sigma)
    }
}

pub fn marginal_utility(c: f64, sigma: f64) -> f64 {
    StitchCoefficients::new(sigma).marginal_utility(c)
}

pub fn marginal_utility_vec(consumption: &[f64], sigma: f64) -> Vec<f64> {
    let coefficients = StitchCoefficients::new(sigma);
    consumption
        .iter()
        .map(|&c| coefficients.marginal_utility(c))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub consumption: f64,
    pub marginal_utility: f64,
}

/// Sampled CRRA and stitched marginal-utility curves around `EPSILON`, used to
/// check by eye that the two pieces meet smoothly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StitchCurve {
    pub sigma: f64,
    pub epsilon: f64,
    pub b1: f64,
    pub b2: f64,
    pub crra: Vec<CurvePoint>,
    pub stitched: Vec<CurvePoint>,
}

impl StitchCurve {
    pub fn sample(sigma: f64) -> Self {
        let coefficients = StitchCoefficients::new(sigma);
        let epsilon = coefficients.epsilon;

        let crra = linspace(epsilon / 2.0, epsilon * 3.0, CRRA_CURVE_POINTS)
            .into_iter()
            .map(|c| CurvePoint {
                consumption: c,
                marginal_utility: c.powf(-sigma),
            })
            .collect();
        let stitched = linspace(STITCH_CURVE_LOWER, epsilon, STITCH_CURVE_POINTS)
            .into_iter()
            .map(|c| CurvePoint {
                consumption: c,
                marginal_utility: coefficients.extension_marginal_utility(c),
            })
            .collect();

        Self {
            sigma,
            epsilon,
            b1: coefficients.b1,
            b2: coefficients.b2,
            crra,
            stitched,
        }
    }
}

/// Output port for the stitch diagnostic.
pub trait StitchRenderer {
    fn render(&mut self, curve: &StitchCurve) -> HouseholdResult<()>;
}

/// Writes the sampled curves as pretty-printed JSON, creating parent
/// directories as needed.
#[derive(Debug, Clone)]
pub struct JsonCurveWriter {
    path: PathBuf,
}

impl JsonCurveWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StitchRenderer for JsonCurveWriter {
    fn render(&mut self, curve: &StitchCurve) -> HouseholdResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(curve)?;
        fs::write(&self.path, json)?;
        tracing::info!(path = %self.path.display(), sigma = curve.sigma, "wrote stitch diagnostic");
        Ok(())
    }
}

/// Same as [`marginal_utility_vec`], additionally handing a sampled
/// [`StitchCurve`] to `renderer` when one is supplied. Keep this out of
/// solver loops: renderers may block on I/O.
pub fn marginal_utility_with_diagnostics(
    consumption: &[f64],
    sigma: f64,
    renderer: Option<&mut dyn StitchRenderer>,
) -> HouseholdResult<Vec<f64>> {
    let values = marginal_utility_vec(consumption, sigma);
    if let Some(renderer) = renderer {
        renderer.render(&StitchCurve::sample(sigma))?;
    }
    Ok(values)
}

fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            (0..points)
                .map(|i| {
                    if i + 1 == points {
                        end
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}
