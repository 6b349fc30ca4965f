//! Lognormal summary of a corrected spectrum.
//!
//! Two fitting routines exist for historical reasons and are kept apart on purpose. They
//! disagree on how strongly bins near the detection floor are down-weighted and on whether the
//! location and width of the distribution are bounded:
//!
//! | mode | weight | area | mu | sigma |
//! |---|---|---|---|---|
//! | [`FitMode::Measured`] | `1/(1 - E)` | >= 0 | [ln 0.01, ln 4.5] | [0, ln 6] |
//! | [`FitMode::Synthetic`] | `1/(1 - E)^2` | >= 0 | free | free |
//!
//! Note the weight grows as the collection efficiency `E` rises towards one, so bins near the
//! 40% floor count for about 1.7 and well collected bins count for more. This is how the
//! weights have always been formed.

use std::time::Duration;

use log::debug;
use ndarray::array;
use serde::{Deserialize, Serialize};

use crate::error::FitFailure;
use crate::math::chi_square;
use crate::minimisation::{Problem, SolverSettings};
use crate::spectrum::CorrectedSpectrum;

pub use crate::minimisation::Bound;

/// Fewest non-empty bins that can support a three parameter fit
pub const MIN_FIT_BINS: usize = 3;
/// Efficiencies are capped here when forming weights, so a perfectly collected bin has a
/// finite weight
pub const MAX_WEIGHTED_EFFICIENCY: f64 = 1. - 1e-6;

/// Which of the two weighting schemes to use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Weights `1/(1 - E)`
    Measured,
    /// Weights `1/(1 - E)^2`, used for spectra with gaps filled from a reference profile
    Synthetic,
}

impl FitMode {
    pub fn weight(self, efficiency: f64) -> f64 {
        let miss = 1. - efficiency.min(MAX_WEIGHTED_EFFICIENCY);
        match self {
            Self::Measured => 1. / miss,
            Self::Synthetic => 1. / miss.powi(2),
        }
    }
}

/// Bounds, starting point and solver budget of a lognormal fit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub mode: FitMode,
    pub area_bound: Bound,
    pub mu_bound: Bound,
    pub sigma_bound: Bound,
    /// The starting area is the summed concentration divided by this
    pub initial_area_divisor: f64,
    pub initial_mu: f64,
    pub initial_sigma: f64,
    /// Iteration budget of a single simplex run
    pub max_iterations: u64,
    /// Convergence threshold on the spread of simplex costs, relative to the starting cost
    pub tolerance: f64,
    pub restarts: usize,
    /// Wall clock budget per sample, in milliseconds
    pub timeout_ms: u64,
    /// Log every solver iteration to the terminal
    pub trace: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self::measured()
    }
}

impl FitConfig {
    pub fn measured() -> Self {
        Self {
            mode: FitMode::Measured,
            area_bound: Bound::Lower(0.0),
            mu_bound: Bound::Range(0.01f64.ln(), 4.5f64.ln()),
            sigma_bound: Bound::Range(1f64.ln(), 6f64.ln()),
            initial_area_divisor: 0.01,
            initial_mu: 0.0,
            initial_sigma: 0.7,
            max_iterations: 5000,
            tolerance: 1e-14,
            restarts: 3,
            timeout_ms: 10_000,
            trace: false,
        }
    }

    pub fn synthetic() -> Self {
        Self {
            mode: FitMode::Synthetic,
            mu_bound: Bound::Free,
            sigma_bound: Bound::Free,
            ..Self::measured()
        }
    }

    fn bounds(&self) -> [Bound; 3] {
        [self.area_bound, self.mu_bound, self.sigma_bound]
    }

    fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            restarts: self.restarts,
            budget: Duration::from_millis(self.timeout_ms),
            trace: self.trace,
        }
    }

    /// # Errors
    /// A description of the first setting that cannot drive a fit
    pub(crate) fn check(&self) -> Result<(), String> {
        if !self.bounds().iter().all(|bound| bound.is_valid()) {
            return Err("fit bounds must be finite with min < max".into());
        }
        if !(self.initial_area_divisor.is_finite() && self.initial_area_divisor > 0.0) {
            return Err("initial area divisor must be positive".into());
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err("fit tolerance must be non-negative".into());
        }
        if self.max_iterations == 0 {
            return Err("fit iteration budget must be positive".into());
        }
        Ok(())
    }
}

/// Fitted lognormal parameters and goodness of fit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LognormalFit {
    pub mode: FitMode,
    pub area: f64,
    /// Log-space mean, ln(µm)
    pub mu: f64,
    /// Log-space standard deviation
    pub sigma: f64,
    /// Geometric mean radius, µm
    pub geometric_mean: f64,
    pub geometric_std_dev: f64,
    /// Chi-square divided by the number of bins used
    pub reduced_chi_square: f64,
    pub p_value: f64,
    /// Number of bins used in the fit
    pub dof: usize,
    pub iterations: u64,
}

/// Fit a lognormal to bins at radii `x` (µm) with concentrations `y` collected at
/// `efficiency`.
///
/// Only bins with a positive concentration take part; empty and suppressed bins are left out
/// rather than fitted as zeros.
///
/// # Errors
/// [`FitFailure`] when fewer than [`MIN_FIT_BINS`] bins are usable, the solver runs out of
/// iterations or time, or the configuration cannot drive a fit.
pub fn fit_points(
    x: &[f64],
    y: &[f64],
    efficiency: &[f64],
    config: &FitConfig,
) -> Result<LognormalFit, FitFailure> {
    config.check().map_err(FitFailure::Optimiser)?;

    let retained = x
        .iter()
        .zip(y)
        .zip(efficiency)
        .filter(|((&x, &y), _)| y > 0.0 && x > 0.0)
        .map(|((&x, &y), &e)| (x, y, config.mode.weight(e)))
        .collect::<Vec<_>>();
    if retained.len() < MIN_FIT_BINS {
        return Err(FitFailure::TooFewBins {
            retained: retained.len(),
            required: MIN_FIT_BINS,
        });
    }

    let x = retained.iter().map(|r| r.0).collect::<Vec<_>>();
    let y = retained.iter().map(|r| r.1).collect::<Vec<_>>();
    let w = retained.iter().map(|r| r.2).collect::<Vec<_>>();

    let initial = array![
        config
            .area_bound
            .clamp(y.iter().sum::<f64>() / config.initial_area_divisor),
        config.mu_bound.clamp(config.initial_mu),
        config.sigma_bound.clamp(config.initial_sigma),
    ];

    let problem = Problem::build(&x, &y, &w, config.bounds());
    let solution = problem.clone().solve(&initial, &config.solver_settings())?;
    let (area, mu, sigma) = (solution.params[0], solution.params[1], solution.params[2]);

    let expected = problem.model(&solution.params).to_vec();
    let (statistic, p_value) = chi_square(&y, &expected);
    #[allow(clippy::cast_precision_loss)]
    let reduced_chi_square = statistic / y.len() as f64;

    debug!(
        "lognormal fit over {} bins: area {area:.4e}, mu {mu:.4}, sigma {sigma:.4}, \
         cost {:.4e} after {} iterations",
        y.len(),
        solution.cost,
        solution.iterations
    );

    Ok(LognormalFit {
        mode: config.mode,
        area,
        mu,
        sigma,
        geometric_mean: mu.exp(),
        geometric_std_dev: sigma.exp(),
        reduced_chi_square,
        p_value,
        dof: y.len(),
        iterations: solution.iterations,
    })
}

/// Fit a lognormal to the (cut off) concentrations of `corrected`, weighting each bin by its
/// collection efficiency.
///
/// # Errors
/// See [`fit_points`].
pub fn fit(corrected: &CorrectedSpectrum, config: &FitConfig) -> Result<LognormalFit, FitFailure> {
    let x = corrected
        .bins
        .iter()
        .map(|bin| bin.bin.mid_radius)
        .collect::<Vec<_>>();
    fit_points(&x, &corrected.concentrations(), &corrected.efficiencies(), config)
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    use super::{fit, fit_points, FitConfig, FitMode, MIN_FIT_BINS};
    use crate::correction::{correct, DEFAULT_EFFICIENCY_THRESHOLD};
    use crate::cutoff::{truncate, DEFAULT_CUTOFF_RADIUS};
    use crate::math::lognormal_density;
    use crate::spectrum::tests::sample;
    use crate::FitFailure;

    fn log_spaced_radii(count: i32) -> Vec<f64> {
        (0..count).map(|ii| 0.5 * 1.15f64.powi(ii)).collect()
    }

    #[test]
    fn exact_lognormal_bins_are_recovered() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);

        for _ in 0..5 {
            let area: f64 = rng.gen_range(1e2..1e6);
            let mu: f64 = rng.gen_range(-0.5..1.3);
            let sigma: f64 = rng.gen_range(0.2..1.2);

            let x = log_spaced_radii(30);
            let y = x
                .iter()
                .map(|&r| lognormal_density(r, area, mu, sigma))
                .collect::<Vec<_>>();
            let efficiency = vec![1.0; x.len()];

            let fit = fit_points(&x, &y, &efficiency, &FitConfig::measured()).unwrap();

            approx::assert_relative_eq!(fit.area, area, max_relative = 1e-2);
            approx::assert_relative_eq!(fit.geometric_mean, mu.exp(), max_relative = 1e-2);
            approx::assert_relative_eq!(fit.geometric_std_dev, sigma.exp(), max_relative = 1e-2);
            // Zero up to the solver tolerance, which scales with the concentrations
            assert!(fit.reduced_chi_square < 1e-6 * area);
            assert_eq!(fit.dof, x.len());
        }
    }

    #[test]
    fn reduced_chi_square_is_normalised_by_bin_count() {
        let x = log_spaced_radii(12);
        let y = x
            .iter()
            .enumerate()
            .map(|(ii, &r)| {
                let scale = if ii % 2 == 0 { 1.1 } else { 0.9 };
                lognormal_density(r, 1e4, 0.5, 0.6) * scale
            })
            .collect::<Vec<_>>();
        let efficiency = vec![0.8; x.len()];

        let fit = fit_points(&x, &y, &efficiency, &FitConfig::measured()).unwrap();

        let statistic: f64 = x
            .iter()
            .zip(&y)
            .map(|(&r, &y)| {
                let f = lognormal_density(r, fit.area, fit.mu, fit.sigma);
                (y - f).powi(2) / f
            })
            .sum();
        approx::assert_relative_eq!(fit.reduced_chi_square, statistic / 12., max_relative = 1e-9);
        assert!((0.0..=1.0).contains(&fit.p_value));
    }

    #[test]
    fn suppressed_bins_are_left_out() {
        let x = log_spaced_radii(10);
        let mut y = x
            .iter()
            .map(|&r| lognormal_density(r, 1e4, 0.5, 0.6))
            .collect::<Vec<_>>();
        y[0] = 0.0;
        y[1] = 0.0;
        let efficiency = vec![0.9; x.len()];

        let fit = fit_points(&x, &y, &efficiency, &FitConfig::measured()).unwrap();
        assert_eq!(fit.dof, 8);
    }

    #[test]
    fn too_few_bins_is_a_failure_not_a_fit() {
        let x = [4.0, 5.0, 6.0, 7.0];
        let y = [0.0, 10.0, 0.0, 5.0];
        let result = fit_points(&x, &y, &[0.9; 4], &FitConfig::measured());
        assert_eq!(
            result,
            Err(FitFailure::TooFewBins {
                retained: 2,
                required: MIN_FIT_BINS
            })
        );
    }

    #[test]
    fn a_heavily_cut_spectrum_cannot_be_fitted() {
        let corrected = correct(&sample(6, 1000.0), DEFAULT_EFFICIENCY_THRESHOLD).unwrap();
        let truncated = truncate(&corrected, DEFAULT_CUTOFF_RADIUS).unwrap();
        // Only the 4.5 and 5.5 µm lower edges survive
        assert!(matches!(
            fit(&truncated, &FitConfig::measured()),
            Err(FitFailure::TooFewBins { retained: 2, .. })
        ));
    }

    #[test]
    fn fitted_parameters_respect_their_bounds() {
        // A flat spectrum pushes the width towards its upper bound
        let x = log_spaced_radii(20);
        let y = vec![100.0; x.len()];
        let fit = fit_points(&x, &y, &[0.9; 20], &FitConfig::measured()).unwrap();

        assert!(fit.area >= 0.0);
        assert!((0.01f64.ln()..=4.5f64.ln()).contains(&fit.mu));
        assert!((0.0..=6f64.ln()).contains(&fit.sigma));
    }

    #[test]
    fn weights_follow_the_mode() {
        approx::assert_relative_eq!(FitMode::Measured.weight(0.4), 1. / 0.6);
        approx::assert_relative_eq!(FitMode::Synthetic.weight(0.4), 1. / 0.36);
        approx::assert_relative_eq!(FitMode::Measured.weight(0.0), 1.0);
        assert!(FitMode::Measured.weight(1.0).is_finite());
    }

    #[test]
    fn synthetic_mode_drops_location_bounds() {
        let config = FitConfig::synthetic();
        assert_eq!(config.mode, FitMode::Synthetic);
        assert_eq!(config.mu_bound, super::Bound::Free);
        assert_eq!(config.area_bound, FitConfig::measured().area_bound);
    }

    #[test]
    fn an_exhausted_budget_is_reported() {
        let x = log_spaced_radii(10);
        let y = x
            .iter()
            .map(|&r| lognormal_density(r, 1e4, 0.5, 0.6))
            .collect::<Vec<_>>();
        let config = FitConfig {
            max_iterations: 3,
            ..FitConfig::measured()
        };
        assert!(matches!(
            fit_points(&x, &y, &[0.9; 10], &config),
            Err(FitFailure::NotConverged { .. })
        ));
    }

    #[test]
    fn an_exhausted_time_budget_is_a_timeout() {
        let x = log_spaced_radii(10);
        let y = x
            .iter()
            .map(|&r| lognormal_density(r, 1e4, 0.5, 0.6))
            .collect::<Vec<_>>();
        let config = FitConfig {
            timeout_ms: 0,
            ..FitConfig::measured()
        };
        assert!(matches!(
            fit_points(&x, &y, &[0.9; 10], &config),
            Err(FitFailure::Timeout { .. })
        ));
    }
}
