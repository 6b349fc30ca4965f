use std::time::{Duration, Instant};

use argmin::core::observers::{ObserverMode, SlogLogger};
use argmin::core::{CostFunction, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use crate::error::FitFailure;
use crate::math::lognormal_density;

/// Constraint on a single fit parameter
///
/// Bounded parameters are fitted through an unbounded internal coordinate, so the solver never
/// has to handle the constraint itself. A one-sided bound uses
/// $$
///     p = p_{min} - 1 + \sqrt{u^2 + 1}
/// $$
/// and a two-sided bound
/// $$
///     p = p_{min} + \frac{(\sin u + 1)(p_{max} - p_{min})}{2}.
/// $$
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Free,
    Lower(f64),
    Range(f64, f64),
}

impl Bound {
    pub(crate) fn to_external(self, internal: f64) -> f64 {
        match self {
            Self::Free => internal,
            Self::Lower(min) => (min - 1. + internal.mul_add(internal, 1.).sqrt()).max(min),
            Self::Range(min, max) => {
                (min + (internal.sin() + 1.) * (max - min) / 2.).clamp(min, max)
            }
        }
    }

    pub(crate) fn to_internal(self, external: f64) -> f64 {
        match self {
            Self::Free => external,
            Self::Lower(min) => ((external - min + 1.).powi(2) - 1.).max(0.0).sqrt(),
            Self::Range(min, max) => {
                (2. * (external - min) / (max - min) - 1.).clamp(-1., 1.).asin()
            }
        }
    }

    pub(crate) fn clamp(self, value: f64) -> f64 {
        match self {
            Self::Free => value,
            Self::Lower(min) => value.max(min),
            Self::Range(min, max) => value.clamp(min, max),
        }
    }

    pub(crate) fn is_valid(self) -> bool {
        match self {
            Self::Free => true,
            Self::Lower(min) => min.is_finite(),
            Self::Range(min, max) => min.is_finite() && max.is_finite() && min < max,
        }
    }
}

/// Settings for the bounded simplex solver
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverSettings {
    /// Iteration budget for each simplex run
    pub(crate) max_iterations: u64,
    /// Convergence threshold on the spread of simplex costs, relative to the starting cost
    pub(crate) tolerance: f64,
    /// Number of times the simplex is rebuilt around the best point after converging
    pub(crate) restarts: usize,
    /// Wall clock budget for the whole fit
    pub(crate) budget: Duration,
    /// Write the solver state at every iteration to the terminal
    pub(crate) trace: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Solution {
    /// Fitted `[area, mu, sigma]`
    pub(crate) params: Array1<f64>,
    pub(crate) cost: f64,
    pub(crate) iterations: u64,
}

/// Weighted least squares fit of a lognormal to binned data
#[derive(Clone, Debug)]
pub(crate) struct Problem {
    /// Bin mid radii
    x: Array1<f64>,
    /// Observed concentrations
    y: Array1<f64>,
    /// Weight multiplying each residual
    weights: Array1<f64>,
    /// Constraints on `[area, mu, sigma]`
    bounds: [Bound; 3],
}

impl Problem {
    /// This function DOES NOT sanity check what is passed to it.
    ///
    /// The caller guarantees `x`, `y` and `weights` have equal lengths, `x` is positive and the
    /// bounds are valid.
    pub(crate) fn build(x: &[f64], y: &[f64], weights: &[f64], bounds: [Bound; 3]) -> Self {
        Self {
            x: Array1::from_vec(x.to_vec()),
            y: Array1::from_vec(y.to_vec()),
            weights: Array1::from_vec(weights.to_vec()),
            bounds,
        }
    }

    /// Map internal solver coordinates onto `[area, mu, sigma]`
    pub(crate) fn external(&self, internal: &Array1<f64>) -> Array1<f64> {
        internal
            .iter()
            .zip(self.bounds)
            .map(|(&u, bound)| bound.to_external(u))
            .collect()
    }

    /// Map `[area, mu, sigma]` onto internal solver coordinates
    pub(crate) fn internal(&self, external: &Array1<f64>) -> Array1<f64> {
        external
            .iter()
            .zip(self.bounds)
            .map(|(&p, bound)| bound.to_internal(bound.clamp(p)))
            .collect()
    }

    /// Model densities at every bin for the external parameters `params`
    pub(crate) fn model(&self, params: &Array1<f64>) -> Array1<f64> {
        self.x
            .mapv(|x| lognormal_density(x, params[0], params[1], params[2]))
    }

    /// Weighted residuals for the external parameters `params`
    fn residuals(&self, params: &Array1<f64>) -> Array1<f64> {
        let model = self.model(params);
        Zip::from(&self.y)
            .and(&model)
            .and(&self.weights)
            .map_collect(|y, f, w| w * (y - f))
    }

    fn initial_simplex(start: &Array1<f64>) -> Vec<Array1<f64>> {
        let mut simplex = vec![start.clone()];
        for ii in 0..start.len() {
            let mut vertex = start.clone();
            vertex[ii] = if vertex[ii] == 0.0 {
                0.00025
            } else {
                vertex[ii] * 1.05
            };
            simplex.push(vertex);
        }
        simplex
    }

    /// Run the optimisation from the external parameters `initial`
    pub(crate) fn solve(
        self,
        initial: &Array1<f64>,
        settings: &SolverSettings,
    ) -> Result<Solution, FitFailure> {
        let started = Instant::now();
        let mut start = self.internal(initial);
        let starting_cost = self
            .cost(&start)
            .map_err(|e| FitFailure::Optimiser(e.to_string()))?;
        if !starting_cost.is_finite() {
            return Err(FitFailure::Optimiser(format!(
                "cost at the initial guess is {starting_cost}"
            )));
        }
        let sd_tolerance = (settings.tolerance * starting_cost).max(f64::MIN_POSITIVE);

        let mut iterations = 0;
        let mut cost = starting_cost;
        for _ in 0..=settings.restarts {
            let solver = NelderMead::new(Self::initial_simplex(&start))
                .with_sd_tolerance(sd_tolerance)
                .map_err(|e| FitFailure::Optimiser(e.to_string()))?;

            let max_iterations = settings.max_iterations;
            let mut executor = Executor::new(self.clone(), solver)
                .configure(|state| state.max_iters(max_iterations));
            if settings.trace {
                executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
            }
            let res = executor
                .run()
                .map_err(|e| FitFailure::Optimiser(e.to_string()))?;

            let state = res.state();
            iterations += state.get_iter();
            if matches!(
                state.get_termination_reason(),
                Some(TerminationReason::MaxItersReached)
            ) {
                return Err(FitFailure::NotConverged { iterations });
            }
            let elapsed = started.elapsed();
            if elapsed > settings.budget {
                return Err(FitFailure::Timeout {
                    elapsed,
                    budget: settings.budget,
                });
            }

            start = state
                .get_best_param()
                .cloned()
                .ok_or_else(|| FitFailure::Optimiser("solver returned no parameters".into()))?;
            let improvement = cost - state.get_best_cost();
            cost = state.get_best_cost();
            if cost == 0.0 || improvement <= sd_tolerance {
                break;
            }
        }

        Ok(Solution {
            params: self.external(&start),
            cost,
            iterations,
        })
    }
}

impl CostFunction for Problem {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let residuals = self.residuals(&self.external(p));
        let cost = residuals.dot(&residuals);
        // Treat overflow as a wall rather than letting NaN poison the simplex
        Ok(if cost.is_nan() { f64::INFINITY } else { cost })
    }
}
