use std::f64::consts::PI;

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Compute the tail sums of `values`
///
/// Element `i` of the output is the sum of `values[i..]`, so the output is non-increasing for
/// non-negative input and its final element equals the final input.
///
/// # Examples
///
/// ```
/// use ssa_spectra::math::tail_sum;
///
/// let cumulative = tail_sum(&[1., 2., 3.]);
/// assert_eq!(cumulative, vec![6., 5., 3.]);
/// ```
pub fn tail_sum(values: &[f64]) -> Vec<f64> {
    let mut running = 0.0;
    let mut sums = values
        .iter()
        .rev()
        .map(|value| {
            running += value;
            running
        })
        .collect::<Vec<_>>();
    sums.reverse();
    sums
}

/// Lognormal number density of total `area`, log-space mean `mu` and log-space width `sigma`
///
/// $$
///     f(r) = \frac{A}{r \sigma \sqrt{2\pi}} \exp\left(-\frac{(\ln r - \mu)^2}{2\sigma^2}\right)
/// $$
///
/// # Examples
///
/// ```
/// use ssa_spectra::math::lognormal_density;
///
/// // The density of a unit lognormal at its median
/// let peak = lognormal_density(1.0, 1.0, 0.0, 1.0);
/// assert!((peak - 1.0 / (2.0 * std::f64::consts::PI).sqrt()).abs() < 1e-12);
/// ```
pub fn lognormal_density(radius: f64, area: f64, mu: f64, sigma: f64) -> f64 {
    area / (radius * sigma * (2. * PI).sqrt())
        * (-(radius.ln() - mu).powi(2) / (2. * sigma.powi(2))).exp()
}

/// Pearson's chi-square statistic for `observed` against `expected`, with its p-value
///
/// The p-value is the upper tail of the chi-square distribution with `n - 1` degrees of
/// freedom. Perfect agreement has a p-value of one and an undefined statistic (an expected
/// value of zero) a p-value of zero.
pub fn chi_square(observed: &[f64], expected: &[f64]) -> (f64, f64) {
    let statistic: f64 = observed
        .iter()
        .zip(expected)
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum();

    let degrees_of_freedom = observed.len().saturating_sub(1);
    if degrees_of_freedom == 0 || !statistic.is_finite() || statistic < 0.0 {
        return (statistic, 0.0);
    }
    if statistic == 0.0 {
        return (statistic, 1.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let p_value = ChiSquared::new(degrees_of_freedom as f64)
        .map_or(0.0, |distribution| distribution.sf(statistic));
    (statistic, p_value)
}
