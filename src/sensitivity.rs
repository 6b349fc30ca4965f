//! Uncertainty in the corrected spectrum due to the wind speed at the sampler.
//!
//! The wind speed is not measured aloft, so each sample is recomputed with the wind scaled up
//! and down by a fraction. The number of particles counted on the slide is fixed, so
//! $$
//!     N' = N \frac{E U}{E' U'}
//! $$
//! where the sampled volume scales with the wind speed $U$ and the collected fraction with the
//! efficiency $E$.

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::correction::classify;
use crate::cutoff::total_above;
use crate::efficiency::collision_efficiency;
use crate::error::Error;
use crate::spectrum::{BinStatus, CorrectedSpectrum};
use crate::Result;

/// Default fractional perturbation applied to the wind speed
pub const DEFAULT_FRACTIONAL_CHANGE: f64 = 0.35;

/// The spectrum recomputed at a single perturbed wind speed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensitivityBranch {
    pub wind_speed: f64,
    pub efficiency: Vec<f64>,
    pub concentration: Vec<f64>,
    pub total_concentration: f64,
    /// Total over bins at or above the secondary cutoff
    pub cutoff_total_concentration: f64,
}

/// Spectra recomputed at wind speeds `U (1 + f)` and `U (1 - f)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub fractional_change: f64,
    pub cutoff_radius: f64,
    pub high: SensitivityBranch,
    pub low: SensitivityBranch,
}

fn branch(
    corrected: &CorrectedSpectrum,
    wind_speed: f64,
    cutoff_radius: f64,
) -> Result<SensitivityBranch> {
    let ambient = corrected.ambient.with_wind_speed(wind_speed);
    let original_wind = corrected.ambient.wind_speed;

    let efficiency = corrected
        .bins
        .iter()
        .map(|bin| collision_efficiency(&ambient, bin.bin.mid_radius_m()))
        .collect::<Result<Vec<_>>>()?;

    let concentration = izip!(&corrected.bins, &efficiency)
        .map(|(bin, &perturbed)| {
            let raw = bin.bin.raw_concentration;
            match classify(perturbed, raw, corrected.efficiency_threshold) {
                BinStatus::Measured if raw > 0.0 => {
                    raw * ((bin.efficiency * original_wind) / (perturbed * wind_speed))
                }
                _ => 0.0,
            }
        })
        .collect::<Vec<_>>();

    let lower_radii = corrected
        .bins
        .iter()
        .map(|bin| bin.bin.lower_radius)
        .collect::<Vec<_>>();

    Ok(SensitivityBranch {
        wind_speed,
        total_concentration: concentration.iter().sum(),
        cutoff_total_concentration: total_above(&lower_radii, &concentration, cutoff_radius),
        efficiency,
        concentration,
    })
}

/// Recompute `corrected` with the wind speed perturbed by `fractional_change` in both
/// directions.
///
/// Bins whose perturbed efficiency drops below the spectrum's efficiency threshold are zeroed,
/// so the detection floor moves with the wind. A fractional change of zero reproduces the
/// corrected concentrations exactly.
///
/// # Errors
/// [`Error::InvalidInput`] if `fractional_change` is outside [0, 1], otherwise any error from
/// the efficiency model.
pub fn sensitivity(
    corrected: &CorrectedSpectrum,
    fractional_change: f64,
    cutoff_radius: f64,
) -> Result<SensitivityResult> {
    if !(0.0..=1.0).contains(&fractional_change) {
        return Err(Error::invalid(format!(
            "fractional wind change must lie in [0, 1], got {fractional_change}"
        )));
    }
    let wind = corrected.ambient.wind_speed;

    Ok(SensitivityResult {
        fractional_change,
        cutoff_radius,
        high: branch(corrected, wind * (1. + fractional_change), cutoff_radius)?,
        low: branch(corrected, wind * (1. - fractional_change), cutoff_radius)?,
    })
}
