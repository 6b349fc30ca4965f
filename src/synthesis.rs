//! Filling poorly collected bins from a reference profile.
//!
//! Small particles are collected so badly that their bins are suppressed in most samples. A
//! reference profile, the per-bin mean of a set of spectra taken where the small end is well
//! resolved, stands in for those bins so the whole distribution can be fitted.

use itertools::izip;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::correction::salt_mass;
use crate::error::{Error, FitFailure};
use crate::lognormal::{fit_points, FitConfig, LognormalFit};
use crate::spectrum::{BinStatus, CorrectedSpectrum};
use crate::Result;

/// Mean efficiency and corrected concentration per bin over a set of reference spectra
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProfile {
    pub efficiency: Vec<f64>,
    pub concentration: Vec<f64>,
    /// Number of spectra averaged
    pub members: usize,
}

impl ReferenceProfile {
    /// Average `spectra` bin by bin.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] if `spectra` is empty or the spectra do not share a bin count.
    pub fn from_spectra(spectra: &[CorrectedSpectrum]) -> Result<Self> {
        let Some(first) = spectra.first() else {
            return Err(Error::invalid("a reference profile needs at least one spectrum"));
        };
        let bins = first.bins.len();
        if let Some(other) = spectra.iter().find(|spectrum| spectrum.bins.len() != bins) {
            return Err(Error::invalid(format!(
                "reference spectrum {} has {} bins, expected {bins}",
                other.sample_id,
                other.bins.len()
            )));
        }

        let mut efficiency = vec![0.0; bins];
        let mut concentration = vec![0.0; bins];
        for spectrum in spectra {
            for (e, c, bin) in izip!(&mut efficiency, &mut concentration, &spectrum.bins) {
                *e += bin.efficiency;
                *c += bin.concentration;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let members = spectra.len() as f64;
        efficiency.iter_mut().for_each(|e| *e /= members);
        concentration.iter_mut().for_each(|c| *c /= members);

        Ok(Self {
            efficiency,
            concentration,
            members: spectra.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.concentration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concentration.is_empty()
    }
}

/// Replace every bin of `corrected` collected below `threshold` with the profile's efficiency
/// and concentration.
///
/// Replaced bins are marked [`BinStatus::Synthetic`] and their salt mass, tail sums and totals
/// are recomputed. All other bins are left as they are.
///
/// # Errors
/// [`Error::InvalidInput`] if the profile and the spectrum differ in bin count or the threshold
/// is outside [0, 1].
pub fn synthesize(
    corrected: &CorrectedSpectrum,
    profile: &ReferenceProfile,
    threshold: f64,
) -> Result<CorrectedSpectrum> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::invalid(format!(
            "efficiency threshold must lie in [0, 1], got {threshold}"
        )));
    }
    if profile.len() != corrected.bins.len() {
        return Err(Error::invalid(format!(
            "sample {} has {} bins but the reference profile has {}",
            corrected.sample_id,
            corrected.bins.len(),
            profile.len()
        )));
    }

    let mut synthetic = corrected.clone();
    let mut replaced = 0;
    for (bin, &efficiency, &concentration) in
        izip!(&mut synthetic.bins, &profile.efficiency, &profile.concentration)
    {
        if bin.efficiency < threshold {
            bin.efficiency = efficiency;
            bin.concentration = concentration;
            bin.salt_mass = salt_mass(bin.bin.mid_radius, concentration);
            bin.status = BinStatus::Synthetic;
            replaced += 1;
        }
    }
    debug!(
        "sample {}: filled {replaced} bins from a profile of {} spectra",
        corrected.sample_id, profile.members
    );

    synthetic.refresh_totals();
    Ok(synthetic)
}

/// Fit the gap-filled `synthetic` spectrum, weighting each bin by the efficiency at which the
/// sample itself was collected in `measured`.
///
/// # Errors
/// [`FitFailure`] as for [`fit_points`]. A bin count mismatch between the two spectra is
/// reported as [`FitFailure::Optimiser`].
pub fn fit_synthetic(
    measured: &CorrectedSpectrum,
    synthetic: &CorrectedSpectrum,
    config: &FitConfig,
) -> std::result::Result<LognormalFit, FitFailure> {
    if measured.bins.len() != synthetic.bins.len() {
        return Err(FitFailure::Optimiser(format!(
            "measured spectrum has {} bins, synthetic spectrum {}",
            measured.bins.len(),
            synthetic.bins.len()
        )));
    }
    let x = synthetic
        .bins
        .iter()
        .map(|bin| bin.bin.mid_radius)
        .collect::<Vec<_>>();
    fit_points(
        &x,
        &synthetic.concentrations(),
        &measured.efficiencies(),
        config,
    )
}
