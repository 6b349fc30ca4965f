use std::f64::consts::PI;

use log::debug;

use crate::efficiency::collision_efficiency;
use crate::error::Error;
use crate::spectrum::{
    BinStatus, CorrectedBin, CorrectedSpectrum, QualityFlag, SampleSpectrum,
    METRES_PER_MICROMETRE,
};
use crate::Result;

/// Efficiency below which counted bins are discarded
pub const DEFAULT_EFFICIENCY_THRESHOLD: f64 = 0.4;
/// Salt density used to convert number to mass concentration, kg m⁻³
pub const SALT_MASS_DENSITY: f64 = 2170.;
/// Scale from kg m⁻³ to µg m⁻³
const MICROGRAMS_PER_KILOGRAM: f64 = 1e9;

/// Salt mass concentration (µg m⁻³) carried by `concentration` particles per m³ of dry radius
/// `mid_radius` (µm)
pub fn salt_mass(mid_radius: f64, concentration: f64) -> f64 {
    let radius = mid_radius * METRES_PER_MICROMETRE;
    4. / 3. * PI * radius.powi(3) * SALT_MASS_DENSITY * MICROGRAMS_PER_KILOGRAM * concentration
}

/// Classify a bin given its efficiency and raw concentration
pub fn classify(efficiency: f64, raw_concentration: f64, threshold: f64) -> BinStatus {
    if raw_concentration > 0.0 && efficiency == 0.0 {
        BinStatus::ZeroEfficiency
    } else if raw_concentration > 0.0 && efficiency < threshold {
        BinStatus::LowConfidence
    } else {
        BinStatus::Measured
    }
}

/// Apply the collision efficiency model to every bin of `spectrum`.
///
/// Bins that held particles but were collected at an efficiency below `threshold` are zeroed,
/// both in number and in salt mass. They are not extrapolated. Bins where the model gives an
/// efficiency of exactly zero are also flagged, and dropped from the `fixed_concentration`
/// diagnostic which otherwise carries the raw values.
///
/// # Errors
/// [`Error::InvalidInput`] if the threshold is outside [0, 1], or any error raised by the
/// efficiency model for the sample's conditions.
pub fn correct(spectrum: &SampleSpectrum, threshold: f64) -> Result<CorrectedSpectrum> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::invalid(format!(
            "efficiency threshold must lie in [0, 1], got {threshold}"
        )));
    }

    let mut flags = vec![];
    let mut bins = Vec::with_capacity(spectrum.bins.len());
    for (ii, bin) in spectrum.bins.iter().enumerate() {
        let efficiency = collision_efficiency(&spectrum.ambient, bin.mid_radius_m())?;
        let status = classify(efficiency, bin.raw_concentration, threshold);

        let concentration = if status.is_suppressed() {
            0.0
        } else {
            bin.raw_concentration
        };
        let fixed_concentration = if status == BinStatus::ZeroEfficiency {
            flags.push(QualityFlag {
                bin_index: ii,
                mid_radius: bin.mid_radius,
            });
            0.0
        } else {
            bin.raw_concentration
        };

        bins.push(CorrectedBin {
            bin: *bin,
            efficiency,
            status,
            concentration,
            salt_mass: salt_mass(bin.mid_radius, concentration),
            cumulative: 0.0,
            fixed_concentration,
        });
    }

    let suppressed = bins.iter().filter(|bin| bin.status.is_suppressed()).count();
    debug!(
        "sample {}: suppressed {suppressed} of {} bins, {} zero-efficiency flags",
        spectrum.id,
        bins.len(),
        flags.len()
    );

    let mut corrected = CorrectedSpectrum {
        sample_id: spectrum.id.clone(),
        ambient: spectrum.ambient,
        efficiency_threshold: threshold,
        cutoff_radius: None,
        bins,
        flags,
        total_concentration: 0.0,
        total_salt_mass: 0.0,
    };
    corrected.refresh_totals();
    Ok(corrected)
}
