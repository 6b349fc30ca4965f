use log::{debug, warn};

use crate::config::Config;
use crate::correction::correct;
use crate::cutoff::truncate;
use crate::efficiency::half_efficiency_radius;
use crate::error::FitFailure;
use crate::lognormal::{fit, LognormalFit};
use crate::sensitivity::{sensitivity, SensitivityResult};
use crate::spectrum::{AmbientState, CorrectedSpectrum, SampleSpectrum, TimeWindow};
use crate::synthesis::{fit_synthetic, synthesize, ReferenceProfile};
use crate::Result;

/// Everything derived from a single sample
#[derive(Clone, Debug, PartialEq)]
pub struct SampleSummary {
    pub sample_id: String,
    pub window: TimeWindow,
    pub ambient: AmbientState,
    /// Dry radius (µm) collected at 50% efficiency, if the curve reaches it
    pub half_efficiency_radius: Option<f64>,
    /// Efficiency corrected spectrum before the cutoff
    pub corrected: CorrectedSpectrum,
    /// Corrected spectrum after the intercomparison cutoff
    pub truncated: CorrectedSpectrum,
    pub sensitivity: SensitivityResult,
    /// Lognormal fit of the truncated spectrum. A failed fit does not reject the sample.
    pub fit: std::result::Result<LognormalFit, FitFailure>,
    /// Fit of the spectrum with its gaps filled from a reference profile, when one was given
    pub synthetic_fit: Option<std::result::Result<LognormalFit, FitFailure>>,
}

/// Run a single sample through correction, cutoff, wind sensitivity and fitting.
///
/// # Errors
/// [`crate::Error::InvalidInput`] or [`crate::Error::NumericDomain`] if the sample or the
/// configuration is rejected. Fit failures are recorded in the summary instead.
pub fn process(sample: &SampleSpectrum, config: &Config) -> Result<SampleSummary> {
    process_with_profile(sample, config, None)
}

/// As [`process`], additionally fitting the sample with its poorly collected bins filled from
/// `profile`.
///
/// # Errors
/// As for [`process`], and [`crate::Error::InvalidInput`] if the profile does not share the
/// sample's binning.
pub fn process_with_profile(
    sample: &SampleSpectrum,
    config: &Config,
    profile: Option<&ReferenceProfile>,
) -> Result<SampleSummary> {
    config.validate()?;
    sample.validate()?;

    let corrected = correct(sample, config.efficiency_threshold)?;
    let truncated = truncate(&corrected, config.cutoff_radius)?;
    let sensitivity = sensitivity(
        &corrected,
        config.fractional_change,
        config.sensitivity_cutoff_radius,
    )?;

    let fit = fit(&truncated, &config.fit);
    if let Err(failure) = &fit {
        warn!("sample {}: {failure}", sample.id);
    }

    let synthetic_fit = match profile {
        Some(profile) => {
            let synthetic = synthesize(&corrected, profile, config.efficiency_threshold)?;
            let fit = fit_synthetic(&corrected, &synthetic, &config.synthetic_fit);
            if let Err(failure) = &fit {
                warn!("sample {} (gap filled): {failure}", sample.id);
            }
            Some(fit)
        }
        None => None,
    };

    let half_efficiency_radius = half_efficiency_radius(&sample.ambient)?;
    debug!(
        "sample {}: total {:.4e} m^-3, {:.4e} m^-3 above {} µm",
        sample.id,
        corrected.total_concentration,
        truncated.total_concentration,
        config.cutoff_radius
    );

    Ok(SampleSummary {
        sample_id: sample.id.clone(),
        window: sample.window,
        ambient: sample.ambient,
        half_efficiency_radius,
        corrected,
        truncated,
        sensitivity,
        fit,
        synthetic_fit,
    })
}
