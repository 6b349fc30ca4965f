use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use itertools::Itertools;
use serde::Serialize;

use crate::batch::SampleFailure;
use crate::error::FitFailure;
use crate::lognormal::LognormalFit;
use crate::pipeline::SampleSummary;
use crate::spectrum::{CorrectedBin, CorrectedSpectrum, SampleSpectrum};
use crate::Result;

/// Load a JSON array of samples
///
/// # Errors
/// Returns an error if the file cannot be opened or does not hold an array of samples.
pub fn read_samples(path: &Path) -> Result<Vec<SampleSpectrum>> {
    let file = File::open(path)?;
    let samples = serde_json::from_reader(BufReader::new(file))?;
    Ok(samples)
}

fn joined<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values.into_iter().map(|v| v.to_string()).join(";")
}

fn per_bin(spectrum: &CorrectedSpectrum, value: impl Fn(&CorrectedBin) -> f64) -> String {
    joined(spectrum.bins.iter().map(value))
}

/// Fit columns, all empty when the fit failed
#[derive(Default)]
struct FitColumns {
    area: Option<f64>,
    mu: Option<f64>,
    sigma: Option<f64>,
    geometric_mean: Option<f64>,
    geometric_std_dev: Option<f64>,
    reduced_chi_square: Option<f64>,
    p_value: Option<f64>,
    dof: Option<usize>,
    failure: Option<String>,
}

impl From<&std::result::Result<LognormalFit, FitFailure>> for FitColumns {
    fn from(fit: &std::result::Result<LognormalFit, FitFailure>) -> Self {
        match fit {
            Ok(fit) => Self {
                area: Some(fit.area),
                mu: Some(fit.mu),
                sigma: Some(fit.sigma),
                geometric_mean: Some(fit.geometric_mean),
                geometric_std_dev: Some(fit.geometric_std_dev),
                reduced_chi_square: Some(fit.reduced_chi_square),
                p_value: Some(fit.p_value),
                dof: Some(fit.dof),
                failure: None,
            },
            Err(failure) => Self {
                failure: Some(failure.to_string()),
                ..Self::default()
            },
        }
    }
}

/// One output line per sample. Per-bin arrays are `;`-joined.
#[derive(Serialize)]
struct SummaryRow {
    sample_id: String,
    start: String,
    end: String,
    pressure: f64,
    temperature: f64,
    relative_humidity: f64,
    wind_speed: f64,
    half_efficiency_radius: Option<f64>,
    bin_lower: String,
    bin_middle: String,
    bin_upper: String,
    raw_concentration: String,
    efficiency: String,
    bin_status: String,
    concentration: String,
    salt_mass: String,
    cumulative: String,
    fixed_concentration: String,
    flagged_bins: String,
    total_concentration: f64,
    total_salt_mass: f64,
    cutoff_radius: Option<f64>,
    cutoff_concentration: String,
    cutoff_salt_mass: String,
    cutoff_total_concentration: f64,
    cutoff_total_salt_mass: f64,
    fractional_change: f64,
    sensitivity_cutoff_radius: f64,
    high_wind_speed: f64,
    high_efficiency: String,
    high_concentration: String,
    high_total_concentration: f64,
    high_cutoff_total_concentration: f64,
    low_wind_speed: f64,
    low_efficiency: String,
    low_concentration: String,
    low_total_concentration: f64,
    low_cutoff_total_concentration: f64,
    fit_area: Option<f64>,
    fit_mu: Option<f64>,
    fit_sigma: Option<f64>,
    fit_geometric_mean: Option<f64>,
    fit_geometric_std_dev: Option<f64>,
    fit_reduced_chi_square: Option<f64>,
    fit_p_value: Option<f64>,
    fit_dof: Option<usize>,
    fit_failure: Option<String>,
    synthetic_area: Option<f64>,
    synthetic_mu: Option<f64>,
    synthetic_sigma: Option<f64>,
    synthetic_failure: Option<String>,
}

impl From<&SampleSummary> for SummaryRow {
    fn from(summary: &SampleSummary) -> Self {
        let corrected = &summary.corrected;
        let truncated = &summary.truncated;
        let sensitivity = &summary.sensitivity;
        let fit = FitColumns::from(&summary.fit);
        let synthetic = summary
            .synthetic_fit
            .as_ref()
            .map(FitColumns::from)
            .unwrap_or_default();

        Self {
            sample_id: summary.sample_id.clone(),
            start: summary.window.start.to_string(),
            end: summary.window.end.to_string(),
            pressure: summary.ambient.pressure,
            temperature: summary.ambient.temperature,
            relative_humidity: summary.ambient.relative_humidity,
            wind_speed: summary.ambient.wind_speed,
            half_efficiency_radius: summary.half_efficiency_radius,
            bin_lower: per_bin(corrected, |bin| bin.bin.lower_radius),
            bin_middle: per_bin(corrected, |bin| bin.bin.mid_radius),
            bin_upper: per_bin(corrected, |bin| bin.bin.upper_radius),
            raw_concentration: per_bin(corrected, |bin| bin.bin.raw_concentration),
            efficiency: per_bin(corrected, |bin| bin.efficiency),
            bin_status: joined(corrected.bins.iter().map(|bin| bin.status.label())),
            concentration: per_bin(corrected, |bin| bin.concentration),
            salt_mass: per_bin(corrected, |bin| bin.salt_mass),
            cumulative: per_bin(corrected, |bin| bin.cumulative),
            fixed_concentration: per_bin(corrected, |bin| bin.fixed_concentration),
            flagged_bins: joined(corrected.flags.iter().map(|flag| flag.bin_index)),
            total_concentration: corrected.total_concentration,
            total_salt_mass: corrected.total_salt_mass,
            cutoff_radius: truncated.cutoff_radius,
            cutoff_concentration: per_bin(truncated, |bin| bin.concentration),
            cutoff_salt_mass: per_bin(truncated, |bin| bin.salt_mass),
            cutoff_total_concentration: truncated.total_concentration,
            cutoff_total_salt_mass: truncated.total_salt_mass,
            fractional_change: sensitivity.fractional_change,
            sensitivity_cutoff_radius: sensitivity.cutoff_radius,
            high_wind_speed: sensitivity.high.wind_speed,
            high_efficiency: joined(&sensitivity.high.efficiency),
            high_concentration: joined(&sensitivity.high.concentration),
            high_total_concentration: sensitivity.high.total_concentration,
            high_cutoff_total_concentration: sensitivity.high.cutoff_total_concentration,
            low_wind_speed: sensitivity.low.wind_speed,
            low_efficiency: joined(&sensitivity.low.efficiency),
            low_concentration: joined(&sensitivity.low.concentration),
            low_total_concentration: sensitivity.low.total_concentration,
            low_cutoff_total_concentration: sensitivity.low.cutoff_total_concentration,
            fit_area: fit.area,
            fit_mu: fit.mu,
            fit_sigma: fit.sigma,
            fit_geometric_mean: fit.geometric_mean,
            fit_geometric_std_dev: fit.geometric_std_dev,
            fit_reduced_chi_square: fit.reduced_chi_square,
            fit_p_value: fit.p_value,
            fit_dof: fit.dof,
            fit_failure: fit.failure,
            synthetic_area: synthetic.area,
            synthetic_mu: synthetic.mu,
            synthetic_sigma: synthetic.sigma,
            synthetic_failure: synthetic.failure,
        }
    }
}

/// Write one CSV row per summary to `path`
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_summaries(path: &Path, summaries: &[SampleSummary]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for summary in summaries {
        wtr.serialize(SummaryRow::from(summary))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the rejected samples and their reasons to `path`
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_failures(path: &Path, failures: &[SampleFailure]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for failure in failures {
        wtr.serialize(failure)?;
    }
    wtr.flush()?;
    Ok(())
}
