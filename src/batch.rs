//! Processing many samples at once.
//!
//! Samples share nothing, so each one is an independent rayon task. Results come back in input
//! order and a rejected sample never stops the rest of the batch.

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::pipeline::{process_with_profile, SampleSummary};
use crate::spectrum::SampleSpectrum;
use crate::synthesis::ReferenceProfile;

/// A sample the pipeline refused, and why
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFailure {
    pub sample_id: String,
    pub reason: String,
}

/// Outcome of a batch run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Summaries of the accepted samples, in input order
    pub summaries: Vec<SampleSummary>,
    /// Rejected samples, in input order
    pub failures: Vec<SampleFailure>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.summaries.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Accepted samples whose lognormal fit failed
    pub fn unfitted(&self) -> usize {
        self.summaries
            .iter()
            .filter(|summary| summary.fit.is_err())
            .count()
    }
}

/// Process every sample in `samples` with `config`
pub fn run_batch(samples: &[SampleSpectrum], config: &Config) -> BatchReport {
    run(samples, config, None)
}

/// Process every sample in `samples`, additionally fitting each with its gaps filled from
/// `profile`
pub fn run_batch_with_profile(
    samples: &[SampleSpectrum],
    config: &Config,
    profile: &ReferenceProfile,
) -> BatchReport {
    run(samples, config, Some(profile))
}

fn run(
    samples: &[SampleSpectrum],
    config: &Config,
    profile: Option<&ReferenceProfile>,
) -> BatchReport {
    info!("processing {} samples", samples.len());

    let outcomes = samples
        .par_iter()
        .map(|sample| {
            process_with_profile(sample, config, profile).map_err(|e| SampleFailure {
                sample_id: sample.id.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Vec<_>>();

    let mut report = BatchReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(summary) => report.summaries.push(summary),
            Err(failure) => {
                warn!("rejected sample {}: {}", failure.sample_id, failure.reason);
                report.failures.push(failure);
            }
        }
    }

    info!(
        "processed {} samples, rejected {}, {} without a lognormal fit",
        report.processed(),
        report.failed(),
        report.unfitted()
    );
    report
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    use super::{run_batch, run_batch_with_profile};
    use crate::config::Config;
    use crate::correction::correct;
    use crate::spectrum::tests::sample;
    use crate::spectrum::SampleSpectrum;
    use crate::synthesis::ReferenceProfile;

    fn random_samples(count: usize, seed: u64) -> Vec<SampleSpectrum> {
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        (0..count)
            .map(|ii| {
                let mut spectrum = sample(15, 0.0);
                spectrum.id = format!("sample-{ii:03}");
                spectrum.ambient.wind_speed = rng.gen_range(2.0..15.0);
                for bin in &mut spectrum.bins {
                    bin.raw_concentration = rng.gen_range(0.0..1e4);
                }
                spectrum
            })
            .collect()
    }

    #[test]
    fn summaries_come_back_in_input_order() {
        let samples = random_samples(24, 40);
        let report = run_batch(&samples, &Config::default());

        assert_eq!(report.processed(), 24);
        assert_eq!(report.failed(), 0);
        for (summary, sample) in report.summaries.iter().zip(&samples) {
            assert_eq!(summary.sample_id, sample.id);
            assert_eq!(summary.ambient, sample.ambient);
        }
    }

    #[test]
    fn failures_are_counted_not_dropped() {
        let mut samples = random_samples(6, 41);
        samples[1].bins[2].raw_concentration = -5.0;
        samples[4].ambient.relative_humidity = 1.2;

        let report = run_batch(&samples, &Config::default());

        assert_eq!(report.processed(), 4);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.failures[0].sample_id, "sample-001");
        assert_eq!(report.failures[1].sample_id, "sample-004");
        assert!(report.failures[1].reason.contains("relative humidity"));
    }

    #[test]
    fn an_empty_batch_is_an_empty_report() {
        let report = run_batch(&[], &Config::default());
        assert_eq!(report.processed(), 0);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.unfitted(), 0);
    }

    #[test]
    fn a_profile_gives_every_summary_a_gap_filled_fit() {
        let samples = random_samples(5, 42);
        let reference = correct(&samples[0], 0.4).unwrap();
        let profile = ReferenceProfile::from_spectra(&[reference]).unwrap();

        let report = run_batch_with_profile(&samples, &Config::default(), &profile);

        assert_eq!(report.processed(), 5);
        assert!(report
            .summaries
            .iter()
            .all(|summary| summary.synthetic_fit.is_some()));
    }
}
