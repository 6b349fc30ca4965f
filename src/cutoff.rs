use crate::error::Error;
use crate::spectrum::{BinStatus, CorrectedSpectrum};
use crate::Result;

/// Shared minimum radius (µm) for comparing totals between samples
pub const DEFAULT_CUTOFF_RADIUS: f64 = 3.9;
/// Minimum radius (µm) applied to the wind sensitivity branches
pub const DEFAULT_SENSITIVITY_CUTOFF_RADIUS: f64 = 4.9;

/// Whether a bin with lower edge `lower_radius` survives a cutoff at `cutoff_radius`
pub fn retained(lower_radius: f64, cutoff_radius: f64) -> bool {
    lower_radius >= cutoff_radius
}

/// Zero every bin of `corrected` whose lower edge lies below `cutoff_radius` (µm).
///
/// Works on the efficiency-corrected values, never the raw counts. Bins at or above the cutoff
/// are returned untouched, and the tail sums and totals are recomputed. A bin that was already
/// suppressed keeps its suppression status.
///
/// # Errors
/// [`Error::InvalidInput`] if the cutoff is negative or not finite.
pub fn truncate(corrected: &CorrectedSpectrum, cutoff_radius: f64) -> Result<CorrectedSpectrum> {
    if !cutoff_radius.is_finite() || cutoff_radius < 0.0 {
        return Err(Error::invalid(format!(
            "cutoff radius must be a non-negative number of microns, got {cutoff_radius}"
        )));
    }

    let mut truncated = corrected.clone();
    for bin in truncated
        .bins
        .iter_mut()
        .filter(|bin| !retained(bin.bin.lower_radius, cutoff_radius))
    {
        bin.concentration = 0.0;
        bin.salt_mass = 0.0;
        if bin.status == BinStatus::Measured {
            bin.status = BinStatus::BelowCutoff;
        }
    }
    truncated.cutoff_radius = Some(cutoff_radius);
    truncated.refresh_totals();
    Ok(truncated)
}

/// Total of `concentrations` over the bins whose lower edge survives `cutoff_radius`
pub fn total_above(lower_radii: &[f64], concentrations: &[f64], cutoff_radius: f64) -> f64 {
    lower_radii
        .iter()
        .zip(concentrations)
        .filter(|(&lower, _)| retained(lower, cutoff_radius))
        .map(|(_, concentration)| concentration)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{total_above, truncate, DEFAULT_CUTOFF_RADIUS};
    use crate::correction::{correct, DEFAULT_EFFICIENCY_THRESHOLD};
    use crate::spectrum::tests::sample;
    use crate::spectrum::BinStatus;
    use crate::Error;

    #[test]
    fn bins_below_the_cutoff_are_zeroed_and_the_rest_untouched() {
        let corrected = correct(&sample(20, 1000.0), DEFAULT_EFFICIENCY_THRESHOLD).unwrap();
        let truncated = truncate(&corrected, DEFAULT_CUTOFF_RADIUS).unwrap();

        for (before, after) in corrected.bins.iter().zip(&truncated.bins) {
            if before.bin.lower_radius < DEFAULT_CUTOFF_RADIUS {
                assert_eq!(after.concentration, 0.0);
                assert_eq!(after.salt_mass, 0.0);
                assert_ne!(after.status, BinStatus::Measured);
            } else {
                assert_eq!(after.concentration, before.concentration);
                assert_eq!(after.salt_mass, before.salt_mass);
                assert_eq!(after.status, before.status);
            }
        }
        assert_eq!(truncated.cutoff_radius, Some(DEFAULT_CUTOFF_RADIUS));
    }

    #[test]
    fn totals_and_tail_sums_are_recomputed() {
        let corrected = correct(&sample(20, 1000.0), DEFAULT_EFFICIENCY_THRESHOLD).unwrap();
        let truncated = truncate(&corrected, DEFAULT_CUTOFF_RADIUS).unwrap();

        // Lower edges run 0.5, 1.5, ... so bins from 4.5 µm up survive
        approx::assert_relative_eq!(truncated.total_concentration, 16. * 1000.);
        approx::assert_relative_eq!(truncated.bins[0].cumulative, truncated.total_concentration);
        approx::assert_relative_eq!(
            truncated.total_salt_mass,
            truncated.bins.iter().map(|bin| bin.salt_mass).sum::<f64>()
        );
        assert!(truncated.total_concentration <= corrected.total_concentration);
    }

    #[test]
    fn suppression_status_survives_truncation() {
        let corrected = correct(&sample(5, 1000.0), DEFAULT_EFFICIENCY_THRESHOLD).unwrap();
        let truncated = truncate(&corrected, 100.0).unwrap();
        assert_eq!(truncated.bins[0].status, BinStatus::ZeroEfficiency);
        assert_eq!(truncated.bins[4].status, BinStatus::BelowCutoff);
        assert_eq!(truncated.total_concentration, 0.0);
    }

    #[test]
    fn the_cutoff_edge_is_inclusive() {
        assert!(approx::relative_eq!(
            total_above(&[1.0, 2.0, 3.0], &[5.0, 7.0, 11.0], 2.0),
            18.0
        ));
    }

    #[test]
    fn negative_cutoffs_are_rejected() {
        let corrected = correct(&sample(3, 1.0), DEFAULT_EFFICIENCY_THRESHOLD).unwrap();
        assert!(matches!(
            truncate(&corrected, -1.0),
            Err(Error::InvalidInput(_))
        ));
    }
}
