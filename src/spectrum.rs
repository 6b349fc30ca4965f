use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Conversion from the micrometre radii used for binning to the metres used by the physics.
pub const METRES_PER_MICROMETRE: f64 = 1e-6;

/// Ambient conditions during a slide exposure, already normalised to SI units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmbientState {
    /// Pressure in Pa
    pub pressure: f64,
    /// Temperature in K
    pub temperature: f64,
    /// Relative humidity as a fraction in [0, 1)
    pub relative_humidity: f64,
    /// Wind (air) speed across the slide in m/s
    pub wind_speed: f64,
}

impl AmbientState {
    /// The same conditions at a different wind speed
    #[must_use]
    pub const fn with_wind_speed(self, wind_speed: f64) -> Self {
        Self { wind_speed, ..self }
    }

    /// Check the state lies inside the domain of the impaction model.
    ///
    /// # Errors
    /// Returns [`Error::NumericDomain`] for non-finite values, non-positive pressure or
    /// temperature, negative wind speed or a humidity outside [0, 1).
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("pressure", self.pressure),
            ("temperature", self.temperature),
            ("relative humidity", self.relative_humidity),
            ("wind speed", self.wind_speed),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(Error::domain(format!("{name} is not finite ({value})")));
        }
        if self.pressure <= 0.0 {
            return Err(Error::domain(format!(
                "pressure must be positive, got {} Pa",
                self.pressure
            )));
        }
        if self.temperature <= 0.0 {
            return Err(Error::domain(format!(
                "temperature must be positive, got {} K",
                self.temperature
            )));
        }
        if !(0.0..1.0).contains(&self.relative_humidity) {
            return Err(Error::domain(format!(
                "relative humidity must lie in [0, 1), got {}",
                self.relative_humidity
            )));
        }
        if self.wind_speed < 0.0 {
            return Err(Error::domain(format!(
                "wind speed must be non-negative, got {} m/s",
                self.wind_speed
            )));
        }
        Ok(())
    }
}

/// One histogram bin of dry radii. Radii in µm, concentration in m⁻³.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeBin {
    pub lower_radius: f64,
    pub mid_radius: f64,
    pub upper_radius: f64,
    pub raw_concentration: f64,
}

impl SizeBin {
    /// Mid radius in metres
    pub fn mid_radius_m(&self) -> f64 {
        self.mid_radius * METRES_PER_MICROMETRE
    }
}

/// The exposure window of a slide
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// A single slide exposure as handed over by the ingestion side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleSpectrum {
    pub id: String,
    pub window: TimeWindow,
    pub ambient: AmbientState,
    pub bins: Vec<SizeBin>,
}

impl SampleSpectrum {
    /// Reject samples that cannot be pushed through the pipeline.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] for malformed bins or time windows, [`Error::NumericDomain`] when
    /// the ambient state is outside the domain of the physics.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid("sample identifier is empty"));
        }
        if self.window.end < self.window.start {
            return Err(Error::invalid(format!(
                "sample {}: exposure ends ({}) before it starts ({})",
                self.id, self.window.end, self.window.start
            )));
        }
        if self.bins.is_empty() {
            return Err(Error::invalid(format!("sample {} has no size bins", self.id)));
        }
        self.ambient.validate()?;

        for (ii, bin) in self.bins.iter().enumerate() {
            let values = [
                bin.lower_radius,
                bin.mid_radius,
                bin.upper_radius,
                bin.raw_concentration,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::invalid(format!(
                    "sample {}: bin {ii} contains a non-finite value",
                    self.id
                )));
            }
            if bin.lower_radius <= 0.0 {
                return Err(Error::invalid(format!(
                    "sample {}: bin {ii} has non-positive lower radius {}",
                    self.id, bin.lower_radius
                )));
            }
            if !(bin.lower_radius <= bin.mid_radius && bin.mid_radius <= bin.upper_radius) {
                return Err(Error::invalid(format!(
                    "sample {}: bin {ii} edges are not ordered ({} <= {} <= {})",
                    self.id, bin.lower_radius, bin.mid_radius, bin.upper_radius
                )));
            }
            if bin.raw_concentration < 0.0 {
                return Err(Error::invalid(format!(
                    "sample {}: bin {ii} has negative concentration {}",
                    self.id, bin.raw_concentration
                )));
            }
        }

        if let Some(ii) = self
            .bins
            .windows(2)
            .position(|pair| pair[1].mid_radius <= pair[0].mid_radius)
        {
            return Err(Error::invalid(format!(
                "sample {}: bins {ii} and {} are not in increasing radius order",
                self.id,
                ii + 1
            )));
        }
        Ok(())
    }
}

/// How a bin's corrected value came about.
///
/// Carried explicitly so a bin that is legitimately empty is never mistaken for one that was
/// thrown away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinStatus {
    /// Efficiency at or above the confidence floor, or nothing was counted
    Measured,
    /// Particles were counted but the efficiency is below the confidence floor
    LowConfidence,
    /// Particles were counted where the model says none can reach the ribbon
    ZeroEfficiency,
    /// Zeroed by the intercomparison cutoff
    BelowCutoff,
    /// Poorly collected bin filled in from a reference profile
    Synthetic,
}

impl BinStatus {
    pub const fn is_suppressed(self) -> bool {
        matches!(self, Self::LowConfidence | Self::ZeroEfficiency)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Measured => "measured",
            Self::LowConfidence => "low_confidence",
            Self::ZeroEfficiency => "zero_efficiency",
            Self::BelowCutoff => "below_cutoff",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Non-fatal diagnostic: counts were recorded in a bin the impaction model cannot collect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityFlag {
    pub bin_index: usize,
    pub mid_radius: f64,
}

/// Per-bin result of the efficiency correction
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectedBin {
    pub bin: SizeBin,
    pub efficiency: f64,
    pub status: BinStatus,
    /// Concentration after suppression (and cutoff, once applied), m⁻³
    pub concentration: f64,
    /// Salt mass concentration after suppression (and cutoff, once applied)
    pub salt_mass: f64,
    /// Tail sum of `concentration` from this bin upward
    pub cumulative: f64,
    /// Raw concentration with the zero-efficiency bins removed
    pub fixed_concentration: f64,
}

/// Corrected spectrum of a single sample.
///
/// Every stage downstream of the correction takes one of these by reference and returns a new
/// one; they are never edited in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectedSpectrum {
    pub sample_id: String,
    pub ambient: AmbientState,
    pub efficiency_threshold: f64,
    /// Cutoff radius in µm, if one has been applied
    pub cutoff_radius: Option<f64>,
    pub bins: Vec<CorrectedBin>,
    pub flags: Vec<QualityFlag>,
    pub total_concentration: f64,
    pub total_salt_mass: f64,
}

impl CorrectedSpectrum {
    pub fn concentrations(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.concentration).collect()
    }

    pub fn efficiencies(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.efficiency).collect()
    }

    pub fn cumulative(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.cumulative).collect()
    }

    /// Recompute tail sums and totals after the per-bin concentrations changed
    pub(crate) fn refresh_totals(&mut self) {
        let concentrations = self.concentrations();
        for (bin, cumulative) in self
            .bins
            .iter_mut()
            .zip(crate::math::tail_sum(&concentrations))
        {
            bin.cumulative = cumulative;
        }
        self.total_concentration = concentrations.iter().sum();
        self.total_salt_mass = self.bins.iter().map(|bin| bin.salt_mass).sum();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;

    use super::{AmbientState, SampleSpectrum, SizeBin, TimeWindow};
    use crate::Error;

    pub(crate) fn ambient() -> AmbientState {
        AmbientState {
            pressure: 99_053.14,
            temperature: 297.55,
            relative_humidity: 0.7492,
            wind_speed: 5.0,
        }
    }

    pub(crate) fn window() -> TimeWindow {
        let day = NaiveDate::from_ymd_opt(2019, 7, 12).unwrap();
        TimeWindow {
            start: day.and_hms_opt(10, 0, 0).unwrap(),
            end: day.and_hms_opt(10, 20, 0).unwrap(),
        }
    }

    /// Bins one micron wide from 0.5 µm to `count` µm, holding `concentration` each
    pub(crate) fn sample(count: usize, concentration: f64) -> SampleSpectrum {
        let bins = (0..count)
            .map(|ii| {
                let lower = 0.5 + ii as f64;
                SizeBin {
                    lower_radius: lower,
                    mid_radius: lower + 0.5,
                    upper_radius: lower + 1.0,
                    raw_concentration: concentration,
                }
            })
            .collect();
        SampleSpectrum {
            id: "20190712a".into(),
            window: window(),
            ambient: ambient(),
            bins,
        }
    }

    #[test]
    fn well_formed_samples_validate() {
        assert!(sample(10, 1000.0).validate().is_ok());
    }

    #[test]
    fn saturated_air_is_outside_the_model_domain() {
        let mut spectrum = sample(4, 1.0);
        spectrum.ambient.relative_humidity = 1.0;
        assert!(matches!(spectrum.validate(), Err(Error::NumericDomain(_))));
    }

    #[test]
    fn unordered_bins_are_rejected() {
        let mut spectrum = sample(4, 1.0);
        spectrum.bins.swap(1, 2);
        assert!(matches!(spectrum.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn negative_concentrations_are_rejected() {
        let mut spectrum = sample(4, 1.0);
        spectrum.bins[3].raw_concentration = -1.0;
        assert!(matches!(spectrum.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn empty_samples_are_rejected() {
        let spectrum = sample(0, 1.0);
        assert!(matches!(spectrum.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn reversed_time_windows_are_rejected() {
        let mut spectrum = sample(3, 1.0);
        std::mem::swap(&mut spectrum.window.start, &mut spectrum.window.end);
        assert!(matches!(spectrum.validate(), Err(Error::InvalidInput(_))));
    }
}
