use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correction::DEFAULT_EFFICIENCY_THRESHOLD;
use crate::cutoff::{DEFAULT_CUTOFF_RADIUS, DEFAULT_SENSITIVITY_CUTOFF_RADIUS};
use crate::error::Error;
use crate::lognormal::FitConfig;
use crate::sensitivity::DEFAULT_FRACTIONAL_CHANGE;
use crate::Result;

/// Settings for a processing run, read from a TOML file.
///
/// Every field has a default, so a file only needs to name what it changes:
///
/// ```toml
/// cutoff_radius = 4.5
///
/// [fit]
/// max_iterations = 10000
/// trace = true
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Efficiency below which counted bins are suppressed
    pub efficiency_threshold: f64,
    /// Intercomparison cutoff on the lower bin edge, µm
    pub cutoff_radius: f64,
    /// Cutoff applied to the totals of the wind sensitivity branches, µm
    pub sensitivity_cutoff_radius: f64,
    /// Fraction by which the wind speed is perturbed up and down
    pub fractional_change: f64,
    pub fit: FitConfig,
    pub synthetic_fit: FitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            efficiency_threshold: DEFAULT_EFFICIENCY_THRESHOLD,
            cutoff_radius: DEFAULT_CUTOFF_RADIUS,
            sensitivity_cutoff_radius: DEFAULT_SENSITIVITY_CUTOFF_RADIUS,
            fractional_change: DEFAULT_FRACTIONAL_CHANGE,
            fit: FitConfig::measured(),
            synthetic_fit: FitConfig::synthetic(),
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Read and check a configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML for this structure or
    /// holds values outside their valid range.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    /// # Errors
    /// [`Error::InvalidInput`] naming the first setting out of range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.efficiency_threshold) {
            return Err(Error::invalid(format!(
                "efficiency threshold must lie in [0, 1], got {}",
                self.efficiency_threshold
            )));
        }
        for (name, radius) in [
            ("cutoff radius", self.cutoff_radius),
            ("sensitivity cutoff radius", self.sensitivity_cutoff_radius),
        ] {
            if !radius.is_finite() || radius < 0.0 {
                return Err(Error::invalid(format!(
                    "{name} must be a non-negative number of microns, got {radius}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.fractional_change) {
            return Err(Error::invalid(format!(
                "fractional wind change must lie in [0, 1], got {}",
                self.fractional_change
            )));
        }
        self.fit
            .check()
            .map_err(|reason| Error::invalid(format!("[fit] {reason}")))?;
        self.synthetic_fit
            .check()
            .map_err(|reason| Error::invalid(format!("[synthetic_fit] {reason}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::Config;
    use crate::lognormal::{Bound, FitConfig, FitMode};
    use crate::Error;

    #[test]
    fn an_empty_file_gives_the_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.efficiency_threshold, 0.4);
        assert_eq!(config.cutoff_radius, 3.9);
        assert_eq!(config.sensitivity_cutoff_radius, 4.9);
        assert_eq!(config.fractional_change, 0.35);
        assert_eq!(config.fit.mode, FitMode::Measured);
        assert_eq!(config.synthetic_fit.mode, FitMode::Synthetic);
    }

    #[test]
    fn partial_overrides_keep_the_other_defaults() {
        let config: Config = r#"
            cutoff_radius = 4.5

            [fit]
            max_iterations = 10000
            area_bound = { lower = 1.0 }
            mu_bound = "free"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.cutoff_radius, 4.5);
        assert_eq!(config.efficiency_threshold, 0.4);
        assert_eq!(config.fit.max_iterations, 10_000);
        assert_eq!(config.fit.area_bound, Bound::Lower(1.0));
        assert_eq!(config.fit.mu_bound, Bound::Free);
        assert_eq!(config.fit.sigma_bound, FitConfig::measured().sigma_bound);
        assert_eq!(config.synthetic_fit, FitConfig::synthetic());
    }

    #[test]
    fn defaults_survive_a_round_trip_through_a_file() {
        let tmp_dir = TempDir::new("config_round_trip").unwrap();
        let path = tmp_dir.path().join("ssa.toml");
        std::fs::write(&path, toml::to_string(&Config::default()).unwrap()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        assert!(matches!(
            "efficiency_threshold = 1.5".parse::<Config>(),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            "sensitivity_cutoff_radius = -1.0".parse::<Config>(),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            "[fit]\nsigma_bound = { range = [2.0, 1.0] }".parse::<Config>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn malformed_files_are_configuration_errors() {
        assert!(matches!(
            "cutoff_radius = \"large\"".parse::<Config>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let tmp_dir = TempDir::new("config_missing").unwrap();
        assert!(matches!(
            Config::from_file(&tmp_dir.path().join("absent.toml")),
            Err(Error::Io(_))
        ));
    }
}
