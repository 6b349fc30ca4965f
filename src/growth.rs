//! Hygroscopic growth of sea-salt particles.
//!
//! Lewis (2008) single-parameter form of Köhler theory for NaCl,
//! $$
//!     \frac{r}{r_{dry}} = a \left[b + \frac{1}{1 - RH + (r_0 / (a r_{dry}))^{3/2}}\right]^{1/3}
//! $$
//! with a Kelvin length $r_0$ for pure water.

use crate::error::Error;
use crate::Result;

/// Growth law prefactor for NaCl
pub const GROWTH_PREFACTOR: f64 = 1.08;
/// Growth law offset for NaCl
pub const GROWTH_OFFSET: f64 = 1.10;
/// Characteristic Kelvin length for pure water, m
pub const KELVIN_LENGTH: f64 = 1.1e-9;

/// Equilibrium wet radius (m) of a dry NaCl particle of `dry_radius` (m) at relative humidity
/// `rh` (fraction).
///
/// The law diverges as `rh` approaches one. Humidities outside [0, 1) are rejected rather than
/// clamped, so a saturated or mis-scaled (percent instead of fraction) humidity never silently
/// produces a radius.
///
/// # Errors
/// [`Error::NumericDomain`] for a non-positive or non-finite radius, or `rh` outside [0, 1).
pub fn wet_radius(dry_radius: f64, rh: f64) -> Result<f64> {
    if !dry_radius.is_finite() || dry_radius <= 0.0 {
        return Err(Error::domain(format!(
            "dry radius must be positive and finite, got {dry_radius} m"
        )));
    }
    if !(0.0..1.0).contains(&rh) {
        return Err(Error::domain(format!(
            "relative humidity must lie in [0, 1), got {rh}"
        )));
    }

    let kelvin = (KELVIN_LENGTH / (GROWTH_PREFACTOR * dry_radius)).powf(1.5);
    let ratio = GROWTH_PREFACTOR * (GROWTH_OFFSET + 1. / (1. - rh + kelvin)).cbrt();
    Ok(dry_radius * ratio)
}
