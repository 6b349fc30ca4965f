//! Ranz–Wong collision efficiency of a ribbon of infinite length and finite width.
//!
//! Physical constants and the viscosity and slip relations follow Pruppacher and Klett (1997),
//! equations 10-139 to 10-141.

use std::f64::consts::PI;

use crate::error::Error;
use crate::growth::wet_radius;
use crate::spectrum::{AmbientState, METRES_PER_MICROMETRE};
use crate::Result;

/// Standard pressure, Pa
pub const STANDARD_PRESSURE: f64 = 101_325.;
/// Standard temperature, K
pub const STANDARD_TEMPERATURE: f64 = 273.16;
/// Mean free path of air at standard pressure and temperature, m
pub const STANDARD_MEAN_FREE_PATH: f64 = 6.6e-8;
/// Width of the exposed slide, m
pub const RIBBON_WIDTH: f64 = 6.35e-3;
/// Density of dry NaCl used for the particle inertia, kg m⁻³
pub const SALT_DENSITY: f64 = 2.163e3;
/// Density of water, kg m⁻³
pub const WATER_DENSITY: f64 = 1.0e3;
/// Critical inertial parameter below which nothing reaches the ribbon
pub const CRITICAL_INERTIAL_PARAMETER: f64 = 0.125;

/// Dynamic viscosity of air (Pa s) at `temperature` (K).
///
/// Linear above freezing, with a quadratic correction below.
pub fn dynamic_viscosity(temperature: f64) -> f64 {
    let celsius = temperature - STANDARD_TEMPERATURE;
    if temperature >= STANDARD_TEMPERATURE {
        4.9e-8f64.mul_add(celsius, 1.718e-5)
    } else {
        4.9e-8f64.mul_add(celsius, 1.718e-5) - 1.2e-10 * celsius.powi(2)
    }
}

/// Mean free path of air (m) scaled from standard conditions
pub fn mean_free_path(pressure: f64, temperature: f64) -> f64 {
    STANDARD_MEAN_FREE_PATH * (STANDARD_PRESSURE / pressure) * (temperature / STANDARD_TEMPERATURE)
}

/// Cunningham slip correction for a particle of `radius` (m), Davis (1945) coefficients
pub fn cunningham_factor(radius: f64, pressure: f64, temperature: f64) -> f64 {
    let lambda = mean_free_path(pressure, temperature);
    let alpha = 0.4f64.mul_add((-1.1 * radius / lambda).exp(), 1.257);
    alpha.mul_add(lambda / radius, 1.)
}

/// Density (kg m⁻³) of a solution droplet holding a salt core of `dry_radius` grown to
/// `wet_radius`
fn droplet_density(dry_radius: f64, wet_radius: f64) -> f64 {
    let salt_volume = 4. / 3. * PI * dry_radius.powi(3);
    let droplet_volume = 4. / 3. * PI * wet_radius.powi(3);
    let salt_mass = salt_volume * SALT_DENSITY;
    let water_mass = (droplet_volume - salt_volume) * WATER_DENSITY;
    (salt_mass + water_mass) / droplet_volume
}

/// Inertial parameter psi for a dry particle under `ambient` conditions.
///
/// psi is the ratio of the stopping distance of the wet droplet at the air speed to half the
/// ribbon width.
///
/// # Errors
/// [`Error::NumericDomain`] if the ambient state or radius is outside the model domain.
pub fn inertial_parameter(ambient: &AmbientState, dry_radius: f64) -> Result<f64> {
    ambient.validate()?;
    let wet = wet_radius(dry_radius, ambient.relative_humidity)?;
    let density = droplet_density(dry_radius, wet);
    let slip = cunningham_factor(wet, ambient.pressure, ambient.temperature);
    let viscosity = dynamic_viscosity(ambient.temperature);
    if viscosity <= 0.0 {
        return Err(Error::domain(format!(
            "air viscosity is not positive at {} K",
            ambient.temperature
        )));
    }

    Ok(slip * density * ambient.wind_speed * (2. * wet).powi(2) / (18. * viscosity * RIBBON_WIDTH))
}

/// Closed-form ribbon capture efficiency for an inertial parameter `psi`
fn ribbon_efficiency(psi: f64) -> f64 {
    let q_squared = 0.5 / psi - 1. / (16. * psi.powi(2));
    if psi <= CRITICAL_INERTIAL_PARAMETER || q_squared <= 0.0 {
        return 0.0;
    }
    let q = q_squared.sqrt();
    // Two-argument arctangent keeps the transit time on the right branch for psi < 1/4
    let t = (4. * psi * q).atan2(4. * psi - 1.) / q;
    let root = (1. / (16. * psi.powi(2)) + 0.5 / psi).sqrt();
    let s1 = -0.25 / psi + root;
    let s2 = -0.25 / psi - root;
    (s2 - s1) / (s2 * (s1 * t).exp() - s1 * (s2 * t).exp())
}

/// Collision efficiency in [0, 1] of a dry particle of `dry_radius` (m) carried at the ambient
/// wind speed onto the ribbon.
///
/// # Errors
/// [`Error::NumericDomain`] if the radius is not positive, the ambient state is outside the
/// model domain, or the closed form does not evaluate to a finite value.
pub fn collision_efficiency(ambient: &AmbientState, dry_radius: f64) -> Result<f64> {
    let psi = inertial_parameter(ambient, dry_radius)?;
    let efficiency = ribbon_efficiency(psi);
    if !efficiency.is_finite() {
        return Err(Error::domain(format!(
            "collision efficiency is not finite for psi = {psi}"
        )));
    }
    Ok(efficiency.clamp(0.0, 1.0))
}

/// Dry radius (µm) at which the collision efficiency reaches one half.
///
/// This is the radius the sampler is usually quoted as "cutting off" at. Searched between
/// 0.01 µm and 100 µm; returns `None` if the efficiency never reaches one half in that range.
///
/// # Errors
/// [`Error::NumericDomain`] if the ambient state is outside the model domain.
pub fn half_efficiency_radius(ambient: &AmbientState) -> Result<Option<f64>> {
    const TARGET: f64 = 0.5;
    let mut lo = (0.01 * METRES_PER_MICROMETRE).ln();
    let mut hi = (100. * METRES_PER_MICROMETRE).ln();

    if collision_efficiency(ambient, hi.exp())? < TARGET {
        return Ok(None);
    }
    if collision_efficiency(ambient, lo.exp())? >= TARGET {
        return Ok(Some(lo.exp() / METRES_PER_MICROMETRE));
    }

    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if collision_efficiency(ambient, mid.exp())? < TARGET {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 {
            break;
        }
    }
    Ok(Some(hi.exp() / METRES_PER_MICROMETRE))
}
