//! Physical constants as measurement values.
//!
//! Every constant is an exact [`Measurement::constant`], so it carries its
//! unit through arithmetic and rejects in-place mutation.

use crate::measurement::Measurement;

fn exact(value: f64, unit: &str) -> Measurement {
    Measurement::constant(value, unit).expect("constants use catalogue units")
}

/// Standard gravity `g = 9.80665 m/s²`.
pub fn standard_gravity() -> Measurement {
    exact(9.80665, "m/s2")
}

/// Speed of light `c = 299792458 m/s`.
pub fn speed_of_light() -> Measurement {
    exact(299_792_458.0, "m/s")
}

/// Boltzmann constant `k_B = 1.380649e-23 J/K`.
pub fn boltzmann() -> Measurement {
    exact(1.380649e-23, "J/K")
}

/// Planck constant `h = 6.62607015e-34 J·s`.
pub fn planck() -> Measurement {
    exact(6.62607015e-34, "J-s")
}

/// Gravitational constant `G = 6.6743e-11 m³/(kg·s²)`.
pub fn gravitational() -> Measurement {
    exact(6.6743e-11, "m3/kg-s2")
}

/// Standard atmosphere `101325 Pa`.
pub fn standard_atmosphere() -> Measurement {
    exact(101_325.0, "Pa")
}

/// Elementary charge `e = 1.602176634e-19 A·s`.
pub fn elementary_charge() -> Measurement {
    exact(1.602176634e-19, "A-s")
}
