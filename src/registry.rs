//! The unit catalogue.
//!
//! A closed set of recognised unit symbols, the affine conversion each one
//! carries to its SI base, and the SI-prefix multipliers. The catalogue is
//! process-wide immutable data; lookups go through [`lookup`] and
//! [`prefix_factor`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// An affine conversion `x ↦ scale·x + offset`.
///
/// The offset is non-zero only for absolute temperature units; every other
/// conversion is a pure scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineMap {
    pub scale: f64,
    pub offset: f64,
}

impl AffineMap {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset: 0.0,
    };

    pub const fn scaling(scale: f64) -> Self {
        Self { scale, offset: 0.0 }
    }

    /// The map applying `self` first and `other` second.
    pub fn then(self, other: Self) -> Self {
        Self {
            scale: self.scale * other.scale,
            offset: self.offset * other.scale + other.offset,
        }
    }

    pub fn inverse(self) -> Self {
        Self {
            scale: 1.0 / self.scale,
            offset: -self.offset / self.scale,
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        self.scale * x + self.offset
    }

    /// Apply the scale while suppressing the offset. Uncertainties and
    /// temperature differences convert this way.
    pub fn apply_scale(self, x: f64) -> f64 {
        self.scale * x
    }

    /// Drop the offset, keeping the scale.
    pub fn without_offset(self) -> Self {
        Self::scaling(self.scale)
    }
}

/// The dimensional family a unit symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Length,
    Mass,
    Time,
    Temperature,
    Current,
    Volume,
    Force,
    Energy,
    Power,
    Pressure,
    Voltage,
    Frequency,
    Angle,
    Dimensionless,
}

/// One catalogue entry: a symbol, its family, its decomposition into SI base
/// symbols (in the textual unit grammar), and its conversion to that base.
#[derive(Debug, Clone, Copy)]
pub struct UnitDef {
    pub symbol: &'static str,
    pub family: Family,
    /// Decomposition into SI base symbols, e.g. `kg-m/s2` for newton.
    pub si: &'static str,
    pub conversion: AffineMap,
}

impl UnitDef {
    pub fn is_temperature(&self) -> bool {
        self.family == Family::Temperature
    }
}

const fn def(symbol: &'static str, family: Family, si: &'static str, scale: f64) -> UnitDef {
    UnitDef {
        symbol,
        family,
        si,
        conversion: AffineMap::scaling(scale),
    }
}

const fn def_offset(
    symbol: &'static str,
    family: Family,
    si: &'static str,
    scale: f64,
    offset: f64,
) -> UnitDef {
    UnitDef {
        symbol,
        family,
        si,
        conversion: AffineMap { scale, offset },
    }
}

pub const UNITS: &[UnitDef] = &[
    def("1", Family::Dimensionless, "1", 1.0),
    def("m", Family::Length, "m", 1.0),
    def("g", Family::Mass, "kg", 1e-3),
    def("s", Family::Time, "s", 1.0),
    def("min", Family::Time, "s", 60.0),
    def("h", Family::Time, "s", 3600.0),
    def("yr", Family::Time, "s", 31_536_000.0),
    def("K", Family::Temperature, "K", 1.0),
    def_offset("C", Family::Temperature, "K", 1.0, 273.15),
    def_offset(
        "F",
        Family::Temperature,
        "K",
        5.0 / 9.0,
        273.15 - 32.0 * 5.0 / 9.0,
    ),
    def("A", Family::Current, "A", 1.0),
    def("m3", Family::Volume, "m3", 1.0),
    def("L", Family::Volume, "m3", 1e-3),
    def("N", Family::Force, "kg-m/s2", 1.0),
    def("J", Family::Energy, "kg-m2/s2", 1.0),
    def("W", Family::Power, "kg-m2/s3", 1.0),
    def("Pa", Family::Pressure, "kg/m-s2", 1.0),
    def("bar", Family::Pressure, "kg/m-s2", 1e5),
    def("V", Family::Voltage, "kg-m2/s3-A", 1.0),
    def("Hz", Family::Frequency, "Hz", 1.0),
    def("rad", Family::Angle, "rad", 1.0),
    def("°", Family::Angle, "rad", std::f64::consts::PI / 180.0),
];

/// An SI-prefix multiplier attachable to any symbol except `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Prefix {
    Micro,
    Milli,
    Kilo,
    Mega,
}

impl Prefix {
    pub fn factor(self) -> f64 {
        match self {
            Prefix::Micro => 1e-6,
            Prefix::Milli => 1e-3,
            Prefix::Kilo => 1e3,
            Prefix::Mega => 1e6,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Prefix::Micro => 'µ',
            Prefix::Milli => 'm',
            Prefix::Kilo => 'k',
            Prefix::Mega => 'M',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            'µ' => Some(Prefix::Micro),
            'm' => Some(Prefix::Milli),
            'k' => Some(Prefix::Kilo),
            'M' => Some(Prefix::Mega),
            _ => None,
        }
    }
}

pub const PREFIXES: &[Prefix] = &[Prefix::Micro, Prefix::Milli, Prefix::Kilo, Prefix::Mega];

/// Find the catalogue entry for a bare symbol (no prefix, no Δ tag).
pub fn lookup(symbol: &str) -> Option<&'static UnitDef> {
    UNITS.iter().find(|def| def.symbol == symbol)
}

pub fn prefix_factor(c: char) -> Option<f64> {
    Prefix::from_symbol(c).map(Prefix::factor)
}

/// Every character that may appear in a textual unit expression. Anything
/// outside this set is rejected before grammar parsing.
pub static KNOWN_CHARACTERS: LazyLock<HashSet<char>> = LazyLock::new(|| {
    let mut set = HashSet::new();
    for def in UNITS {
        set.extend(def.symbol.chars());
    }
    for prefix in PREFIXES {
        set.insert(prefix.symbol());
    }
    set.extend(['Δ', '-', '/']);
    set.extend('0'..='9');
    set
});

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("bar").unwrap().conversion.scale, 1e5);
        assert_eq!(lookup("g").unwrap().si, "kg");
        assert!(lookup("furlong").is_none());
    }

    #[test]
    fn test_symbols_unique() {
        for (i, a) in UNITS.iter().enumerate() {
            for b in &UNITS[i + 1..] {
                assert_ne!(a.symbol, b.symbol);
            }
        }
    }

    #[test]
    fn test_affine_composition() {
        let celsius = lookup("C").unwrap().conversion;
        let fahrenheit = lookup("F").unwrap().conversion;
        let c_to_f = celsius.then(fahrenheit.inverse());
        assert_relative_eq!(c_to_f.apply(0.0), 32.0, epsilon = 1e-9);
        assert_relative_eq!(c_to_f.apply(100.0), 212.0, epsilon = 1e-9);
    }

    #[test]
    fn test_affine_inverse_roundtrip() {
        let f = lookup("F").unwrap().conversion;
        let x = 68.0;
        assert_relative_eq!(f.inverse().apply(f.apply(x)), x, epsilon = 1e-9);
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(prefix_factor('k'), Some(1e3));
        assert_eq!(prefix_factor('µ'), Some(1e-6));
        assert_eq!(prefix_factor('d'), None);
    }

    #[test]
    fn test_known_characters() {
        assert!(KNOWN_CHARACTERS.contains(&'°'));
        assert!(KNOWN_CHARACTERS.contains(&'/'));
        assert!(!KNOWN_CHARACTERS.contains(&'*'));
    }
}
