//! Canonical unit expressions and their algebra.
//!
//! A [`Unit`] is a pair of atom multisets (numerator and denominator), each
//! atom a base symbol with an optional prefix and an integer exponent.
//! Multiplication and division cancel matching atoms, powers and roots act
//! on the exponents, and [`Unit::converter`] produces the affine map between
//! two units that share an SI base.
//!
//! Absolute temperatures are special: a bare `K`, `C` or `F` converts with
//! an offset, while the same symbol inside a composite expression (or the
//! result of subtracting two absolute temperatures) is Δ-tagged and converts
//! by scale alone.

use crate::registry::{self, AffineMap, Family, Prefix, KNOWN_CHARACTERS};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Div, Mul};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Atom {
    pub symbol: &'static str,
    pub prefix: Option<Prefix>,
    pub delta: bool,
    pub exp: i32,
}

impl Atom {
    fn key(&self) -> (&'static str, Option<Prefix>, bool) {
        (self.symbol, self.prefix, self.delta)
    }

    fn def(&self) -> &'static registry::UnitDef {
        registry::lookup(self.symbol).expect("atoms are built from catalogue symbols")
    }

    fn is_temperature(&self) -> bool {
        self.def().is_temperature()
    }
}

impl Atom {
    /// Render with or without the Δ marker. Inside a composite expression
    /// the marker is implied by the auto-Δ rule and re-established on
    /// parsing, so only single-atom units spell it out.
    fn render(&self, show_delta: bool) -> String {
        let mut out = String::new();
        if let Some(prefix) = self.prefix {
            out.push(prefix.symbol());
        }
        if self.delta && show_delta {
            out.push('Δ');
        }
        out.push_str(self.symbol);
        if self.exp != 1 {
            out.push_str(&self.exp.to_string());
        }
        out
    }

    fn latex(&self, show_delta: bool) -> String {
        let mut out = String::new();
        if let Some(prefix) = self.prefix {
            out.push(prefix.symbol());
        }
        if self.delta && show_delta {
            out.push_str("\\Delta ");
        }
        out.push_str(self.symbol);
        if self.exp != 1 {
            out.push_str(&format!("^{{{}}}", self.exp));
        }
        out
    }
}

/// A canonical unit expression.
///
/// Equality is modulo commutativity: atoms are kept sorted, no atom appears
/// in both numerator and denominator, and no exponent is zero. The empty
/// expression is the dimensionless unit, written `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Unit {
    num: Vec<Atom>,
    den: Vec<Atom>,
}

/// How two units combine under addition or subtraction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Combine {
    /// The canonical forms agree; operate in place.
    Identical { result: Unit },
    /// Convert both operands to `result` first.
    Convert { result: Unit },
}

impl Unit {
    pub fn dimensionless() -> Self {
        Self::default()
    }

    pub(crate) fn kelvin() -> Self {
        Self {
            num: vec![Atom {
                symbol: "K",
                prefix: None,
                delta: false,
                exp: 1,
            }],
            den: Vec::new(),
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.num.is_empty() && self.den.is_empty()
    }

    fn atom_count(&self) -> usize {
        self.num.len() + self.den.len()
    }

    /// A single absolute-temperature atom with exponent one. Only these
    /// carry an offset when converted.
    fn is_bare_absolute_temperature(&self) -> bool {
        self.den.is_empty()
            && self.num.len() == 1
            && self.num[0].exp == 1
            && !self.num[0].delta
            && self.num[0].is_temperature()
    }

    /// Rewrite every absolute-temperature atom as its Δ-tagged counterpart.
    pub(crate) fn delta_tagged(&self) -> Self {
        let tag = |atoms: &[Atom]| {
            atoms
                .iter()
                .map(|&a| Atom {
                    delta: a.delta || a.is_temperature(),
                    ..a
                })
                .collect()
        };
        Self {
            num: tag(&self.num),
            den: tag(&self.den),
        }
    }

    fn apply_auto_delta(&mut self) {
        if self.atom_count() > 1 {
            *self = self.delta_tagged();
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Parse a textual unit expression.
    ///
    /// The grammar: atoms separated by `-`, at most one `/` separating
    /// numerator from denominator, each atom an optional prefix, a base
    /// symbol and an optional trailing integer exponent. Spaces are
    /// ignored; the empty string and `1` denote the dimensionless unit.
    pub fn parse(text: &str) -> Result<Self> {
        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() || cleaned == "1" {
            return Ok(Self::dimensionless());
        }
        for c in cleaned.chars() {
            if !KNOWN_CHARACTERS.contains(&c) {
                return Err(Error::UnitParse {
                    unit: text.to_string(),
                    reason: format!("the character '{c}' is not part of the unit system"),
                });
            }
        }
        let parts: Vec<&str> = cleaned.split('/').collect();
        if parts.len() > 2 {
            return Err(Error::UnitParse {
                unit: text.to_string(),
                reason: "a unit can contain at most one '/'".to_string(),
            });
        }
        let num = Self::parse_side(parts[0], text)?;
        let den = if parts.len() == 2 {
            Self::parse_side(parts[1], text)?
        } else {
            Vec::new()
        };
        let (num, den) = canonicalise(num, den);
        let mut unit = Self { num, den };
        unit.apply_auto_delta();
        Ok(unit)
    }

    fn parse_side(side: &str, whole: &str) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        for token in side.split('-') {
            if let Some(atom) = Self::parse_atom(token, whole)? {
                atoms.push(atom);
            }
        }
        Ok(atoms)
    }

    fn parse_atom(token: &str, whole: &str) -> Result<Option<Atom>> {
        if token.is_empty() || token == "1" {
            return Ok(None);
        }

        // Split off the exponent. All digits must form one run at the end.
        let chars: Vec<char> = token.chars().collect();
        let digit_positions: Vec<usize> = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| i)
            .collect();
        let exp = if digit_positions.is_empty() {
            1
        } else {
            let first = digit_positions[0];
            let contiguous = digit_positions
                .iter()
                .enumerate()
                .all(|(k, &p)| p == first + k);
            if !contiguous || *digit_positions.last().unwrap() != chars.len() - 1 {
                return Err(Error::UnitParse {
                    unit: whole.to_string(),
                    reason: format!("the digits in '{token}' must be grouped at its end"),
                });
            }
            chars[first..]
                .iter()
                .collect::<String>()
                .parse::<i32>()
                .expect("a digit run is a valid integer")
        };
        let symbol_part: String = chars
            .iter()
            .take(chars.len() - digit_positions.len())
            .collect();

        if symbol_part.is_empty() {
            if exp == 1 {
                return Ok(None);
            }
            return Err(Error::UnitParse {
                unit: whole.to_string(),
                reason: format!("'{token}' contains no unit symbol"),
            });
        }
        if exp == 0 {
            return Ok(None);
        }

        let (prefix, rest) = Self::resolve_symbol(&symbol_part, whole)?;
        let (delta, base) = match rest.strip_prefix('Δ') {
            Some(tail) => (true, tail),
            None => (false, rest.as_str()),
        };
        let def = registry::lookup(base).ok_or_else(|| Error::UnknownUnitSymbol(symbol_part.clone()))?;
        if delta && def.family != Family::Temperature {
            return Err(Error::UnitParse {
                unit: whole.to_string(),
                reason: format!("'Δ' applies only to temperature units, not '{base}'"),
            });
        }
        Ok(Some(Atom {
            symbol: def.symbol,
            prefix,
            delta,
            exp,
        }))
    }

    /// Resolve a symbol string into an optional prefix and the remainder.
    /// A full-symbol match wins over a prefix interpretation, so `min` is
    /// minutes rather than milli-inches.
    fn resolve_symbol(s: &str, whole: &str) -> Result<(Option<Prefix>, String)> {
        let bare = s.strip_prefix('Δ').unwrap_or(s);
        if registry::lookup(bare).is_some() {
            return Ok((None, s.to_string()));
        }
        let mut chars = s.chars();
        let first = chars.next().expect("symbol is non-empty");
        let rest: String = chars.collect();
        let prefix = Prefix::from_symbol(first).ok_or_else(|| Error::UnknownPrefix(first.to_string()))?;
        if rest.is_empty() || rest == "1" {
            return Err(Error::UnitParse {
                unit: whole.to_string(),
                reason: "the unit '1' cannot carry a prefix".to_string(),
            });
        }
        Ok((Some(prefix), rest))
    }

    // ------------------------------------------------------------------
    // Algebra
    // ------------------------------------------------------------------

    fn mul_units(a: &Unit, b: &Unit) -> Unit {
        let num = a.num.iter().chain(&b.num).copied().collect();
        let den = a.den.iter().chain(&b.den).copied().collect();
        let (num, den) = canonicalise(num, den);
        let mut unit = Unit { num, den };
        unit.apply_auto_delta();
        unit
    }

    fn reciprocal(&self) -> Unit {
        Unit {
            num: self.den.clone(),
            den: self.num.clone(),
        }
    }

    /// Raise to a non-negative integer power.
    pub fn powi(&self, n: u32) -> Unit {
        if n == 0 {
            return Unit::dimensionless();
        }
        let scale = |atoms: &[Atom]| {
            atoms
                .iter()
                .map(|&a| Atom {
                    exp: a.exp * n as i32,
                    ..a
                })
                .collect()
        };
        Unit {
            num: scale(&self.num),
            den: scale(&self.den),
        }
    }

    /// The `k`-th root. Succeeds only when every exponent is divisible by
    /// `k`.
    pub fn root(&self, k: u32) -> Result<Unit> {
        self.pow_f(1.0 / k as f64)
    }

    /// Raise to an arbitrary real power. The result must have integer
    /// exponents; atoms whose exponent turns negative move across the
    /// fraction bar.
    pub(crate) fn pow_f(&self, power: f64) -> Result<Unit> {
        if power == 0.0 {
            return Ok(Unit::dimensionless());
        }
        if self.is_dimensionless() {
            return Ok(Unit::dimensionless());
        }
        let mut num = Vec::new();
        let mut den = Vec::new();
        let atoms = self
            .num
            .iter()
            .map(|a| (a, true))
            .chain(self.den.iter().map(|a| (a, false)));
        for (atom, numerator) in atoms {
            let exact = atom.exp as f64 * power;
            let rounded = exact.round();
            if (exact - rounded).abs() > 1e-9 * exact.abs().max(1.0) {
                return Err(Error::NonIntegerPowerOfUnit {
                    unit: self.to_string(),
                    power,
                });
            }
            let exp = rounded as i32;
            if exp == 0 {
                continue;
            }
            let target = if (exp > 0) == numerator {
                &mut num
            } else {
                &mut den
            };
            target.push(Atom {
                exp: exp.abs(),
                ..*atom
            });
        }
        let (num, den) = canonicalise(num, den);
        Ok(Unit { num, den })
    }

    /// Reduce to SI base symbols: expand every named unit, drop prefixes,
    /// collect exponents and cancel. Δ tags survive the reduction.
    pub fn si_base(&self) -> Unit {
        let mut num = Vec::new();
        let mut den = Vec::new();
        for (atoms, sign) in [(&self.num, 1), (&self.den, -1)] {
            for atom in atoms.iter() {
                let expansion = Unit::parse(atom.def().si).expect("catalogue SI strings parse");
                for (exp_atoms, exp_sign) in [(&expansion.num, 1), (&expansion.den, -1)] {
                    for base in exp_atoms.iter() {
                        let target = if sign * exp_sign > 0 { &mut num } else { &mut den };
                        target.push(Atom {
                            delta: base.delta || (atom.delta && base.is_temperature()),
                            exp: base.exp * atom.exp,
                            ..*base
                        });
                    }
                }
            }
        }
        let (num, den) = canonicalise(num, den);
        Unit { num, den }
    }

    /// Whether `self + other` is dimensionally sound, and how.
    pub(crate) fn addable(&self, other: &Unit) -> Option<Combine> {
        if self == other {
            return Some(Combine::Identical {
                result: self.clone(),
            });
        }
        let a = self.si_base();
        let b = other.si_base();
        if a == b {
            return Some(Combine::Convert { result: a });
        }
        if Self::mixes_absolute_and_delta(&a, &b) {
            return Some(Combine::Convert {
                result: Unit::kelvin(),
            });
        }
        None
    }

    /// Whether `self − other` is dimensionally sound. Subtracting two equal
    /// absolute temperatures yields the Δ-tagged difference unit.
    pub(crate) fn subtractable(&self, other: &Unit) -> Option<Combine> {
        if self == other {
            let result = if self.is_bare_absolute_temperature() {
                self.delta_tagged()
            } else {
                self.clone()
            };
            return Some(Combine::Identical { result });
        }
        let a = self.si_base();
        let b = other.si_base();
        if a == b {
            return Some(Combine::Convert { result: a });
        }
        if Self::mixes_absolute_and_delta(&a, &b) {
            return Some(Combine::Convert {
                result: Unit::kelvin(),
            });
        }
        None
    }

    fn mixes_absolute_and_delta(a: &Unit, b: &Unit) -> bool {
        let kelvin = Unit::kelvin();
        let delta_kelvin = kelvin.delta_tagged();
        (*a == kelvin && *b == delta_kelvin) || (*a == delta_kelvin && *b == kelvin)
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    /// The affine map converting values in `self` to values in `to`.
    /// Requires identical SI bases.
    pub fn converter(&self, to: &Unit) -> Result<AffineMap> {
        if self.si_base() != to.si_base() {
            return Err(Error::IncompatibleUnits {
                op: "convert",
                expected: self.to_string(),
                found: to.to_string(),
            });
        }
        Ok(self.to_si_map().then(to.to_si_map().inverse()))
    }

    /// The LaTeX form of the canonical expression, a fraction when a
    /// denominator is present.
    pub fn to_latex(&self) -> String {
        if self.is_dimensionless() {
            return "1".to_string();
        }
        let show_delta = self.atom_count() == 1;
        let product = |atoms: &[Atom]| {
            atoms
                .iter()
                .map(|a| a.latex(show_delta))
                .collect::<Vec<_>>()
                .join(" \\cdot ")
        };
        match (self.num.is_empty(), self.den.is_empty()) {
            (_, true) => product(&self.num),
            (true, false) => format!("\\frac{{1}}{{{}}}", product(&self.den)),
            (false, false) => format!(
                "\\frac{{{}}}{{{}}}",
                product(&self.num),
                product(&self.den)
            ),
        }
    }

    /// The affine map from this unit to its SI base. The offset survives
    /// only for a bare absolute temperature.
    fn to_si_map(&self) -> AffineMap {
        let keep_offset = self.is_bare_absolute_temperature();
        let mut out = AffineMap::IDENTITY;
        for (atoms, numerator) in [(&self.num, true), (&self.den, false)] {
            for atom in atoms.iter() {
                let mut conv = atom.def().conversion;
                if !keep_offset || atom.delta {
                    conv = conv.without_offset();
                }
                if let Some(prefix) = atom.prefix {
                    conv.scale *= prefix.factor();
                }
                for _ in 0..atom.exp {
                    out = if numerator {
                        out.then(conv)
                    } else {
                        out.then(conv.inverse())
                    };
                }
            }
        }
        out
    }
}

fn canonicalise(num: Vec<Atom>, den: Vec<Atom>) -> (Vec<Atom>, Vec<Atom>) {
    fn merge(atoms: Vec<Atom>) -> Vec<Atom> {
        let mut out: Vec<Atom> = Vec::new();
        for atom in atoms {
            match out.iter_mut().find(|a| a.key() == atom.key()) {
                Some(existing) => existing.exp += atom.exp,
                None => out.push(atom),
            }
        }
        out.retain(|a| a.exp != 0);
        out
    }
    let mut num = merge(num);
    let mut den = merge(den);
    for n in num.iter_mut() {
        if let Some(d) = den.iter_mut().find(|d| d.key() == n.key()) {
            let cancelled = n.exp.min(d.exp);
            n.exp -= cancelled;
            d.exp -= cancelled;
        }
    }
    num.retain(|a| a.exp != 0);
    den.retain(|a| a.exp != 0);
    num.sort();
    den.sort();
    (num, den)
}

impl Mul for &Unit {
    type Output = Unit;
    fn mul(self, other: &Unit) -> Unit {
        Unit::mul_units(self, other)
    }
}

impl Mul for Unit {
    type Output = Unit;
    fn mul(self, other: Unit) -> Unit {
        Unit::mul_units(&self, &other)
    }
}

impl Div for &Unit {
    type Output = Unit;
    fn div(self, other: &Unit) -> Unit {
        // Dividing an absolute temperature always produces a difference
        // quantity, so the operands are Δ-tagged up front.
        let a = if self.is_bare_absolute_temperature() {
            self.delta_tagged()
        } else {
            self.clone()
        };
        let b = if other.is_bare_absolute_temperature() {
            other.delta_tagged()
        } else {
            other.clone()
        };
        Unit::mul_units(&a, &b.reciprocal())
    }
}

impl Div for Unit {
    type Output = Unit;
    fn div(self, other: Unit) -> Unit {
        &self / &other
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let show_delta = self.atom_count() == 1;
        let join = |atoms: &[Atom]| {
            atoms
                .iter()
                .map(|a| a.render(show_delta))
                .collect::<Vec<_>>()
                .join("-")
        };
        if self.num.is_empty() {
            write!(f, "1")?;
        } else {
            write!(f, "{}", join(&self.num))?;
        }
        if !self.den.is_empty() {
            write!(f, "/{}", join(&self.den))?;
        }
        Ok(())
    }
}

impl FromStr for Unit {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Unit::parse(s)
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Unit::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn u(s: &str) -> Unit {
        Unit::parse(s).unwrap()
    }

    #[test]
    fn test_parse_roundtrip() {
        for s in ["1", "m", "L/min", "kg-m/s2", "L2/min2", "kL", "µm", "ΔK", "J/K-kg"] {
            assert_eq!(u(s).to_string(), s);
        }
    }

    #[test]
    fn test_parse_empty_is_dimensionless() {
        assert!(u("").is_dimensionless());
        assert!(u("1").is_dimensionless());
        assert_eq!(u("").to_string(), "1");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Unit::parse("m*s"),
            Err(Error::UnitParse { .. })
        ));
        assert!(matches!(
            Unit::parse("m/s/s"),
            Err(Error::UnitParse { .. })
        ));
        assert!(matches!(
            Unit::parse("m2m"),
            Err(Error::UnitParse { .. })
        ));
        assert!(matches!(
            Unit::parse("k1"),
            Err(Error::UnitParse { .. })
        ));
        assert!(matches!(
            Unit::parse("kq"),
            Err(Error::UnknownUnitSymbol(_))
        ));
    }

    #[test]
    fn test_parse_min_is_minutes() {
        let unit = u("min");
        assert_eq!(unit.to_string(), "min");
        let si = unit.si_base();
        assert_eq!(si.to_string(), "s");
    }

    #[test]
    fn test_auto_delta_in_composites() {
        // A temperature atom inside a composite is Δ-tagged, whether or not
        // the tag was spelled out. Atoms are kept sorted, so the kelvin atom
        // leads the denominator.
        assert_eq!(u("J/kg-K"), u("J/kg-ΔK"));
        assert_eq!(u("J/kg-K").to_string(), "J/K-kg");
        assert_eq!(u("K-m"), u("ΔK-m"));
        assert_eq!(u("K").to_string(), "K");
        assert_eq!(u("ΔK").to_string(), "ΔK");
        assert_ne!(u("K"), u("ΔK"));
    }

    #[test]
    fn test_multiply_cancels() {
        let result = &u("L/min") * &u("min/L");
        assert!(result.is_dimensionless());
    }

    #[test]
    fn test_multiply_merges_exponents() {
        assert_eq!((&u("m") * &u("m")).to_string(), "m2");
        assert_eq!((&u("m2/s") * &u("m/s")).to_string(), "m3/s2");
    }

    #[test]
    fn test_prefixes_are_distinct_atoms() {
        // mL and L do not cancel; the scale difference is a conversion
        // concern, not an algebraic one.
        let result = &u("mL") / &u("L");
        assert_eq!(result.to_string(), "mL/L");
    }

    #[test]
    fn test_divide_temperature_becomes_delta() {
        assert_eq!(&u("K") / &u("min"), u("ΔK/min"));
        assert_eq!(&u("J") / &u("C"), u("J/ΔC"));
        // The quotient of an absolute temperature by a dimensionless value
        // is a single-atom difference, which spells its tag out.
        assert_eq!((&u("C") / &u("1")).to_string(), "ΔC");
    }

    #[test]
    fn test_powers() {
        assert_eq!(u("L/min").powi(2).to_string(), "L2/min2");
        assert!(u("m").powi(0).is_dimensionless());
        assert_eq!(u("L2/min2").root(2).unwrap().to_string(), "L/min");
        assert!(matches!(
            u("L2/min2").pow_f(0.6),
            Err(Error::NonIntegerPowerOfUnit { .. })
        ));
        assert!(matches!(
            u("m").root(2),
            Err(Error::NonIntegerPowerOfUnit { .. })
        ));
    }

    #[test]
    fn test_pow_negative_moves_across_bar() {
        assert_eq!(u("m/s").pow_f(-1.0).unwrap().to_string(), "s/m");
    }

    #[test]
    fn test_si_base() {
        assert_eq!(u("N").si_base().to_string(), "kg-m/s2");
        assert_eq!(u("bar").si_base().to_string(), "kg/m-s2");
        assert_eq!(u("L/min").si_base().to_string(), "m3/s");
        assert_eq!(u("kL").si_base().to_string(), "m3");
        // J / (J/kg) = kg
        let specific = &u("J") / &u("J/kg");
        assert_eq!(specific.si_base().to_string(), "kg");
    }

    #[test]
    fn test_si_base_keeps_delta() {
        assert_eq!(u("ΔC").si_base().to_string(), "ΔK");
        assert_eq!(u("C").si_base().to_string(), "K");
    }

    #[test]
    fn test_addable() {
        assert!(matches!(
            u("L").addable(&u("L")),
            Some(Combine::Identical { .. })
        ));
        match u("L").addable(&u("m3")) {
            Some(Combine::Convert { result }) => assert_eq!(result.to_string(), "m3"),
            other => panic!("expected SI-base conversion, got {other:?}"),
        }
        match u("K").addable(&u("ΔK")) {
            Some(Combine::Convert { result }) => assert_eq!(result.to_string(), "K"),
            other => panic!("expected kelvin result, got {other:?}"),
        }
        assert!(u("m").addable(&u("s")).is_none());
    }

    #[test]
    fn test_subtractable_temperature() {
        match u("C").subtractable(&u("C")) {
            Some(Combine::Identical { result }) => assert_eq!(result.to_string(), "ΔC"),
            other => panic!("expected ΔC, got {other:?}"),
        }
        match u("m").subtractable(&u("m")) {
            Some(Combine::Identical { result }) => assert_eq!(result.to_string(), "m"),
            other => panic!("expected m, got {other:?}"),
        }
    }

    #[test]
    fn test_converter_scaling() {
        let map = u("L/min").converter(&u("m3/h")).unwrap();
        // 1 L/min = 0.06 m3/h
        assert_relative_eq!(map.apply(1.0), 0.06, max_relative = 1e-12);
        assert_eq!(map.offset, 0.0);
    }

    #[test]
    fn test_converter_temperature_offset() {
        let c_to_k = u("C").converter(&u("K")).unwrap();
        assert_relative_eq!(c_to_k.apply(0.0), 273.15);
        let k_to_f = u("K").converter(&u("F")).unwrap();
        assert_relative_eq!(k_to_f.apply(273.15), 32.0, epsilon = 1e-6);
        let c_to_f = u("C").converter(&u("F")).unwrap();
        assert_relative_eq!(c_to_f.apply(100.0), 212.0, epsilon = 1e-6);
    }

    #[test]
    fn test_converter_delta_has_no_offset() {
        let map = u("ΔC").converter(&u("ΔK")).unwrap();
        assert_eq!(map.offset, 0.0);
        assert_relative_eq!(map.apply(5.0), 5.0);
        let map = u("ΔF").converter(&u("ΔK")).unwrap();
        assert_relative_eq!(map.apply(9.0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_converter_prefix() {
        let map = u("kL").converter(&u("L")).unwrap();
        assert_relative_eq!(map.apply(1.0), 1000.0);
        let map = u("µm").converter(&u("m")).unwrap();
        assert_relative_eq!(map.apply(1.0), 1e-6);
    }

    #[test]
    fn test_converter_incompatible() {
        assert!(matches!(
            u("m").converter(&u("s")),
            Err(Error::IncompatibleUnits { .. })
        ));
        // An absolute temperature and a difference do not share an SI base.
        assert!(matches!(
            u("K").converter(&u("ΔK")),
            Err(Error::IncompatibleUnits { .. })
        ));
    }

    #[test]
    fn test_converter_roundtrip() {
        for s in ["bar", "L/min", "F", "kg-m/s2", "°"] {
            let unit = u(s);
            let si = unit.si_base();
            let there = unit.converter(&si).unwrap();
            let back = si.converter(&unit).unwrap();
            let x = 12.5;
            assert_relative_eq!(back.apply(there.apply(x)), x, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_string_roundtrip_of_constructed_units() {
        let unit = &u("L2/min2") * &u("J/kg-K");
        let back: Unit = unit.to_string().parse().unwrap();
        assert_eq!(back, unit);
    }

    #[test]
    fn test_to_latex() {
        assert_eq!(u("1").to_latex(), "1");
        assert_eq!(u("m2").to_latex(), "m^{2}");
        assert_eq!(u("L/min").to_latex(), "\\frac{L}{min}");
        assert_eq!(u("kg-m/s2").to_latex(), "\\frac{kg \\cdot m}{s^{2}}");
        assert_eq!(u("1/s").to_latex(), "\\frac{1}{s}");
        assert_eq!(u("ΔK").to_latex(), "\\Delta K");
    }
}
