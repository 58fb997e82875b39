//! Measurement values.
//!
//! A [`Measurement`] couples a magnitude (scalar or sequence) with a unit
//! and a one-standard-deviation uncertainty. Every arithmetic operation
//! produces the result value, the result unit, and the propagated
//! uncertainty at once.
//!
//! Uncertainty propagation is first order and correlation aware. Each
//! measurement carries a dependency map from the independent measurements it
//! was derived from (the leaves of the derivation graph) to the partial
//! derivative with respect to each one. The uncertainty of a derived value
//! is reduced from this map:
//!
//! ```text
//! σ² = Σᵢ (∂f/∂xᵢ · σᵢ)² + 2·Σᵢ<ⱼ (∂f/∂xᵢ)(∂f/∂xⱼ)·cov(xᵢ, xⱼ)
//! ```
//!
//! Operators follow the usual arithmetic syntax and panic on dimensional
//! errors; every operator has a checked `try_*` counterpart returning a
//! [`Result`].
//!
//! # Example
//! ```
//! use measurand::Measurement;
//! # fn main() -> Result<(), measurand::Error> {
//! let flow = Measurement::with_uncert(10.0, "L/min", 0.1)?;
//! let time = Measurement::with_uncert(30.0, "min", 0.5)?;
//! let volume = &flow * &time;
//! assert_eq!(volume.unit().to_string(), "L");
//! # Ok(())
//! # }
//! ```

use crate::registry::AffineMap;
use crate::unit::{Combine, Unit};
use crate::value::Value;
use crate::{Error, Result};
use ndarray::Array1;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_LEAF_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity of an independent measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafId(u64);

/// The shared record of an independent measurement: its uncertainty and the
/// covariances registered against other leaves. Dependency maps reference
/// leaves through this record, so a leaf stays alive as long as anything
/// derived from it does.
#[derive(Debug)]
pub(crate) struct Leaf {
    id: LeafId,
    uncert: RwLock<Value>,
    covariance: RwLock<BTreeMap<LeafId, Value>>,
}

impl Leaf {
    fn new(uncert: Value) -> Arc<Self> {
        Arc::new(Self {
            id: LeafId(NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed)),
            uncert: RwLock::new(uncert),
            covariance: RwLock::new(BTreeMap::new()),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Dependency {
    pub leaf: Arc<Leaf>,
    pub grad: Value,
}

/// A value, its unit, and its standard uncertainty.
#[derive(Debug, Clone)]
pub struct Measurement {
    value: Value,
    unit: Unit,
    uncert: Value,
    constant: bool,
    /// Present on independent measurements.
    leaf: Option<Arc<Leaf>>,
    /// Empty on independent measurements.
    deps: BTreeMap<LeafId, Dependency>,
}

impl Measurement {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// A new independent measurement with zero uncertainty.
    pub fn new(value: impl Into<Value>, unit: &str) -> Result<Self> {
        Self::leaf(value.into(), Unit::parse(unit)?, None, false)
    }

    /// A new independent measurement with a one-standard-deviation
    /// uncertainty of the same shape as the value.
    pub fn with_uncert(
        value: impl Into<Value>,
        unit: &str,
        uncert: impl Into<Value>,
    ) -> Result<Self> {
        Self::leaf(value.into(), Unit::parse(unit)?, Some(uncert.into()), false)
    }

    /// A constant: an exact leaf that rejects all in-place mutation.
    pub fn constant(value: impl Into<Value>, unit: &str) -> Result<Self> {
        Self::leaf(value.into(), Unit::parse(unit)?, None, true)
    }

    /// A sequence measurement of `n` evenly spaced values from `start` to
    /// `end` (inclusive), with zero uncertainty.
    pub fn linspace(start: f64, end: f64, n: usize, unit: &str) -> Result<Self> {
        Self::new(Array1::linspace(start, end, n), unit)
    }

    pub(crate) fn from_parts(value: Value, unit: Unit, uncert: Value) -> Result<Self> {
        Self::leaf(value, unit, Some(uncert), false)
    }

    fn leaf(value: Value, unit: Unit, uncert: Option<Value>, constant: bool) -> Result<Self> {
        let uncert = match uncert {
            None => value.zeros_like(),
            Some(u) => {
                if !u.same_shape(&value) {
                    return Err(Error::ShapeMismatch(
                        "the value and the uncertainty must have the same shape".to_string(),
                    ));
                }
                u
            }
        };
        Ok(Self {
            value,
            unit,
            uncert: uncert.clone(),
            constant,
            leaf: Some(Leaf::new(uncert)),
            deps: BTreeMap::new(),
        })
    }

    fn promoted_same_unit(&self, x: f64) -> Self {
        Self::leaf(Value::Scalar(x), self.unit.clone(), None, false)
            .expect("a scalar leaf is always well formed")
    }

    fn promoted_dimensionless(x: f64) -> Self {
        Self::leaf(Value::Scalar(x), Unit::dimensionless(), None, false)
            .expect("a scalar leaf is always well formed")
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn uncert(&self) -> &Value {
        &self.uncert
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// The sequence length, or `None` for a scalar measurement.
    pub fn len(&self) -> Option<usize> {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub(crate) fn leaf_id(&self) -> Option<LeafId> {
        self.leaf.as_ref().map(|l| l.id)
    }

    /// The partial derivative of this value with respect to the given
    /// independent measurement, if it depends on it.
    pub(crate) fn gradient_for(&self, leaf: &Measurement) -> Option<&Value> {
        let id = leaf.leaf_id()?;
        self.deps.get(&id).map(|dep| &dep.grad)
    }

    // ------------------------------------------------------------------
    // Covariance
    // ------------------------------------------------------------------

    /// Register the covariance between two independent measurements. The
    /// registration is symmetric; later derivations involving both leaves
    /// pick up the cross term.
    pub fn set_covariance(a: &Measurement, b: &Measurement, covariance: impl Into<Value>) -> Result<()> {
        let cov = covariance.into();
        let (la, lb) = match (&a.leaf, &b.leaf, a.deps.is_empty() && b.deps.is_empty()) {
            (Some(la), Some(lb), true) => (la, lb),
            _ => {
                return Err(Error::InvalidArgument {
                    name: "covariance".to_string(),
                    reason: "covariance can only be registered between independent measurements"
                        .to_string(),
                })
            }
        };
        if !a.value.same_shape(&b.value) || !cov.same_shape(&a.value) {
            return Err(Error::ShapeMismatch(
                "the covariance must have the shape of both measurements".to_string(),
            ));
        }
        la.covariance.write().unwrap().insert(lb.id, cov.clone());
        lb.covariance.write().unwrap().insert(la.id, cov);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derivation
    // ------------------------------------------------------------------

    /// Build a derived measurement from local partial derivatives. The
    /// dependency maps of the operands fold into the new map and the
    /// uncertainty is reduced immediately.
    pub(crate) fn derived(value: Value, unit: Unit, operands: &[(&Measurement, Value)]) -> Result<Self> {
        let mut deps: BTreeMap<LeafId, Dependency> = BTreeMap::new();
        for (operand, grad) in operands {
            fold_dependencies(&mut deps, operand, grad)?;
        }
        let uncert = reduce_uncertainty(&value, &deps)?;
        Ok(Self {
            value,
            unit,
            uncert,
            constant: false,
            leaf: None,
            deps,
        })
    }

    /// Replace this measurement's dependencies, folding through the given
    /// sources, then recompute its uncertainty. Used by the equation solver
    /// to attach residual dependencies to a solved unknown.
    pub(crate) fn adopt_dependencies(
        &mut self,
        sources: &[&Measurement],
        grads: &[Value],
    ) -> Result<()> {
        self.deps.clear();
        for (source, grad) in sources.iter().zip(grads) {
            fold_dependencies(&mut self.deps, source, grad)?;
        }
        // A value must not depend on its own leaf.
        if let Some(leaf) = &self.leaf {
            self.deps.remove(&leaf.id);
        }
        self.uncert = reduce_uncertainty(&self.value, &self.deps)?;
        if let Some(leaf) = &self.leaf {
            *leaf.uncert.write().unwrap() = self.uncert.clone();
        }
        Ok(())
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    /// Convert to another unit of the same SI base. The value conversion
    /// applies the affine offset where one exists (a bare absolute
    /// temperature); the uncertainty is always scaled without offset.
    pub fn convert(&mut self, unit: &str) -> Result<()> {
        let target = Unit::parse(unit)?;
        let map = self.unit.converter(&target)?;
        self.value = self.value.convert(map);
        self.uncert = self.uncert.convert_scale(map);
        if let Some(leaf) = &self.leaf {
            *leaf.uncert.write().unwrap() = self.uncert.clone();
        }
        self.unit = target;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    pub fn try_add(&self, other: &Measurement) -> Result<Measurement> {
        let combine = self.unit.addable(&other.unit).ok_or_else(|| Error::IncompatibleUnits {
            op: "add",
            expected: self.unit.to_string(),
            found: other.unit.to_string(),
        })?;
        self.combine_linear(other, combine, false)
    }

    pub fn try_sub(&self, other: &Measurement) -> Result<Measurement> {
        let combine = self
            .unit
            .subtractable(&other.unit)
            .ok_or_else(|| Error::IncompatibleUnits {
                op: "subtract",
                expected: self.unit.to_string(),
                found: other.unit.to_string(),
            })?;
        self.combine_linear(other, combine, true)
    }

    fn combine_linear(
        &self,
        other: &Measurement,
        combine: Combine,
        subtract: bool,
    ) -> Result<Measurement> {
        let sign = if subtract { -1.0 } else { 1.0 };
        let (value, unit, grad_a, grad_b) = match combine {
            Combine::Identical { result } => {
                let value = if subtract {
                    self.value.sub(&other.value)?
                } else {
                    self.value.add(&other.value)?
                };
                (value, result, 1.0, sign)
            }
            Combine::Convert { result } => {
                let map_a = conversion_into(&self.unit, &result)?;
                let map_b = conversion_into(&other.unit, &result)?;
                let va = self.value.convert(map_a);
                let vb = other.value.convert(map_b);
                let value = if subtract { va.sub(&vb)? } else { va.add(&vb)? };
                (value, result, map_a.scale, sign * map_b.scale)
            }
        };
        Measurement::derived(
            value,
            unit,
            &[
                (self, Value::Scalar(grad_a)),
                (other, Value::Scalar(grad_b)),
            ],
        )
    }

    pub fn try_mul(&self, other: &Measurement) -> Result<Measurement> {
        let unit = &self.unit * &other.unit;
        let value = self.value.mul(&other.value)?;
        Measurement::derived(
            value,
            unit,
            &[(self, other.value.clone()), (other, self.value.clone())],
        )
    }

    pub fn try_div(&self, other: &Measurement) -> Result<Measurement> {
        let unit = &self.unit / &other.unit;
        let value = self.value.div(&other.value)?;
        let grad_a = other.value.map(|b| 1.0 / b);
        let grad_b = self.value.zip_with(&other.value, |a, b| -a / (b * b))?;
        Measurement::derived(value, unit, &[(self, grad_a), (other, grad_b)])
    }

    /// Raise to the power of another measurement. The exponent must be a
    /// dimensionless scalar; a dimensioned base additionally requires the
    /// exponent to produce integer unit exponents.
    pub fn try_pow(&self, other: &Measurement) -> Result<Measurement> {
        if !other.unit.is_dimensionless() {
            return Err(Error::UnitExponentRequired(other.unit.to_string()));
        }
        let p = other.value.as_scalar().ok_or_else(|| {
            Error::ShapeMismatch("the exponent must be a scalar".to_string())
        })?;
        let unit = self.unit.pow_f(p)?;
        let value = self.value.map(|x| x.powf(p));
        let grad_a = self.value.map(|x| p * x.powf(p - 1.0));
        let grad_b = self.value.map(|x| x.powf(p) * x.ln());
        Measurement::derived(value, unit, &[(self, grad_a), (other, grad_b)])
    }

    /// Raise to an integer power.
    pub fn powi(&self, n: i32) -> Measurement {
        self.try_pow(&Self::promoted_dimensionless(n as f64))
            .expect("integer powers preserve integer unit exponents")
    }

    /// The square root, `self^(1/2)`.
    pub fn sqrt(&self) -> Result<Measurement> {
        self.try_pow(&Self::promoted_dimensionless(0.5))
    }

    /// The natural logarithm of a dimensionless measurement.
    pub fn ln(&self) -> Result<Measurement> {
        self.transcendental("ln", Value::ln, |x| 1.0 / x)
    }

    /// The base-10 logarithm of a dimensionless measurement.
    pub fn log10(&self) -> Result<Measurement> {
        self.transcendental("log10", Value::log10, |x| 1.0 / (x * std::f64::consts::LN_10))
    }

    /// The exponential of a dimensionless measurement.
    pub fn exp(&self) -> Result<Measurement> {
        self.transcendental("exp", Value::exp, f64::exp)
    }

    fn transcendental(
        &self,
        op: &'static str,
        apply: impl Fn(&Value) -> Value,
        grad: impl Fn(f64) -> f64,
    ) -> Result<Measurement> {
        if !self.unit.is_dimensionless() {
            return Err(Error::NonDimensionlessTranscendental {
                op,
                unit: self.unit.to_string(),
            });
        }
        Measurement::derived(
            apply(&self.value),
            Unit::dimensionless(),
            &[(self, self.value.map(&grad))],
        )
    }

    // ------------------------------------------------------------------
    // In-place operators
    // ------------------------------------------------------------------

    pub fn try_add_assign(&mut self, other: &Measurement) -> Result<()> {
        self.rebind(|m| m.try_add(other))
    }

    pub fn try_sub_assign(&mut self, other: &Measurement) -> Result<()> {
        self.rebind(|m| m.try_sub(other))
    }

    pub fn try_mul_assign(&mut self, other: &Measurement) -> Result<()> {
        self.rebind(|m| m.try_mul(other))
    }

    pub fn try_div_assign(&mut self, other: &Measurement) -> Result<()> {
        self.rebind(|m| m.try_div(other))
    }

    fn rebind(&mut self, f: impl Fn(&Measurement) -> Result<Measurement>) -> Result<()> {
        if self.constant {
            return Err(Error::ImmutableConstant);
        }
        *self = f(self)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// Select a single element. The result is a fresh independent scalar
    /// measurement with the same unit. Indexing a scalar with 0 returns the
    /// measurement itself.
    pub fn get(&self, index: usize) -> Result<Measurement> {
        if self.value.is_scalar() {
            return if index == 0 {
                Ok(self.clone())
            } else {
                Err(Error::IndexOutOfRange { index, len: 1 })
            };
        }
        let value = self.value.get(index)?;
        let uncert = self.uncert.get(index)?;
        Self::from_parts(
            Value::Scalar(value),
            self.unit.clone(),
            Value::Scalar(uncert),
        )
    }

    /// Select several elements into a shorter sequence measurement.
    pub fn take(&self, indices: &[usize]) -> Result<Measurement> {
        let values: Vec<f64> = indices
            .iter()
            .map(|&i| self.value.get(i))
            .collect::<Result<_>>()?;
        let uncerts: Vec<f64> = indices
            .iter()
            .map(|&i| self.uncert.get(i))
            .collect::<Result<_>>()?;
        Self::from_parts(Value::from(values), self.unit.clone(), Value::from(uncerts))
    }
}

/// Pick the conversion from an operand unit into the combination result,
/// falling back to the Δ-tagged (offset free) form when the operand is a
/// temperature difference meeting an absolute temperature.
fn conversion_into(from: &Unit, to: &Unit) -> Result<AffineMap> {
    from.converter(to)
        .or_else(|_| from.delta_tagged().converter(&to.delta_tagged()))
}

fn fold_dependencies(
    deps: &mut BTreeMap<LeafId, Dependency>,
    operand: &Measurement,
    grad: &Value,
) -> Result<()> {
    if operand.deps.is_empty() {
        let leaf = operand
            .leaf
            .as_ref()
            .expect("a measurement without dependencies is independent")
            .clone();
        accumulate(deps, leaf, grad.clone())
    } else {
        for dep in operand.deps.values() {
            let chained = dep.grad.mul(grad)?;
            accumulate(deps, dep.leaf.clone(), chained)?;
        }
        Ok(())
    }
}

fn accumulate(deps: &mut BTreeMap<LeafId, Dependency>, leaf: Arc<Leaf>, grad: Value) -> Result<()> {
    use std::collections::btree_map::Entry;
    match deps.entry(leaf.id) {
        Entry::Occupied(mut entry) => {
            let summed = entry.get().grad.add(&grad)?;
            entry.get_mut().grad = summed;
        }
        Entry::Vacant(entry) => {
            entry.insert(Dependency { leaf, grad });
        }
    }
    Ok(())
}

/// Reduce the dependency map to a standard uncertainty. Zero-uncertainty
/// leaves contribute nothing, even where their partial is not finite.
fn reduce_uncertainty(value: &Value, deps: &BTreeMap<LeafId, Dependency>) -> Result<Value> {
    let mut variance = value.zeros_like();
    for dep in deps.values() {
        let sigma = dep.leaf.uncert.read().unwrap().clone();
        let term = dep
            .grad
            .zip_with(&sigma, |g, s| if s == 0.0 { 0.0 } else { (g * s) * (g * s) })?;
        variance = variance.add(&term)?;
    }
    let entries: Vec<&Dependency> = deps.values().collect();
    for (i, dep_i) in entries.iter().enumerate() {
        let cov_i = dep_i.leaf.covariance.read().unwrap();
        for dep_j in &entries[i + 1..] {
            if let Some(cov) = cov_i.get(&dep_j.leaf.id) {
                let cross = dep_i.grad.mul(&dep_j.grad)?.mul(cov)?.map(|x| 2.0 * x);
                variance = variance.add(&cross)?;
            }
        }
    }
    Ok(variance.map(|v| v.max(0.0).sqrt()))
}

// ----------------------------------------------------------------------
// Operator impls
// ----------------------------------------------------------------------

macro_rules! impl_binary_op {
    ($trt:ident, $method:ident, $try:ident, $promote:ident) => {
        impl $trt for &Measurement {
            type Output = Measurement;
            fn $method(self, rhs: &Measurement) -> Measurement {
                self.$try(rhs).unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl $trt for Measurement {
            type Output = Measurement;
            fn $method(self, rhs: Measurement) -> Measurement {
                (&self).$method(&rhs)
            }
        }

        impl $trt<&Measurement> for Measurement {
            type Output = Measurement;
            fn $method(self, rhs: &Measurement) -> Measurement {
                (&self).$method(rhs)
            }
        }

        impl $trt<Measurement> for &Measurement {
            type Output = Measurement;
            fn $method(self, rhs: Measurement) -> Measurement {
                self.$method(&rhs)
            }
        }

        impl $trt<f64> for &Measurement {
            type Output = Measurement;
            fn $method(self, rhs: f64) -> Measurement {
                let rhs = impl_binary_op!(@promote $promote, self, rhs);
                self.$method(&rhs)
            }
        }

        impl $trt<f64> for Measurement {
            type Output = Measurement;
            fn $method(self, rhs: f64) -> Measurement {
                (&self).$method(rhs)
            }
        }

        impl $trt<&Measurement> for f64 {
            type Output = Measurement;
            fn $method(self, rhs: &Measurement) -> Measurement {
                let lhs = impl_binary_op!(@promote $promote, rhs, self);
                (&lhs).$method(rhs)
            }
        }

        impl $trt<Measurement> for f64 {
            type Output = Measurement;
            fn $method(self, rhs: Measurement) -> Measurement {
                self.$method(&rhs)
            }
        }
    };
    (@promote same_unit, $m:expr, $x:expr) => {
        $m.promoted_same_unit($x)
    };
    (@promote dimensionless, $m:expr, $x:expr) => {
        Measurement::promoted_dimensionless($x)
    };
}

impl_binary_op!(Add, add, try_add, same_unit);
impl_binary_op!(Sub, sub, try_sub, same_unit);
impl_binary_op!(Mul, mul, try_mul, dimensionless);
impl_binary_op!(Div, div, try_div, dimensionless);

macro_rules! impl_assign_op {
    ($trt:ident, $method:ident, $try:ident) => {
        impl $trt<&Measurement> for Measurement {
            fn $method(&mut self, rhs: &Measurement) {
                self.$try(rhs).unwrap_or_else(|e| panic!("{e}"));
            }
        }

        impl $trt for Measurement {
            fn $method(&mut self, rhs: Measurement) {
                self.$method(&rhs);
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, try_add_assign);
impl_assign_op!(SubAssign, sub_assign, try_sub_assign);
impl_assign_op!(MulAssign, mul_assign, try_mul_assign);
impl_assign_op!(DivAssign, div_assign, try_div_assign);

impl Neg for &Measurement {
    type Output = Measurement;
    fn neg(self) -> Measurement {
        self * -1.0
    }
}

impl Neg for Measurement {
    type Output = Measurement;
    fn neg(self) -> Measurement {
        -&self
    }
}

// ----------------------------------------------------------------------
// Formatting
// ----------------------------------------------------------------------

/// Round to `digits` significant digits and render the shortest form.
fn format_sig(v: f64, digits: usize) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{v}");
    }
    let magnitude = v.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits as i32 - 1 - magnitude);
    let rounded = (v * factor).round() / factor;
    format!("{rounded}")
}

/// Format a value and its uncertainty. The first significant digit of the
/// uncertainty fixes the decimal position the value is rounded to; the
/// uncertainty keeps one significant digit.
fn format_with_uncert(value: f64, uncert: f64) -> (String, String) {
    if uncert == 0.0 {
        return (format_sig(value, 3), "0".to_string());
    }
    let uncert_str = format_sig(uncert, 1);
    let digits_uncert = -(uncert.abs().log10().floor() as i32);
    let digits_value = if value == 0.0 {
        i32::MAX
    } else {
        -(value.abs().log10().floor() as i32)
    };
    if digits_uncert >= digits_value {
        let sig = (digits_uncert - digits_value + 1).max(1) as usize;
        (format_sig(value, sig), uncert_str)
    } else {
        let mut v = String::from("0");
        if digits_uncert > 0 {
            v.push('.');
            v.push_str(&"0".repeat(digits_uncert as usize));
        }
        (v, uncert_str)
    }
}

impl Measurement {
    /// A LaTeX rendering of the value, its uncertainty and its unit.
    pub fn to_latex(&self) -> String {
        let unit = if self.unit.is_dimensionless() {
            String::new()
        } else {
            format!("\\,\\mathrm{{{}}}", self.unit.to_latex())
        };
        let render = |v: f64, u: f64| {
            if u == 0.0 {
                format_sig(v, 3)
            } else {
                let (vs, us) = format_with_uncert(v, u);
                format!("{vs} \\pm {us}")
            }
        };
        match &self.value {
            Value::Scalar(v) => {
                let u = self.uncert.as_scalar().expect("shapes agree");
                format!("${}{unit}$", render(*v, u))
            }
            Value::Vector(values) => {
                let elements: Vec<String> = values
                    .iter()
                    .zip(self.uncert.iter())
                    .map(|(v, u)| render(*v, u))
                    .collect();
                format!("$[{}]{unit}$", elements.join(", "))
            }
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.unit.is_dimensionless() {
            String::new()
        } else {
            self.unit.to_string()
        };
        let exact = self.uncert.is_zero();
        match &self.value {
            Value::Scalar(v) => {
                if exact {
                    write!(f, "{} [{unit}]", format_sig(*v, 3))
                } else {
                    let u = self.uncert.as_scalar().expect("shapes agree");
                    let (vs, us) = format_with_uncert(*v, u);
                    write!(f, "{vs} ± {us} [{unit}]")
                }
            }
            Value::Vector(values) => {
                let formatted: Vec<String> = if exact {
                    values.iter().map(|v| format_sig(*v, 3)).collect()
                } else {
                    values
                        .iter()
                        .zip(self.uncert.iter())
                        .map(|(v, u)| {
                            let (vs, us) = format_with_uncert(*v, u);
                            format!("{vs} ± {us}")
                        })
                        .collect()
                };
                write!(f, "[{}] [{unit}]", formatted.join(", "))
            }
        }
    }
}
