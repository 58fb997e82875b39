//! Measurement values with units, uncertainties, and correlated error
//! propagation.
//!
//! A [`Measurement`] carries three inseparable pieces of information: a
//! magnitude (scalar or sequence), a symbolic unit expression, and a
//! one-standard-deviation uncertainty. Arithmetic on measurements produces
//! the correct value, the correct unit, and the correctly propagated
//! uncertainty at once, accounting for correlations between inputs through
//! a dependency graph of independent measurements.
//!
//! On top of the core sit an orthogonal-distance regression engine whose
//! fitted parameters inherit units and uncertainty ([`fit`]), a numerical
//! equation solver with Jacobian-based uncertainty propagation ([`solve`]),
//! a thermophysical property adapter ([`prop`]), and a tabular ingestion
//! adapter ([`ingest`]).
//!
//! ## Examples
//!
//! Units combine and cancel symbolically:
//! ```
//! use measurand::Measurement;
//! # fn main() -> Result<(), measurand::Error> {
//! let flow = Measurement::new(10.0, "L/min")?;
//! let pace = Measurement::new(2.0, "min/L")?;
//! let ratio = &flow * &pace;
//! assert_eq!(ratio.value().as_scalar(), Some(20.0));
//! assert!(ratio.unit().is_dimensionless());
//! # Ok(())
//! # }
//! ```
//!
//! Uncertainties propagate to first order, with correlations:
//! ```
//! use measurand::Measurement;
//! # fn main() -> Result<(), measurand::Error> {
//! let current = Measurement::with_uncert(2.0, "A", 0.05)?;
//! let voltage = Measurement::with_uncert(230.0, "V", 1.5)?;
//! let power = &current * &voltage;
//! assert_eq!(power.unit().si_base().to_string(), "kg-m2/s3");
//! let expected = ((230.0f64 * 0.05).powi(2) + (2.0f64 * 1.5).powi(2)).sqrt();
//! assert!((power.uncert().as_scalar().unwrap() - expected).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```
//!
//! Affine temperature conversions apply their offset only to bare absolute
//! temperatures:
//! ```
//! use measurand::Measurement;
//! # fn main() -> Result<(), measurand::Error> {
//! let mut t = Measurement::with_uncert(0.0, "C", 0.5)?;
//! t.convert("K")?;
//! assert_eq!(t.value().as_scalar(), Some(273.15));
//! assert_eq!(t.uncert().as_scalar(), Some(0.5));
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

use thiserror::Error as ThisError;

mod measurement;
mod registry;
mod unit;
mod value;

pub mod consts;
pub mod fit;
pub mod ingest;
mod odr;
pub mod prop;
pub mod solve;

pub use measurement::{LeafId, Measurement};
pub use registry::{AffineMap, Prefix};
pub use unit::Unit;
pub use value::Value;

/// Error type for every fallible operation in the crate.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("the unit symbol '{0}' is not known")]
    UnknownUnitSymbol(String),
    #[error("the prefix '{0}' is not known")]
    UnknownPrefix(String),
    #[error("could not parse the unit '{unit}': {reason}")]
    UnitParse { unit: String, reason: String },
    #[error("operation '{op}' encountered incompatible units [{expected}] and [{found}]")]
    IncompatibleUnits {
        op: &'static str,
        expected: String,
        found: String,
    },
    #[error("the unit [{unit}] cannot be raised to the power {power}")]
    NonIntegerPowerOfUnit { unit: String, power: f64 },
    #[error("the exponent must be dimensionless, found [{0}]")]
    UnitExponentRequired(String),
    #[error("'{op}' requires a dimensionless operand, found [{unit}]")]
    NonDimensionlessTranscendental { op: &'static str, unit: String },
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("in-place operators cannot be applied to a constant")]
    ImmutableConstant,
    #[error("index {index} is out of range for a measurement of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("the argument '{0}' is required but missing")]
    MissingArgument(&'static str),
    #[error("the argument '{0}' is not expected here")]
    UnexpectedArgument(String),
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("{expected} unknowns require {expected} equations, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("the system Jacobian is singular")]
    SingularSystem,
    #[error("expected {expected} initial parameters, found {found}")]
    BadParameterCount { expected: usize, found: usize },
    #[error("invalid term mask: {0}")]
    BadTermMask(String),
    #[error("table error: {0}")]
    Table(String),
    #[error("property backend error: {0}")]
    PropertyBackend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
