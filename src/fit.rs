//! Curve fitting.
//!
//! Orthogonal-distance regression over a closed family of model forms. The
//! fitted parameters come back as [`Measurement`] values whose units follow
//! from the units of the data, e.g. fitting a parabola of `x` in metres to
//! `y` in volts gives the leading coefficient the unit `V/m2`.
//!
//! The regression runs twice: once from the caller's guess and once from a
//! 10% perturbation of the first result. This guards against a guess that
//! coincides with a stationary point.
//!
//! ```
//! use measurand::{fit, Measurement};
//! use ndarray::Array1;
//! # fn main() -> Result<(), measurand::Error> {
//! let xs = Array1::linspace(0.0, 9.0, 10);
//! let ys = xs.mapv(|x| 3.0 * x + 7.0);
//! let x = Measurement::new(xs, "s")?;
//! let y = Measurement::new(ys, "m")?;
//! let fit = fit::linear(&x, &y)?;
//! assert_eq!(fit.params[0].unit().to_string(), "m/s");
//! assert!((fit.r_squared - 1.0).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

use crate::measurement::Measurement;
use crate::odr::{orthogonal_distance_fit, OdrProblem};
use crate::unit::Unit;
use crate::value::Value;
use crate::{Error, Result};
use log::debug;
use ndarray::Array1;
use std::fmt;

/// The closed family of model forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    /// `Σᵢ aᵢ·x^(n−i)` with a per-term inclusion mask of length `n+1`.
    Polynomial { degree: usize, mask: Vec<bool> },
    /// `a·x^b`
    Power,
    /// `a·b^x`
    Exponential,
    /// `L / (1 + exp(−k·(x − x₀)))`
    Logistic,
    /// The logistic form with `L` pinned to 100.
    PinnedLogistic,
}

impl Model {
    pub fn parameter_count(&self) -> usize {
        match self {
            Model::Polynomial { mask, .. } => mask.iter().filter(|m| **m).count(),
            Model::Power | Model::Exponential | Model::PinnedLogistic => 2,
            Model::Logistic => 3,
        }
    }

    fn requires_dimensionless_x(&self) -> bool {
        !matches!(self, Model::Polynomial { .. })
    }

    fn eval(&self, beta: &[f64], x: f64) -> f64 {
        match self {
            Model::Polynomial { degree, mask } => {
                let mut out = 0.0;
                let mut j = 0;
                for (i, included) in mask.iter().enumerate() {
                    if *included {
                        out += beta[j] * x.powi((*degree - i) as i32);
                        j += 1;
                    }
                }
                out
            }
            Model::Power => beta[0] * x.powf(beta[1]),
            Model::Exponential => beta[0] * beta[1].powf(x),
            Model::Logistic => logistic(beta[0], beta[1], beta[2], x),
            Model::PinnedLogistic => logistic(100.0, beta[0], beta[1], x),
        }
    }

    fn slope(&self, beta: &[f64], x: f64) -> f64 {
        match self {
            Model::Polynomial { degree, mask } => {
                let mut out = 0.0;
                let mut j = 0;
                for (i, included) in mask.iter().enumerate() {
                    if *included {
                        let e = (*degree - i) as i32;
                        if e > 0 {
                            out += beta[j] * e as f64 * x.powi(e - 1);
                        }
                        j += 1;
                    }
                }
                out
            }
            Model::Power => beta[0] * beta[1] * x.powf(beta[1] - 1.0),
            Model::Exponential => beta[0] * beta[1].powf(x) * beta[1].ln(),
            Model::Logistic => logistic_slope(beta[0], beta[1], beta[2], x),
            Model::PinnedLogistic => logistic_slope(100.0, beta[0], beta[1], x),
        }
    }

    /// The unit of each fitted parameter, given the units of the data.
    fn parameter_units(&self, x: &Unit, y: &Unit) -> Vec<Unit> {
        match self {
            Model::Polynomial { degree, mask } => mask
                .iter()
                .enumerate()
                .filter(|(_, included)| **included)
                .map(|(i, _)| {
                    let power = (*degree - i) as u32;
                    if power == 0 {
                        y.clone()
                    } else {
                        y / &x.powi(power)
                    }
                })
                .collect(),
            Model::Power | Model::Exponential => vec![y.clone(), Unit::dimensionless()],
            Model::Logistic => vec![
                y.clone(),
                Unit::dimensionless(),
                Unit::dimensionless(),
            ],
            Model::PinnedLogistic => {
                vec![Unit::dimensionless(), Unit::dimensionless()]
            }
        }
    }

    fn default_guess(&self) -> Vec<f64> {
        match self {
            Model::Polynomial { .. } => vec![0.0; self.parameter_count()],
            Model::Power | Model::Exponential => vec![1.0, 1.0],
            Model::Logistic => vec![1.0, 1.0, 0.0],
            Model::PinnedLogistic => vec![1.0, 0.0],
        }
    }

    fn description(&self) -> String {
        match self {
            Model::Polynomial { degree, .. } => format!("polynomial of degree {degree}"),
            Model::Power => "a·x^b".to_string(),
            Model::Exponential => "a·b^x".to_string(),
            Model::Logistic => "L/(1 + exp(-k·(x - x0)))".to_string(),
            Model::PinnedLogistic => "100/(1 + exp(-k·(x - x0)))".to_string(),
        }
    }
}

fn logistic(l: f64, k: f64, x0: f64, x: f64) -> f64 {
    l / (1.0 + (-k * (x - x0)).exp())
}

fn logistic_slope(l: f64, k: f64, x0: f64, x: f64) -> f64 {
    let e = (-k * (x - x0)).exp();
    k * l * e / ((1.0 + e) * (1.0 + e))
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Initial parameter guess. Model defaults apply when absent.
    pub guess: Option<Vec<f64>>,
    /// Zero input uncertainties are replaced by this floor so the
    /// weighting stays finite.
    pub sigma_floor: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            guess: None,
            sigma_floor: 1e-10,
        }
    }
}

/// The outcome of a regression: parameters as measurements and the
/// coefficient of determination.
#[derive(Debug, Clone)]
pub struct Fit {
    pub model: Model,
    pub params: Vec<Measurement>,
    pub r_squared: f64,
    beta: Vec<f64>,
}

impl Fit {
    /// Evaluate the fitted model.
    pub fn predict(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| self.model.eval(&self.beta, x))
    }

    /// Evaluate the derivative of the fitted model.
    pub fn predict_slope(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| self.model.slope(&self.beta, x))
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, R² = {:.5}", self.model.description(), self.r_squared)
    }
}

/// Fit a model to sequence-shaped `x` and `y` measurements.
pub fn fit(model: Model, x: &Measurement, y: &Measurement, options: &FitOptions) -> Result<Fit> {
    if let Model::Polynomial { degree, mask } = &model {
        if mask.len() != degree + 1 {
            return Err(Error::BadTermMask(format!(
                "a degree-{degree} polynomial needs {} mask entries, found {}",
                degree + 1,
                mask.len()
            )));
        }
        if !mask.iter().any(|m| *m) {
            return Err(Error::BadTermMask(
                "the term mask must include at least one term".to_string(),
            ));
        }
    }
    if model.requires_dimensionless_x() && !x.unit().is_dimensionless() {
        return Err(Error::IncompatibleUnits {
            op: "fit",
            expected: "1".to_string(),
            found: x.unit().to_string(),
        });
    }

    let xs = as_sequence(x)?;
    let ys = as_sequence(y)?;
    if xs.len() != ys.len() {
        return Err(Error::ShapeMismatch(format!(
            "x has {} points but y has {}",
            xs.len(),
            ys.len()
        )));
    }

    let guess = match &options.guess {
        Some(g) => g.clone(),
        None => model.default_guess(),
    };
    if guess.len() != model.parameter_count() {
        return Err(Error::BadParameterCount {
            expected: model.parameter_count(),
            found: guess.len(),
        });
    }

    let floor = |sigma: f64| if sigma == 0.0 { options.sigma_floor } else { sigma };
    let sx: Vec<f64> = x.uncert().iter().map(floor).collect();
    let sy: Vec<f64> = y.uncert().iter().map(floor).collect();

    let eval = |beta: &[f64], x: f64| model.eval(beta, x);
    let slope = |beta: &[f64], x: f64| model.slope(beta, x);
    let problem = OdrProblem {
        f: &eval,
        df_dx: &slope,
    };

    let first = orthogonal_distance_fit(&problem, &xs, &ys, &sx, &sy, &guess)?;
    let restart: Vec<f64> = first.beta.iter().map(|b| b * 1.1).collect();
    let out = orthogonal_distance_fit(&problem, &xs, &ys, &sx, &sy, &restart)?;

    let units = model.parameter_units(x.unit(), y.unit());
    let params = out
        .beta
        .iter()
        .zip(units)
        .enumerate()
        .map(|(k, (beta, unit))| {
            let sigma = (out.cov_beta[(k, k)].max(0.0) + out.sd_beta[k] * out.sd_beta[k]).sqrt();
            Measurement::from_parts(Value::Scalar(*beta), unit, Value::Scalar(sigma))
        })
        .collect::<Result<Vec<_>>>()?;

    let y_mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| {
            let r = y - model.eval(&out.beta, *x);
            r * r
        })
        .sum();
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean) * (y - y_mean)).sum();
    let r_squared = if ss_tot != 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        1.0
    };
    debug!("fitted {}: R² = {r_squared:.6}", model.description());

    Ok(Fit {
        model,
        params,
        r_squared,
        beta: out.beta,
    })
}

fn as_sequence(m: &Measurement) -> Result<Vec<f64>> {
    match m.len() {
        Some(_) => Ok(m.value().iter().collect()),
        None => Err(Error::ShapeMismatch(
            "fitting requires sequence-shaped measurements".to_string(),
        )),
    }
}

/// Fit a straight line, `a·x + b`.
pub fn linear(x: &Measurement, y: &Measurement) -> Result<Fit> {
    polynomial(x, y, 1, &FitOptions::default())
}

/// Fit a polynomial of the given degree with all terms included.
pub fn polynomial(x: &Measurement, y: &Measurement, degree: usize, options: &FitOptions) -> Result<Fit> {
    fit(
        Model::Polynomial {
            degree,
            mask: vec![true; degree + 1],
        },
        x,
        y,
        options,
    )
}

/// Fit a polynomial with a per-term inclusion mask. Masked-out terms do not
/// consume a degree of freedom.
pub fn masked_polynomial(
    x: &Measurement,
    y: &Measurement,
    degree: usize,
    mask: &[bool],
    options: &FitOptions,
) -> Result<Fit> {
    fit(
        Model::Polynomial {
            degree,
            mask: mask.to_vec(),
        },
        x,
        y,
        options,
    )
}

/// Fit the constant model, a degree-0 polynomial.
pub fn constant(x: &Measurement, y: &Measurement, options: &FitOptions) -> Result<Fit> {
    polynomial(x, y, 0, options)
}

/// Fit `a·x^b`. `x` must be dimensionless.
pub fn power(x: &Measurement, y: &Measurement, options: &FitOptions) -> Result<Fit> {
    fit(Model::Power, x, y, options)
}

/// Fit `a·b^x`. `x` must be dimensionless.
pub fn exponential(x: &Measurement, y: &Measurement, options: &FitOptions) -> Result<Fit> {
    fit(Model::Exponential, x, y, options)
}

/// Fit the logistic model. `x` must be dimensionless.
pub fn logistic_fit(x: &Measurement, y: &Measurement, options: &FitOptions) -> Result<Fit> {
    fit(Model::Logistic, x, y, options)
}

/// Fit the logistic model with its ceiling pinned to 100. `x` must be
/// dimensionless.
pub fn pinned_logistic(x: &Measurement, y: &Measurement, options: &FitOptions) -> Result<Fit> {
    fit(Model::PinnedLogistic, x, y, options)
}
