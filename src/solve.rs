//! Numerical equation solving with propagated uncertainty.
//!
//! A system is a function from the unknowns to a list of [`Equation`]s,
//! each a left and a right [`Measurement`]. The solver drives the scaled
//! residual norm to zero with damped quasi-Newton steps whose Jacobian is
//! read off the dependency graph of the residuals, then propagates the
//! uncertainty of every input through the inverted Jacobian onto the
//! solved unknowns.
//!
//! ```
//! use measurand::{solve, Measurement};
//! # fn main() -> Result<(), measurand::Error> {
//! let a = Measurement::with_uncert(2.0, "1", 0.01)?;
//! let b = Measurement::with_uncert(10.0, "1", 0.1)?;
//! let x = solve::solve_single(
//!     |x| solve::Equation::new(&a * x, b.clone()),
//!     Measurement::new(1.0, "1")?,
//!     &solve::SolveOptions::default(),
//! )?;
//! assert!((x.value().as_scalar().unwrap() - 5.0).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

use crate::measurement::Measurement;
use crate::value::Value;
use crate::{Error, Result};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

/// One equation, `lhs = rhs`. Both sides must share an SI base.
#[derive(Debug, Clone)]
pub struct Equation {
    pub lhs: Measurement,
    pub rhs: Measurement,
}

impl Equation {
    pub fn new(lhs: Measurement, rhs: Measurement) -> Self {
        Self { lhs, rhs }
    }
}

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// The scaled residual norm below which the system counts as solved.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Per-unknown bounds, converted to each unknown's unit before use.
    pub bounds: Option<Vec<(Measurement, Measurement)>>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 200,
            bounds: None,
        }
    }
}

/// Solve a single-unknown equation.
pub fn solve_single<F>(
    mut f: F,
    unknown: Measurement,
    options: &SolveOptions,
) -> Result<Measurement>
where
    F: FnMut(&Measurement) -> Equation,
{
    let mut solved = solve(|xs| vec![f(&xs[0])], vec![unknown], options)?;
    Ok(solved.pop().expect("one unknown in, one unknown out"))
}

/// Solve a system of as many equations as unknowns.
pub fn solve<F>(
    mut f: F,
    mut unknowns: Vec<Measurement>,
    options: &SolveOptions,
) -> Result<Vec<Measurement>>
where
    F: FnMut(&[Measurement]) -> Vec<Equation>,
{
    let n = unknowns.len();
    for unknown in &unknowns {
        if !unknown.value().is_scalar() {
            return Err(Error::ShapeMismatch(
                "the solver works on scalar unknowns".to_string(),
            ));
        }
    }

    let equations = f(&unknowns);
    if equations.len() != n {
        return Err(Error::ArityMismatch {
            expected: n,
            found: equations.len(),
        });
    }
    // Subtracting the sides checks the units of every equation up front.
    let residuals = residuals_of(&equations)?;

    // Scale factors from residual units to SI, fixed for the whole solve.
    let si_scales: Vec<f64> = residuals
        .iter()
        .map(|r| {
            r.unit()
                .converter(&r.unit().si_base())
                .map(|map| map.scale)
        })
        .collect::<Result<_>>()?;

    // Per-equation scales taken from the squared residuals at the initial
    // point, so equations of very different magnitude weigh comparably.
    let scales: Vec<f64> = if n == 1 {
        vec![1.0]
    } else {
        residuals
            .iter()
            .zip(&si_scales)
            .map(|(r, scale)| {
                let v = scalar_value(r) * scale;
                if v == 0.0 {
                    1.0
                } else {
                    v * v
                }
            })
            .collect()
    };

    let bounds = converted_bounds(options, &unknowns)?;

    let objective = |residuals: &[Measurement]| -> f64 {
        residuals
            .iter()
            .zip(&si_scales)
            .zip(&scales)
            .map(|((r, si), s)| {
                let v = scalar_value(r) * si;
                v * v / s
            })
            .sum()
    };

    let mut current = residuals;
    let mut cost = objective(&current);

    for iteration in 0..options.max_iterations {
        if cost < options.tolerance {
            debug!("solver converged after {iteration} iterations, residual norm {cost:.3e}");
            break;
        }
        let jacobian = dependency_jacobian(&current, &unknowns);
        let r = DVector::from_iterator(n, current.iter().map(scalar_value));
        let Some(step) = jacobian.lu().solve(&r) else {
            return Err(Error::SingularSystem);
        };

        let x: Vec<f64> = unknowns.iter().map(scalar_value).collect();
        let mut damping = 1.0;
        let mut accepted = false;
        for _ in 0..25 {
            for (j, unknown) in unknowns.iter_mut().enumerate() {
                let mut candidate = x[j] - damping * step[j];
                if let Some(bounds) = &bounds {
                    candidate = candidate.clamp(bounds[j].0, bounds[j].1);
                }
                unknown.set_value(Value::Scalar(candidate));
            }
            let trial = residuals_of(&f(&unknowns))?;
            let trial_cost = objective(&trial);
            if trial_cost < cost {
                current = trial;
                cost = trial_cost;
                accepted = true;
                break;
            }
            damping *= 0.5;
        }
        if !accepted {
            // Restore the best point and stop stepping.
            for (j, unknown) in unknowns.iter_mut().enumerate() {
                unknown.set_value(Value::Scalar(x[j]));
            }
            current = residuals_of(&f(&unknowns))?;
            cost = objective(&current);
            if cost >= options.tolerance {
                warn!("solver stalled with residual norm {cost:.3e}");
            }
            break;
        }
    }

    // Propagate input uncertainties through the inverted Jacobian.
    let jacobian = dependency_jacobian(&current, &unknowns);
    let residual_refs: Vec<&Measurement> = current.iter().collect();
    if n == 1 {
        let j = jacobian[(0, 0)];
        if j == 0.0 {
            return Err(Error::SingularSystem);
        }
        let grads = vec![Value::Scalar(1.0 / j)];
        unknowns[0].adopt_dependencies(&residual_refs, &grads)?;
    } else {
        let inverse = jacobian.try_inverse().ok_or(Error::SingularSystem)?;
        for (i, unknown) in unknowns.iter_mut().enumerate() {
            let grads: Vec<Value> = (0..n).map(|k| Value::Scalar(inverse[(i, k)])).collect();
            unknown.adopt_dependencies(&residual_refs, &grads)?;
        }
    }
    Ok(unknowns)
}

fn residuals_of(equations: &[Equation]) -> Result<Vec<Measurement>> {
    equations
        .iter()
        .map(|eq| eq.lhs.try_sub(&eq.rhs))
        .collect()
}

fn scalar_value(m: &Measurement) -> f64 {
    m.value().as_scalar().unwrap_or(f64::NAN)
}

/// The Jacobian `∂rᵢ/∂xⱼ` read off the dependency maps. Entries absent from
/// a residual's map are zero.
fn dependency_jacobian(residuals: &[Measurement], unknowns: &[Measurement]) -> DMatrix<f64> {
    let n = unknowns.len();
    DMatrix::from_fn(n, n, |i, j| {
        residuals[i]
            .gradient_for(&unknowns[j])
            .and_then(Value::as_scalar)
            .unwrap_or(0.0)
    })
}

fn converted_bounds(
    options: &SolveOptions,
    unknowns: &[Measurement],
) -> Result<Option<Vec<(f64, f64)>>> {
    let Some(bounds) = &options.bounds else {
        return Ok(None);
    };
    if bounds.len() != unknowns.len() {
        return Err(Error::ArityMismatch {
            expected: unknowns.len(),
            found: bounds.len(),
        });
    }
    let mut out = Vec::with_capacity(bounds.len());
    for ((lo, hi), unknown) in bounds.iter().zip(unknowns) {
        let unit = unknown.unit().to_string();
        let mut lo = lo.clone();
        let mut hi = hi.clone();
        lo.convert(&unit)?;
        hi.convert(&unit)?;
        out.push((scalar_value(&lo), scalar_value(&hi)));
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar(m: &Measurement) -> f64 {
        m.value().as_scalar().unwrap()
    }

    fn sigma(m: &Measurement) -> f64 {
        m.uncert().as_scalar().unwrap()
    }

    #[test]
    fn test_linear_equation() {
        let a = Measurement::with_uncert(23.7, "1", 0.1).unwrap();
        let b = Measurement::with_uncert(943.0, "1", 12.5).unwrap();
        let x = solve_single(
            |x| Equation::new(&a * x, b.clone()),
            Measurement::new(1.0, "1").unwrap(),
            &SolveOptions::default(),
        )
        .unwrap();

        let expected = 943.0 / 23.7;
        assert_relative_eq!(scalar(&x), expected, max_relative = 1e-9);
        let expected_sigma =
            expected * ((0.1f64 / 23.7).powi(2) + (12.5f64 / 943.0).powi(2)).sqrt();
        assert_relative_eq!(sigma(&x), expected_sigma, max_relative = 1e-6);
    }

    #[test]
    fn test_two_equation_system() {
        let b1 = Measurement::with_uncert(3.0, "1", 0.1).unwrap();
        let b2 = Measurement::with_uncert(1.0, "1", 0.2).unwrap();
        let solved = solve(
            |xs| {
                vec![
                    Equation::new(&xs[0] + &xs[1], b1.clone()),
                    Equation::new(&xs[0] - &xs[1], b2.clone()),
                ]
            },
            vec![
                Measurement::new(0.0, "1").unwrap(),
                Measurement::new(0.0, "1").unwrap(),
            ],
            &SolveOptions::default(),
        )
        .unwrap();

        assert_relative_eq!(scalar(&solved[0]), 2.0, max_relative = 1e-9);
        assert_relative_eq!(scalar(&solved[1]), 1.0, max_relative = 1e-9);
        // x = (b1 + b2)/2, so σ_x = √((σ₁/2)² + (σ₂/2)²)
        let expected = ((0.05f64).powi(2) + (0.1f64).powi(2)).sqrt();
        assert_relative_eq!(sigma(&solved[0]), expected, max_relative = 1e-6);
    }

    #[test]
    fn test_nonlinear_with_bounds() {
        let four = Measurement::new(4.0, "1").unwrap();
        let x = solve_single(
            |x| Equation::new(x * x, four.clone()),
            Measurement::new(1.0, "1").unwrap(),
            &SolveOptions {
                bounds: Some(vec![(
                    Measurement::new(0.5, "1").unwrap(),
                    Measurement::new(10.0, "1").unwrap(),
                )]),
                ..SolveOptions::default()
            },
        )
        .unwrap();
        assert_relative_eq!(scalar(&x), 2.0, max_relative = 1e-9);
        assert!(scalar(&x) >= 0.5 && scalar(&x) <= 10.0);
    }

    #[test]
    fn test_units_absorbed_between_sides() {
        // 2 x [L/min] = 0.24 [m3/h] has the solution x = 2.
        let rate = Measurement::new(2.0, "L/min").unwrap();
        let target = Measurement::new(0.24, "m3/h").unwrap();
        let x = solve_single(
            |x| Equation::new(&rate * x, target.clone()),
            Measurement::new(1.0, "1").unwrap(),
            &SolveOptions::default(),
        )
        .unwrap();
        assert_relative_eq!(scalar(&x), 2.0, max_relative = 1e-6);
    }

    #[test]
    fn test_arity_mismatch() {
        let one = Measurement::new(1.0, "1").unwrap();
        let result = solve(
            |xs| vec![Equation::new(xs[0].clone(), one.clone())],
            vec![
                Measurement::new(0.0, "1").unwrap(),
                Measurement::new(0.0, "1").unwrap(),
            ],
            &SolveOptions::default(),
        );
        assert!(matches!(
            result,
            Err(Error::ArityMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_incompatible_equation_sides() {
        let metre = Measurement::new(1.0, "m").unwrap();
        let second = Measurement::new(1.0, "s").unwrap();
        let result = solve_single(
            |x| Equation::new(x + &metre, second.clone()),
            Measurement::new(0.0, "m").unwrap(),
            &SolveOptions::default(),
        );
        assert!(matches!(result, Err(Error::IncompatibleUnits { .. })));
    }

    #[test]
    fn test_singular_system() {
        let one = Measurement::new(1.0, "1").unwrap();
        // Two identical equations leave the Jacobian rank deficient.
        let result = solve(
            |xs| {
                vec![
                    Equation::new(&xs[0] + &xs[1], one.clone()),
                    Equation::new(&xs[0] + &xs[1], one.clone()),
                ]
            },
            vec![
                Measurement::new(0.0, "1").unwrap(),
                Measurement::new(0.0, "1").unwrap(),
            ],
            &SolveOptions::default(),
        );
        assert!(matches!(result, Err(Error::SingularSystem)));
    }

    #[test]
    fn test_nonlinear_uncertainty_matches_closed_form() {
        // a·x² = b has the solution (b/a)^(1/2); the solver's propagated
        // uncertainty must agree with the one from direct arithmetic.
        let a = Measurement::with_uncert(23.7, "1", 0.1).unwrap();
        let b = Measurement::with_uncert(943.0, "1", 12.5).unwrap();
        let x = solve_single(
            |x| Equation::new(&a * &(x * x), b.clone()),
            Measurement::new(1.0, "1").unwrap(),
            &SolveOptions::default(),
        )
        .unwrap();

        let correct = b.try_div(&a).unwrap().sqrt().unwrap();
        assert_relative_eq!(scalar(&x), scalar(&correct), max_relative = 1e-6);
        assert_relative_eq!(sigma(&x), sigma(&correct), max_relative = 1e-3);
    }

    #[test]
    fn test_two_linear_equations_uncertainty() {
        let a = Measurement::with_uncert(23.7, "1", 0.1).unwrap();
        let b = Measurement::with_uncert(943.0, "1", 12.5).unwrap();
        let c = Measurement::with_uncert(7.5, "1", 0.05).unwrap();
        let d = Measurement::with_uncert(638.0, "1", 19.7).unwrap();
        let e = Measurement::with_uncert(293.4, "1", 0.3).unwrap();
        let f = Measurement::with_uncert(156.2, "1", 4.2).unwrap();

        let solved = solve(
            |xs| {
                vec![
                    Equation::new(&a * &xs[0] + &b * &xs[1], c.clone()),
                    Equation::new(&d * &xs[0] + &e * &xs[1], f.clone()),
                ]
            },
            vec![
                Measurement::new(1.0, "1").unwrap(),
                Measurement::new(1.0, "1").unwrap(),
            ],
            &SolveOptions::default(),
        )
        .unwrap();

        let y_exact = (&f - &d * &c / &a) / (&e - &d * &b / &a);
        let x_exact = (&c - &b * &y_exact) / &a;
        assert_relative_eq!(scalar(&solved[0]), scalar(&x_exact), max_relative = 1e-6);
        assert_relative_eq!(scalar(&solved[1]), scalar(&y_exact), max_relative = 1e-6);
        assert_relative_eq!(sigma(&solved[0]), sigma(&x_exact), max_relative = 1e-3);
        assert_relative_eq!(sigma(&solved[1]), sigma(&y_exact), max_relative = 1e-3);
    }

    #[test]
    fn test_bounded_solution_clamps_with_units() {
        // The free solution is (943/23.7)^(1/2) ≈ 6.3 L/min; the upper
        // bound pins the unknown at 4.
        let a = Measurement::with_uncert(23.7, "mbar-min2/L2", 0.1).unwrap();
        let b = Measurement::with_uncert(943.0, "mbar", 12.5).unwrap();
        let x = solve_single(
            |x| Equation::new(&a * &(x * x), b.clone()),
            Measurement::new(100.0, "L/min").unwrap(),
            &SolveOptions {
                bounds: Some(vec![(
                    Measurement::new(-10.0, "L/min").unwrap(),
                    Measurement::new(4.0, "L/min").unwrap(),
                )]),
                ..SolveOptions::default()
            },
        )
        .unwrap();
        assert_relative_eq!(scalar(&x), 4.0, max_relative = 1e-9);
        assert_eq!(x.unit().to_string(), "L/min");
    }

    #[test]
    fn test_residuals_below_tolerance() {
        let c = Measurement::new(7.5, "1").unwrap();
        let x = solve_single(
            |x| Equation::new(x.clone() + x.powi(3), c.clone()),
            Measurement::new(1.0, "1").unwrap(),
            &SolveOptions::default(),
        )
        .unwrap();
        let x_val = scalar(&x);
        let residual = (x_val + x_val.powi(3) - 7.5).abs();
        assert!(residual * residual < 1e-12);
    }
}
