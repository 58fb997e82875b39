//! Orthogonal-distance regression core.
//!
//! Minimises the weighted orthogonal objective
//!
//! ```text
//! Σᵢ [ ((yᵢ − f(β; xᵢ + δᵢ))/σ_yᵢ)² + (δᵢ/σ_xᵢ)² ]
//! ```
//!
//! over the parameter vector `β` and the per-point adjustments `δ`, by
//! Levenberg-Marquardt on the stacked residual vector. Reports the fitted
//! parameters, their unscaled covariance (the inverse normal matrix) and the
//! residual-scaled standard errors.

use crate::{Error, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};

pub(crate) struct OdrProblem<'a> {
    /// The model value `f(β, x)`.
    pub f: &'a dyn Fn(&[f64], f64) -> f64,
    /// The model slope `∂f/∂x`, used for the adjustment columns.
    pub df_dx: &'a dyn Fn(&[f64], f64) -> f64,
}

pub(crate) struct OdrOutput {
    pub beta: Vec<f64>,
    /// Inverse normal matrix, restricted to the parameter block.
    pub cov_beta: DMatrix<f64>,
    /// Residual-scaled standard error per parameter.
    pub sd_beta: Vec<f64>,
}

const MAX_ITERATIONS: usize = 200;
const MAX_DAMPING_STEPS: usize = 30;
const COST_TOLERANCE: f64 = 1e-14;

pub(crate) fn orthogonal_distance_fit(
    problem: &OdrProblem,
    x: &[f64],
    y: &[f64],
    sx: &[f64],
    sy: &[f64],
    beta0: &[f64],
) -> Result<OdrOutput> {
    let n = x.len();
    let p = beta0.len();

    // θ = [β; δ], with the adjustments starting at zero.
    let mut theta = DVector::zeros(p + n);
    for (k, b) in beta0.iter().enumerate() {
        theta[k] = *b;
    }

    let residual = |theta: &DVector<f64>| -> DVector<f64> {
        let beta = theta.as_slice()[..p].to_vec();
        let mut r = DVector::zeros(2 * n);
        for i in 0..n {
            let delta = theta[p + i];
            r[i] = (y[i] - (problem.f)(&beta, x[i] + delta)) / sy[i];
            r[n + i] = delta / sx[i];
        }
        r
    };

    let jacobian = |theta: &DVector<f64>| -> DMatrix<f64> {
        let beta = theta.as_slice()[..p].to_vec();
        let mut j = DMatrix::zeros(2 * n, p + n);
        // Parameter columns by central differences.
        for k in 0..p {
            let h = 1e-7 * beta[k].abs().max(1.0);
            let mut plus = beta.clone();
            let mut minus = beta.clone();
            plus[k] += h;
            minus[k] -= h;
            for i in 0..n {
                let xi = x[i] + theta[p + i];
                let df = ((problem.f)(&plus, xi) - (problem.f)(&minus, xi)) / (2.0 * h);
                j[(i, k)] = -df / sy[i];
            }
        }
        // Adjustment columns from the analytic slope.
        for i in 0..n {
            let xi = x[i] + theta[p + i];
            j[(i, p + i)] = -(problem.df_dx)(&beta, xi) / sy[i];
            j[(n + i, p + i)] = 1.0 / sx[i];
        }
        j
    };

    let mut r = residual(&theta);
    let mut cost = r.dot(&r);
    let mut lambda = 1e-3;

    for iteration in 0..MAX_ITERATIONS {
        let j = jacobian(&theta);
        let normal = j.transpose() * &j;
        let gradient = j.transpose() * &r;

        let mut improved = false;
        for _ in 0..MAX_DAMPING_STEPS {
            let mut damped = normal.clone();
            for k in 0..p + n {
                let d = normal[(k, k)];
                damped[(k, k)] = d + lambda * if d > 0.0 { d } else { 1.0 };
            }
            let Some(step) = damped.lu().solve(&(-&gradient)) else {
                lambda *= 10.0;
                continue;
            };
            let candidate = &theta + &step;
            let r_new = residual(&candidate);
            let cost_new = r_new.dot(&r_new);
            if cost_new <= cost {
                let gain = cost - cost_new;
                theta = candidate;
                r = r_new;
                cost = cost_new;
                lambda = (lambda * 0.3).max(1e-12);
                improved = true;
                if gain <= COST_TOLERANCE * (cost + 1e-30) {
                    debug!("odr converged after {} iterations, cost {cost:.3e}", iteration + 1);
                    return finish(&theta, cost, n, p, &jacobian);
                }
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            debug!("odr stalled after {} iterations, cost {cost:.3e}", iteration + 1);
            break;
        }
    }
    finish(&theta, cost, n, p, &jacobian)
}

fn finish(
    theta: &DVector<f64>,
    cost: f64,
    n: usize,
    p: usize,
    jacobian: &dyn Fn(&DVector<f64>) -> DMatrix<f64>,
) -> Result<OdrOutput> {
    let j = jacobian(theta);
    let normal = j.transpose() * &j;
    let inverse = normal.try_inverse().ok_or(Error::SingularSystem)?;
    let cov_beta = inverse.view((0, 0), (p, p)).into_owned();
    let dof = n.saturating_sub(p).max(1) as f64;
    let res_var = cost / dof;
    let sd_beta = (0..p)
        .map(|k| (cov_beta[(k, k)].max(0.0) * res_var).sqrt())
        .collect();
    Ok(OdrOutput {
        beta: theta.as_slice()[..p].to_vec(),
        cov_beta,
        sd_beta,
    })
}
