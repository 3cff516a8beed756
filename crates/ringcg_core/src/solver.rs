//! Conjugate-gradient solve of the regularized normal equations.
//!
//! Solves `(A + αI)·x = f` for a symmetric positive semi-definite operator A
//! (in practice `HᵗH` from [`crate::operator::BandedNormalOperator`]) with
//! no preconditioner. The loop is bounded by [`CgOptions::max_iterations`]
//! and always hands back its latest iterate; whether it actually reached
//! the tolerance is reported in [`CgSolution::converged`].

use ndarray::{Array1, ArrayView1};

use crate::error::{Result, RingError};
use crate::operator::LinearOperator;

// =============================================================================
// Constants
// =============================================================================

/// Iteration cap. A safety bound, not a tuning parameter: the profile
/// systems are low-dimensional and converge in far fewer steps.
pub const DEFAULT_MAX_ITERATIONS: usize = 1_000_000;

/// Absolute tolerance on the residual 2-norm.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

// =============================================================================
// Types
// =============================================================================

/// Options for the conjugate-gradient solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgOptions {
    /// Maximum number of CG steps. Default: 1_000_000
    pub max_iterations: usize,
    /// Stop once `‖r‖₂` drops below this. Default: 1e-7
    pub tolerance: f64,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl CgOptions {
    /// Validate the solver parameters.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RingError::InvalidConfig(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(RingError::InvalidConfig(format!(
                "tolerance must be finite and > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Result of a conjugate-gradient solve.
#[derive(Debug, Clone)]
pub struct CgSolution {
    /// Latest iterate x
    pub solution: Array1<f64>,
    /// Number of CG steps taken
    pub iterations: usize,
    /// `‖r‖₂` of the returned iterate (recursively updated residual)
    pub residual_norm: f64,
    /// Whether `residual_norm < tolerance` was reached
    pub converged: bool,
}

// =============================================================================
// Solver
// =============================================================================

#[inline]
fn l2_norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// `A·w + α·w`
fn apply_shifted<A: LinearOperator>(op: &A, alpha: f64, w: &Array1<f64>) -> Array1<f64> {
    let mut z = op.apply(w.view());
    z.scaled_add(alpha, w);
    z
}

/// Solve `(A + αI)·x = f` by conjugate gradients starting from x₀ = 0.
///
/// Recurrence, with the search direction kept as `w = -p` of the textbook
/// form:
///
/// ```text
/// r = f,  w = -r
/// loop:
///     z = (A + αI)·w
///     a = (r·w) / (w·z)
///     x += a·w
///     r -= a·z          stop if ‖r‖ < tol
///     β = (r·z) / (w·z)
///     w = -r + β·w
/// ```
///
/// A right-hand side that already satisfies the tolerance returns x = 0
/// without iterating. A non-positive or non-finite curvature `w·z` stops
/// the loop early. Neither that nor hitting the iteration cap is an error:
/// the latest iterate is returned with `converged == false`.
pub fn solve_regularized<A: LinearOperator>(
    op: &A,
    alpha: f64,
    rhs: ArrayView1<f64>,
    options: &CgOptions,
) -> Result<CgSolution> {
    options.validate()?;
    let n = op.dim();
    if rhs.len() != n {
        return Err(RingError::DimensionMismatch {
            expected: n,
            got: rhs.len(),
        });
    }

    let mut x = Array1::<f64>::zeros(n);
    // x₀ = 0, so r₀ = f - (A + αI)·x₀ = f.
    let mut r = rhs.to_owned();
    let mut residual_norm = l2_norm(&r);

    if residual_norm < options.tolerance {
        return Ok(CgSolution {
            solution: x,
            iterations: 0,
            residual_norm,
            converged: true,
        });
    }

    let mut w = -&r;

    for iteration in 1..=options.max_iterations {
        let z = apply_shifted(op, alpha, &w);
        let curvature = w.dot(&z);
        if !(curvature.is_finite() && curvature > 0.0) {
            log::warn!(
                "cg breakdown at iteration {}: w·z = {:e}, residual {:e}",
                iteration,
                curvature,
                residual_norm
            );
            return Ok(CgSolution {
                solution: x,
                iterations: iteration - 1,
                residual_norm,
                converged: false,
            });
        }

        let step = r.dot(&w) / curvature;
        x.scaled_add(step, &w);
        r.scaled_add(-step, &z);
        residual_norm = l2_norm(&r);

        if residual_norm < options.tolerance {
            log::debug!(
                "cg converged: n={} alpha={:e} iterations={} residual={:e}",
                n,
                alpha,
                iteration,
                residual_norm
            );
            return Ok(CgSolution {
                solution: x,
                iterations: iteration,
                residual_norm,
                converged: true,
            });
        }

        let beta = r.dot(&z) / curvature;
        w *= beta;
        w -= &r;
    }

    log::warn!(
        "cg hit the iteration cap ({}) with residual {:e}; returning latest iterate",
        options.max_iterations,
        residual_norm
    );
    Ok(CgSolution {
        solution: x,
        iterations: options.max_iterations,
        residual_norm,
        converged: false,
    })
}
