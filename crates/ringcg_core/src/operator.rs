//! Implicit banded normal-equations operator.
//!
//! For a stencil h of length k and a signal of length R, H is the
//! (R - k + 1) x R Toeplitz matrix whose rows are h slid across the signal.
//! `HᵗH·x` is evaluated as two 1-D convolutions in O(R·k) instead of a
//! dense R x R product:
//!
//! 1. full convolution of x with the reversed stencil, keeping the valid
//!    segment `[k - 1, R)`, which is exactly `H·x`;
//! 2. full convolution of that segment with h, which is `Hᵗ·(H·x)` and has
//!    length R again.
//!
//! Boundary samples follow zero-padded convolution semantics, so the first
//! and last k - 1 entries see fewer stencil rows than interior entries.

use ndarray::{s, Array1, ArrayView1};

use crate::kernel::DifferenceKernel;

/// A symmetric linear map on vectors of a fixed length.
///
/// The CG solver only needs to apply the operator, never to see its entries.
pub trait LinearOperator {
    /// Length of the vectors the operator acts on.
    fn dim(&self) -> usize;

    /// Compute `A·x`. `x.len()` must equal [`LinearOperator::dim`].
    fn apply(&self, x: ArrayView1<f64>) -> Array1<f64>;
}

/// Full discrete convolution, output length `x.len() + h.len() - 1`.
///
/// `out[n] = sum_j x[j] * h[n - j]`. Either input being empty yields an
/// empty output.
pub fn convolve_full(x: ArrayView1<f64>, h: &[f64]) -> Array1<f64> {
    if x.is_empty() || h.is_empty() {
        return Array1::zeros(0);
    }

    let mut out = Array1::zeros(x.len() + h.len() - 1);
    for (j, &xj) in x.iter().enumerate() {
        if xj == 0.0 {
            continue;
        }
        let mut window = out.slice_mut(s![j..j + h.len()]);
        for (o, &hk) in window.iter_mut().zip(h.iter()) {
            *o += xj * hk;
        }
    }
    out
}

/// `HᵗH` for a finite-difference stencil, applied without materializing H.
#[derive(Debug, Clone)]
pub struct BandedNormalOperator {
    kernel: DifferenceKernel,
    reversed: Vec<f64>,
    len: usize,
}

impl BandedNormalOperator {
    /// Operator for signals of length `len` penalized by `kernel`.
    pub fn new(kernel: DifferenceKernel, len: usize) -> Self {
        let reversed = kernel.coefficients().iter().rev().copied().collect();
        Self {
            kernel,
            reversed,
            len,
        }
    }

    /// Stencil backing this operator.
    pub fn kernel(&self) -> DifferenceKernel {
        self.kernel
    }

    /// `H·x`: the stencil correlated with x over its valid range.
    ///
    /// Returns `R - k + 1` samples, or none when the signal is shorter than
    /// the stencil.
    pub fn forward(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let k = self.reversed.len();
        let r = x.len();
        if r < k {
            return Array1::zeros(0);
        }
        let full = convolve_full(x, &self.reversed);
        full.slice(s![k - 1..r]).to_owned()
    }

    /// Right-hand side `f = -HᵗH·pp` for a mean detector profile `pp`.
    pub fn rhs(&self, profile: ArrayView1<f64>) -> Array1<f64> {
        -self.apply(profile)
    }
}

impl LinearOperator for BandedNormalOperator {
    fn dim(&self) -> usize {
        self.len
    }

    fn apply(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let hx = self.forward(x);
        if hx.is_empty() {
            // H has no rows, so HᵗH is the zero map.
            return Array1::zeros(x.len());
        }
        convolve_full(hx.view(), self.kernel.coefficients())
    }
}
