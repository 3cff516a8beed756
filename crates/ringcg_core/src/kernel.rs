//! Finite-difference stencils used to penalize non-smooth detector profiles.
//!
//! Each stencil approximates the m-th derivative with accuracy order n and
//! is applied as a correlation kernel, so coefficient order matters.

use crate::error::{Result, RingError};

// =============================================================================
// Coefficient Table
// =============================================================================

const D1_A1: [f64; 2] = [1.0, -1.0];
const D1_A2: [f64; 3] = [-1.5, 2.0, -0.5];
const D1_A3: [f64; 4] = [-11.0 / 6.0, 3.0, -1.5, 1.0 / 3.0];
const D2_A1: [f64; 3] = [-1.0, 2.0, -1.0];
const D2_A2: [f64; 4] = [2.0, -5.0, 4.0, -1.0];
const D3_A1: [f64; 4] = [-1.0, 3.0, -3.0, 1.0];

/// Highest derivative order in the table. Accuracy orders satisfy n <= 4 - m.
const MAX_DERIVATIVE: usize = 3;

/// A finite-difference stencil selected by (derivative order, accuracy order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DifferenceKernel {
    /// m=1, n=1: `[1, -1]`
    FirstOrderAccuracy1,
    /// m=1, n=2: `[-3/2, 2, -1/2]`
    FirstOrderAccuracy2,
    /// m=1, n=3: `[-11/6, 3, -3/2, 1/3]`
    FirstOrderAccuracy3,
    /// m=2, n=1: `[-1, 2, -1]`
    SecondOrderAccuracy1,
    /// m=2, n=2: `[2, -5, 4, -1]`
    SecondOrderAccuracy2,
    /// m=3, n=1: `[-1, 3, -3, 1]`
    ThirdOrderAccuracy1,
}

/// First-derivative stencil used by the slice pipeline.
pub const FIRST_ORDER: DifferenceKernel = DifferenceKernel::FirstOrderAccuracy1;

/// Second-derivative stencil used by the slice pipeline.
pub const SECOND_ORDER: DifferenceKernel = DifferenceKernel::SecondOrderAccuracy1;

impl DifferenceKernel {
    /// Every entry of the table, ordered by (m, n).
    pub const ALL: [DifferenceKernel; 6] = [
        DifferenceKernel::FirstOrderAccuracy1,
        DifferenceKernel::FirstOrderAccuracy2,
        DifferenceKernel::FirstOrderAccuracy3,
        DifferenceKernel::SecondOrderAccuracy1,
        DifferenceKernel::SecondOrderAccuracy2,
        DifferenceKernel::ThirdOrderAccuracy1,
    ];

    /// Look up the stencil for derivative order `derivative` (m) and accuracy
    /// order `accuracy` (n).
    ///
    /// Valid pairs are m in 1..=3 with 1 <= n <= 4 - m. Anything else is a
    /// caller bug and is reported as [`RingError::InvalidKernelIndex`].
    pub fn new(derivative: usize, accuracy: usize) -> Result<Self> {
        let invalid = RingError::InvalidKernelIndex {
            derivative,
            accuracy,
        };
        if derivative == 0 || derivative > MAX_DERIVATIVE || accuracy == 0 {
            return Err(invalid);
        }
        if accuracy > MAX_DERIVATIVE + 1 - derivative {
            return Err(invalid);
        }

        let kernel = match (derivative, accuracy) {
            (1, 1) => DifferenceKernel::FirstOrderAccuracy1,
            (1, 2) => DifferenceKernel::FirstOrderAccuracy2,
            (1, 3) => DifferenceKernel::FirstOrderAccuracy3,
            (2, 1) => DifferenceKernel::SecondOrderAccuracy1,
            (2, 2) => DifferenceKernel::SecondOrderAccuracy2,
            (3, 1) => DifferenceKernel::ThirdOrderAccuracy1,
            _ => return Err(invalid),
        };
        Ok(kernel)
    }

    /// Stencil coefficients in correlation order.
    pub fn coefficients(self) -> &'static [f64] {
        match self {
            DifferenceKernel::FirstOrderAccuracy1 => &D1_A1,
            DifferenceKernel::FirstOrderAccuracy2 => &D1_A2,
            DifferenceKernel::FirstOrderAccuracy3 => &D1_A3,
            DifferenceKernel::SecondOrderAccuracy1 => &D2_A1,
            DifferenceKernel::SecondOrderAccuracy2 => &D2_A2,
            DifferenceKernel::ThirdOrderAccuracy1 => &D3_A1,
        }
    }

    /// Derivative order m.
    pub fn derivative_order(self) -> usize {
        match self {
            DifferenceKernel::FirstOrderAccuracy1
            | DifferenceKernel::FirstOrderAccuracy2
            | DifferenceKernel::FirstOrderAccuracy3 => 1,
            DifferenceKernel::SecondOrderAccuracy1 | DifferenceKernel::SecondOrderAccuracy2 => 2,
            DifferenceKernel::ThirdOrderAccuracy1 => 3,
        }
    }

    /// Accuracy order n.
    pub fn accuracy_order(self) -> usize {
        match self {
            DifferenceKernel::FirstOrderAccuracy1
            | DifferenceKernel::SecondOrderAccuracy1
            | DifferenceKernel::ThirdOrderAccuracy1 => 1,
            DifferenceKernel::FirstOrderAccuracy2 | DifferenceKernel::SecondOrderAccuracy2 => 2,
            DifferenceKernel::FirstOrderAccuracy3 => 3,
        }
    }

    /// Stencil length k.
    pub fn width(self) -> usize {
        self.coefficients().len()
    }
}
