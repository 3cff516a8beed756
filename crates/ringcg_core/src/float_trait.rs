//! Float trait abstraction for f32/f64 sinograms.
//!
//! Slices can be stored in either precision. The profile solve always runs
//! in f64, so the trait mainly carries lossless-enough conversions in and
//! out of the solver's working precision.

use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for floating point types accepted by the stripe remover.
///
/// This trait combines all the bounds needed by the pipeline:
/// - Basic float operations (Float, NumAssign)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Thread safety for per-slice parallelism (Send, Sync)
pub trait RingFloat:
    Float + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Widen to f64 for the profile solve.
    fn as_f64(self) -> f64;
}

impl RingFloat for f32 {
    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl RingFloat for f64 {
    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}
