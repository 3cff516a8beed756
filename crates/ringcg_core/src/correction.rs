//! Whole-slice and block-partitioned stripe correction.
//!
//! Both strategies work on a transposed f64 copy of the slice, the
//! *working frame*: rows are detector pixels (length R), columns are
//! projection angles (length N). For the data being corrected they
//!
//! 1. zero every non-finite sample,
//! 2. derive `α_reg = 1 / (2·(max colsum - min colsum))` from the per-angle
//!    column sums,
//! 3. take the mean detector profile `pp` (mean over angles, length R),
//! 4. solve `(HᵗH + α_reg·I)·q = -HᵗH·pp` for the correction profile q,
//! 5. add q to every angle column.
//!
//! Adding q flattens the high-frequency part of `pp`, which is exactly
//! where a vertical stripe lives.

use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewMut2, Axis};

use crate::error::{Result, RingError};
use crate::float_trait::RingFloat;
use crate::kernel::DifferenceKernel;
use crate::operator::BandedNormalOperator;
use crate::solver::{solve_regularized, CgOptions};

// =============================================================================
// Types
// =============================================================================

/// What to do when every column sum of the data is identical, which leaves
/// `α_reg` undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlatColumnPolicy {
    /// Fail with [`RingError::DegenerateRegularization`].
    #[default]
    Reject,
    /// Treat `α_reg` as infinite. Its limit is a zero profile, so the data
    /// is returned cleaned but otherwise uncorrected.
    Skip,
}

/// Options shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorrectionOptions {
    /// Conjugate-gradient parameters
    pub cg: CgOptions,
    /// Handling of zero column-sum range
    pub flat_columns: FlatColumnPolicy,
}

impl CorrectionOptions {
    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        self.cg.validate()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Transposed f64 copy of an (angles x pixels) slice with non-finite
/// samples set to zero.
fn working_frame<F: RingFloat>(slice: ArrayView2<F>) -> Array2<f64> {
    slice.t().mapv(|v| {
        let v = v.as_f64();
        if v.is_finite() {
            v
        } else {
            0.0
        }
    })
}

/// Regularization weight from the per-angle column sums of working-frame
/// data (pixels x angles).
///
/// Returns `None` when the sums have no dynamic range (or it is not
/// finite), in which case the weight is undefined.
pub fn regularization_from_column_sums(data: ArrayView2<f64>) -> Option<f64> {
    let sums = data.sum_axis(Axis(0));
    let (lo, hi) = sums
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if range.is_finite() && range > 0.0 {
        Some(1.0 / (2.0 * range))
    } else {
        None
    }
}

/// Mean detector profile: the mean over angles of each pixel row.
fn mean_profile(data: ArrayView2<f64>) -> Array1<f64> {
    let angles = data.ncols().max(1) as f64;
    data.sum_axis(Axis(1)) / angles
}

/// Solve for the correction profile of one working-frame block and add it
/// to every angle column of that block.
///
/// `angles` is the block's angle range within the full slice, used for
/// diagnostics only.
fn correct_block_in_place(
    mut block: ArrayViewMut2<f64>,
    kernel: DifferenceKernel,
    options: &CorrectionOptions,
    angles: (usize, usize),
) -> Result<()> {
    let alpha = match regularization_from_column_sums(block.view()) {
        Some(alpha) => alpha,
        None => match options.flat_columns {
            FlatColumnPolicy::Reject => {
                return Err(RingError::DegenerateRegularization {
                    start: angles.0,
                    end: angles.1,
                })
            }
            FlatColumnPolicy::Skip => {
                log::debug!(
                    "angles {}..{}: flat column sums, leaving block uncorrected",
                    angles.0,
                    angles.1
                );
                return Ok(());
            }
        },
    };

    let pixels = block.nrows();
    let op = BandedNormalOperator::new(kernel, pixels);
    let pp = mean_profile(block.view());
    let f = op.rhs(pp.view());
    let solved = solve_regularized(&op, alpha, f.view(), &options.cg)?;

    log::debug!(
        "angles {}..{} kernel=({}, {}) alpha_reg={:e} cg_iterations={} converged={}",
        angles.0,
        angles.1,
        kernel.derivative_order(),
        kernel.accuracy_order(),
        alpha,
        solved.iterations,
        solved.converged
    );

    // Broadcast q (one value per pixel) across the block's angles.
    block += &solved.solution.insert_axis(Axis(1));
    Ok(())
}

fn check_not_empty<F>(slice: &ArrayView2<F>) -> Result<()> {
    let (angles, pixels) = slice.dim();
    if angles == 0 || pixels == 0 {
        return Err(RingError::EmptySlice {
            shape: (angles, pixels),
        });
    }
    Ok(())
}

// =============================================================================
// Strategies
// =============================================================================

/// Correct a whole (angles x pixels) slice with a single profile.
///
/// Returns the corrected slice in the input orientation and precision.
/// Non-finite input samples come back as `0 + q`.
pub fn correct_global<F: RingFloat>(
    slice: ArrayView2<F>,
    kernel: DifferenceKernel,
    options: &CorrectionOptions,
) -> Result<Array2<F>> {
    options.validate()?;
    check_not_empty(&slice)?;

    let mut work = working_frame(slice);
    let angles = work.ncols();
    correct_block_in_place(work.view_mut(), kernel, options, (0, angles))?;

    Ok(work.t().mapv(F::from_f64_c))
}

/// Correct a slice block by block along the angle axis.
///
/// The angles are split into `nblocks` contiguous ranges of
/// `angles / nblocks` each; the remainder is folded into the last range so
/// every angle belongs to exactly one block. Each block gets its own
/// `α_reg` and its own profile, with nothing carried between blocks.
pub fn correct_blocks<F: RingFloat>(
    slice: ArrayView2<F>,
    kernel: DifferenceKernel,
    nblocks: usize,
    options: &CorrectionOptions,
) -> Result<Array2<F>> {
    options.validate()?;
    check_not_empty(&slice)?;

    let angles = slice.nrows();
    if nblocks == 0 || nblocks > angles {
        return Err(RingError::InvalidBlockCount { nblocks, angles });
    }

    let step = angles / nblocks;
    let mut work = working_frame(slice);

    for k in 0..nblocks {
        let start = k * step;
        let end = if k + 1 == nblocks {
            angles
        } else {
            (k + 1) * step
        };
        let block = work.slice_mut(s![.., start..end]);
        correct_block_in_place(block, kernel, options, (start, end))?;
    }

    Ok(work.t().mapv(F::from_f64_c))
}
