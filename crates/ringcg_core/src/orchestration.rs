//! Slice pipeline and volume driver for stripe removal.
//!
//! Per slice, in linear intensity space:
//! 1. attenuation `sino = -ln(I)`
//! 2. two corrections of `sino`, one with the first-derivative stencil (d1)
//!    and one with the second-derivative stencil (d2), either whole-slice
//!    (`nblocks == 0`) or block-partitioned along the angle axis
//! 3. `p = d1 ⊙ d2`, `d = sqrt(p + α_damp·|min p|)`
//! 4. back to intensity `exp(-d)`, written over the slice
//!
//! No state survives between slices. The volume driver runs the selected
//! slices on rayon workers, each holding an exclusive view of its own slice.

use ndarray::{Array2, ArrayView2, ArrayViewMut2, ArrayViewMut3, Axis};
use rayon::prelude::*;

use crate::correction::{correct_blocks, correct_global, CorrectionOptions, FlatColumnPolicy};
use crate::error::{Result, RingError};
use crate::float_trait::RingFloat;
use crate::kernel::{FIRST_ORDER, SECOND_ORDER};
use crate::solver::{CgOptions, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

// =============================================================================
// Constants
// =============================================================================

/// Default block count (0 = whole-slice correction)
const DEFAULT_NBLOCKS: usize = 0;

/// Default damping factor for combining the two corrections
const DEFAULT_ALPHA_DAMP: f64 = 0.01;

// =============================================================================
// Types
// =============================================================================

/// Configuration for stripe removal.
///
/// Use `Default::default()` for whole-slice correction with light damping.
#[derive(Debug, Clone)]
pub struct RingConfig<F: RingFloat> {
    /// Number of angle blocks; 0 corrects the whole slice at once. Default: 0
    pub nblocks: usize,
    /// Damping factor α_damp. Default: 0.01
    pub alpha_damp: F,
    /// CG iteration cap. Default: 1_000_000
    pub cg_max_iterations: usize,
    /// CG residual tolerance. Default: 1e-7
    pub cg_tolerance: f64,
    /// Handling of slices whose column sums are all equal. Default: Reject
    pub flat_columns: FlatColumnPolicy,
}

impl<F: RingFloat> Default for RingConfig<F> {
    fn default() -> Self {
        Self {
            nblocks: DEFAULT_NBLOCKS,
            alpha_damp: F::from_f64_c(DEFAULT_ALPHA_DAMP),
            cg_max_iterations: DEFAULT_MAX_ITERATIONS,
            cg_tolerance: DEFAULT_TOLERANCE,
            flat_columns: FlatColumnPolicy::default(),
        }
    }
}

impl<F: RingFloat> RingConfig<F> {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with the two parameters the pipeline is usually driven by.
    pub fn with_params(nblocks: usize, alpha_damp: F) -> Self {
        Self {
            nblocks,
            alpha_damp,
            ..Self::default()
        }
    }

    /// Validate the configuration parameters.
    ///
    /// `nblocks` can only be checked against a slice, so it is validated
    /// when the block strategy runs.
    pub fn validate(&self) -> Result<()> {
        if !self.alpha_damp.is_finite() || self.alpha_damp < F::zero() {
            return Err(RingError::InvalidConfig(format!(
                "alpha_damp must be finite and >= 0, got {:?}",
                self.alpha_damp
            )));
        }
        self.correction_options().validate()
    }

    /// Options handed to the correction strategies.
    pub fn correction_options(&self) -> CorrectionOptions {
        CorrectionOptions {
            cg: CgOptions {
                max_iterations: self.cg_max_iterations,
                tolerance: self.cg_tolerance,
            },
            flat_columns: self.flat_columns,
        }
    }
}

// =============================================================================
// Pipeline Steps
// =============================================================================

/// Linear intensity to attenuation, `-ln(I)`.
///
/// Non-positive intensities give `inf` or NaN; the strategies zero those.
pub fn to_attenuation<F: RingFloat>(intensity: ArrayView2<F>) -> Array2<F> {
    intensity.mapv(|v| -v.ln())
}

/// Attenuation back to linear intensity, `exp(-d)`.
pub fn to_intensity<F: RingFloat>(attenuation: ArrayView2<F>) -> Array2<F> {
    attenuation.mapv(|v| (-v).exp())
}

/// Combine the first- and second-order corrections into a non-negative
/// magnitude: `d = sqrt(max(p + α_damp·|min p|, 0))` with `p = d1 ⊙ d2`.
///
/// `min p` is taken over finite entries only. The clamp keeps `d` real when
/// `α_damp < 1` and `min p < 0`.
pub fn combine_corrections<F: RingFloat>(
    d1: ArrayView2<F>,
    d2: ArrayView2<F>,
    alpha_damp: F,
) -> Result<Array2<F>> {
    if d1.dim() != d2.dim() {
        return Err(RingError::DimensionMismatch {
            expected: d1.len(),
            got: d2.len(),
        });
    }

    let p = &d1 * &d2;
    let p_min = p
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(F::infinity(), |a, b| if b < a { b } else { a });
    let shift = if p_min.is_finite() {
        alpha_damp * p_min.abs()
    } else {
        F::zero()
    };

    Ok(p.mapv(|v| (v + shift).max(F::zero()).sqrt()))
}

// =============================================================================
// Main Entry Points
// =============================================================================

/// Remove stripes from one (angles x pixels) slice of linear intensities.
///
/// Returns a new slice of the same shape and precision.
///
/// # Example
///
/// ```
/// use ndarray::Array2;
/// use ringcg_core::{remove_stripes, RingConfig};
///
/// let slice = Array2::from_shape_fn((16, 32), |(a, p)| {
///     let att = 1.0 + 0.05 * a as f32 + if p == 10 { 0.1 } else { 0.0 };
///     (-att).exp()
/// });
/// let corrected = remove_stripes(slice.view(), &RingConfig::default()).unwrap();
/// assert_eq!(corrected.dim(), (16, 32));
/// ```
pub fn remove_stripes<F: RingFloat>(
    slice: ArrayView2<F>,
    config: &RingConfig<F>,
) -> Result<Array2<F>> {
    config.validate()?;
    let options = config.correction_options();

    let sino = to_attenuation(slice);
    let (d1, d2) = if config.nblocks == 0 {
        (
            correct_global(sino.view(), FIRST_ORDER, &options)?,
            correct_global(sino.view(), SECOND_ORDER, &options)?,
        )
    } else {
        (
            correct_blocks(sino.view(), FIRST_ORDER, config.nblocks, &options)?,
            correct_blocks(sino.view(), SECOND_ORDER, config.nblocks, &options)?,
        )
    };

    let d = combine_corrections(d1.view(), d2.view(), config.alpha_damp)?;
    Ok(to_intensity(d.view()))
}

/// Remove stripes from a caller-owned slice, overwriting it.
///
/// On error the slice is left untouched.
pub fn remove_stripes_in_place<F: RingFloat>(
    mut slice: ArrayViewMut2<F>,
    config: &RingConfig<F>,
) -> Result<()> {
    let corrected = remove_stripes(slice.view(), config)?;
    slice.assign(&corrected);
    Ok(())
}

/// Remove stripes from the selected slices of a volume shaped
/// (angles, slices, pixels), in place.
///
/// Every index must be in bounds and appear once. Selected slices are
/// processed in parallel; slices not listed are never touched. A failing
/// slice stops the run and its error is returned tagged with its index.
/// Slices that already finished keep their corrected data.
///
/// To split one volume across independent workers, give each worker a
/// disjoint sub-view (e.g. from `split_at(Axis(1), ..)`) and its own
/// indices relative to that view.
pub fn remove_stripes_volume<F: RingFloat>(
    mut volume: ArrayViewMut3<F>,
    indices: &[usize],
    config: &RingConfig<F>,
) -> Result<()> {
    config.validate()?;

    let slices = volume.len_of(Axis(1));
    let mut selected = vec![false; slices];
    for &index in indices {
        if index >= slices {
            return Err(RingError::SliceIndexOutOfBounds { index, slices });
        }
        if selected[index] {
            return Err(RingError::DuplicateSliceIndex(index));
        }
        selected[index] = true;
    }

    log::debug!(
        "removing stripes from {} of {} slices (nblocks={}, alpha_damp={:?})",
        indices.len(),
        slices,
        config.nblocks,
        config.alpha_damp
    );

    volume
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .enumerate()
        .filter(|(index, _)| selected[*index])
        .try_for_each(|(index, slice)| {
            remove_stripes_in_place(slice, config).map_err(|e| e.at_slice(index))
        })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    // Helper: Simple LCG for deterministic test data
    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_u64(&mut self) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            self.state
        }

        fn next_f32(&mut self) -> f32 {
            let u = self.next_u64();
            (u >> 40) as f32 / (1u64 << 24) as f32
        }
    }

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    /// Stripe-free attenuation: an angle-correlated random walk shared by
    /// every pixel plus a smooth detector profile. Shape (angles, pixels).
    fn clean_attenuation(angles: usize, pixels: usize, seed: u64) -> Array2<f32> {
        let mut rng = SimpleLcg::new(seed);
        let mut walk = 0.0f32;
        let angle_term: Vec<f32> = (0..angles)
            .map(|_| {
                walk = 0.8 * walk + 0.2 * (rng.next_f32() - 0.5);
                walk
            })
            .collect();
        Array2::from_shape_fn((angles, pixels), |(a, p)| {
            let detector = (std::f32::consts::PI * p as f32 / pixels as f32).sin();
            1.0 + angle_term[a] + 0.2 * detector
        })
    }

    fn with_stripe(att: &Array2<f32>, cols: std::ops::Range<usize>, bias: f32) -> Array2<f32> {
        let mut out = att.clone();
        for c in cols {
            out.column_mut(c).mapv_inplace(|v| v + bias);
        }
        out
    }

    fn intensity(att: &Array2<f32>) -> Array2<f32> {
        att.mapv(|v| (-v).exp())
    }

    fn column_means(slice: ArrayView2<f32>) -> Vec<f32> {
        (0..slice.ncols())
            .map(|c| slice.column(c).sum() / slice.nrows() as f32)
            .collect()
    }

    /// Mean of columns 60..65 minus the mean of the two columns either side.
    fn stripe_contrast(means: &[f32]) -> f32 {
        let stripe: f32 = means[60..65].iter().sum::<f32>() / 5.0;
        let neighbours = (means[58] + means[59] + means[65] + means[66]) / 4.0;
        stripe - neighbours
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_default_config() {
        let config: RingConfig<f32> = RingConfig::default();
        assert_eq!(config.nblocks, 0);
        assert!(approx_eq(config.alpha_damp, 0.01, 1e-9));
        assert_eq!(config.cg_max_iterations, 1_000_000);
        assert_eq!(config.cg_tolerance, 1e-7);
        assert_eq!(config.flat_columns, FlatColumnPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_params() {
        let config = RingConfig::with_params(4, 1.5f64);
        assert_eq!(config.nblocks, 4);
        assert_eq!(config.alpha_damp, 1.5);
        assert_eq!(config.cg_max_iterations, 1_000_000);
    }

    #[test]
    fn test_config_validation_alpha_damp() {
        for bad in [-0.1f32, f32::NAN, f32::INFINITY] {
            let mut config: RingConfig<f32> = RingConfig::default();
            config.alpha_damp = bad;
            assert!(config.validate().is_err(), "alpha_damp {bad} accepted");
        }
        let mut config: RingConfig<f32> = RingConfig::default();
        config.alpha_damp = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_cg() {
        let mut config: RingConfig<f32> = RingConfig::default();
        config.cg_max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config: RingConfig<f32> = RingConfig::default();
        config.cg_tolerance = 0.0;
        assert!(config.validate().is_err());
    }

    // ==================== Pipeline Step Tests ====================

    #[test]
    fn test_log_exp_round_trip() {
        let slice = intensity(&clean_attenuation(16, 24, 3));
        let back = to_intensity(to_attenuation(slice.view()).view());
        for (a, b) in slice.iter().zip(back.iter()) {
            assert!((a - b).abs() / a.abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_uncorrected_combination_round_trips() {
        // With no correction (d1 = d2 = sino) and no damping, d = sino and
        // the pipeline's last two steps reproduce the input.
        let slice = intensity(&clean_attenuation(16, 24, 4));
        let sino = to_attenuation(slice.view());
        let d = combine_corrections(sino.view(), sino.view(), 0.0).unwrap();
        let back = to_intensity(d.view());
        for (a, b) in slice.iter().zip(back.iter()) {
            assert!((a - b).abs() / a.abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_combine_applies_damping() {
        let d1 = Array2::from_shape_vec((1, 3), vec![1.0f64, 2.0, 3.0]).unwrap();
        let d2 = Array2::from_shape_vec((1, 3), vec![1.0f64, 2.0, 3.0]).unwrap();
        // p = [1, 4, 9], shift = 0.5 * 1
        let d = combine_corrections(d1.view(), d2.view(), 0.5).unwrap();
        let expected = [1.5f64.sqrt(), 4.5f64.sqrt(), 9.5f64.sqrt()];
        for (got, want) in d.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_combine_clamps_negative_radicand() {
        let d1 = Array2::from_shape_vec((1, 3), vec![-2.0f32, 1.0, 3.0]).unwrap();
        let d2 = Array2::from_shape_vec((1, 3), vec![1.0f32, 1.0, 3.0]).unwrap();
        // p = [-2, 1, 9]; -2 + 0.01 * 2 < 0 must clamp to 0, not NaN.
        let d = combine_corrections(d1.view(), d2.view(), 0.01).unwrap();
        assert_eq!(d[[0, 0]], 0.0);
        assert!(d.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_combine_shape_mismatch() {
        let d1 = Array2::<f32>::zeros((2, 3));
        let d2 = Array2::<f32>::zeros((3, 2));
        assert!(combine_corrections(d1.view(), d2.view(), 0.1).is_err());
    }

    // ==================== Slice Pipeline Tests ====================

    #[test]
    fn test_end_to_end_stripe_reduction() {
        // 64 angles x 1 slice x 128 pixels, stripe of +0.1 attenuation in
        // columns 60..65 at every angle.
        let (angles, pixels) = (64, 128);
        let clean_att = clean_attenuation(angles, pixels, 17);
        let striped_att = with_stripe(&clean_att, 60..65, 0.1);

        let mut clean = Array3::<f32>::zeros((angles, 1, pixels));
        clean
            .index_axis_mut(Axis(1), 0)
            .assign(&intensity(&clean_att));
        let mut striped = Array3::<f32>::zeros((angles, 1, pixels));
        striped
            .index_axis_mut(Axis(1), 0)
            .assign(&intensity(&striped_att));

        let before = stripe_contrast(&column_means(striped.index_axis(Axis(1), 0)))
            - stripe_contrast(&column_means(clean.index_axis(Axis(1), 0)));

        let config = RingConfig::with_params(0, 0.01f32);
        remove_stripes_volume(clean.view_mut(), &[0], &config).unwrap();
        remove_stripes_volume(striped.view_mut(), &[0], &config).unwrap();

        let after = stripe_contrast(&column_means(striped.index_axis(Axis(1), 0)))
            - stripe_contrast(&column_means(clean.index_axis(Axis(1), 0)));

        assert!(before.abs() > 0.02, "injected contrast too small: {before}");
        assert!(
            after.abs() <= 0.2 * before.abs(),
            "stripe contrast only reduced from {before} to {after}"
        );
    }

    #[test]
    fn test_block_mode_reduces_stripe() {
        let clean_att = clean_attenuation(64, 128, 17);
        let striped_att = with_stripe(&clean_att, 60..65, 0.1);
        let config = RingConfig::with_params(4, 0.01f32);

        let clean_in = intensity(&clean_att);
        let striped_in = intensity(&striped_att);
        let clean_out = remove_stripes(clean_in.view(), &config).unwrap();
        let striped_out = remove_stripes(striped_in.view(), &config).unwrap();

        let before = stripe_contrast(&column_means(striped_in.view()))
            - stripe_contrast(&column_means(clean_in.view()));
        let after = stripe_contrast(&column_means(striped_out.view()))
            - stripe_contrast(&column_means(clean_out.view()));
        assert!(
            after.abs() <= 0.3 * before.abs(),
            "block mode reduced contrast from {before} to {after} only"
        );
    }

    #[test]
    fn test_output_is_valid_intensity() {
        let slice = intensity(&with_stripe(&clean_attenuation(32, 64, 8), 20..22, 0.2));
        for nblocks in [0, 1, 3] {
            let config = RingConfig::with_params(nblocks, 0.01f32);
            let out = remove_stripes(slice.view(), &config).unwrap();
            assert_eq!(out.dim(), slice.dim());
            assert!(
                out.iter().all(|&v| v.is_finite() && v > 0.0 && v <= 1.0),
                "nblocks={nblocks}"
            );
        }
    }

    #[test]
    fn test_single_nan_does_not_propagate() {
        let mut slice = intensity(&clean_attenuation(64, 128, 21));
        slice[[10, 40]] = f32::NAN;
        let out = remove_stripes(slice.view(), &RingConfig::default()).unwrap();
        assert!(out.iter().all(|&v| v.is_finite() && (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_single_block_matches_whole_slice() {
        let slice = intensity(&with_stripe(&clean_attenuation(32, 48, 12), 5..7, 0.1));
        let global = remove_stripes(slice.view(), &RingConfig::with_params(0, 0.01f32)).unwrap();
        let blocks = remove_stripes(slice.view(), &RingConfig::with_params(1, 0.01f32)).unwrap();
        for (a, b) in global.iter().zip(blocks.iter()) {
            assert!(approx_eq(*a, *b, 1e-6));
        }
    }

    #[test]
    fn test_f64_pipeline() {
        let slice = intensity(&clean_attenuation(16, 32, 6)).mapv(|v| v as f64);
        let out = remove_stripes(slice.view(), &RingConfig::<f64>::default()).unwrap();
        assert_eq!(out.dim(), (16, 32));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_flat_slice_rejected() {
        let slice = Array2::from_elem((8, 16), 0.5f32);
        let err = remove_stripes(slice.view(), &RingConfig::default()).unwrap_err();
        assert!(matches!(err, RingError::DegenerateRegularization { .. }));
    }

    #[test]
    fn test_too_many_blocks_rejected() {
        let slice = intensity(&clean_attenuation(8, 16, 2));
        let config = RingConfig::with_params(9, 0.01f32);
        let err = remove_stripes(slice.view(), &config).unwrap_err();
        assert_eq!(
            err,
            RingError::InvalidBlockCount {
                nblocks: 9,
                angles: 8
            }
        );
    }

    #[test]
    fn test_in_place_matches_pure() {
        let slice = intensity(&with_stripe(&clean_attenuation(24, 40, 13), 11..13, 0.1));
        let config = RingConfig::default();
        let expected = remove_stripes(slice.view(), &config).unwrap();

        let mut buffer = slice.clone();
        remove_stripes_in_place(buffer.view_mut(), &config).unwrap();
        assert_eq!(buffer, expected);
    }

    #[test]
    fn test_in_place_leaves_slice_on_error() {
        let mut buffer = Array2::from_elem((8, 16), 0.5f32);
        let original = buffer.clone();
        assert!(remove_stripes_in_place(buffer.view_mut(), &RingConfig::default()).is_err());
        assert_eq!(buffer, original);
    }

    // ==================== Volume Driver Tests ====================

    fn test_volume(angles: usize, slices: usize, pixels: usize) -> Array3<f32> {
        let mut volume = Array3::zeros((angles, slices, pixels));
        for n in 0..slices {
            let att = with_stripe(
                &clean_attenuation(angles, pixels, 100 + n as u64),
                (n % pixels)..(n % pixels + 2).min(pixels),
                0.1,
            );
            volume.index_axis_mut(Axis(1), n).assign(&intensity(&att));
        }
        volume
    }

    #[test]
    fn test_volume_processes_only_selected_slices() {
        let original = test_volume(16, 6, 32);
        let mut volume = original.clone();
        let config = RingConfig::default();

        remove_stripes_volume(volume.view_mut(), &[4, 1], &config).unwrap();

        for n in 0..6 {
            let got = volume.index_axis(Axis(1), n);
            let orig = original.index_axis(Axis(1), n);
            if n == 1 || n == 4 {
                let expected = remove_stripes(orig, &config).unwrap();
                assert_eq!(got, expected.view(), "slice {n} not corrected");
            } else {
                assert_eq!(got, orig, "slice {n} should be untouched");
            }
        }
    }

    #[test]
    fn test_volume_all_slices_match_sequential() {
        let original = test_volume(20, 8, 24);
        let mut volume = original.clone();
        let config = RingConfig::with_params(2, 0.05f32);
        let indices: Vec<usize> = (0..8).collect();

        remove_stripes_volume(volume.view_mut(), &indices, &config).unwrap();

        for n in 0..8 {
            let expected = remove_stripes(original.index_axis(Axis(1), n), &config).unwrap();
            assert_eq!(volume.index_axis(Axis(1), n), expected.view());
        }
    }

    #[test]
    fn test_volume_disjoint_sub_views() {
        // Two workers own disjoint halves of the slice axis.
        let original = test_volume(16, 4, 32);
        let mut volume = original.clone();
        let config = RingConfig::default();
        {
            let (left, right) = volume.view_mut().split_at(Axis(1), 2);
            let (a, b) = rayon::join(
                || remove_stripes_volume(left, &[0, 1], &config),
                || remove_stripes_volume(right, &[0, 1], &config),
            );
            a.unwrap();
            b.unwrap();
        }
        let mut sequential = original.clone();
        remove_stripes_volume(sequential.view_mut(), &[0, 1, 2, 3], &config).unwrap();
        assert_eq!(volume, sequential);
    }

    #[test]
    fn test_volume_rejects_bad_indices() {
        let mut volume = test_volume(8, 3, 16);
        let config = RingConfig::default();

        let err = remove_stripes_volume(volume.view_mut(), &[0, 3], &config).unwrap_err();
        assert_eq!(err, RingError::SliceIndexOutOfBounds { index: 3, slices: 3 });

        let err = remove_stripes_volume(volume.view_mut(), &[2, 0, 2], &config).unwrap_err();
        assert_eq!(err, RingError::DuplicateSliceIndex(2));

        // Validation happens before any slice is written.
        assert_eq!(volume, test_volume(8, 3, 16));
    }

    #[test]
    fn test_volume_error_names_failing_slice() {
        let mut volume = test_volume(8, 3, 16);
        volume.slice_mut(s![.., 2, ..]).fill(0.5);
        let err =
            remove_stripes_volume(volume.view_mut(), &[0, 1, 2], &RingConfig::default())
                .unwrap_err();
        match err {
            RingError::Slice { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, RingError::DegenerateRegularization { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_volume_empty_index_set() {
        let original = test_volume(8, 2, 16);
        let mut volume = original.clone();
        remove_stripes_volume(volume.view_mut(), &[], &RingConfig::default()).unwrap();
        assert_eq!(volume, original);
    }
}
