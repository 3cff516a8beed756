//! Error types for ringcg.

use thiserror::Error;

/// Result type alias using ringcg's error.
pub type Result<T> = std::result::Result<T, RingError>;

/// Errors that can occur while computing or applying a stripe correction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RingError {
    /// No finite-difference stencil exists for this (derivative, accuracy) pair.
    #[error("no difference kernel for derivative order {derivative} with accuracy order {accuracy}")]
    InvalidKernelIndex {
        /// Requested derivative order (m)
        derivative: usize,
        /// Requested accuracy order (n)
        accuracy: usize,
    },

    /// Vector length does not match the operator dimension.
    #[error("dimension mismatch: operator acts on length {expected}, got {got}")]
    DimensionMismatch {
        /// Operator dimension
        expected: usize,
        /// Length actually supplied
        got: usize,
    },

    /// All column sums of the (sub)data are equal, so alpha_reg is undefined.
    #[error("column sums over angles {start}..{end} have zero dynamic range; regularization is undefined")]
    DegenerateRegularization {
        /// First angle of the offending range
        start: usize,
        /// One past the last angle of the offending range
        end: usize,
    },

    /// Block count cannot partition the angle axis.
    #[error("cannot split {angles} angles into {nblocks} blocks")]
    InvalidBlockCount {
        /// Requested number of blocks
        nblocks: usize,
        /// Number of projection angles in the slice
        angles: usize,
    },

    /// Slice has no angles or no detector pixels.
    #[error("empty sinogram slice with shape {shape:?}")]
    EmptySlice {
        /// (angles, pixels)
        shape: (usize, usize),
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested slice index lies outside the volume.
    #[error("slice index {index} out of bounds for volume with {slices} slices")]
    SliceIndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Number of slices in the volume
        slices: usize,
    },

    /// The same slice was requested twice in one call.
    #[error("slice index {0} requested more than once")]
    DuplicateSliceIndex(usize),

    /// Processing of one volume slice failed.
    #[error("slice {index}: {source}")]
    Slice {
        /// Index of the failing slice
        index: usize,
        /// Underlying failure
        #[source]
        source: Box<RingError>,
    },
}

impl RingError {
    /// Attach the volume slice index to an error raised while processing it.
    pub fn at_slice(self, index: usize) -> Self {
        RingError::Slice {
            index,
            source: Box::new(self),
        }
    }
}
