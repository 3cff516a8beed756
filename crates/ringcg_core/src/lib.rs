//! Ring Artifact Removal Core Library
//!
//! Pure Rust implementation of regularized least-squares stripe removal for
//! tomographic sinograms. A stripe (a detector pixel with a consistent bias
//! across all angles) shows up as a high-frequency component of the mean
//! detector profile; each correction solves a Tikhonov-regularized system
//! `(HᵗH + α·I)·q = -HᵗH·pp` by conjugate gradients and adds the profile q
//! back to every angle.
//!
//! This crate contains all algorithm logic without Python bindings.

pub mod correction;
pub mod error;
pub mod float_trait;
pub mod kernel;
pub mod operator;
pub mod orchestration;
pub mod solver;

// Re-export commonly used types at the crate root
pub use correction::{correct_blocks, correct_global, CorrectionOptions, FlatColumnPolicy};
pub use error::{Result, RingError};
pub use float_trait::RingFloat;
pub use kernel::DifferenceKernel;
pub use operator::{BandedNormalOperator, LinearOperator};
pub use orchestration::{
    combine_corrections, remove_stripes, remove_stripes_in_place, remove_stripes_volume,
    RingConfig,
};
pub use solver::{solve_regularized, CgOptions, CgSolution};
