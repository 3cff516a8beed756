//! PyO3 Python bindings for ring artifact removal.
//!
//! This crate provides thin Python bindings for the ringcg_core library.
//! All algorithm logic is in ringcg_core; this crate only handles
//! Python/NumPy type conversions.

use numpy::{PyArray2, PyReadonlyArray2, PyReadwriteArray3, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use ringcg_core::{
    correct_blocks, correct_global, remove_stripes, remove_stripes_volume, CorrectionOptions,
    DifferenceKernel, RingConfig, RingError,
};

fn to_py_err(e: RingError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Remove stripes from one (angles x pixels) slice of linear intensities.
#[pyfunction]
#[pyo3(signature = (sino, nblocks = 0, alpha_damp = 0.01))]
pub fn remove_stripes_slice<'py>(
    py: Python<'py>,
    sino: PyReadonlyArray2<f32>,
    nblocks: usize,
    alpha_damp: f32,
) -> PyResult<&'py PyArray2<f32>> {
    let config = RingConfig::with_params(nblocks, alpha_damp);
    let output = remove_stripes(sino.as_array(), &config).map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Remove stripes from the listed slices of an (angles, slices, pixels)
/// volume, in place.
#[pyfunction]
#[pyo3(name = "remove_stripes_volume", signature = (data, indices, nblocks = 0, alpha_damp = 0.01))]
pub fn remove_stripes_volume_py(
    mut data: PyReadwriteArray3<f32>,
    indices: Vec<usize>,
    nblocks: usize,
    alpha_damp: f32,
) -> PyResult<()> {
    let config = RingConfig::with_params(nblocks, alpha_damp);
    remove_stripes_volume(data.as_array_mut(), &indices, &config).map_err(to_py_err)
}

/// Run a single correction with the (derivative, accuracy) stencil and
/// return the corrected attenuation slice (used for debugging/validation).
#[pyfunction]
#[pyo3(signature = (sino, derivative, accuracy, nblocks = 0))]
pub fn correction_profile<'py>(
    py: Python<'py>,
    sino: PyReadonlyArray2<f32>,
    derivative: usize,
    accuracy: usize,
    nblocks: usize,
) -> PyResult<&'py PyArray2<f32>> {
    let kernel = DifferenceKernel::new(derivative, accuracy).map_err(to_py_err)?;
    let options = CorrectionOptions::default();
    let output = if nblocks == 0 {
        correct_global(sino.as_array(), kernel, &options)
    } else {
        correct_blocks(sino.as_array(), kernel, nblocks, &options)
    }
    .map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Ring artifact removal Rust accelerator module
#[pymodule]
fn ringcg_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(remove_stripes_slice, m)?)?;
    m.add_function(wrap_pyfunction!(remove_stripes_volume_py, m)?)?;
    m.add_function(wrap_pyfunction!(correction_profile, m)?)?;
    Ok(())
}
