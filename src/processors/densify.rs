//! Sparse-to-dense conversion of voxel grids for model input.

use ndarray::{Array5, Array6, ArrayView5, Axis};
use thiserror::Error;

use super::grid::SparseVoxelGrid;

/// Errors that can occur while densifying or batching grids.
#[derive(Debug, Error, PartialEq)]
pub enum DensifyError {
    #[error("sparse index {index:?} lies outside declared shape {shape:?}")]
    IndexOutOfBounds { index: [usize; 5], shape: [usize; 5] },

    #[error("grid {position} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        position: usize,
        expected: [usize; 5],
        found: [usize; 5],
    },

    #[error("cannot stack an empty batch")]
    EmptyBatch,

    #[error("failed to stack grids: {0}")]
    Stack(String),
}

/// Scatter a sparse grid into a zero-initialized dense array.
///
/// Every listed index receives its value; all other cells stay 0.
pub fn densify(grid: &SparseVoxelGrid) -> Result<Array5<f32>, DensifyError> {
    let shape = grid.shape();
    let mut dense = Array5::<f32>::zeros(shape);

    for (index, value) in grid.entries() {
        let cell = dense
            .get_mut(index)
            .ok_or(DensifyError::IndexOutOfBounds { index, shape })?;
        *cell = value;
    }

    Ok(dense)
}

/// Stack dense grids along a new leading batch axis.
pub fn stack_grids(grids: &[Array5<f32>]) -> Result<Array6<f32>, DensifyError> {
    let first = grids.first().ok_or(DensifyError::EmptyBatch)?;
    let expected = dim5(first.shape());

    for (position, grid) in grids.iter().enumerate() {
        let found = dim5(grid.shape());
        if found != expected {
            return Err(DensifyError::ShapeMismatch {
                position,
                expected,
                found,
            });
        }
    }

    let views: Vec<ArrayView5<f32>> = grids.iter().map(|g| g.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| DensifyError::Stack(e.to_string()))
}

/// Densify and stack a batch of sparse grids.
pub fn densify_batch(grids: &[SparseVoxelGrid]) -> Result<Array6<f32>, DensifyError> {
    let dense = grids.iter().map(densify).collect::<Result<Vec<_>, _>>()?;
    stack_grids(&dense)
}

fn dim5(shape: &[usize]) -> [usize; 5] {
    [shape[0], shape[1], shape[2], shape[3], shape[4]]
}
