//! Data processing modules.

pub mod combine;
pub mod densify;
pub mod grid;
pub mod pipeline;
pub mod voxel;

// Re-export key types for convenience
pub use combine::{combine_lidar_data, resolve_data_path, CombineError};
pub use densify::{densify, densify_batch, stack_grids, DensifyError};
pub use grid::{build_voxel_grid, SparseVoxelGrid, VoxelFeatures, FEATURES_PER_POINT};
pub use pipeline::{
    process_sample, process_samples, process_samples_with, sample_rng, PipelineError,
    SampleOutput,
};
pub use voxel::{bucket_points, voxel_index, VoxelBounds, VoxelCoord};
