//! LiDAR preprocessing pipeline: multi-sensor point clouds to sparse voxel grids.
//!
//! This crate provides tools for:
//! - Loading raw LiDAR sweeps and aligning them into the vehicle frame
//! - Fusing the sweeps of several sensors into one point cloud per sample
//! - Bucketing points into a bounded voxel grid with per-voxel subsampling
//! - Densifying sparse grids into batched `ndarray` tensors
//!
//! # Example
//!
//! ```no_run
//! use rand::SeedableRng;
//! use voxel_pipeline::{core::loaders::load_lidar_bin, processors::grid::build_voxel_grid, VoxelConfig};
//!
//! let cloud = load_lidar_bin("sweep.bin").unwrap();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let grid = build_voxel_grid(&cloud, &VoxelConfig::default(), &mut rng);
//! println!("{} occupied voxels", grid.num_voxels());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod dataset;
pub mod processors;

pub use config::{PipelineConfig, ProcessingConfig, SensorConfig, VoxelConfig};
pub use core::loaders::PointCloud;
pub use dataset::{JsonCatalog, SensorCatalog};
pub use processors::grid::SparseVoxelGrid;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
