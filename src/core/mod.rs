//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{load_lidar_bin, LoaderError, PointCloud};
pub use transforms::{align_to_sensor, align_to_vehicle, Calibration, TransformError};
pub use writers::{write_manifest, write_ply, write_sparse_grid_csv, GridManifest, WriteError};
