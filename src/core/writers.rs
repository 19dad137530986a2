//! Data writers for point clouds and voxel grids.
//!
//! - PLY (ASCII) for fused point clouds
//! - CSV for sparse voxel grid entries
//! - YAML manifest describing an exported grid

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loaders::PointCloud;
use crate::processors::grid::SparseVoxelGrid;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// YAML serialization error.
    #[error("YAML write error for '{path}': {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Summary of an exported grid, written next to its CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridManifest {
    pub sample_token: String,
    /// Declared dense shape `[Z, X, Y, capacity, 6]`.
    pub shape: [usize; 5],
    pub num_points: usize,
    pub num_voxels: usize,
    pub num_entries: usize,
}

impl GridManifest {
    pub fn new(sample_token: impl Into<String>, num_points: usize, grid: &SparseVoxelGrid) -> Self {
        Self {
            sample_token: sample_token.into(),
            shape: grid.shape(),
            num_points,
            num_voxels: grid.num_voxels(),
            num_entries: grid.num_entries(),
        }
    }
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a point cloud as an ASCII PLY file with x, y, z float properties.
///
/// Parent directories are created if needed.
///
/// # Example
///
/// ```no_run
/// use voxel_pipeline::core::loaders::PointCloud;
/// use voxel_pipeline::core::writers::write_ply;
/// use std::path::Path;
///
/// let cloud = PointCloud::default();
/// write_ply(Path::new("output.ply"), &cloud).unwrap();
/// ```
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let write_err = |e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    write!(
        writer,
        "ply\nformat ascii 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
        cloud.len()
    )
    .map_err(write_err)?;

    for i in 0..cloud.len() {
        writeln!(writer, "{} {} {}", cloud.x[i], cloud.y[i], cloud.z[i]).map_err(write_err)?;
    }

    writer.flush().map_err(write_err)?;
    Ok(())
}

/// Write sparse grid entries as CSV with header `z,x,y,row,feature,value`.
///
/// Every materialized entry is written, zero padding rows included.
pub fn write_sparse_grid_csv(path: &Path, grid: &SparseVoxelGrid) -> Result<()> {
    ensure_parent_dirs(path)?;
    let writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(["z", "x", "y", "row", "feature", "value"])
        .map_err(csv_err)?;

    for ([z, x, y, row, feature], value) in grid.entries() {
        csv_writer
            .write_record(&[
                z.to_string(),
                x.to_string(),
                y.to_string(),
                row.to_string(),
                feature.to_string(),
                value.to_string(),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;
    Ok(())
}

/// Write a grid manifest as YAML.
pub fn write_manifest(path: &Path, manifest: &GridManifest) -> Result<()> {
    ensure_parent_dirs(path)?;
    let content = serde_yaml::to_string(manifest).map_err(|e| WriteError::YamlError {
        path: path.display().to_string(),
        source: e,
    })?;
    fs::write(path, content).map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}
