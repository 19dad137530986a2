//! Point cloud container and raw LiDAR sweep loader.
//!
//! Raw sweeps are flat binary files of little-endian `f32` values laid out in
//! rows of five channels: x, y, z followed by two channels the pipeline does
//! not use. Only the spatial channels are kept.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Number of `f32` channels per point in a raw sweep file.
pub const RAW_POINT_STRIDE: usize = 5;

/// Size in bytes of one raw point record.
pub const RAW_RECORD_BYTES: usize = RAW_POINT_STRIDE * std::mem::size_of::<f32>();

/// Errors that can occur while reading raw sweep files.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Sensor file not found or unreadable: {path}: {source}")]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed sweep file {path}: {len} bytes is not a multiple of the {stride}-byte record")]
    MalformedRecord {
        path: PathBuf,
        len: usize,
        stride: usize,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Container for 3D point cloud data, stored column-wise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a point cloud from `[x, y, z]` rows.
    pub fn from_coords(coords: &[[f32; 3]]) -> Self {
        let mut cloud = Self::with_capacity(coords.len());
        for &[x, y, z] in coords {
            cloud.push(x, y, z);
        }
        cloud
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns the point at `idx` as `[x, y, z]`.
    #[inline]
    pub fn point(&self, idx: usize) -> [f32; 3] {
        [self.x[idx], self.y[idx], self.z[idx]]
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Appends all points of `other`, preserving their order.
    pub fn extend_from(&mut self, other: &PointCloud) {
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
    }
}

/// Concatenate clouds in order into a single cloud.
pub fn concat_clouds(clouds: &[PointCloud]) -> PointCloud {
    let total = clouds.iter().map(PointCloud::len).sum();
    let mut combined = PointCloud::with_capacity(total);
    for cloud in clouds {
        combined.extend_from(cloud);
    }
    combined
}

/// Decode raw sweep bytes into a point cloud.
///
/// `path` is only used for error reporting.
pub fn decode_lidar_bin(bytes: &[u8], path: &Path) -> Result<PointCloud> {
    if bytes.len() % RAW_RECORD_BYTES != 0 {
        return Err(LoaderError::MalformedRecord {
            path: path.to_path_buf(),
            len: bytes.len(),
            stride: RAW_RECORD_BYTES,
        });
    }

    let num_points = bytes.len() / RAW_RECORD_BYTES;
    let mut cloud = PointCloud::with_capacity(num_points);

    for record in bytes.chunks_exact(RAW_RECORD_BYTES) {
        let channel = |i: usize| {
            let start = i * 4;
            f32::from_le_bytes([
                record[start],
                record[start + 1],
                record[start + 2],
                record[start + 3],
            ])
        };
        cloud.push(channel(0), channel(1), channel(2));
    }

    Ok(cloud)
}

/// Load a raw LiDAR sweep file.
///
/// # Errors
///
/// Returns [`LoaderError::MissingFile`] if the file cannot be opened or read and
/// [`LoaderError::MalformedRecord`] if its length is not a whole number of
/// five-channel records.
pub fn load_lidar_bin<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| LoaderError::MissingFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    decode_lidar_bin(&bytes, path)
}

/// Encode points as raw sweep bytes, zero-filling the unused channels.
pub fn encode_lidar_bin(cloud: &PointCloud) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(cloud.len() * RAW_RECORD_BYTES);
    for i in 0..cloud.len() {
        for value in [cloud.x[i], cloud.y[i], cloud.z[i], 0.0, 0.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}
