//! Configuration types for the voxel pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised when a configuration cannot describe a usable voxel grid.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("voxel size along {axis} must be positive and finite, got {value}")]
    InvalidVoxelSize { axis: char, value: f32 },

    #[error("max_points_per_voxel must be at least 1")]
    ZeroCapacity,

    #[error("max_voxel_{axis} must be positive, got {value}")]
    InvalidBound { axis: char, value: i32 },

    #[error("sensor channel list is empty")]
    NoChannels,
}

/// Voxel grid geometry and per-voxel capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelConfig {
    /// Voxel edge length along x (meters)
    #[serde(default = "default_size_x")]
    pub size_x: f32,

    /// Voxel edge length along y (meters)
    #[serde(default = "default_size_y")]
    pub size_y: f32,

    /// Voxel edge length along z (meters)
    #[serde(default = "default_size_z")]
    pub size_z: f32,

    /// Rows kept per voxel; larger voxels are subsampled, smaller ones zero-padded
    #[serde(default = "default_max_points_per_voxel")]
    pub max_points_per_voxel: usize,

    /// Half-extent of the retained region along x, in voxels
    #[serde(default = "default_max_voxel_x")]
    pub max_voxel_x: i32,

    /// Half-extent of the retained region along y, in voxels
    #[serde(default = "default_max_voxel_y")]
    pub max_voxel_y: i32,

    /// Upper bound along z, in voxels (z is not mirrored below the ground)
    #[serde(default = "default_max_voxel_z")]
    pub max_voxel_z: i32,
}

fn default_size_x() -> f32 {
    0.5
}

fn default_size_y() -> f32 {
    0.25
}

fn default_size_z() -> f32 {
    0.25
}

fn default_max_points_per_voxel() -> usize {
    35
}

// 100 m x 100 m x 2 m region; x and y are stored as half-extents.
fn default_max_voxel_x() -> i32 {
    (100.0 / default_size_x()) as i32 / 2
}

fn default_max_voxel_y() -> i32 {
    (100.0 / default_size_y()) as i32 / 2
}

fn default_max_voxel_z() -> i32 {
    (2.0 / default_size_z()) as i32
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self {
            size_x: default_size_x(),
            size_y: default_size_y(),
            size_z: default_size_z(),
            max_points_per_voxel: default_max_points_per_voxel(),
            max_voxel_x: default_max_voxel_x(),
            max_voxel_y: default_max_voxel_y(),
            max_voxel_z: default_max_voxel_z(),
        }
    }
}

impl VoxelConfig {
    /// Per-axis voxel sizes as `[x, y, z]`.
    #[inline]
    pub fn sizes(&self) -> [f32; 3] {
        [self.size_x, self.size_y, self.size_z]
    }

    /// Declared dense shape `[Z, X, Y, capacity, 6]` of grids built with this config.
    pub fn dense_shape(&self) -> [usize; 5] {
        [
            self.max_voxel_z.max(0) as usize,
            self.max_voxel_x.max(0) as usize * 2,
            self.max_voxel_y.max(0) as usize * 2,
            self.max_points_per_voxel,
            crate::processors::grid::FEATURES_PER_POINT,
        ]
    }

    /// Check that the configuration describes a usable grid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, value) in [('x', self.size_x), ('y', self.size_y), ('z', self.size_z)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidVoxelSize { axis, value });
            }
        }
        if self.max_points_per_voxel == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        for (axis, value) in [
            ('x', self.max_voxel_x),
            ('y', self.max_voxel_y),
            ('z', self.max_voxel_z),
        ] {
            if value <= 0 {
                return Err(ConfigError::InvalidBound { axis, value });
            }
        }
        Ok(())
    }
}

/// Which sensors to fuse and where their raw files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Ordered sensor channel names fused into each sample
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    /// Base directory that sample-data filenames are relative to
    #[serde(default)]
    pub data_root: Option<PathBuf>,
}

fn default_channels() -> Vec<String> {
    vec![
        "LIDAR_TOP".to_string(),
        "LIDAR_FRONT_RIGHT".to_string(),
        "LIDAR_FRONT_LEFT".to_string(),
    ]
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            data_root: None,
        }
    }
}

/// Batch processing behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Base seed for per-sample subsampling; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Treat a sample with no points as an empty grid instead of an error
    #[serde(default = "default_allow_empty_samples")]
    pub allow_empty_samples: bool,
}

fn default_allow_empty_samples() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            seed: None,
            allow_empty_samples: default_allow_empty_samples(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub voxel: VoxelConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate every section that has constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.voxel.validate()?;
        if self.sensors.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        Ok(())
    }
}
