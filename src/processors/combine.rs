//! Multi-sensor point cloud fusion.
//!
//! Each LiDAR on the vehicle writes its own sweep file in its own frame. For a
//! sample, the sweeps of the configured channels are loaded, aligned into the
//! vehicle frame with their calibrations, and concatenated in channel order.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::core::loaders::{concat_clouds, load_lidar_bin, LoaderError, PointCloud};
use crate::core::transforms::{align_to_vehicle, TransformError};
use crate::dataset::{CatalogError, Sample, SensorCatalog};

/// Errors that can occur while fusing a sample's sensors.
#[derive(Debug, Error)]
pub enum CombineError {
    #[error("channel {channel}: {source}")]
    Catalog {
        channel: String,
        #[source]
        source: CatalogError,
    },

    #[error("channel {channel}: {source}")]
    Load {
        channel: String,
        #[source]
        source: LoaderError,
    },

    #[error("channel {channel}: {source}")]
    Transform {
        channel: String,
        #[source]
        source: TransformError,
    },
}

/// Resolve a dataset-relative filename against the data root.
///
/// Both `/` and `\` are treated as separators so filenames recorded on one
/// platform resolve on another.
pub fn resolve_data_path(data_root: &Path, filename: &str) -> PathBuf {
    filename
        .split(['/', '\\'])
        .filter(|component| !component.is_empty())
        .fold(data_root.to_path_buf(), |path, component| path.join(component))
}

/// Load, align and concatenate the sample's sweeps for `channels`.
///
/// Channels the sample does not carry are skipped.
///
/// # Errors
///
/// Fails on the first channel whose metadata, file, or calibration is unusable.
pub fn combine_lidar_data<C: SensorCatalog + ?Sized>(
    catalog: &C,
    sample: &Sample,
    data_root: &Path,
    channels: &[String],
) -> Result<PointCloud, CombineError> {
    let mut aligned = Vec::with_capacity(channels.len());

    for channel in channels {
        let Some(sample_data_token) = sample.data.get(channel) else {
            debug!("Sample {} has no {} data, skipping", sample.token, channel);
            continue;
        };

        let catalog_err = |source| CombineError::Catalog {
            channel: channel.clone(),
            source,
        };
        let frame = catalog.sample_data(sample_data_token).map_err(catalog_err)?;
        let calibration = catalog
            .calibrated_sensor(&frame.calibrated_sensor_token)
            .map_err(catalog_err)?;

        let path = resolve_data_path(data_root, &frame.filename);
        let raw = load_lidar_bin(&path).map_err(|source| CombineError::Load {
            channel: channel.clone(),
            source,
        })?;

        let points = align_to_vehicle(&raw, calibration).map_err(|source| {
            CombineError::Transform {
                channel: channel.clone(),
                source,
            }
        })?;

        debug!(
            "Sample {}: {} points from {} ({})",
            sample.token,
            points.len(),
            channel,
            path.display()
        );
        aligned.push(points);
    }

    Ok(concat_clouds(&aligned))
}
