//! Per-sample preprocessing: sensor fusion followed by voxelization.

use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use super::combine::{combine_lidar_data, CombineError};
use super::grid::{build_voxel_grid, SparseVoxelGrid};
use crate::config::{ConfigError, PipelineConfig};
use crate::core::loaders::PointCloud;
use crate::dataset::{Sample, SensorCatalog};

/// Errors that can occur while processing a sample.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("sample {sample}: {source}")]
    Combine {
        sample: String,
        #[source]
        source: CombineError,
    },

    #[error("sample {0} has no points after combining sensors")]
    EmptyInput(String),
}

/// Output of the pipeline for one sample.
#[derive(Debug, Clone)]
pub struct SampleOutput {
    pub sample_token: String,
    /// Number of fused points fed into voxelization.
    pub num_points: usize,
    pub grid: SparseVoxelGrid,
}

/// Fuse a sample's sensors into one vehicle-frame cloud.
pub fn combine_sample<C: SensorCatalog + ?Sized>(
    catalog: &C,
    sample: &Sample,
    data_root: &Path,
    config: &PipelineConfig,
) -> Result<PointCloud, PipelineError> {
    combine_lidar_data(catalog, sample, data_root, &config.sensors.channels).map_err(|source| {
        PipelineError::Combine {
            sample: sample.token.clone(),
            source,
        }
    })
}

/// Run the full preprocessing pipeline for one sample.
///
/// A sample with no points yields an empty grid unless
/// `processing.allow_empty_samples` is off.
pub fn process_sample<C: SensorCatalog + ?Sized, R: Rng + ?Sized>(
    catalog: &C,
    sample: &Sample,
    data_root: &Path,
    config: &PipelineConfig,
    rng: &mut R,
) -> Result<SampleOutput, PipelineError> {
    config.validate()?;
    let start = Instant::now();

    let cloud = combine_sample(catalog, sample, data_root, config)?;
    if cloud.is_empty() && !config.processing.allow_empty_samples {
        return Err(PipelineError::EmptyInput(sample.token.clone()));
    }

    let grid = build_voxel_grid(&cloud, &config.voxel, rng);

    info!(
        "Sample {}: {} points -> {} voxels in {:.2?}",
        sample.token,
        cloud.len(),
        grid.num_voxels(),
        start.elapsed()
    );

    Ok(SampleOutput {
        sample_token: sample.token.clone(),
        num_points: cloud.len(),
        grid,
    })
}

/// Random source for the sample at `position` in a batch.
///
/// With a base seed each sample gets its own deterministic stream; without one
/// every sample is seeded from OS entropy.
pub fn sample_rng(seed: Option<u64>, position: usize) -> StdRng {
    match seed {
        Some(base) => StdRng::seed_from_u64(base.wrapping_add(position as u64)),
        None => StdRng::from_entropy(),
    }
}

/// Process many samples in parallel.
///
/// Results are returned in input order. A failing sample does not stop the
/// others.
pub fn process_samples<C: SensorCatalog + ?Sized>(
    catalog: &C,
    samples: &[&Sample],
    data_root: &Path,
    config: &PipelineConfig,
) -> Vec<Result<SampleOutput, PipelineError>> {
    process_samples_with(catalog, samples, data_root, config, |_, _| {})
}

/// Like [`process_samples`], calling `on_done` after each sample finishes.
pub fn process_samples_with<C, F>(
    catalog: &C,
    samples: &[&Sample],
    data_root: &Path,
    config: &PipelineConfig,
    on_done: F,
) -> Vec<Result<SampleOutput, PipelineError>>
where
    C: SensorCatalog + ?Sized,
    F: Fn(&Sample, &Result<SampleOutput, PipelineError>) + Sync,
{
    debug!(
        "Processing {} samples on {} threads",
        samples.len(),
        rayon::current_num_threads()
    );

    samples
        .par_iter()
        .enumerate()
        .map(|(position, sample)| {
            let mut rng = sample_rng(config.processing.seed, position);
            let result = process_sample(catalog, sample, data_root, config, &mut rng);
            on_done(sample, &result);
            result
        })
        .collect()
}
