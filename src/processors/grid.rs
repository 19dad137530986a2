//! Sparse voxel grid construction with centroid augmentation.
//!
//! Points are bucketed into voxels, each occupied voxel is reduced to at most
//! `max_points_per_voxel` points by uniform sampling without replacement, and
//! every kept point becomes a six-feature row `(x, y, z, x-cx, y-cy, z-cz)`
//! relative to the centroid of the kept points. Voxels are padded with zero
//! rows to exactly the configured capacity.

use log::debug;
use rand::seq::index;
use rand::Rng;

use super::voxel::{bucket_points, VoxelBounds, VoxelCoord};
use crate::config::VoxelConfig;
use crate::core::loaders::PointCloud;

/// Features per row: position followed by offset from the voxel centroid.
pub const FEATURES_PER_POINT: usize = 6;

/// One feature row of an augmented voxel.
pub type FeatureRow = [f32; FEATURES_PER_POINT];

/// Augmented rows of a single occupied voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelFeatures {
    /// Shifted voxel coordinate (x, y non-negative).
    pub coord: VoxelCoord,
    /// Exactly `capacity` rows; rows at `kept..` are zero padding.
    pub rows: Vec<FeatureRow>,
    /// Number of real points among `rows`.
    pub kept: usize,
    /// Centroid of the kept points.
    pub centroid: [f32; 3],
}

/// Sparse 5-D grid indexed by `(z, x, y, row, feature)`.
///
/// Only occupied voxels are stored. Every stored voxel contributes
/// `capacity * 6` entries, padding included; every other index of the
/// declared shape is implicitly zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVoxelGrid {
    shape: [usize; 5],
    voxels: Vec<VoxelFeatures>,
}

impl SparseVoxelGrid {
    /// A grid with no occupied voxels.
    pub fn empty(shape: [usize; 5]) -> Self {
        Self {
            shape,
            voxels: Vec::new(),
        }
    }

    /// Declared dense shape `[Z, X, Y, capacity, 6]`.
    #[inline]
    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    /// Occupied voxels in ascending `(z, x, y)` order.
    #[inline]
    pub fn voxels(&self) -> &[VoxelFeatures] {
        &self.voxels
    }

    #[inline]
    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    /// Number of materialized sparse entries.
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.voxels.len() * self.shape[3] * self.shape[4]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Look up an occupied voxel by shifted coordinate.
    pub fn voxel(&self, coord: VoxelCoord) -> Option<&VoxelFeatures> {
        self.voxels
            .binary_search_by(|v| v.coord.zxy().cmp(&coord.zxy()))
            .ok()
            .map(|i| &self.voxels[i])
    }

    /// Iterate sparse entries as `([z, x, y, row, feature], value)`.
    pub fn entries(&self) -> impl Iterator<Item = ([usize; 5], f32)> + '_ {
        self.voxels.iter().flat_map(|voxel| {
            let (z, x, y) = (
                voxel.coord.iz as usize,
                voxel.coord.ix as usize,
                voxel.coord.iy as usize,
            );
            voxel.rows.iter().enumerate().flat_map(move |(row, features)| {
                features
                    .iter()
                    .enumerate()
                    .map(move |(feature, &value)| ([z, x, y, row, feature], value))
            })
        })
    }

    /// Split into coordinate-list form: parallel index and value vectors.
    pub fn to_coo(&self) -> (Vec<[usize; 5]>, Vec<f32>) {
        let mut indices = Vec::with_capacity(self.num_entries());
        let mut values = Vec::with_capacity(self.num_entries());
        for (index, value) in self.entries() {
            indices.push(index);
            values.push(value);
        }
        (indices, values)
    }
}

/// Build the sparse voxel grid for one sample.
///
/// Voxels outside the configured bounds are dropped silently. Occupied voxels
/// are visited in `(z, x, y)` order, so a seeded `rng` yields the same grid
/// for the same input.
pub fn build_voxel_grid<R: Rng + ?Sized>(
    cloud: &PointCloud,
    config: &VoxelConfig,
    rng: &mut R,
) -> SparseVoxelGrid {
    let shape = config.dense_shape();
    let capacity = config.max_points_per_voxel;
    let bounds = VoxelBounds::from_config(config);

    let buckets = bucket_points(cloud, config.sizes(), &bounds);
    if buckets.is_empty() {
        debug!("No points inside voxel bounds ({} input points)", cloud.len());
        return SparseVoxelGrid::empty(shape);
    }

    let mut occupied: Vec<(VoxelCoord, Vec<usize>)> = buckets.into_iter().collect();
    occupied.sort_unstable_by_key(|(coord, _)| coord.zxy());

    let mut subsampled = 0usize;
    let voxels: Vec<VoxelFeatures> = occupied
        .into_iter()
        .map(|(coord, members)| {
            let kept = if members.len() > capacity {
                subsampled += 1;
                sample_without_replacement(&members, capacity, rng)
            } else {
                members
            };
            augment_voxel(cloud, coord, &kept, capacity)
        })
        .collect();

    debug!(
        "Built {} voxels from {} points ({} subsampled to {})",
        voxels.len(),
        cloud.len(),
        subsampled,
        capacity
    );

    SparseVoxelGrid { shape, voxels }
}

/// Draw `amount` distinct members uniformly, in draw order.
fn sample_without_replacement<R: Rng + ?Sized>(
    members: &[usize],
    amount: usize,
    rng: &mut R,
) -> Vec<usize> {
    index::sample(rng, members.len(), amount)
        .into_iter()
        .map(|i| members[i])
        .collect()
}

/// Build the padded, centroid-augmented rows for one voxel.
fn augment_voxel(
    cloud: &PointCloud,
    coord: VoxelCoord,
    kept: &[usize],
    capacity: usize,
) -> VoxelFeatures {
    let mut sum = [0.0f64; 3];
    for &idx in kept {
        let p = cloud.point(idx);
        for axis in 0..3 {
            sum[axis] += p[axis] as f64;
        }
    }
    let n = kept.len().max(1) as f64;
    let centroid = sum.map(|s| (s / n) as f32);

    let mut rows = Vec::with_capacity(capacity);
    for &idx in kept {
        let [x, y, z] = cloud.point(idx);
        rows.push([
            x,
            y,
            z,
            x - centroid[0],
            y - centroid[1],
            z - centroid[2],
        ]);
    }
    rows.resize(capacity, [0.0; FEATURES_PER_POINT]);

    VoxelFeatures {
        coord,
        rows,
        kept: kept.len(),
        centroid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn unit_config(capacity: usize, bound: i32) -> VoxelConfig {
        VoxelConfig {
            size_x: 1.0,
            size_y: 1.0,
            size_z: 1.0,
            max_points_per_voxel: capacity,
            max_voxel_x: bound,
            max_voxel_y: bound,
            max_voxel_z: bound,
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_over_capacity_voxel_is_subsampled() {
        let cloud = PointCloud::from_coords(&[
            [0.1, 0.1, 1.1],
            [0.2, 0.2, 1.2],
            [0.9, 0.9, 1.9],
        ]);
        let grid = build_voxel_grid(&cloud, &unit_config(2, 5), &mut rng());

        assert_eq!(grid.shape(), [5, 10, 10, 2, 6]);
        assert_eq!(grid.num_voxels(), 1);

        let voxel = &grid.voxels()[0];
        assert_eq!(voxel.coord, VoxelCoord::new(5, 5, 1));
        assert_eq!(voxel.kept, 2);
        assert_eq!(voxel.rows.len(), 2);

        let originals: HashSet<[u32; 3]> = cloud
            .to_coords()
            .iter()
            .map(|p| p.map(f32::to_bits))
            .collect();
        let kept: HashSet<[u32; 3]> = voxel
            .rows
            .iter()
            .map(|r| [r[0].to_bits(), r[1].to_bits(), r[2].to_bits()])
            .collect();
        assert_eq!(kept.len(), 2, "sampled points must be distinct");
        assert!(kept.is_subset(&originals));
    }

    #[test]
    fn test_ground_layer_voxel_dropped() {
        let cloud = PointCloud::from_coords(&[
            [0.1, 0.1, 0.1],
            [0.2, 0.2, 0.2],
            [0.9, 0.9, 0.9],
        ]);
        let grid = build_voxel_grid(&cloud, &unit_config(2, 5), &mut rng());
        assert!(grid.is_empty());
        assert_eq!(grid.shape(), [5, 10, 10, 2, 6]);
    }

    #[test]
    fn test_under_capacity_voxel_is_padded() {
        let cloud = PointCloud::from_coords(&[[1.25, -2.5, 3.5], [1.75, -2.25, 3.0]]);
        let grid = build_voxel_grid(&cloud, &unit_config(4, 5), &mut rng());

        let voxel = grid.voxel(VoxelCoord::new(6, 2, 3)).expect("voxel present");
        assert_eq!(voxel.kept, 2);
        assert_eq!(voxel.rows.len(), 4);
        assert_eq!(voxel.rows[0], [1.25, -2.5, 3.5, -0.25, -0.125, 0.25]);
        assert_eq!(voxel.rows[1], [1.75, -2.25, 3.0, 0.25, 0.125, -0.25]);
        assert_eq!(voxel.rows[2], [0.0; 6]);
        assert_eq!(voxel.rows[3], [0.0; 6]);
        assert_eq!(voxel.centroid, [1.5, -2.375, 3.25]);
    }

    #[test]
    fn test_exact_capacity_keeps_all_without_padding() {
        let cloud = PointCloud::from_coords(&[[0.1, 0.1, 1.1], [0.2, 0.3, 1.4], [0.6, 0.7, 1.8]]);
        let grid = build_voxel_grid(&cloud, &unit_config(3, 5), &mut rng());

        let voxel = &grid.voxels()[0];
        assert_eq!(voxel.kept, 3);
        let positions: Vec<[f32; 3]> = voxel.rows.iter().map(|r| [r[0], r[1], r[2]]).collect();
        assert_eq!(positions, cloud.to_coords());
    }

    #[test]
    fn test_every_voxel_has_capacity_rows() {
        let mut cloud = PointCloud::new();
        // 1, 3, 7 and 12 points in four distinct voxels
        for (count, base) in [(1, 0.0f32), (3, 1.0), (7, 2.0), (12, 3.0)] {
            for k in 0..count {
                let t = k as f32 / 20.0;
                cloud.push(base + t, t, 1.0 + t);
            }
        }
        let capacity = 5;
        let grid = build_voxel_grid(&cloud, &unit_config(capacity, 10), &mut rng());

        assert_eq!(grid.num_voxels(), 4);
        for voxel in grid.voxels() {
            assert_eq!(voxel.rows.len(), capacity);
            assert!(voxel.kept <= capacity);
            assert!(voxel.rows[voxel.kept..].iter().all(|r| *r == [0.0; 6]));
        }
        let kept: Vec<usize> = grid.voxels().iter().map(|v| v.kept).collect();
        assert_eq!(kept, vec![1, 3, 5, 5]);
    }

    #[test]
    fn test_centroid_offsets_sum_to_zero() {
        let mut cloud = PointCloud::new();
        for k in 0..50 {
            let t = (k as f32 * 0.37).fract();
            cloud.push(2.0 + t * 0.9, -1.0 + (1.0 - t) * 0.9, 3.0 + t * t * 0.9);
        }
        let grid = build_voxel_grid(&cloud, &unit_config(35, 10), &mut rng());

        for voxel in grid.voxels() {
            for axis in 3..6 {
                let sum: f32 = voxel.rows[..voxel.kept].iter().map(|r| r[axis]).sum();
                assert!(sum.abs() < 1e-4, "offset column {} sums to {}", axis, sum);
            }
        }
    }

    #[test]
    fn test_out_of_bounds_points_never_emitted() {
        let cloud = PointCloud::from_coords(&[
            [4.5, 0.0, 1.0],   // inside
            [5.0, 0.0, 1.0],   // x on the upper bound
            [-5.0, 0.0, 1.0],  // x at the lower bound
            [-4.0, 0.0, 1.0],  // inside
            [0.0, 5.2, 1.0],   // y outside
            [0.0, 0.0, 5.0],   // z on the upper bound
            [0.0, 0.0, -0.5],  // below ground
        ]);
        let grid = build_voxel_grid(&cloud, &unit_config(2, 5), &mut rng());

        let coords: Vec<VoxelCoord> = grid.voxels().iter().map(|v| v.coord).collect();
        assert_eq!(coords, vec![VoxelCoord::new(1, 5, 1), VoxelCoord::new(9, 5, 1)]);

        for (index, _) in grid.entries() {
            for (axis, &extent) in grid.shape().iter().enumerate() {
                assert!(index[axis] < extent);
            }
        }
    }

    #[test]
    fn test_nan_point_does_not_corrupt_voxel() {
        let cloud = PointCloud::from_coords(&[
            [0.2, 0.3, 1.5],
            [0.6, 0.7, 1.5],
            [f32::NAN, f32::NAN, 1.5],
        ]);
        let grid = build_voxel_grid(&cloud, &unit_config(4, 5), &mut rng());

        assert_eq!(grid.num_voxels(), 1);
        let voxel = grid.voxel(VoxelCoord::new(5, 5, 1)).expect("voxel present");
        assert_eq!(voxel.kept, 2);
        assert!(voxel.centroid.iter().all(|c| c.is_finite()));
        assert!(grid.entries().all(|(_, v)| v.is_finite()));
        for axis in 3..6 {
            let sum: f32 = voxel.rows[..voxel.kept].iter().map(|r| r[axis]).sum();
            assert!(sum.abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_cloud_gives_empty_grid() {
        let config = VoxelConfig::default();
        let grid = build_voxel_grid(&PointCloud::new(), &config, &mut rng());
        assert!(grid.is_empty());
        assert_eq!(grid.num_entries(), 0);
        assert_eq!(grid.shape(), config.dense_shape());
    }

    #[test]
    fn test_entries_layout() {
        let cloud = PointCloud::from_coords(&[[0.5, 1.5, 2.5]]);
        let grid = build_voxel_grid(&cloud, &unit_config(2, 5), &mut rng());

        let (indices, values) = grid.to_coo();
        assert_eq!(indices.len(), 12);
        assert_eq!(values.len(), 12);
        assert_eq!(indices[0], [2, 5, 6, 0, 0]);
        assert_eq!(values[0], 0.5);
        assert_eq!(indices[2], [2, 5, 6, 0, 2]);
        assert_eq!(values[2], 2.5);
        assert_eq!(indices[6], [2, 5, 6, 1, 0]);
        assert_eq!(values[6], 0.0);
        assert_eq!(indices[11], [2, 5, 6, 1, 5]);
    }

    #[test]
    fn test_voxels_sorted_by_z_then_x_then_y() {
        let cloud = PointCloud::from_coords(&[
            [1.5, 0.5, 2.5],
            [0.5, 3.5, 1.5],
            [0.5, 0.5, 2.5],
            [0.5, 0.5, 1.5],
        ]);
        let grid = build_voxel_grid(&cloud, &unit_config(1, 5), &mut rng());
        let order: Vec<(i32, i32, i32)> = grid.voxels().iter().map(|v| v.coord.zxy()).collect();
        assert_eq!(order, vec![(1, 5, 5), (1, 5, 8), (2, 5, 5), (2, 6, 5)]);
    }

    #[test]
    fn test_same_seed_same_grid() {
        let mut cloud = PointCloud::new();
        for k in 0..200 {
            let t = k as f32 / 200.0;
            cloud.push(t * 3.0, (t * 7.0).fract() * 2.0, 1.0 + (t * 13.0).fract() * 2.0);
        }
        let config = unit_config(4, 5);

        let a = build_voxel_grid(&cloud, &config, &mut StdRng::seed_from_u64(9));
        let b = build_voxel_grid(&cloud, &config, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_centroids_independent_of_seed_when_not_subsampled() {
        let cloud = PointCloud::from_coords(&[[0.2, 0.2, 1.2], [0.4, 0.6, 1.8], [2.5, 2.5, 2.5]]);
        let config = unit_config(8, 5);

        let a = build_voxel_grid(&cloud, &config, &mut StdRng::seed_from_u64(1));
        let b = build_voxel_grid(&cloud, &config, &mut StdRng::seed_from_u64(2));
        let ca: Vec<[f32; 3]> = a.voxels().iter().map(|v| v.centroid).collect();
        let cb: Vec<[f32; 3]> = b.voxels().iter().map(|v| v.centroid).collect();
        assert_eq!(ca, cb);
    }
}
