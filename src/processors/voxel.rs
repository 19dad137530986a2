//! Voxel indexing and spatial bucketing.

use std::collections::HashMap;

use crate::config::VoxelConfig;
use crate::core::loaders::PointCloud;

/// Integer voxel coordinate, addressed by the cell's lower-leftmost corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelCoord {
    pub ix: i32,
    pub iy: i32,
    pub iz: i32,
}

impl VoxelCoord {
    pub const fn new(ix: i32, iy: i32, iz: i32) -> Self {
        Self { ix, iy, iz }
    }

    /// Ordering key used when emitting grids: z first, then x, then y.
    #[inline]
    pub fn zxy(&self) -> (i32, i32, i32) {
        (self.iz, self.ix, self.iy)
    }
}

/// Map a point to the voxel containing it: `floor(coord / size)` per axis.
///
/// No bounds are checked; callers decide which voxels to keep.
#[inline]
pub fn voxel_index(point: [f32; 3], sizes: [f32; 3]) -> VoxelCoord {
    VoxelCoord::new(
        (point[0] / sizes[0]).floor() as i32,
        (point[1] / sizes[1]).floor() as i32,
        (point[2] / sizes[2]).floor() as i32,
    )
}

/// Retained region of the grid, in voxels.
///
/// x and y are symmetric half-extents; z starts above the ground voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelBounds {
    pub max_x: i32,
    pub max_y: i32,
    pub max_z: i32,
}

impl VoxelBounds {
    pub fn from_config(config: &VoxelConfig) -> Self {
        Self {
            max_x: config.max_voxel_x,
            max_y: config.max_voxel_y,
            max_z: config.max_voxel_z,
        }
    }

    /// `-max_x < ix < max_x`, `-max_y < iy < max_y`, `0 < iz < max_z`.
    ///
    /// Voxel layer 0 and everything below it are ground and never kept.
    #[inline]
    pub fn contains(&self, v: VoxelCoord) -> bool {
        -self.max_x < v.ix
            && v.ix < self.max_x
            && -self.max_y < v.iy
            && v.iy < self.max_y
            && 0 < v.iz
            && v.iz < self.max_z
    }

    /// Shift x and y so retained coordinates are non-negative dense offsets.
    #[inline]
    pub fn shift(&self, v: VoxelCoord) -> VoxelCoord {
        VoxelCoord::new(v.ix + self.max_x, v.iy + self.max_y, v.iz)
    }
}

/// Point indices grouped by shifted voxel coordinate.
pub type VoxelBuckets = HashMap<VoxelCoord, Vec<usize>>;

/// Group point indices by voxel, dropping voxels outside `bounds`.
///
/// Points with a non-finite coordinate have no voxel and are dropped too.
/// Keys are shifted coordinates (see [`VoxelBounds::shift`]); indices within a
/// bucket keep point order.
pub fn bucket_points(cloud: &PointCloud, sizes: [f32; 3], bounds: &VoxelBounds) -> VoxelBuckets {
    let mut buckets: VoxelBuckets = HashMap::new();

    for idx in 0..cloud.len() {
        let point = cloud.point(idx);
        if !point.iter().all(|c| c.is_finite()) {
            continue;
        }
        let voxel = voxel_index(point, sizes);
        if bounds.contains(voxel) {
            buckets.entry(bounds.shift(voxel)).or_default().push(idx);
        }
    }

    buckets
}
