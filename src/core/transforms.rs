//! Sensor-to-vehicle frame alignment.
//!
//! Every sensor reports points in its own frame. A [`Calibration`] gives the
//! sensor pose relative to the vehicle as a rotation quaternion plus a
//! translation; aligning a cloud rotates every point by that quaternion and
//! then adds the translation. Per-point work is parallelized using Rayon.

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loaders::PointCloud;

/// Quaternions with a norm below this are treated as degenerate.
const MIN_QUATERNION_NORM: f64 = 1e-9;

/// Errors raised by frame transforms.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("invalid calibration rotation {rotation:?}: {reason}")]
    InvalidCalibration { rotation: [f64; 4], reason: String },
}

/// Pose of a sensor relative to the vehicle frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Rotation quaternion as `[w, x, y, z]`.
    pub rotation: [f64; 4],
    /// Translation `[x, y, z]` in meters.
    pub translation: [f64; 3],
}

impl Calibration {
    /// Calibration that leaves points unchanged.
    pub fn identity() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0],
            translation: [0.0; 3],
        }
    }

    /// Pure translation with identity rotation.
    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// The rotation as a unit quaternion.
    ///
    /// A finite, non-zero quaternion is normalized; anything else cannot
    /// represent a rotation.
    pub fn unit_quaternion(&self) -> Result<UnitQuaternion<f64>, TransformError> {
        let [w, x, y, z] = self.rotation;
        if !self.rotation.iter().all(|c| c.is_finite()) {
            return Err(TransformError::InvalidCalibration {
                rotation: self.rotation,
                reason: "non-finite component".to_string(),
            });
        }

        let q = Quaternion::new(w, x, y, z);
        if q.norm() < MIN_QUATERNION_NORM {
            return Err(TransformError::InvalidCalibration {
                rotation: self.rotation,
                reason: "zero-norm quaternion".to_string(),
            });
        }

        Ok(UnitQuaternion::from_quaternion(q))
    }

    #[inline]
    fn translation_vector(&self) -> Vector3<f64> {
        Vector3::from(self.translation)
    }
}

/// Rotate every point by the quaternion, or by its inverse when `inverse` is set.
///
/// # Errors
///
/// Returns [`TransformError::InvalidCalibration`] for a degenerate quaternion.
pub fn rotate_points(
    cloud: &PointCloud,
    rotation: [f64; 4],
    inverse: bool,
) -> Result<PointCloud, TransformError> {
    let calibration = Calibration {
        rotation,
        translation: [0.0; 3],
    };
    let mut q = calibration.unit_quaternion()?;
    if inverse {
        q = q.inverse();
    }
    Ok(apply_affine(
        cloud,
        q.to_rotation_matrix().into_inner(),
        Vector3::zeros(),
        Vector3::zeros(),
    ))
}

/// Transform a sensor-frame cloud into the vehicle frame: `R * p + t`.
///
/// # Example
///
/// ```
/// use voxel_pipeline::core::loaders::PointCloud;
/// use voxel_pipeline::core::transforms::{align_to_vehicle, Calibration};
///
/// let cloud = PointCloud::from_coords(&[[1.0, 0.0, 0.0]]);
/// let aligned = align_to_vehicle(&cloud, &Calibration::from_translation([10.0, 0.0, 0.0])).unwrap();
/// assert_eq!(aligned.point(0), [11.0, 0.0, 0.0]);
/// ```
pub fn align_to_vehicle(
    cloud: &PointCloud,
    calibration: &Calibration,
) -> Result<PointCloud, TransformError> {
    let rotation = calibration.unit_quaternion()?.to_rotation_matrix().into_inner();
    Ok(apply_affine(
        cloud,
        rotation,
        Vector3::zeros(),
        calibration.translation_vector(),
    ))
}

/// Transform a vehicle-frame cloud back into the sensor frame: `R⁻¹ * (p - t)`.
pub fn align_to_sensor(
    cloud: &PointCloud,
    calibration: &Calibration,
) -> Result<PointCloud, TransformError> {
    let rotation = calibration
        .unit_quaternion()?
        .inverse()
        .to_rotation_matrix()
        .into_inner();
    Ok(apply_affine(
        cloud,
        rotation,
        -calibration.translation_vector(),
        Vector3::zeros(),
    ))
}

/// Compute `rotation * (p + pre) + post` for every point.
fn apply_affine(
    cloud: &PointCloud,
    rotation: Matrix3<f64>,
    pre: Vector3<f64>,
    post: Vector3<f64>,
) -> PointCloud {
    let transformed: Vec<[f32; 3]> = (0..cloud.len())
        .into_par_iter()
        .map(|i| {
            let p = Vector3::new(cloud.x[i] as f64, cloud.y[i] as f64, cloud.z[i] as f64);
            let q = rotation * (p + pre) + post;
            [q.x as f32, q.y as f32, q.z as f32]
        })
        .collect();

    let mut out = PointCloud::with_capacity(transformed.len());
    for [x, y, z] in transformed {
        out.push(x, y, z);
    }
    out
}
