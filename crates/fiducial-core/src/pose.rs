//! Pose of a planar square marker from its four image corners.

use crate::{homography_from_4pt, CameraModel};
use nalgebra::{Matrix3, Point2, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform from the marker frame to the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub rotation: Rotation3<f64>,
    /// Marker centre in camera coordinates (same unit as the marker length).
    pub translation: Vector3<f64>,
}

impl MarkerPose {
    /// Rotation as an axis-angle (Rodrigues) vector.
    ///
    /// Goes through a quaternion so half turns keep their axis.
    pub fn rvec(&self) -> [f64; 3] {
        let v = UnitQuaternion::from_rotation_matrix(&self.rotation).scaled_axis();
        [v.x, v.y, v.z]
    }

    pub fn tvec(&self) -> [f64; 3] {
        [self.translation.x, self.translation.y, self.translation.z]
    }
}

/// Marker-plane corner coordinates (TL, TR, BR, BL), `z = 0`, y axis up.
pub fn square_object_points(marker_length: f64) -> [Point2<f64>; 4] {
    let h = 0.5 * marker_length;
    [
        Point2::new(-h, h),
        Point2::new(h, h),
        Point2::new(h, -h),
        Point2::new(-h, -h),
    ]
}

/// Estimate the marker pose from distorted pixel corners (TL, TR, BR, BL).
///
/// Corners are undistorted into normalized coordinates, related to the marker
/// plane by a homography `H ~ [r1 r2 t]`, and the rotation is projected back
/// onto SO(3). Returns `None` for degenerate corner sets or a non-positive
/// marker length.
pub fn estimate_square_pose(
    camera: &CameraModel,
    corners: &[Point2<f32>; 4],
    marker_length: f64,
) -> Option<MarkerPose> {
    if !(marker_length.is_finite() && marker_length > 0.0) {
        return None;
    }

    let mut normalized = [Point2::new(0.0, 0.0); 4];
    for (dst, c) in normalized.iter_mut().zip(corners) {
        let [x, y] = camera.undistort_normalized([c.x as f64, c.y as f64])?;
        *dst = Point2::new(x, y);
    }

    let object = square_object_points(marker_length);
    let h = homography_from_4pt(&object, &normalized)?.h;

    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let mut lambda = 0.5 * (h1.norm() + h2.norm());
    if lambda < 1e-12 {
        return None;
    }
    if h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 / lambda;
    let r2 = h2 / lambda;
    let r3 = r1.cross(&r2);
    let translation = h3 / lambda;

    let rotation = nearest_rotation(Matrix3::from_columns(&[r1, r2, r3]))?;

    Some(MarkerPose {
        rotation,
        translation,
    })
}

fn nearest_rotation(m: Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        let flipped = -u.column(2);
        u.set_column(2, &flipped);
    }
    Some(Rotation3::from_matrix_unchecked(u * v_t))
}
