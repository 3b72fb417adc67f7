//! Pose step: marker poses from corners and the loaded calibration.

use crate::calibration::CalibrationParameters;
use crate::message::FiducialPose;
use fiducial_core::{estimate_square_pose, CameraModel};
use log::warn;
use nalgebra::Point2;
use std::collections::HashSet;

/// Present only when the calibration provides both intrinsics and distortion.
#[derive(Clone, Debug)]
pub struct PoseEstimator {
    camera: CameraModel,
    marker_length: f64,
    resolution: Option<(u32, u32)>,
    warned_sizes: HashSet<(u32, u32)>,
}

impl PoseEstimator {
    pub fn from_calibration(calibration: &CalibrationParameters, marker_length: f64) -> Option<Self> {
        if !(marker_length.is_finite() && marker_length > 0.0) {
            return None;
        }
        let camera = calibration.camera_model()?;
        Some(Self {
            camera,
            marker_length,
            resolution: calibration.resolution,
            warned_sizes: HashSet::new(),
        })
    }

    pub fn marker_length(&self) -> f64 {
        self.marker_length
    }

    /// Whether poses may be computed for a frame of this size.
    ///
    /// A frame that differs from the calibrated resolution gets no poses;
    /// each distinct offending size is reported once.
    pub fn accepts_frame(&mut self, width: u32, height: u32) -> bool {
        let Some((cw, ch)) = self.resolution else {
            return true;
        };
        if (cw, ch) == (width, height) {
            return true;
        }
        if self.warned_sizes.insert((width, height)) {
            warn!(
                "pose: frame size {width}x{height} differs from calibrated {cw}x{ch}; poses omitted for such frames"
            );
        }
        false
    }

    pub fn estimate(&self, corners: &[Point2<f32>; 4]) -> Option<FiducialPose> {
        let pose = estimate_square_pose(&self.camera, corners, self.marker_length)?;
        Some(FiducialPose {
            translation: pose.tvec(),
            rotation: pose.rvec(),
        })
    }
}
