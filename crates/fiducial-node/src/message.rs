//! Structured detections published once per completed cycle.

use crate::frame::Stamp;
use serde::{Deserialize, Serialize};

/// Marker pose relative to the camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialPose {
    /// Marker centre in camera coordinates, metres.
    pub translation: [f64; 3],
    /// Axis-angle (Rodrigues) rotation from marker to camera frame.
    pub rotation: [f64; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    pub marker_id: u32,
    /// TL, TR, BR, BL pixel corners.
    pub corners: [[f32; 2]; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<FiducialPose>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialArray {
    /// Publish time.
    pub stamp: Stamp,
    /// Timestamp carried by the source frame.
    pub source_stamp: Stamp,
    /// Mailbox sequence number of the source frame.
    pub source_seq: u64,
    pub width: u32,
    pub height: u32,
    pub fiducials: Vec<Fiducial>,
}
