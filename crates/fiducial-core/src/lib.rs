//! Core types and utilities shared by the fiducial node crates.
//!
//! This crate is small and purely geometric: grayscale image views, a
//! projective homography, a pinhole camera model with lens distortion and a
//! planar-square pose solver. It performs no I/O and knows nothing about
//! marker dictionaries or transports.

mod camera;
mod homography;
mod image;
mod logger;
mod pose;

pub use camera::{CameraIntrinsics, CameraModel, Distortion, UndistortConfig};
pub use homography::{homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView, ImageError};
pub use pose::{estimate_square_pose, square_object_points, MarkerPose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
