//! Single-camera fiducial perception node.
//!
//! Frames arrive asynchronously and land in a single-slot [`FrameMailbox`];
//! a fixed-cadence loop ([`FiducialNode::run`]) takes the latest frame,
//! detects markers, draws them and publishes an annotated image plus a
//! [`FiducialArray`] with ids, corners and (when calibrated) poses.
//!
//! ```no_run
//! use fiducial_node::{App, NodeConfig};
//!
//! let config = NodeConfig {
//!     dictionary_path: Some("testdata/demo_6x6_32.json".into()),
//!     ..NodeConfig::default()
//! };
//! let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
//! let stats = App::from_config(&config)?.run(&stop_rx)?;
//! println!("{stats:?}");
//! # Ok::<(), fiducial_node::NodeError>(())
//! ```

mod annotate;
mod app;
mod calibration;
mod config;
mod engine;
mod error;
mod frame;
mod mailbox;
mod message;
mod node;
mod pose;
pub mod transport;

pub use annotate::{Annotator, AnnotatorStyle};
pub use app::App;
pub use calibration::{
    load_calibration, load_calibration_or_unset, CalibrationError, CalibrationParameters,
};
pub use config::{ConfigError, NodeConfig, TopicConfig};
pub use engine::{
    DetectError, DetectedMarker, DetectionEngine, DetectionResult, DictionaryHandle, MarkerBackend,
};
pub use error::NodeError;
pub use frame::{
    decode_frame, encode_frame, CompressedFrame, CompressedImage, FrameError, FrameFormat, Stamp,
};
pub use mailbox::{mailbox_handler, FrameMailbox};
pub use message::{Fiducial, FiducialArray, FiducialPose};
pub use node::{CycleOutcome, FiducialNode, NodeStats};
pub use pose::PoseEstimator;
pub use transport::TransportError;

pub use fiducial_aruco as aruco;
pub use fiducial_core as core;
