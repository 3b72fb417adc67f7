//! ArUco-style marker dictionaries and free-standing marker detection.
//!
//! This crate covers:
//! - dictionaries loaded from JSON code tables,
//! - matching observed codes against a dictionary over the four rotations,
//! - finding square marker candidates in a grayscale frame and decoding them,
//! - rendering markers for printing and synthetic test frames.

mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quads;
mod render;
mod threshold;

pub use decode::DecodeConfig;
pub use detector::{MarkerDetection, QuadDetector, QuadDetectorParams, ScanError};
pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use render::{paste_gray, render_marker};
