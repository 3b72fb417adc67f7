//! Detection engine: grayscale conversion plus an injectable marker backend.

use fiducial_aruco::{Dictionary, QuadDetector, QuadDetectorParams, ScanError};
use fiducial_core::{GrayImageView, ImageError};
use image::RgbImage;
use nalgebra::Point2;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Process-wide, immutable marker dictionary.
pub type DictionaryHandle = Arc<Dictionary>;

#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("marker backend failed: {0}")]
    Backend(String),
}

/// One marker found in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedMarker {
    pub id: u32,
    /// TL, TR, BR, BL of the upright marker, in pixels.
    pub corners: [Point2<f32>; 4],
}

/// Markers in detection order; may be empty.
pub type DetectionResult = Vec<DetectedMarker>;

/// Anything able to find markers of a dictionary in a grayscale frame.
pub trait MarkerBackend: Send {
    fn detect_markers(
        &self,
        gray: &GrayImageView<'_>,
        dictionary: &Dictionary,
    ) -> Result<DetectionResult, DetectError>;
}

impl MarkerBackend for QuadDetector {
    fn detect_markers(
        &self,
        gray: &GrayImageView<'_>,
        dictionary: &Dictionary,
    ) -> Result<DetectionResult, DetectError> {
        let found = self.detect(gray, dictionary)?;
        Ok(found
            .into_iter()
            .map(|d| DetectedMarker {
                id: d.id,
                corners: d.corners,
            })
            .collect())
    }
}

/// Converts frames to intensity and hands them to the backend.
///
/// Holds no per-frame state; the same input gives the same result.
pub struct DetectionEngine {
    backend: Box<dyn MarkerBackend>,
}

impl DetectionEngine {
    pub fn new(backend: impl MarkerBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn with_quad_detector(params: QuadDetectorParams) -> Self {
        Self::new(QuadDetector::new(params))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))
    )]
    pub fn detect(
        &self,
        image: &RgbImage,
        dictionary: &DictionaryHandle,
    ) -> Result<DetectionResult, DetectError> {
        let gray = image::imageops::grayscale(image);
        let view = GrayImageView::new(gray.width() as usize, gray.height() as usize, gray.as_raw())?;
        self.backend.detect_markers(&view, dictionary)
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::with_quad_detector(QuadDetectorParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducial_aruco::{paste_gray, render_marker};
    use fiducial_core::GrayImage;
    use image::Rgb;

    fn demo() -> DictionaryHandle {
        Arc::new(
            Dictionary::from_json_str(include_str!("../../../testdata/demo_6x6_32.json"))
                .expect("fixture dictionary"),
        )
    }

    fn colour_frame(dict: &Dictionary, id: u32) -> RgbImage {
        let tile = render_marker(dict, id, 9, 1).expect("tile");
        let mut gray = GrayImage::filled(150, 110, 255);
        paste_gray(&mut gray, &tile, 30, 20);
        RgbImage::from_fn(150, 110, |x, y| {
            let v = gray.data[y as usize * 150 + x as usize];
            // dark marker on a tinted background
            if v == 0 {
                Rgb([10, 20, 30])
            } else {
                Rgb([240, 230, 200])
            }
        })
    }

    #[test]
    fn detects_through_grayscale_conversion() {
        let dict = demo();
        let frame = colour_frame(&dict, 4);
        let result = DetectionEngine::default().detect(&frame, &dict).expect("detect");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 4);
        assert!((result[0].corners[0].x - 30.0).abs() < 1.0);
        assert!((result[0].corners[0].y - 20.0).abs() < 1.0);
    }

    #[test]
    fn repeated_detection_is_identical_and_leaves_input_alone() {
        let dict = demo();
        let frame = colour_frame(&dict, 9);
        let before = frame.clone();
        let engine = DetectionEngine::default();
        let a = engine.detect(&frame, &dict).expect("detect");
        let b = engine.detect(&frame, &dict).expect("detect");
        assert_eq!(a, b);
        assert_eq!(frame, before);
    }

    struct Failing;

    impl MarkerBackend for Failing {
        fn detect_markers(
            &self,
            _gray: &GrayImageView<'_>,
            _dictionary: &Dictionary,
        ) -> Result<DetectionResult, DetectError> {
            Err(DetectError::Backend("corrupt buffer".into()))
        }
    }

    #[test]
    fn backend_errors_propagate() {
        let dict = demo();
        let frame = RgbImage::new(8, 8);
        let err = DetectionEngine::new(Failing).detect(&frame, &dict).unwrap_err();
        assert!(matches!(err, DetectError::Backend(_)));
    }
}
