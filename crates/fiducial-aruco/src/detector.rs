//! Free-standing marker detection on a full frame.

use crate::decode::{DecodeConfig, QuadDecoder};
use crate::quads::{components, fit_quad};
use crate::threshold::otsu_threshold_from_histogram;
use crate::{Dictionary, Matcher};
use fiducial_core::GrayImageView;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid image (width={width}, height={height}, {len} bytes)")]
    InvalidImage {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("marker_size {marker_size} implies more than 64 code bits")]
    UnsupportedMarkerSize { marker_size: usize },
}

/// Parameters of the quad search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadDetectorParams {
    /// Fixed binarization threshold; Otsu over the frame when unset.
    pub threshold: Option<u8>,
    /// Minimum quad side length in pixels.
    pub min_marker_side_px: f32,
    /// Minimum component area in pixels.
    pub min_area_px: usize,
    /// Hamming threshold; the dictionary's `max_correction_bits` when unset
    /// and never above it.
    pub max_hamming: Option<u8>,
    pub decode: DecodeConfig,
}

impl Default for QuadDetectorParams {
    fn default() -> Self {
        Self {
            threshold: None,
            min_marker_side_px: 12.0,
            min_area_px: 64,
            max_hamming: None,
            decode: DecodeConfig::default(),
        }
    }
}

/// One decoded marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDetection {
    pub id: u32,
    /// Image corners in the marker's own order: TL, TR, BR, BL of the
    /// upright marker, clockwise on screen.
    pub corners: [Point2<f32>; 4],
    /// Quarter turns between the dictionary code and the observed code.
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// Observed inner bits (row-major, black=1) before rotation.
    pub code: u64,
    pub inverted: bool,
}

impl MarkerDetection {
    pub fn center(&self) -> Point2<f32> {
        let sum = self
            .corners
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, c| acc + c.coords);
        Point2::from(sum * 0.25)
    }

    fn mean_side(&self) -> f32 {
        (0..4)
            .map(|i| (self.corners[(i + 1) % 4] - self.corners[i]).norm())
            .sum::<f32>()
            * 0.25
    }
}

/// Marker detector: threshold, component search, quad fit, decode, match.
#[derive(Clone, Debug, Default)]
pub struct QuadDetector {
    params: QuadDetectorParams,
}

impl QuadDetector {
    pub fn new(params: QuadDetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &QuadDetectorParams {
        &self.params
    }

    /// Detect all markers of `dict` in a grayscale frame.
    ///
    /// Output is ordered by the raster position of each marker's first
    /// pixel, so identical frames give identical results.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img, dict), fields(width = img.width, height = img.height, dictionary = %dict.name))
    )]
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        dict: &Dictionary,
    ) -> Result<Vec<MarkerDetection>, ScanError> {
        if !img.is_valid() {
            return Err(ScanError::InvalidImage {
                width: img.width,
                height: img.height,
                len: img.data.len(),
            });
        }
        if dict.marker_size == 0 || dict.bit_count() > 64 {
            return Err(ScanError::UnsupportedMarkerSize {
                marker_size: dict.marker_size,
            });
        }

        let params = &self.params;
        let threshold = params.threshold.unwrap_or_else(|| {
            let mut hist = [0u32; 256];
            for &v in img.data {
                hist[v as usize] += 1;
            }
            otsu_threshold_from_histogram(&hist)
        });

        let matcher = Matcher::new(dict, params.max_hamming.unwrap_or(u8::MAX));
        let Some(mut decoder) = QuadDecoder::new(&params.decode, dict.marker_size) else {
            return Err(ScanError::UnsupportedMarkerSize {
                marker_size: dict.marker_size,
            });
        };

        let polarities: &[bool] = if params.decode.detect_inverted {
            &[true, false]
        } else {
            &[true]
        };

        let mut found: Vec<(usize, MarkerDetection)> = Vec::new();
        let mut quads = 0usize;
        for &dark in polarities {
            let comps = components(img, threshold, dark, params.min_area_px);
            for comp in &comps {
                let Some(quad) = fit_quad(comp, img.width, params.min_marker_side_px) else {
                    continue;
                };
                quads += 1;
                let Some(obs) = decoder.decode_quad(img, &quad) else {
                    continue;
                };
                let Some(m) = matcher.match_code(obs.code) else {
                    continue;
                };

                let mut corners = quad;
                corners.rotate_left(m.rotation as usize);
                found.push((
                    comp.seed,
                    MarkerDetection {
                        id: m.id,
                        corners,
                        rotation: m.rotation,
                        hamming: m.hamming,
                        border_score: obs.border_score,
                        code: obs.code,
                        inverted: obs.inverted,
                    },
                ));
            }
        }

        found.sort_by_key(|(seed, _)| *seed);
        let out = suppress_duplicates(found.into_iter().map(|(_, d)| d).collect());

        debug!(
            "quad search: threshold {threshold}, {quads} quads, {} markers",
            out.len()
        );
        Ok(out)
    }
}

/// Drop detections overlapping a better detection of the same id.
fn suppress_duplicates(dets: Vec<MarkerDetection>) -> Vec<MarkerDetection> {
    let better = |a: &MarkerDetection, b: &MarkerDetection| {
        (a.hamming, -a.border_score) < (b.hamming, -b.border_score)
    };
    let overlaps = |a: &MarkerDetection, b: &MarkerDetection| {
        let reach = 0.5 * a.mean_side().min(b.mean_side());
        (a.center() - b.center()).norm() < reach
    };

    let mut keep = vec![true; dets.len()];
    for i in 0..dets.len() {
        for j in (i + 1)..dets.len() {
            if !keep[i] || !keep[j] || dets[i].id != dets[j].id || !overlaps(&dets[i], &dets[j]) {
                continue;
            }
            if better(&dets[j], &dets[i]) {
                keep[i] = false;
            } else {
                keep[j] = false;
            }
        }
    }

    dets.into_iter()
        .zip(keep)
        .filter_map(|(d, k)| k.then_some(d))
        .collect()
}
