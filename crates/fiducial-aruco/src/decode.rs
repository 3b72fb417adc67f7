//! Marker bit sampling through a quad homography.

use crate::threshold::otsu_threshold_from_samples;
use fiducial_core::{homography_from_4pt, GrayImageView, Homography};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Decoder configuration for one marker quad.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Marker border width in cells (OpenCV typically uses 1).
    pub border_bits: usize,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
    /// Also try the inverted polarity (white border on a dark background).
    pub detect_inverted: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            border_bits: 1,
            min_border_score: 0.85,
            detect_inverted: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct MarkerObservation {
    /// Observed inner bits (row-major, black=1).
    pub code: u64,
    pub border_score: f32,
    pub inverted: bool,
}

const THRESH_SUBDIV: usize = 3;

/// Sampling layout in the canonical marker square, one unit per cell.
pub(crate) struct QuadDecoder<'a> {
    cfg: &'a DecodeConfig,
    bits: usize,
    cells: usize,
    points: Vec<Point2<f64>>, // row-major: cy * cells + cx
    threshold_points: Vec<Point2<f64>>,
    scratch_bits: Vec<u8>,
    scratch_thr: Vec<u8>,
}

impl<'a> QuadDecoder<'a> {
    pub fn new(cfg: &'a DecodeConfig, bits: usize) -> Option<Self> {
        if bits == 0 || bits * bits > 64 {
            return None;
        }
        let cells = bits + 2 * cfg.border_bits;

        let points = grid_points(cells, 1.0);
        let threshold_points = grid_points(cells * THRESH_SUBDIV, 1.0 / THRESH_SUBDIV as f64);

        Some(Self {
            cfg,
            bits,
            cells,
            scratch_bits: Vec::with_capacity(points.len()),
            scratch_thr: Vec::with_capacity(threshold_points.len()),
            points,
            threshold_points,
        })
    }

    /// Sample and binarize the marker whose image corners are `quad`
    /// (TL, TR, BR, BL of the canonical square).
    pub fn decode_quad(
        &mut self,
        img: &GrayImageView<'_>,
        quad: &[Point2<f32>; 4],
    ) -> Option<MarkerObservation> {
        let s = self.cells as f64;
        let canonical = [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(s, s),
            Point2::new(0.0, s),
        ];
        let dst = quad.map(|p| Point2::new(p.x as f64, p.y as f64));
        let h = homography_from_4pt(&canonical, &dst)?;
        self.decode_warped(img, &h)
    }

    fn decode_warped(&mut self, img: &GrayImageView<'_>, h: &Homography) -> Option<MarkerObservation> {
        self.scratch_bits.clear();
        for p in &self.points {
            let q = h.apply(*p);
            self.scratch_bits.push(sample_mean_3x3(img, q.x, q.y)?);
        }

        self.scratch_thr.clear();
        for p in &self.threshold_points {
            let q = h.apply(*p);
            if let Some(v) = sample_mean_3x3(img, q.x, q.y) {
                self.scratch_thr.push(v);
            }
        }

        decode_samples(
            &self.scratch_bits,
            &self.scratch_thr,
            self.cells,
            self.bits,
            self.cfg,
        )
    }
}

fn grid_points(n: usize, step: f64) -> Vec<Point2<f64>> {
    let mut points = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            points.push(Point2::new((x as f64 + 0.5) * step, (y as f64 + 0.5) * step));
        }
    }
    points
}

fn decode_samples(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    cfg: &DecodeConfig,
) -> Option<MarkerObservation> {
    if samples.len() != cells * cells {
        return None;
    }

    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(samples)
    } else {
        otsu_threshold_from_samples(thr_samples)
    };

    let border = cfg.border_bits;
    let polarities: &[bool] = if cfg.detect_inverted {
        &[false, true]
    } else {
        &[false]
    };

    let mut best: Option<MarkerObservation> = None;

    for &inverted in polarities {
        let mut border_ok = 0u32;
        let mut border_total = 0u32;
        let mut code: u64 = 0;

        for cy in 0..cells {
            for cx in 0..cells {
                let is_black = (samples[cy * cells + cx] <= thr) != inverted;
                let is_border = cx < border
                    || cy < border
                    || cx >= cells - border
                    || cy >= cells - border;
                if is_border {
                    border_total += 1;
                    if is_black {
                        border_ok += 1;
                    }
                } else if is_black {
                    code |= 1u64 << ((cy - border) * bits + (cx - border));
                }
            }
        }

        let border_score = if border_total > 0 {
            border_ok as f32 / border_total as f32
        } else {
            1.0
        };
        if border_score < cfg.min_border_score {
            continue;
        }

        if best.is_none_or(|b| border_score > b.border_score) {
            best = Some(MarkerObservation {
                code,
                border_score,
                inverted,
            });
        }
    }

    best
}

fn sample_mean_3x3(img: &GrayImageView<'_>, x: f64, y: f64) -> Option<u8> {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get(ix + dx, iy + dy)? as u32;
        }
    }
    Some((sum / 9) as u8)
}
