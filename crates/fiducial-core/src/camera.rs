//! Pinhole intrinsics and lens distortion.
//!
//! Distortion follows the OpenCV coefficient layout
//! `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`: Brown-Conrady radial-tangential,
//! optionally with the rational radial denominator.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Extract intrinsics from a 3×3 camera matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    /// Returns `true` when focal lengths are finite and non-zero.
    pub fn is_valid(self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn pixel_to_normalized(self, pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        if !self.is_valid() {
            return None;
        }
        let x = (pixel_xy[0] - self.cx) / self.fx;
        let y = (pixel_xy[1] - self.cy) / self.fy;
        (x.is_finite() && y.is_finite()).then_some([x, y])
    }

    pub fn normalized_to_pixel(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        [
            self.fx * normalized_xy[0] + self.cx,
            self.fy * normalized_xy[1] + self.cy,
        ]
    }
}

/// Radial-tangential distortion, optionally rational.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl Distortion {
    /// Build from an OpenCV coefficient vector.
    ///
    /// Returns `None` for fewer than four coefficients. Coefficients beyond
    /// the eighth (thin-prism and tilt terms) are not modelled and ignored.
    pub fn from_coeffs(coeffs: &[f64]) -> Option<Self> {
        if coeffs.len() < 4 {
            return None;
        }
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Some(Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    #[inline]
    fn radial(&self, r2: f64) -> f64 {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        num / den
    }

    #[inline]
    fn tangential(&self, x: f64, y: f64, r2: f64) -> [f64; 2] {
        [
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        ]
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(&self, xy: [f64; 2]) -> [f64; 2] {
        let [x, y] = xy;
        let r2 = x * x + y * y;
        let radial = self.radial(r2);
        let [tx, ty] = self.tangential(x, y, r2);
        [x * radial + tx, y * radial + ty]
    }
}

/// Fixed-point iteration settings for undistortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    pub max_iters: usize,
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

/// Intrinsics plus distortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn distort_pixel(&self, undistorted_pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        let xn = self.intrinsics.pixel_to_normalized(undistorted_pixel_xy)?;
        let xd = self.distortion.distort_normalized(xn);
        let pix = self.intrinsics.normalized_to_pixel(xd);
        (pix[0].is_finite() && pix[1].is_finite()).then_some(pix)
    }

    /// Undistort a pixel into normalized (unit focal length) coordinates.
    pub fn undistort_normalized(&self, distorted_pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        self.undistort_normalized_with(distorted_pixel_xy, UndistortConfig::default())
    }

    pub fn undistort_normalized_with(
        &self,
        distorted_pixel_xy: [f64; 2],
        cfg: UndistortConfig,
    ) -> Option<[f64; 2]> {
        let xd = self.intrinsics.pixel_to_normalized(distorted_pixel_xy)?;
        let [mut x, mut y] = xd;

        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let radial = self.distortion.radial(r2);
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let [tx, ty] = self.distortion.tangential(x, y, r2);
            let x_next = (xd[0] - tx) / radial;
            let y_next = (xd[1] - ty) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }

            let step = ((x_next - x).powi(2) + (y_next - y).powi(2)).sqrt();
            x = x_next;
            y = y_next;
            if step <= cfg.eps.max(0.0) {
                break;
            }
        }

        Some([x, y])
    }

    pub fn undistort_pixel(&self, distorted_pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        self.undistort_normalized(distorted_pixel_xy)
            .map(|xn| self.intrinsics.normalized_to_pixel(xn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_camera() -> CameraModel {
        CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 900.0,
                fy: 920.0,
                cx: 640.0,
                cy: 480.0,
            },
            distortion: Distortion {
                k1: -0.12,
                k2: 0.03,
                p1: 0.001,
                p2: -0.0008,
                ..Distortion::default()
            },
        }
    }

    #[test]
    fn coefficient_vectors_shorter_than_four_are_rejected() {
        assert!(Distortion::from_coeffs(&[0.1, 0.2, 0.0]).is_none());
        let d = Distortion::from_coeffs(&[0.1, 0.2, 0.01, 0.02]).expect("four coeffs");
        assert_eq!(d.k3, 0.0);
        assert_eq!(d.k6, 0.0);
    }

    #[test]
    fn undistort_inverts_distort() {
        let cam = sample_camera();
        for p in [[100.0, 120.0], [640.0, 480.0], [1100.0, 850.0]] {
            let distorted = cam.distort_pixel(p).expect("distort");
            let back = cam.undistort_pixel(distorted).expect("undistort");
            assert!((back[0] - p[0]).abs() < 1e-6, "{back:?} vs {p:?}");
            assert!((back[1] - p[1]).abs() < 1e-6, "{back:?} vs {p:?}");
        }
    }

    #[test]
    fn zero_focal_length_is_invalid() {
        let k = CameraIntrinsics {
            fx: 0.0,
            fy: 500.0,
            cx: 0.0,
            cy: 0.0,
        };
        assert!(!k.is_valid());
        assert!(k.pixel_to_normalized([1.0, 1.0]).is_none());
    }
}
