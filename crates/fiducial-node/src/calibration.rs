//! Camera calibration store.
//!
//! The store is a JSON document in OpenCV `FileStorage` layout with the
//! entries `cameraMatrix`, `dist_coeffs` and an optional `cameraResolution`.
//! Matrices may be written as `{"type_id": "opencv-matrix", "rows", "cols",
//! "data"}` objects, as nested row arrays or as flat arrays.
//!
//! Loading never fails on individual entries: a missing or malformed entry
//! leaves the corresponding field unset and logs a warning.

use fiducial_core::{CameraIntrinsics, CameraModel, Distortion};
use log::{info, warn};
use nalgebra::Matrix3;
use serde_json::Value;
use std::{fs, path::Path};

pub const CAMERA_MATRIX_KEY: &str = "cameraMatrix";
pub const DIST_COEFFS_KEY: &str = "dist_coeffs";
pub const RESOLUTION_KEY: &str = "cameraResolution";

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("calibration store root is not a JSON object")]
    NotAnObject,
}

/// Camera parameters loaded once at startup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationParameters {
    pub camera_matrix: Option<Matrix3<f64>>,
    /// OpenCV-ordered coefficients, at least four when set.
    pub dist_coeffs: Option<Vec<f64>>,
    /// Image size `(width, height)` the calibration was computed for.
    pub resolution: Option<(u32, u32)>,
}

impl CalibrationParameters {
    /// `true` when both the camera matrix and distortion loaded.
    pub fn pose_ready(&self) -> bool {
        self.camera_matrix.is_some() && self.dist_coeffs.is_some()
    }

    /// Camera model for pose estimation, when calibration is complete and
    /// the intrinsics are usable.
    pub fn camera_model(&self) -> Option<CameraModel> {
        let k = self.camera_matrix.as_ref()?;
        let coeffs = self.dist_coeffs.as_deref()?;
        let intrinsics = CameraIntrinsics::from_matrix(k);
        if !intrinsics.is_valid() {
            warn!("calibration: camera matrix has non-positive focal lengths");
            return None;
        }
        let distortion = Distortion::from_coeffs(coeffs)?;
        Some(CameraModel {
            intrinsics,
            distortion,
        })
    }

    /// Extract parameters from a parsed store.
    pub fn from_value(root: &Value) -> Result<Self, CalibrationError> {
        let obj = root.as_object().ok_or(CalibrationError::NotAnObject)?;

        let camera_matrix = match obj.get(CAMERA_MATRIX_KEY) {
            None => {
                warn!("calibration: `{CAMERA_MATRIX_KEY}` missing; pose estimation disabled");
                None
            }
            Some(v) => {
                let parsed = numeric_matrix(v)
                    .filter(|data| data.len() == 9)
                    .map(|data| Matrix3::from_row_slice(&data));
                if parsed.is_none() {
                    warn!("calibration: `{CAMERA_MATRIX_KEY}` is not a 3x3 numeric matrix; pose estimation disabled");
                }
                parsed
            }
        };

        let dist_coeffs = match obj.get(DIST_COEFFS_KEY) {
            None => {
                warn!("calibration: `{DIST_COEFFS_KEY}` missing; pose estimation disabled");
                None
            }
            Some(v) => match numeric_matrix(v) {
                Some(data) if data.len() >= 4 => {
                    if !matches!(data.len(), 4 | 5 | 8) {
                        warn!(
                            "calibration: {} distortion coefficients given; only the first {} are used",
                            data.len(),
                            data.len().min(8)
                        );
                    }
                    Some(data)
                }
                _ => {
                    warn!("calibration: `{DIST_COEFFS_KEY}` needs at least 4 numbers; pose estimation disabled");
                    None
                }
            },
        };

        let resolution = obj.get(RESOLUTION_KEY).and_then(|v| {
            let parsed = resolution_pair(v);
            if parsed.is_none() {
                warn!("calibration: `{RESOLUTION_KEY}` is not a pair of positive integers; ignored");
            }
            parsed
        });

        Ok(Self {
            camera_matrix,
            dist_coeffs,
            resolution,
        })
    }
}

/// Read a calibration store.
///
/// Returns `Err` only when the file itself cannot be read or parsed.
pub fn load_calibration(path: impl AsRef<Path>) -> Result<CalibrationParameters, CalibrationError> {
    let raw = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&raw)?;
    CalibrationParameters::from_value(&root)
}

/// Startup variant of [`load_calibration`]: any failure yields unset
/// parameters with a warning so the node keeps detecting IDs.
pub fn load_calibration_or_unset(path: Option<&Path>) -> CalibrationParameters {
    let Some(path) = path else {
        warn!("calibration: no calibration file configured; pose estimation disabled");
        return CalibrationParameters::default();
    };

    match load_calibration(path) {
        Ok(params) => {
            info!(
                "calibration: loaded {} (camera matrix: {}, distortion: {}, resolution: {:?})",
                path.display(),
                params.camera_matrix.is_some(),
                params.dist_coeffs.is_some(),
                params.resolution
            );
            params
        }
        Err(err) => {
            warn!(
                "calibration: cannot load {}: {err}; pose estimation disabled",
                path.display()
            );
            CalibrationParameters::default()
        }
    }
}

/// Row-major data of a numeric matrix entry.
fn numeric_matrix(v: &Value) -> Option<Vec<f64>> {
    match v {
        Value::Object(m) => {
            let rows = usize::try_from(m.get("rows")?.as_u64()?).ok()?;
            let cols = usize::try_from(m.get("cols")?.as_u64()?).ok()?;
            let data = numbers(m.get("data")?)?;
            (rows.checked_mul(cols) == Some(data.len())).then_some(data)
        }
        Value::Array(items) if items.iter().all(Value::is_array) => {
            let rows: Vec<Vec<f64>> = items.iter().map(numbers).collect::<Option<_>>()?;
            let cols = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|r| r.len() != cols) {
                return None;
            }
            Some(rows.concat())
        }
        Value::Array(_) => numbers(v),
        _ => None,
    }
}

fn numbers(v: &Value) -> Option<Vec<f64>> {
    v.as_array()?
        .iter()
        .map(|x| x.as_f64().filter(|f| f.is_finite()))
        .collect()
}

fn resolution_pair(v: &Value) -> Option<(u32, u32)> {
    let data = numeric_matrix(v)?;
    let [w, h] = data.as_slice() else {
        return None;
    };
    let to_px = |f: f64| (f >= 1.0 && f.fract() == 0.0 && f <= u32::MAX as f64).then_some(f as u32);
    Some((to_px(*w)?, to_px(*h)?))
}
