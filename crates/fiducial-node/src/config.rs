//! Node configuration, loadable from JSON.

use crate::annotate::AnnotatorStyle;
use fiducial_aruco::QuadDetectorParams;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("no marker dictionary configured")]
    MissingDictionary,
    #[error("{field} must be finite and positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("jpeg_quality must be in 1..=100 (got {0})")]
    JpegQuality(u8),
}

/// Topic names of the three channels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub input: String,
    pub debug_image: String,
    pub fiducials: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            input: "/raspicam_node/image/compressed".to_string(),
            debug_image: "/fiducial_node/fiducial_image/compressed".to_string(),
            fiducials: "/fiducial_node/fiducials".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON code table of the marker family.
    pub dictionary_path: Option<PathBuf>,
    pub calibration_path: Option<PathBuf>,
    /// Physical marker side in metres.
    pub marker_length: f64,
    /// Processing cycles per second.
    pub rate_hz: f64,
    pub jpeg_quality: u8,
    pub topics: TopicConfig,
    /// Root directory of the filesystem transport.
    pub transport_root: PathBuf,
    /// Frames per second of the directory replay source.
    pub replay_rate_hz: f64,
    pub replay_loop: bool,
    pub detector: QuadDetectorParams,
    /// Debug overlay colours.
    pub annotation: AnnotatorStyle,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            dictionary_path: None,
            calibration_path: None,
            marker_length: 0.05,
            rate_hz: 1.0,
            jpeg_quality: 90,
            topics: TopicConfig::default(),
            transport_root: PathBuf::from("."),
            replay_rate_hz: 10.0,
            replay_loop: true,
            detector: QuadDetectorParams::default(),
            annotation: AnnotatorStyle::default(),
        }
    }
}

impl NodeConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dictionary_path.is_none() {
            return Err(ConfigError::MissingDictionary);
        }
        for (field, value) in [
            ("rate_hz", self.rate_hz),
            ("marker_length", self.marker_length),
            ("replay_rate_hz", self.replay_rate_hz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        Ok(())
    }

    /// Interval between processing cycles.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: NodeConfig = serde_json::from_str(
            r#"{"dictionary_path": "dict.json", "rate_hz": 4, "topics": {"input": "/cam"}}"#,
        )
        .expect("config");
        assert_eq!(cfg.dictionary_path, Some(PathBuf::from("dict.json")));
        assert_eq!(cfg.period(), Duration::from_millis(250));
        assert_eq!(cfg.topics.input, "/cam");
        assert_eq!(cfg.topics.fiducials, TopicConfig::default().fiducials);
        assert_eq!(cfg.jpeg_quality, 90);
        cfg.validate().expect("valid");
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(matches!(
            NodeConfig::default().validate(),
            Err(ConfigError::MissingDictionary)
        ));

        let base = NodeConfig {
            dictionary_path: Some("d.json".into()),
            ..NodeConfig::default()
        };
        let zero_rate = NodeConfig {
            rate_hz: 0.0,
            ..base.clone()
        };
        assert!(matches!(
            zero_rate.validate(),
            Err(ConfigError::NotPositive { field: "rate_hz", .. })
        ));
        let nan_length = NodeConfig {
            marker_length: f64::NAN,
            ..base.clone()
        };
        assert!(nan_length.validate().is_err());
        let quality = NodeConfig {
            jpeg_quality: 0,
            ..base
        };
        assert!(matches!(quality.validate(), Err(ConfigError::JpegQuality(0))));
    }

    #[test]
    fn json_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.json");
        let cfg = NodeConfig {
            dictionary_path: Some("dict.json".into()),
            calibration_path: Some("calib.json".into()),
            replay_loop: false,
            ..NodeConfig::default()
        };
        cfg.write_json(&path).expect("write");
        assert_eq!(NodeConfig::load_json(&path).expect("load"), cfg);
    }

    #[test]
    fn sample_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/node_config.json");
        let cfg = NodeConfig::load_json(path).expect("sample config");
        cfg.validate().expect("valid");
        assert_eq!(cfg.transport_root, PathBuf::from("bus"));
        assert_eq!(cfg.topics, TopicConfig::default());
        assert_eq!(cfg.detector.threshold, None);
    }
}
