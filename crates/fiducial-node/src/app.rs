//! Wiring of a node from configuration: filesystem topics, calibration,
//! dictionary and detector.

use crate::annotate::Annotator;
use crate::calibration::load_calibration_or_unset;
use crate::config::{ConfigError, NodeConfig};
use crate::engine::DetectionEngine;
use crate::error::NodeError;
use crate::mailbox::{mailbox_handler, FrameMailbox};
use crate::node::{FiducialNode, NodeStats};
use crate::pose::PoseEstimator;
use crate::transport::fs::{DirectoryImageSink, DirectorySource, JsonLinesFiducialSink};
use crate::transport::FrameSource;
use crossbeam_channel::Receiver;
use fiducial_aruco::Dictionary;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// A configured node together with its ingress source.
pub struct App {
    node: FiducialNode,
    source: Box<dyn FrameSource>,
    period: Duration,
}

impl App {
    /// Validate `config` and open every channel.
    ///
    /// Calibration problems only disable poses; an invalid config, an
    /// unreadable dictionary or an unavailable topic are errors.
    pub fn from_config(config: &NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let dict_path = config
            .dictionary_path
            .clone()
            .ok_or(ConfigError::MissingDictionary)?;
        let dictionary = Dictionary::load_json(&dict_path).map_err(|source| NodeError::Dictionary {
            path: dict_path.clone(),
            source,
        })?;
        info!(
            "dictionary `{}`: {} markers of {}x{} bits",
            dictionary.name,
            dictionary.len(),
            dictionary.marker_size,
            dictionary.marker_size
        );

        let calibration = load_calibration_or_unset(config.calibration_path.as_deref());
        let pose = PoseEstimator::from_calibration(&calibration, config.marker_length);

        let root = &config.transport_root;
        let topics = &config.topics;
        let source = DirectorySource::open(root, &topics.input, config.replay_rate_hz, config.replay_loop)?;
        let images = DirectoryImageSink::create(root, &topics.debug_image)?;
        let fiducials = JsonLinesFiducialSink::create(root, &topics.fiducials)?;

        let node = FiducialNode::new(
            Arc::new(FrameMailbox::new()),
            DetectionEngine::with_quad_detector(config.detector.clone()),
            Arc::new(dictionary),
            Box::new(images),
            Box::new(fiducials),
        )
        .with_pose_estimator(pose)
        .with_annotator(Annotator::new(config.annotation.clone()))
        .with_jpeg_quality(config.jpeg_quality);

        Ok(Self {
            node,
            source: Box::new(source),
            period: config.period(),
        })
    }

    /// Start ingress, process until `shutdown` fires, then stop ingress.
    pub fn run(mut self, shutdown: &Receiver<()>) -> Result<NodeStats, NodeError> {
        let handler = mailbox_handler(Arc::clone(self.node.mailbox()));
        self.source.start(Box::new(handler))?;
        let stats = self.node.run(self.period, shutdown);
        self.source.stop();
        Ok(stats)
    }
}
