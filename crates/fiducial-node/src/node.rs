//! Processing loop: one mailbox snapshot in, one debug image and one
//! detection set out, per cycle.

use crate::annotate::Annotator;
use crate::engine::{DetectionEngine, DictionaryHandle};
use crate::frame::{decode_frame, encode_frame, CompressedImage, Stamp};
use crate::mailbox::FrameMailbox;
use crate::message::{Fiducial, FiducialArray};
use crate::pose::PoseEstimator;
use crate::transport::{FiducialSink, ImageSink};
use crossbeam_channel::{select, tick, Receiver};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of one processing cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No frame arrived since the previous cycle.
    Idle,
    /// The frame could not be decoded, scanned or re-encoded.
    Abandoned { seq: u64 },
    /// At least one output reached its sink.
    Published { seq: u64, markers: usize },
    /// The frame was processed but both sinks refused their output.
    Undelivered { seq: u64 },
}

/// Cycle counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub cycles: u64,
    pub idle: u64,
    pub abandoned: u64,
    /// Cycles with at least one output delivered.
    pub published: u64,
    pub undelivered: u64,
    pub publish_errors: u64,
}

pub struct FiducialNode {
    mailbox: Arc<FrameMailbox>,
    engine: DetectionEngine,
    dictionary: DictionaryHandle,
    pose: Option<PoseEstimator>,
    annotator: Annotator,
    image_sink: Box<dyn ImageSink>,
    fiducial_sink: Box<dyn FiducialSink>,
    jpeg_quality: u8,
    stats: NodeStats,
}

impl FiducialNode {
    pub fn new(
        mailbox: Arc<FrameMailbox>,
        engine: DetectionEngine,
        dictionary: DictionaryHandle,
        image_sink: Box<dyn ImageSink>,
        fiducial_sink: Box<dyn FiducialSink>,
    ) -> Self {
        Self {
            mailbox,
            engine,
            dictionary,
            pose: None,
            annotator: Annotator::default(),
            image_sink,
            fiducial_sink,
            jpeg_quality: 90,
            stats: NodeStats::default(),
        }
    }

    /// Enable pose output. `None` keeps it disabled and says so once.
    pub fn with_pose_estimator(mut self, pose: Option<PoseEstimator>) -> Self {
        match &pose {
            Some(est) => info!("pose estimation enabled, marker side {} m", est.marker_length()),
            None => warn!(
                "pose estimation disabled: calibration incomplete; publishing ids and corners only"
            ),
        }
        self.pose = pose;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Run one cycle: take the latest frame, detect, annotate, publish.
    ///
    /// Everything published comes from the single frame taken at the start.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;

        let Some(frame) = self.mailbox.take() else {
            self.stats.idle += 1;
            return CycleOutcome::Idle;
        };
        let seq = frame.seq;

        let (format, rgb) = match decode_frame(&frame.image) {
            Ok(decoded) => decoded,
            Err(err) => return self.abandon(seq, "decode", &err),
        };

        let detections = match self.engine.detect(&rgb, &self.dictionary) {
            Ok(found) => found,
            Err(err) => return self.abandon(seq, "detection", &err),
        };

        let with_pose = match self.pose.as_mut() {
            Some(est) => est.accepts_frame(rgb.width(), rgb.height()),
            None => false,
        };
        let fiducials: Vec<Fiducial> = detections
            .iter()
            .map(|d| Fiducial {
                marker_id: d.id,
                corners: d.corners.map(|c| [c.x, c.y]),
                pose: if with_pose {
                    self.pose.as_ref().and_then(|est| est.estimate(&d.corners))
                } else {
                    None
                },
            })
            .collect();

        let annotated = self.annotator.annotate(&rgb, &detections);
        let encoded = match encode_frame(&annotated, format, self.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(err) => return self.abandon(seq, "encode", &err),
        };

        let stamp = Stamp::now();
        let debug_image = CompressedImage::new(format.tag(), encoded, stamp);
        let mut delivered = 0;
        match self.image_sink.publish_image(debug_image) {
            Ok(()) => delivered += 1,
            Err(err) => {
                self.stats.publish_errors += 1;
                error!("frame {seq}: debug image publish failed: {err}");
            }
        }

        let message = FiducialArray {
            stamp,
            source_stamp: frame.image.stamp,
            source_seq: seq,
            width: rgb.width(),
            height: rgb.height(),
            fiducials,
        };
        match self.fiducial_sink.publish_fiducials(&message) {
            Ok(()) => delivered += 1,
            Err(err) => {
                self.stats.publish_errors += 1;
                error!("frame {seq}: fiducials publish failed: {err}");
            }
        }
        if delivered == 0 {
            self.stats.undelivered += 1;
            return CycleOutcome::Undelivered { seq };
        }

        self.stats.published += 1;
        let markers = message.fiducials.len();
        let age_ms = stamp.0.saturating_sub(frame.arrived.0) / 1_000_000;
        debug!(
            "frame {seq}: {}x{} {}, {markers} markers, ids {:?}, {age_ms} ms after arrival",
            message.width,
            message.height,
            format.tag(),
            message.fiducials.iter().map(|f| f.marker_id).collect::<Vec<_>>()
        );
        CycleOutcome::Published { seq, markers }
    }

    fn abandon(&mut self, seq: u64, stage: &str, err: &dyn std::error::Error) -> CycleOutcome {
        self.stats.abandoned += 1;
        warn!("frame {seq}: {stage} failed, cycle abandoned: {err}");
        CycleOutcome::Abandoned { seq }
    }

    /// Run cycles every `period` until `shutdown` yields a message or
    /// disconnects. The signal is only observed between cycles.
    pub fn run(&mut self, period: Duration, shutdown: &Receiver<()>) -> NodeStats {
        info!(
            "processing every {:.3}s with dictionary `{}` ({} markers)",
            period.as_secs_f64(),
            self.dictionary.name,
            self.dictionary.len()
        );
        let ticker = tick(period);
        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(ticker) -> _ => {
                    self.run_cycle();
                }
            }
        }

        let s = self.stats;
        info!(
            "shutdown: {} cycles ({} published, {} undelivered, {} idle, {} abandoned), {} publish errors, {} of {} frames dropped in mailbox",
            s.cycles,
            s.published,
            s.undelivered,
            s.idle,
            s.abandoned,
            s.publish_errors,
            self.mailbox.dropped(),
            self.mailbox.received()
        );
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel::{channel_fiducial_sink, channel_image_sink};
    use crate::transport::TransportError;
    use fiducial_aruco::Dictionary;

    fn node() -> (
        FiducialNode,
        crossbeam_channel::Receiver<CompressedImage>,
        crossbeam_channel::Receiver<FiducialArray>,
    ) {
        let dict = Arc::new(
            Dictionary::from_json_str(include_str!("../../../testdata/demo_6x6_32.json"))
                .expect("fixture dictionary"),
        );
        let (images, image_rx) = channel_image_sink("/debug");
        let (fids, fid_rx) = channel_fiducial_sink("/fiducials");
        let node = FiducialNode::new(
            Arc::new(FrameMailbox::new()),
            DetectionEngine::default(),
            dict,
            Box::new(images),
            Box::new(fids),
        );
        (node, image_rx, fid_rx)
    }

    #[test]
    fn idle_without_frames() {
        let (mut node, image_rx, fid_rx) = node();
        assert_eq!(node.run_cycle(), CycleOutcome::Idle);
        assert!(image_rx.is_empty() && fid_rx.is_empty());
        assert_eq!(node.stats().idle, 1);
    }

    #[test]
    fn corrupt_frame_is_abandoned_and_node_keeps_going() {
        let (mut node, image_rx, _fid_rx) = node();
        let seq = node
            .mailbox()
            .put(CompressedImage::new("jpeg", vec![1, 2, 3], Stamp(1)));
        assert_eq!(node.run_cycle(), CycleOutcome::Abandoned { seq });
        assert!(image_rx.is_empty());
        assert_eq!(node.run_cycle(), CycleOutcome::Idle);
        assert_eq!(node.stats().abandoned, 1);
    }

    struct Broken;

    impl ImageSink for Broken {
        fn publish_image(&mut self, _image: CompressedImage) -> Result<(), TransportError> {
            Err(TransportError::Disconnected {
                topic: "/debug".into(),
            })
        }
    }

    #[test]
    fn publish_failure_does_not_block_the_other_channel() {
        let (node, _image_rx, fid_rx) = node();
        let mut node = FiducialNode {
            image_sink: Box::new(Broken),
            ..node
        };
        let frame = image::RgbImage::new(32, 24);
        let png = encode_frame(&frame, crate::frame::FrameFormat::Png, 90).expect("encode");
        node.mailbox().put(CompressedImage::new("png", png, Stamp(3)));

        assert!(matches!(
            node.run_cycle(),
            CycleOutcome::Published { markers: 0, .. }
        ));
        let msg = fid_rx.try_recv().expect("fiducials");
        assert_eq!((msg.width, msg.height), (32, 24));
        assert_eq!(msg.source_stamp, Stamp(3));
        assert_eq!(node.stats().publish_errors, 1);
        assert_eq!(node.stats().published, 1);
    }

    impl FiducialSink for Broken {
        fn publish_fiducials(&mut self, _msg: &FiducialArray) -> Result<(), TransportError> {
            Err(TransportError::Disconnected {
                topic: "/fiducials".into(),
            })
        }
    }

    #[test]
    fn cycle_with_no_delivered_output_is_not_published() {
        let (node, _image_rx, _fid_rx) = node();
        let mut node = FiducialNode {
            image_sink: Box::new(Broken),
            fiducial_sink: Box::new(Broken),
            ..node
        };
        let frame = image::RgbImage::new(16, 16);
        let png = encode_frame(&frame, crate::frame::FrameFormat::Png, 90).expect("encode");
        let seq = node.mailbox().put(CompressedImage::new("png", png, Stamp(5)));

        assert_eq!(node.run_cycle(), CycleOutcome::Undelivered { seq });
        let stats = node.stats();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.undelivered, 1);
        assert_eq!(stats.publish_errors, 2);
    }

    #[test]
    fn run_stops_on_shutdown_signal() {
        let (mut node, _image_rx, _fid_rx) = node();
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(()).expect("signal");
        let stats = node.run(Duration::from_secs(3600), &rx);
        assert_eq!(stats.cycles, 0);
    }
}
