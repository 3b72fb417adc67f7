//! Ingress and egress contracts plus two implementations.
//!
//! - [`channel`]: in-process crossbeam channels, for embedding and tests.
//! - [`fs`]: filesystem topics under a root directory, used by the binary.

pub mod channel;
pub mod fs;

use crate::frame::CompressedImage;
use crate::message::FiducialArray;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("topic `{topic}` unavailable: {reason}")]
    Unavailable { topic: String, reason: String },
    #[error("topic `{topic}` disconnected")]
    Disconnected { topic: String },
    #[error("source already started")]
    AlreadyStarted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Callback invoked once per arriving frame.
pub type FrameHandler = Box<dyn Fn(CompressedImage) + Send + Sync + 'static>;

/// Subscription delivering compressed frames on its own thread.
pub trait FrameSource: Send {
    fn start(&mut self, handler: FrameHandler) -> Result<(), TransportError>;
    /// Stop delivering and join the delivery thread. Idempotent.
    fn stop(&mut self);
}

pub trait ImageSink: Send {
    fn publish_image(&mut self, image: CompressedImage) -> Result<(), TransportError>;
}

pub trait FiducialSink: Send {
    fn publish_fiducials(&mut self, fiducials: &FiducialArray) -> Result<(), TransportError>;
}
