//! In-process transport over crossbeam channels.

use super::{FiducialSink, FrameHandler, FrameSource, ImageSink, TransportError};
use crate::frame::CompressedImage;
use crate::message::FiducialArray;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::thread::JoinHandle;

/// Source fed through the paired [`Sender`].
pub struct ChannelSource {
    rx: Receiver<CompressedImage>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

/// Create a source and the sender that feeds it.
pub fn channel_source() -> (Sender<CompressedImage>, ChannelSource) {
    let (tx, rx) = unbounded();
    (
        tx,
        ChannelSource {
            rx,
            stop_tx: None,
            worker: None,
        },
    )
}

impl FrameSource for ChannelSource {
    fn start(&mut self, handler: FrameHandler) -> Result<(), TransportError> {
        if self.worker.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let rx = self.rx.clone();
        let worker = std::thread::Builder::new()
            .name("channel-source".into())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(rx) -> msg => match msg {
                        Ok(image) => handler(image),
                        Err(_) => break,
                    },
                }
            })?;
        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the worker.
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct ChannelImageSink {
    topic: String,
    tx: Sender<CompressedImage>,
}

pub fn channel_image_sink(topic: impl Into<String>) -> (ChannelImageSink, Receiver<CompressedImage>) {
    let (tx, rx) = unbounded();
    (
        ChannelImageSink {
            topic: topic.into(),
            tx,
        },
        rx,
    )
}

impl ImageSink for ChannelImageSink {
    fn publish_image(&mut self, image: CompressedImage) -> Result<(), TransportError> {
        self.tx
            .send(image)
            .map_err(|_| TransportError::Disconnected {
                topic: self.topic.clone(),
            })
    }
}

pub struct ChannelFiducialSink {
    topic: String,
    tx: Sender<FiducialArray>,
}

pub fn channel_fiducial_sink(
    topic: impl Into<String>,
) -> (ChannelFiducialSink, Receiver<FiducialArray>) {
    let (tx, rx) = unbounded();
    (
        ChannelFiducialSink {
            topic: topic.into(),
            tx,
        },
        rx,
    )
}

impl FiducialSink for ChannelFiducialSink {
    fn publish_fiducials(&mut self, fiducials: &FiducialArray) -> Result<(), TransportError> {
        self.tx
            .send(fiducials.clone())
            .map_err(|_| TransportError::Disconnected {
                topic: self.topic.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Stamp;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn source_delivers_until_stopped() {
        let (tx, mut source) = channel_source();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (done_tx, done_rx) = unbounded();
        source
            .start(Box::new(move |img: CompressedImage| {
                sink.lock().expect("lock").push(img.stamp);
                let _ = done_tx.send(());
            }))
            .expect("start");
        assert!(matches!(
            source.start(Box::new(|_: CompressedImage| {})),
            Err(TransportError::AlreadyStarted)
        ));

        tx.send(CompressedImage::new("jpeg", vec![1], Stamp(5))).expect("send");
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delivered");
        source.stop();
        source.stop();

        assert_eq!(*seen.lock().expect("lock"), vec![Stamp(5)]);
    }

    #[test]
    fn sink_reports_disconnect() {
        let (mut sink, rx) = channel_image_sink("/debug");
        sink.publish_image(CompressedImage::new("jpeg", vec![1], Stamp(1)))
            .expect("publish");
        assert_eq!(rx.try_recv().map(|m| m.data), Ok(vec![1]));
        drop(rx);
        let err = sink
            .publish_image(CompressedImage::new("jpeg", vec![2], Stamp(2)))
            .unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { topic } if topic == "/debug"));
    }
}
