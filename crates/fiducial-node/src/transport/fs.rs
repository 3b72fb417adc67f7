//! Filesystem topics.
//!
//! A topic name maps onto a path below a root directory (`/a/b` becomes
//! `root/a/b`). Image topics are directories of numbered image files; the
//! detections topic is a JSON Lines file `root/a/b.jsonl`.

use super::{FiducialSink, FrameHandler, FrameSource, ImageSink, TransportError};
use crate::frame::{CompressedImage, FrameFormat, Stamp};
use crate::message::FiducialArray;
use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

/// Path of `topic` below `root`; `.` and `..` segments are dropped.
pub fn topic_path(root: &Path, topic: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in Path::new(topic).components() {
        if let Component::Normal(p) = part {
            path.push(p);
        }
    }
    path
}

fn unavailable(topic: &str, reason: impl ToString) -> TransportError {
    TransportError::Unavailable {
        topic: topic.to_string(),
        reason: reason.to_string(),
    }
}

/// Replays the image files of a directory as a camera feed.
pub struct DirectorySource {
    topic: String,
    files: Vec<PathBuf>,
    period: Duration,
    looping: bool,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl DirectorySource {
    /// Index `*.jpg`, `*.jpeg` and `*.png` files of the topic directory in
    /// name order. A missing or empty directory is unavailable.
    pub fn open(
        root: &Path,
        topic: &str,
        rate_hz: f64,
        looping: bool,
    ) -> Result<Self, TransportError> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(unavailable(topic, format!("invalid replay rate {rate_hz}")));
        }
        let dir = topic_path(root, topic);
        let entries = fs::read_dir(&dir)
            .map_err(|e| unavailable(topic, format!("{}: {e}", dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && image_format_of(p).is_some())
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(unavailable(
                topic,
                format!("no jpg/jpeg/png files in {}", dir.display()),
            ));
        }

        info!(
            "replaying {} frames from {} at {rate_hz} Hz{}",
            files.len(),
            dir.display(),
            if looping { " (looping)" } else { "" }
        );
        Ok(Self {
            topic: topic.to_string(),
            files,
            period: Duration::from_secs_f64(1.0 / rate_hz),
            looping,
            stop_tx: None,
            worker: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn image_format_of(path: &Path) -> Option<FrameFormat> {
    let ext = path.extension()?.to_str()?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(FrameFormat::Jpeg),
        "png" => Some(FrameFormat::Png),
        _ => None,
    }
}

impl FrameSource for DirectorySource {
    fn start(&mut self, handler: FrameHandler) -> Result<(), TransportError> {
        if self.worker.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let files = self.files.clone();
        let looping = self.looping;
        let ticker = tick(self.period);
        let topic = self.topic.clone();

        let worker = std::thread::Builder::new()
            .name("directory-source".into())
            .spawn(move || {
                'replay: loop {
                    for path in &files {
                        select! {
                            recv(stop_rx) -> _ => break 'replay,
                            recv(ticker) -> _ => {}
                        }
                        let Some(format) = image_format_of(path) else {
                            continue;
                        };
                        match fs::read(path) {
                            Ok(data) => handler(CompressedImage::new(format.tag(), data, Stamp::now())),
                            Err(e) => warn!("{topic}: cannot read {}: {e}", path.display()),
                        }
                    }
                    if !looping {
                        info!("{topic}: replay finished");
                        break;
                    }
                }
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DirectorySource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes each published image as `NNNNNN.<ext>` into the topic directory.
pub struct DirectoryImageSink {
    dir: PathBuf,
    next: u64,
}

impl DirectoryImageSink {
    pub fn create(root: &Path, topic: &str) -> Result<Self, TransportError> {
        let dir = topic_path(root, topic);
        fs::create_dir_all(&dir)
            .map_err(|e| unavailable(topic, format!("{}: {e}", dir.display())))?;
        Ok(Self { dir, next: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for DirectoryImageSink {
    fn publish_image(&mut self, image: CompressedImage) -> Result<(), TransportError> {
        let ext = FrameFormat::from_tag(&image.format).map_or("bin", FrameFormat::extension);
        let path = self.dir.join(format!("{:06}.{ext}", self.next));
        fs::write(&path, &image.data)?;
        self.next += 1;
        debug!("wrote {} ({} bytes)", path.display(), image.data.len());
        Ok(())
    }
}

/// Appends one JSON document per published detection set.
pub struct JsonLinesFiducialSink {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonLinesFiducialSink {
    pub fn create(root: &Path, topic: &str) -> Result<Self, TransportError> {
        let mut path = topic_path(root, topic);
        if path == root {
            return Err(unavailable(topic, "empty topic name"));
        }
        path.as_mut_os_string().push(".jsonl");
        let open = || -> std::io::Result<File> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(&path)
        };
        let file = open().map_err(|e| unavailable(topic, format!("{}: {e}", path.display())))?;
        Ok(Self {
            out: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FiducialSink for JsonLinesFiducialSink {
    fn publish_fiducials(&mut self, fiducials: &FiducialArray) -> Result<(), TransportError> {
        serde_json::to_writer(&mut self.out, fiducials)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
