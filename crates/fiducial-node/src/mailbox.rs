//! Single-slot, latest-wins frame handoff between ingress and the loop.

use crate::frame::{CompressedFrame, CompressedImage, Stamp};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Holds at most one frame. `put` replaces whatever is stored; `take`
/// empties the slot. Both are safe to call from different threads and a
/// `take` never observes a half-written frame.
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<CompressedFrame>>,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `image` as the latest frame and return its sequence number.
    pub fn put(&self, image: CompressedImage) -> u64 {
        let mut slot = self.lock();
        let seq = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = slot.replace(CompressedFrame {
            seq,
            arrived: Stamp::now(),
            image,
        });
        drop(slot);
        if let Some(old) = replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("mailbox: frame {} overwritten by {seq} before processing", old.seq);
        }
        seq
    }

    /// Remove and return the stored frame, if any.
    pub fn take(&self) -> Option<CompressedFrame> {
        self.lock().take()
    }

    /// Frames accepted by `put` so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Frames overwritten before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // The slot holds plain data, so a panic elsewhere cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, Option<CompressedFrame>> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Ingress handler writing every message into `mailbox`.
pub fn mailbox_handler(mailbox: Arc<FrameMailbox>) -> impl Fn(CompressedImage) + Send + Sync + 'static {
    move |image| {
        mailbox.put(image);
    }
}
