//! Bounded frame handoff between the capture callback and the stream sender
//!
//! The producer side never blocks: the capture callback runs on the audio
//! backend's real-time thread and must finish within a frame period. When
//! the queue is full the incoming frame is dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// One block of little-endian 16-bit PCM samples
pub type AudioFrame = Vec<u8>;

/// Queue depth in frames (~256ms of audio each at 16kHz/4096 samples)
pub const FRAME_QUEUE_CAPACITY: usize = 32;

/// Create a bounded frame queue
#[must_use]
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let sender = FrameSender {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, FrameReceiver { rx })
}

/// Producer half, held by the capture source. Dropping it closes the queue.
pub struct FrameSender {
    tx: mpsc::Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Enqueue a frame without ever blocking the caller.
    ///
    /// A full queue drops the INCOMING frame: already-queued audio stays
    /// in capture order and the real-time callback returns immediately.
    pub fn push(&self, frame: AudioFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped_total = total, "frame queue full, dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("frame queue closed, discarding frame");
            }
        }
    }

    /// Total frames dropped because the queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half, drained by the transcription sender loop
pub struct FrameReceiver {
    rx: mpsc::Receiver<AudioFrame>,
}

impl FrameReceiver {
    /// Wait for the next frame; `None` once the queue is closed.
    pub async fn pop(&mut self) -> Option<AudioFrame> {
        self.rx.recv().await
    }
}
