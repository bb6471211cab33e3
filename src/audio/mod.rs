//! Audio capture, playback, and the frame handoff between them and the
//! network loops

mod capture;
mod playback;
mod queue;

pub use capture::{pcm_bytes, AudioCapture, FRAME_SAMPLES, SAMPLE_RATE};
pub use playback::{decode_mp3, AudioSink, ClipSlot, DevicePlayback};
pub use queue::{frame_queue, AudioFrame, FrameReceiver, FrameSender, FRAME_QUEUE_CAPACITY};
