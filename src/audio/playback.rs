//! Audio playback to speakers with last-wins preemption
//!
//! All playback goes through a single mutex-guarded clip slot: starting a
//! clip replaces whatever occupies the slot, so the previous reply's
//! remaining audio is discarded in the same critical section that starts
//! the new one. At most one clip is ever audible.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Playback device abstraction: "stop current, start this"
pub trait AudioSink: Send + Sync {
    /// Play encoded (MP3) audio, interrupting any current playback
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the audio cannot be decoded
    fn play(&self, audio: &[u8]) -> Result<()>;

    /// Stop whatever is currently playing
    fn stop(&self);
}

/// A decoded reply queued into the output slot
struct Clip {
    samples: Vec<f32>,
    pos: usize,
}

/// The single shared slot holding the clip currently being played
#[derive(Clone, Default)]
pub struct ClipSlot(Arc<Mutex<Option<Clip>>>);

impl ClipSlot {
    /// Start playing `samples`, discarding any clip already in the slot.
    ///
    /// Replacing the slot contents under one lock is the stop-then-start:
    /// the output callback can never observe both clips.
    pub fn start(&self, samples: Vec<f32>) {
        let Ok(mut slot) = self.0.lock() else { return };
        if slot.is_some() {
            tracing::debug!("preempting in-flight playback");
        }
        *slot = Some(Clip { samples, pos: 0 });
    }

    /// Discard the active clip, if any
    pub fn stop(&self) {
        let Ok(mut slot) = self.0.lock() else { return };
        *slot = None;
    }

    /// Whether nothing is playing
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.0.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }

    /// Fill an interleaved output buffer from the active clip, silence
    /// when idle. A finished clip vacates the slot.
    fn fill(&self, out: &mut [f32], channels: usize) {
        let Ok(mut slot) = self.0.lock() else {
            out.fill(0.0);
            return;
        };

        let mut finished = false;
        match slot.as_mut() {
            Some(clip) => {
                for frame in out.chunks_mut(channels) {
                    let sample = clip.samples.get(clip.pos).copied().unwrap_or(0.0);
                    for out_sample in frame.iter_mut() {
                        *out_sample = sample;
                    }
                    if clip.pos < clip.samples.len() {
                        clip.pos += 1;
                    }
                }
                if clip.pos >= clip.samples.len() {
                    finished = true;
                }
            }
            None => out.fill(0.0),
        }

        if finished {
            *slot = None;
        }
    }
}

/// Plays audio on the default output device
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// holds it open for the lifetime of this handle; the handle itself is
/// cheap to share.
pub struct DevicePlayback {
    slot: ClipSlot,
    shutdown: std::sync::mpsc::Sender<()>,
}

impl DevicePlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no suitable output device is available
    pub fn new() -> Result<Self> {
        let slot = ClipSlot::default();
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let thread_slot = slot.clone();
        std::thread::spawn(move || {
            run_output_device(&thread_slot, &shutdown_rx, &ready_tx);
        });

        ready_rx
            .recv()
            .map_err(|_| Error::Device("playback thread exited during startup".to_string()))??;

        Ok(Self {
            slot,
            shutdown: shutdown_tx,
        })
    }

    /// Play raw samples directly, preempting any current clip
    pub fn play_samples(&self, samples: Vec<f32>) {
        self.slot.start(samples);
    }

    /// Whether the device has finished the last clip
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.slot.is_idle()
    }
}

impl AudioSink for DevicePlayback {
    fn play(&self, audio: &[u8]) -> Result<()> {
        let samples = decode_mp3(audio)?;
        tracing::debug!(samples = samples.len(), "starting playback");
        self.slot.start(samples);
        Ok(())
    }

    fn stop(&self) {
        self.slot.stop();
    }
}

impl Drop for DevicePlayback {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// Thread body: build and hold the output stream until shutdown
fn run_output_device(
    slot: &ClipSlot,
    shutdown: &std::sync::mpsc::Receiver<()>,
    ready: &std::sync::mpsc::Sender<Result<()>>,
) {
    let stream = match build_output_stream(slot) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::Device(e.to_string())));
        return;
    }

    let _ = ready.send(Ok(()));
    let _ = shutdown.recv();
    drop(stream);
    tracing::debug!("audio playback stopped");
}

fn build_output_stream(slot: &ClipSlot) -> Result<Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Device("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Device(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: stereo, duplicating the mono signal
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Device("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = PLAYBACK_SAMPLE_RATE,
        channels = config.channels,
        "audio playback initialized"
    );

    let channels = config.channels as usize;
    let callback_slot = slot.clone();

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback_slot.fill(data, channels);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Device(e.to_string()))
}

/// Decode MP3 bytes to f32 samples
///
/// # Errors
///
/// Returns `Error::Playback` on malformed data
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
