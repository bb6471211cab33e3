//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::queue::{AudioFrame, FrameSender};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per frame pushed into the queue
pub const FRAME_SAMPLES: usize = 4096;

/// Captures audio from the default input device and pushes fixed-size
/// PCM frames into the frame queue
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no suitable input device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Device("no mono 16kHz input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Start capturing into the given queue
    ///
    /// The cpal callback runs on the audio backend's own real-time thread,
    /// so network latency downstream can never stall capture. `frames` is
    /// moved into the callback: stopping capture drops it and closes the
    /// queue. Device errors after startup are reported on `faults` and are
    /// fatal to the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the input stream cannot be built
    pub fn start(
        &mut self,
        frames: FrameSender,
        faults: mpsc::UnboundedSender<Error>,
    ) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        pending.push(to_i16(sample));
                        if pending.len() == FRAME_SAMPLES {
                            frames.push(pcm_bytes(&pending));
                            pending.clear();
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    let _ = faults.send(Error::Device(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing and release the device
    ///
    /// Dropping the stream drops the callback and with it the queue's only
    /// sender, so a parked sender loop wakes up with a closed queue.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Convert one f32 sample in [-1.0, 1.0] to a signed 16-bit sample
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode samples as the little-endian PCM bytes the recognition engine
/// expects
#[must_use]
pub fn pcm_bytes(samples: &[i16]) -> AudioFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
