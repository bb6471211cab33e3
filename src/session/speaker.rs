//! Speech playback for generated replies
//!
//! Synthesizes a speakable reply and hands it to the audio sink, which
//! preempts whatever is currently playing (last-issued-wins).

use std::sync::Arc;

use crate::audio::AudioSink;
use crate::synthesis::Synthesizer;
use crate::Result;

/// Speaks replies through the synthesis engine and playback device
pub struct Speaker {
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
}

impl Speaker {
    /// Create a speaker from explicitly constructed engine clients
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self { synthesizer, sink }
    }

    /// Synthesize and play, interrupting any reply still playing
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` when synthesis fails (the turn is
    /// dropped, nothing plays) or `Error::Playback` when the decoded
    /// audio cannot be started.
    pub async fn speak(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "speaking");
        let audio = self.synthesizer.synthesize(text).await?;
        self.sink.play(&audio)
    }

    /// Stop any in-flight playback
    pub fn stop(&self) {
        self.sink.stop();
    }
}
