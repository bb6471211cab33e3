//! Speech synthesis
//!
//! Converts a speakable reply into encoded MP3 bytes. A failed call is a
//! non-fatal turn failure: no playback happens and the session continues.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::SynthesisConfig;
use crate::{Error, Result};

/// Synthesizes speech from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Return encoded (MP3) audio for the given text
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` on any call failure
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// OpenAI-compatible speech synthesis client
pub struct SpeechClient {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
}

impl SpeechClient {
    /// Create a new synthesis client
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is missing
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("synthesis API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for SpeechClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "synthesis API error");
            return Err(Error::Synthesis(format!("API error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        tracing::debug!(bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}
