//! Live transcription over the recognition engine's WebSocket
//!
//! One bidirectional stream per session. The sender loop drains the frame
//! queue and forwards raw PCM; the receiver loop parses transcript events
//! and dispatches them to the turn processor. A transport error on either
//! loop is fatal to the session and is reported on the fault channel; the
//! stream is never reconnected.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use super::{Alternative, TranscriptEvent};
use crate::audio::FrameReceiver;
use crate::config::RecognitionConfig;
use crate::{Error, Result};

/// End-of-input marker sent once the frame queue closes
const END_OF_INPUT: &str = r#"{"type":"CloseStream"}"#;

/// Live transcription response envelope
#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(rename = "type")]
    kind: String,
    channel: Option<LiveChannel>,
    is_final: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LiveChannel {
    alternatives: Vec<LiveAlternative>,
}

#[derive(Debug, Deserialize)]
struct LiveAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Live transcription error payload
#[derive(Debug, Deserialize)]
struct LiveError {
    #[serde(rename = "type")]
    kind: String,
    description: String,
}

/// A running bidirectional stream session: sender and receiver loops
pub struct TranscriptionSession {
    sender: tokio::task::JoinHandle<()>,
    receiver: tokio::task::JoinHandle<()>,
}

impl TranscriptionSession {
    /// Connect to the recognition engine and spawn both loops
    ///
    /// Frames popped from `frames` are forwarded in capture order; parsed
    /// events are dispatched on `events`. Transport failures surface on
    /// `faults`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the connection cannot be established
    pub async fn open(
        config: &RecognitionConfig,
        mut frames: FrameReceiver,
        events: mpsc::UnboundedSender<TranscriptEvent>,
        faults: mpsc::UnboundedSender<Error>,
    ) -> Result<Self> {
        let url = listen_url(config)?;

        let request = Request::builder()
            .uri(&url)
            .header("Authorization", format!("Token {}", config.api_key))
            .header("Sec-WebSocket-Protocol", "token")
            .body(())
            .map_err(|e| Error::Transport(format!("invalid stream request: {e}")))?;

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;

        tracing::info!(model = %config.model, language = %config.language, "transcription stream open");

        let (mut ws_sink, mut ws_stream) = ws.split();

        let sender_faults = faults.clone();
        let sender = tokio::spawn(async move {
            while let Some(frame) = frames.pop().await {
                if let Err(e) = ws_sink.send(Message::Binary(frame.into())).await {
                    let _ = sender_faults.send(Error::Transport(format!("send failed: {e}")));
                    return;
                }
            }

            // Queue closed: tell the engine no more audio is coming
            tracing::debug!("frame queue closed, ending audio input");
            let _ = ws_sink.send(Message::Text(END_OF_INPUT.into())).await;
        });

        let receiver = tokio::spawn(async move {
            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match parse_event(&text) {
                        Ok(Some(event)) => {
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = faults.send(e);
                            return;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "transcription stream closed by engine");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = faults.send(Error::Transport(format!("receive failed: {e}")));
                        return;
                    }
                }
            }
        });

        Ok(Self { sender, receiver })
    }

    /// Abort both loops; part of session teardown
    pub fn close(&self) {
        self.sender.abort();
        self.receiver.abort();
        tracing::debug!("transcription stream closed");
    }
}

/// Build the live-listening URL with the session's fixed audio contract
fn listen_url(config: &RecognitionConfig) -> Result<String> {
    let mut url = Url::parse("wss://api.deepgram.com/v1/listen")
        .map_err(|e| Error::Transport(format!("invalid stream URL: {e}")))?;

    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("language", &config.language)
        .append_pair("encoding", "linear16")
        .append_pair("sample_rate", &crate::audio::SAMPLE_RATE.to_string())
        .append_pair("channels", "1")
        .append_pair("interim_results", "true")
        .append_pair("punctuate", "true");

    Ok(url.to_string())
}

/// Parse one text message into a transcript event
///
/// Non-result messages (metadata, speech markers) yield `None`; an engine
/// error report is a transport failure.
fn parse_event(text: &str) -> Result<Option<TranscriptEvent>> {
    let response: LiveResponse = serde_json::from_str(text)
        .map_err(|e| Error::Transport(format!("malformed transcript event: {e}")))?;

    match response.kind.as_str() {
        "Results" => {
            let Some(channel) = response.channel else {
                return Ok(None);
            };
            Ok(Some(TranscriptEvent {
                is_partial: !response.is_final.unwrap_or(false),
                alternatives: channel
                    .alternatives
                    .into_iter()
                    .map(|alt| Alternative {
                        text: alt.transcript,
                        confidence: alt.confidence,
                    })
                    .collect(),
            }))
        }
        "Error" => {
            let detail = serde_json::from_str::<LiveError>(text)
                .map(|e| format!("{}: {}", e.kind, e.description))
                .unwrap_or_else(|_| "unknown engine error".to_string());
            Err(Error::Transport(detail))
        }
        other => {
            tracing::trace!(kind = other, "ignoring non-result message");
            Ok(None)
        }
    }
}
