//! Error types for the parley pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the conversation pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (fatal before any session starts)
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture or playback device unavailable (fatal to the active session)
    #[error("audio device error: {0}")]
    Device(String),

    /// Recognition stream failure (fatal to the active session)
    #[error("transcription transport error: {0}")]
    Transport(String),

    /// Response generator call failure (non-fatal, drops the current turn)
    #[error("generation error: {0}")]
    Generation(String),

    /// Speech synthesis failure (non-fatal, drops playback for the turn)
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Playback failure (non-fatal, logged)
    #[error("playback error: {0}")]
    Playback(String),

    /// Session lifecycle misuse (e.g. starting a session twice)
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error tears down the active session.
    ///
    /// Generation, synthesis, and playback failures drop a single turn;
    /// everything touching the device or the recognition transport ends
    /// the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Device(_) | Self::Transport(_))
    }
}
