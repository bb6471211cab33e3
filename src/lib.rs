//! Parley - real-time voice conversation pipeline
//!
//! Captures microphone audio, streams it to a speech-recognition engine,
//! routes finalized utterances through a response generator, synthesizes
//! the reply, and plays it back - preempting a reply still playing, and
//! ending the session when the generator signals termination.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   frames   ┌────────────┐   events   ┌────────────┐
//! │ Capture  ├──queue────▶│ Recognition├───────────▶│ Turn worker│
//! │ (cpal)   │            │ stream     │            │ (serialized)│
//! └──────────┘            └────────────┘            └─────┬──────┘
//!                                                         │ reply
//!                              ┌────────────┐       ┌─────▼──────┐
//!                              │ Playback   │◀──────│ Generator +│
//!                              │ (preempt)  │  mp3  │ Synthesis  │
//!                              └────────────┘       └────────────┘
//! ```
//!
//! The session controller owns the lifecycle: one session at a time,
//! fatal errors and the termination token tear everything down in order
//! and notify the presentation layer once.

pub mod audio;
pub mod config;
pub mod error;
pub mod generator;
pub mod session;
pub mod stt;
pub mod synthesis;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{EndReason, SessionController, SessionEvent, SessionState};
