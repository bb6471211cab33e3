//! Session lifecycle
//!
//! Owns one conversation session end to end: starts capture, the
//! transcription stream, and the turn worker; reacts to termination,
//! fatal faults, and explicit stop; tears everything down in order and
//! notifies the collaborator surface exactly once.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::memory::TurnMemory;
use super::speaker::Speaker;
use super::turns::TurnProcessor;
use super::SessionCommand;
use crate::audio::{frame_queue, AudioCapture, AudioSink, FRAME_QUEUE_CAPACITY};
use crate::generator::ReplyGenerator;
use crate::stt::TranscriptionSession;
use crate::synthesis::Synthesizer;
use crate::{Config, Error, Result};

/// Lifecycle state of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet
    Idle,
    /// Pipeline active
    Running,
    /// Terminal; nothing is processed after entry
    Ended,
}

/// Why the session ended
#[derive(Debug, Clone)]
pub enum EndReason {
    /// The generator replied with the termination token
    Terminated,
    /// Explicit stop from the collaborator surface
    Stopped,
    /// Fatal device or transport error
    Fatal(String),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => write!(f, "assistant ended the conversation"),
            Self::Stopped => write!(f, "stopped"),
            Self::Fatal(detail) => write!(f, "fatal error: {detail}"),
        }
    }
}

/// Signals delivered to the presentation layer
#[derive(Debug)]
pub enum SessionEvent {
    /// The session reached its terminal state
    Ended {
        /// Why it ended
        reason: EndReason,
    },
    /// One turn was dropped; the session keeps running
    TurnFailed {
        /// Human-readable failure description
        reason: String,
    },
}

/// Controls the lifecycle of one conversation session
///
/// Engine clients are explicitly constructed dependencies, passed in
/// rather than referenced as ambient singletons.
pub struct SessionController {
    config: Config,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    state: SessionState,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionController {
    /// Create a controller and the event receiver for the presentation
    /// layer
    #[must_use]
    pub fn new(
        config: Config,
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                generator,
                synthesizer,
                sink,
                state: SessionState::Idle,
                events,
            },
            event_rx,
        )
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Run one conversation session to completion
    ///
    /// `shutdown` is the explicit-stop signal (e.g. Ctrl-C). Returns once
    /// the session has ended; the reason is also delivered as a
    /// `SessionEvent::Ended`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` when a session was already started on
    /// this controller, or the fatal startup error if the pipeline could
    /// not be brought up.
    #[allow(clippy::future_not_send)] // cpal streams are not Send; run on the main task
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        self.begin()?;
        let session_id = uuid::Uuid::new_v4();
        tracing::info!(%session_id, "session started");

        let (frame_tx, frame_rx) = frame_queue(FRAME_QUEUE_CAPACITY);
        let (fault_tx, mut fault_rx) = mpsc::unbounded_channel::<Error>();
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();

        let mut capture = match AudioCapture::new() {
            Ok(capture) => capture,
            Err(e) => return Err(self.fail_startup(e)),
        };
        if let Err(e) = capture.start(frame_tx, fault_tx.clone()) {
            return Err(self.fail_startup(e));
        }

        let stream = match TranscriptionSession::open(
            &self.config.recognition,
            frame_rx,
            transcript_tx,
            fault_tx,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                capture.stop();
                return Err(self.fail_startup(e));
            }
        };

        let processor = TurnProcessor::new(
            TurnMemory::new(self.config.memory_limit),
            Arc::clone(&self.generator),
            Speaker::new(Arc::clone(&self.synthesizer), Arc::clone(&self.sink)),
            self.config.system_instruction.clone(),
            self.config.termination_token.clone(),
            command_tx,
        );
        let worker = tokio::spawn(processor.run(transcript_rx));

        let reason = loop {
            tokio::select! {
                _ = shutdown.recv() => break EndReason::Stopped,
                command = command_rx.recv() => match command {
                    Some(SessionCommand::Terminate) => break EndReason::Terminated,
                    Some(SessionCommand::TurnFailed(e)) => {
                        let _ = self.events.send(SessionEvent::TurnFailed {
                            reason: e.to_string(),
                        });
                    }
                    None => break EndReason::Stopped,
                },
                fault = fault_rx.recv() => match fault {
                    Some(e) => {
                        tracing::error!(error = %e, "fatal pipeline error");
                        break EndReason::Fatal(e.to_string());
                    }
                    None => break EndReason::Stopped,
                },
            }
        };

        // Teardown order: capture first (closes the frame queue and wakes
        // the sender loop), then the stream, then the worker; playback
        // stop and the surface notification happen in finish().
        capture.stop();
        stream.close();
        worker.abort();
        if let Ok(memory) = worker.await {
            tracing::debug!(turns = memory.len(), "conversation released");
        }
        self.finish(reason);

        tracing::info!(%session_id, "session ended");
        Ok(())
    }

    /// Idle → Running; a second start on the same controller is rejected
    fn begin(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Running;
                Ok(())
            }
            SessionState::Running => {
                Err(Error::Session("session already running".to_string()))
            }
            SessionState::Ended => Err(Error::Session("session already ended".to_string())),
        }
    }

    /// Enter the terminal state: stop playback, notify the surface, mark
    /// Ended. Idempotent — the second call does nothing and returns false.
    fn finish(&mut self, reason: EndReason) -> bool {
        if self.state == SessionState::Ended {
            return false;
        }
        self.sink.stop();
        let _ = self.events.send(SessionEvent::Ended { reason });
        self.state = SessionState::Ended;
        true
    }

    /// Startup failure: tear down what exists and report the error
    fn fail_startup(&mut self, error: Error) -> Error {
        tracing::error!(error = %error, "session startup failed");
        self.finish(EndReason::Fatal(error.to_string()));
        error
    }
}
