//! Conversation session: turn memory, serialized turn processing,
//! reply playback, and lifecycle control

mod controller;
mod memory;
mod speaker;
mod turns;

pub use controller::{EndReason, SessionController, SessionEvent, SessionState};
pub use memory::TurnMemory;
pub use speaker::Speaker;
pub use turns::TurnProcessor;

use crate::Error;

/// Control-plane messages from pipeline tasks to the session controller
#[derive(Debug)]
pub enum SessionCommand {
    /// The generator signaled end-of-session
    Terminate,
    /// A turn was dropped non-fatally
    TurnFailed(Error),
}
