//! Speech recognition: transcript model and the live streaming session

mod stream;

pub use stream::TranscriptionSession;

/// One alternative reading of a transcript segment
#[derive(Debug, Clone)]
pub struct Alternative {
    /// Recognized text
    pub text: String,
    /// Engine confidence in [0, 1]
    pub confidence: f32,
}

/// A recognition result, still-updating (partial) or stable (final)
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    /// Whether this result may still change
    pub is_partial: bool,
    /// Alternative readings, best first
    pub alternatives: Vec<Alternative>,
}

impl TranscriptEvent {
    /// A finalized event with a single alternative
    #[must_use]
    pub fn finalized(text: &str) -> Self {
        Self {
            is_partial: false,
            alternatives: vec![Alternative {
                text: text.to_string(),
                confidence: 1.0,
            }],
        }
    }

    /// A partial event with a single alternative
    #[must_use]
    pub fn partial(text: &str) -> Self {
        Self {
            is_partial: true,
            alternatives: vec![Alternative {
                text: text.to_string(),
                confidence: 0.0,
            }],
        }
    }

    /// The best alternative's trimmed text; `None` when absent or empty
    #[must_use]
    pub fn best_text(&self) -> Option<&str> {
        let text = self.alternatives.first()?.text.trim();
        (!text.is_empty()).then_some(text)
    }
}
