//! Serialized turn processing
//!
//! A single consumer of the transcript event queue: utterances are
//! memory-appended and sent to the generator strictly in finalization
//! order, and a slow generator call never blocks the receiver loop from
//! accepting further transcript events.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::memory::TurnMemory;
use super::speaker::Speaker;
use super::SessionCommand;
use crate::generator::ReplyGenerator;
use crate::stt::TranscriptEvent;
use crate::Error;

/// Processes finalized utterances one at a time, in order
pub struct TurnProcessor {
    memory: TurnMemory,
    generator: Arc<dyn ReplyGenerator>,
    speaker: Speaker,
    system_instruction: String,
    termination_token: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl TurnProcessor {
    /// Create a processor wired to the session's command channel
    #[must_use]
    pub fn new(
        memory: TurnMemory,
        generator: Arc<dyn ReplyGenerator>,
        speaker: Speaker,
        system_instruction: String,
        termination_token: String,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            memory,
            generator,
            speaker,
            system_instruction,
            termination_token,
            commands,
        }
    }

    /// Drain transcript events until the channel closes or the generator
    /// signals termination. Returns the turn memory so the caller can
    /// inspect the conversation at teardown.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<TranscriptEvent>) -> TurnMemory {
        while let Some(event) = events.recv().await {
            if event.is_partial {
                // Live caption only; partials never reach memory or the generator
                if let Some(caption) = event.best_text() {
                    tracing::debug!(caption, "partial transcript");
                }
                continue;
            }

            // Noise-triggered empty finals are ignored entirely
            let Some(text) = event.best_text() else {
                continue;
            };
            let utterance = text.to_string();
            tracing::info!(utterance = %utterance, "utterance finalized");

            self.memory.append(utterance);

            match self
                .generator
                .reply(&self.system_instruction, &self.memory.snapshot())
                .await
            {
                Ok(raw) => {
                    let reply = raw.trim();
                    tracing::debug!(reply, "generator replied");

                    if reply == self.termination_token {
                        let _ = self.commands.send(SessionCommand::Terminate);
                        return self.memory;
                    }

                    if let Err(e) = self.speaker.speak(reply).await {
                        self.drop_turn(e);
                    }
                }
                Err(e) => self.drop_turn(e),
            }
        }

        self.memory
    }

    /// Non-fatal turn failure: no playback for this turn, session keeps
    /// running. Playback errors are logged only; generation and synthesis
    /// failures are surfaced to the collaborator surface.
    fn drop_turn(&self, error: Error) {
        tracing::warn!(error = %error, "turn dropped");
        if !matches!(error, Error::Playback(_)) {
            let _ = self.commands.send(SessionCommand::TurnFailed(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::audio::AudioSink;
    use crate::synthesis::Synthesizer;
    use crate::Result;

    /// Generator that replays a fixed script and records every request
    struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<String>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyGenerator for ScriptedGenerator {
        async fn reply(&self, _system: &str, turns: &[String]) -> Result<String> {
            self.requests.lock().unwrap().push(turns.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Generation("script exhausted".to_string())))
        }
    }

    struct RecordingSynthesizer {
        spoken: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSynthesizer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl Synthesizer for RecordingSynthesizer {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            if self.fail {
                return Err(Error::Synthesis("voice unavailable".to_string()));
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(text.as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<Vec<u8>>>,
    }

    impl AudioSink for RecordingSink {
        fn play(&self, audio: &[u8]) -> Result<()> {
            self.played.lock().unwrap().push(audio.to_vec());
            Ok(())
        }

        fn stop(&self) {}
    }

    fn processor(
        generator: Arc<ScriptedGenerator>,
        synthesizer: Arc<RecordingSynthesizer>,
        sink: Arc<RecordingSink>,
        memory_limit: usize,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> TurnProcessor {
        TurnProcessor::new(
            TurnMemory::new(memory_limit),
            generator,
            Speaker::new(synthesizer, sink),
            "be brief".to_string(),
            "END_SESSION".to_string(),
            commands,
        )
    }

    fn finals(texts: &[&str]) -> mpsc::UnboundedReceiver<TranscriptEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for text in texts {
            tx.send(TranscriptEvent::finalized(text)).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_turns_reach_generator_in_order() {
        let generator = ScriptedGenerator::new(vec![
            Ok("rest and hydrate".to_string()),
            Ok("see a doctor".to_string()),
        ]);
        let synth = RecordingSynthesizer::new(false);
        let (commands, _command_rx) = mpsc::unbounded_channel();
        let proc = processor(
            generator.clone(),
            synth,
            Arc::new(RecordingSink::default()),
            20,
            commands,
        );

        proc.run(finals(&["I have a headache", "it's been two days"]))
            .await;

        let requests = generator.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], vec!["I have a headache"]);
        assert_eq!(
            requests[1],
            vec!["I have a headache", "it's been two days"]
        );
    }

    #[tokio::test]
    async fn test_termination_token_ends_without_playback() {
        let generator = ScriptedGenerator::new(vec![Ok("  END_SESSION  ".to_string())]);
        let synth = RecordingSynthesizer::new(false);
        let sink = Arc::new(RecordingSink::default());
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let proc = processor(generator, synth.clone(), sink.clone(), 20, commands);

        let memory = proc.run(finals(&["goodbye"])).await;

        assert!(matches!(
            command_rx.try_recv(),
            Ok(SessionCommand::Terminate)
        ));
        assert!(command_rx.try_recv().is_err());
        assert!(synth.spoken.lock().unwrap().is_empty());
        assert!(sink.played.lock().unwrap().is_empty());
        assert_eq!(memory.snapshot(), vec!["goodbye"]);
    }

    #[tokio::test]
    async fn test_partial_events_do_not_mutate_memory() {
        let generator = ScriptedGenerator::new(vec![Ok("hello".to_string())]);
        let (commands, _command_rx) = mpsc::unbounded_channel();
        let proc = processor(
            generator.clone(),
            RecordingSynthesizer::new(false),
            Arc::new(RecordingSink::default()),
            20,
            commands,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TranscriptEvent::partial("I ha")).unwrap();
        tx.send(TranscriptEvent::partial("I have a")).unwrap();
        tx.send(TranscriptEvent::finalized("I have a headache"))
            .unwrap();
        drop(tx);

        let memory = proc.run(rx).await;

        assert_eq!(memory.snapshot(), vec!["I have a headache"]);
        assert_eq!(generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_final_is_ignored_entirely() {
        let generator = ScriptedGenerator::new(vec![]);
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let proc = processor(
            generator.clone(),
            RecordingSynthesizer::new(false),
            Arc::new(RecordingSink::default()),
            20,
            commands,
        );

        let memory = proc.run(finals(&["   ", ""])).await;

        assert!(memory.is_empty());
        assert!(generator.requests().is_empty());
        assert!(command_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_generator_failure_drops_turn_and_continues() {
        let generator = ScriptedGenerator::new(vec![
            Err(Error::Generation("timeout".to_string())),
            Ok("better now".to_string()),
        ]);
        let synth = RecordingSynthesizer::new(false);
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let proc = processor(
            generator,
            synth.clone(),
            Arc::new(RecordingSink::default()),
            20,
            commands,
        );

        let memory = proc.run(finals(&["first", "second"])).await;

        // First turn failed non-fatally, second was processed normally
        assert!(matches!(
            command_rx.try_recv(),
            Ok(SessionCommand::TurnFailed(Error::Generation(_)))
        ));
        assert_eq!(*synth.spoken.lock().unwrap(), vec!["better now"]);
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn test_synthesis_failure_drops_playback_only() {
        let generator = ScriptedGenerator::new(vec![Ok("reply".to_string())]);
        let sink = Arc::new(RecordingSink::default());
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let proc = processor(
            generator,
            RecordingSynthesizer::new(true),
            sink.clone(),
            20,
            commands,
        );

        proc.run(finals(&["hello"])).await;

        assert!(sink.played.lock().unwrap().is_empty());
        assert!(matches!(
            command_rx.try_recv(),
            Ok(SessionCommand::TurnFailed(Error::Synthesis(_)))
        ));
    }

    #[tokio::test]
    async fn test_memory_limit_evicts_oldest() {
        let generator = ScriptedGenerator::new(vec![
            Ok("r1".to_string()),
            Ok("r2".to_string()),
            Ok("r3".to_string()),
        ]);
        let (commands, _command_rx) = mpsc::unbounded_channel();
        let proc = processor(
            generator.clone(),
            RecordingSynthesizer::new(false),
            Arc::new(RecordingSink::default()),
            2,
            commands,
        );

        let memory = proc.run(finals(&["a", "b", "c"])).await;

        assert_eq!(memory.snapshot(), vec!["b", "c"]);
        // Third request saw only the bounded context
        assert_eq!(generator.requests()[2], vec!["b", "c"]);
    }
}
