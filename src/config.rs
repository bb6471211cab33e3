//! Configuration for the conversation pipeline
//!
//! Everything is sourced from the environment; a missing credential is a
//! startup failure, before any session exists.

use crate::{Error, Result};

/// Default termination token the generator uses to end the conversation
pub const DEFAULT_TERMINATION_TOKEN: &str = "END_SESSION";

/// Default number of utterances kept as conversational context
pub const DEFAULT_MEMORY_LIMIT: usize = 20;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Recognition engine settings
    pub recognition: RecognitionConfig,

    /// Response generator settings
    pub generator: GeneratorConfig,

    /// Speech synthesis settings
    pub synthesis: SynthesisConfig,

    /// Exact reply that ends the session (byte-for-byte, after trimming)
    pub termination_token: String,

    /// Maximum utterances retained in turn memory
    pub memory_limit: usize,

    /// System instruction sent on every generator call
    pub system_instruction: String,
}

/// Streaming recognition engine settings
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Deepgram API key
    pub api_key: String,

    /// Recognition model (e.g. "nova-2")
    pub model: String,

    /// Spoken language (e.g. "en-US")
    pub language: String,
}

/// Response generator settings (OpenAI-compatible chat completions)
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// API key for the chat completions endpoint
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Chat model identifier
    pub model: String,
}

/// Speech synthesis settings
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// API key for the speech endpoint
    pub api_key: String,

    /// Voice identifier
    pub voice: String,

    /// Synthesis model identifier
    pub model: String,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first missing or invalid
    /// variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first missing or invalid
    /// variable.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let termination_token =
            var_or(lookup, "PARLEY_TERMINATION_TOKEN", DEFAULT_TERMINATION_TOKEN);

        let memory_limit = match lookup("PARLEY_MEMORY_LIMIT") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                Error::Config(format!("PARLEY_MEMORY_LIMIT is not a number: {raw}"))
            })?,
            None => DEFAULT_MEMORY_LIMIT,
        };

        let system_instruction = lookup("PARLEY_SYSTEM_INSTRUCTION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_system_instruction(&termination_token));

        Ok(Self {
            recognition: RecognitionConfig {
                api_key: required(lookup, "DEEPGRAM_API_KEY")?,
                model: var_or(lookup, "PARLEY_STT_MODEL", "nova-2"),
                language: var_or(lookup, "PARLEY_LANGUAGE", "en-US"),
            },
            generator: GeneratorConfig {
                api_key: required(lookup, "GROQ_API_KEY")?,
                base_url: var_or(
                    lookup,
                    "PARLEY_GENERATOR_URL",
                    "https://api.groq.com/openai/v1",
                ),
                model: var_or(lookup, "PARLEY_GENERATOR_MODEL", "llama-3.1-8b-instant"),
            },
            synthesis: SynthesisConfig {
                api_key: required(lookup, "OPENAI_API_KEY")?,
                voice: var_or(lookup, "PARLEY_TTS_VOICE", "alloy"),
                model: var_or(lookup, "PARLEY_TTS_MODEL", "tts-1"),
            },
            termination_token,
            memory_limit,
            system_instruction,
        })
    }
}

/// Build the default system instruction around the configured token, so
/// the instruction and the terminal-reply check can never disagree.
#[must_use]
pub fn default_system_instruction(termination_token: &str) -> String {
    format!(
        "You are a medical assistant. Provide brief and precise medical advice \
         based on the conversation. If the user asks to end the call or indicates \
         they want to stop, respond exactly with the token {termination_token} \
         and nothing else."
    )
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("{name} is not set")))
}

fn var_or(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DEEPGRAM_API_KEY", "dg-key"),
            ("GROQ_API_KEY", "gq-key"),
            ("OPENAI_API_KEY", "oa-key"),
        ]
    }

    #[test]
    fn test_defaults() {
        let pairs = full_env();
        let config = Config::from_lookup(&env(&pairs)).unwrap();

        assert_eq!(config.termination_token, "END_SESSION");
        assert_eq!(config.memory_limit, 20);
        assert_eq!(config.recognition.model, "nova-2");
        assert_eq!(config.recognition.language, "en-US");
        assert_eq!(config.generator.model, "llama-3.1-8b-instant");
        assert_eq!(config.synthesis.voice, "alloy");
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let pairs = vec![("GROQ_API_KEY", "gq-key"), ("OPENAI_API_KEY", "oa-key")];
        let err = Config::from_lookup(&env(&pairs)).unwrap_err();

        match err {
            Error::Config(msg) => assert!(msg.contains("DEEPGRAM_API_KEY")),
            other => panic!("expected Config error, got {other}"),
        }
    }

    #[test]
    fn test_blank_credential_is_rejected() {
        let mut pairs = full_env();
        pairs.push(("DEEPGRAM_API_KEY", "   "));
        let err = Config::from_lookup(&env(&pairs)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_memory_limit_override() {
        let mut pairs = full_env();
        pairs.push(("PARLEY_MEMORY_LIMIT", "5"));
        let config = Config::from_lookup(&env(&pairs)).unwrap();
        assert_eq!(config.memory_limit, 5);
    }

    #[test]
    fn test_bad_memory_limit_is_config_error() {
        let mut pairs = full_env();
        pairs.push(("PARLEY_MEMORY_LIMIT", "many"));
        assert!(Config::from_lookup(&env(&pairs)).is_err());
    }

    #[test]
    fn test_instruction_carries_token() {
        let mut pairs = full_env();
        pairs.push(("PARLEY_TERMINATION_TOKEN", "HANG_UP"));
        let config = Config::from_lookup(&env(&pairs)).unwrap();
        assert!(config.system_instruction.contains("HANG_UP"));
    }
}
