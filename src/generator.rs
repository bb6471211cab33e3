//! Conversational response generation
//!
//! One synchronous request per finalized utterance: the fixed system
//! instruction plus the ordered turn-memory snapshot, newest utterance
//! last. No retries; a failed call drops the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::{Error, Result};

/// One role/content pair sent to the chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// "system" or "user"
    pub role: &'static str,
    /// Message text
    pub content: String,
}

/// Produces a reply for the conversation so far
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply from the system instruction and ordered turns
    ///
    /// # Errors
    ///
    /// Returns `Error::Generation` on any call failure
    async fn reply(&self, system_instruction: &str, turns: &[String]) -> Result<String>;
}

/// Assemble the request messages: system instruction first, then every
/// remembered utterance in chronological order. The newest utterance is
/// already the snapshot's last element, so it is not appended twice.
#[must_use]
pub fn conversation_request(system_instruction: &str, turns: &[String]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: system_instruction.to_string(),
    });
    for turn in turns {
        messages.push(ChatMessage {
            role: "user",
            content: turn.clone(),
        });
    }
    messages
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatCompletionsClient {
    /// Create a new generator client
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is missing
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config(
                "generator API key required".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ReplyGenerator for ChatCompletionsClient {
    async fn reply(&self, system_instruction: &str, turns: &[String]) -> Result<String> {
        let messages = conversation_request(system_instruction, turns);
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "generator API error");
            return Err(Error::Generation(format!("API error {status}: {body}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Generation("response carried no reply".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let turns = vec!["I have a headache".to_string(), "it's been two days".to_string()];
        let messages = conversation_request("be brief", &turns);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[1].role, "user");
        // Newest utterance is always last
        assert_eq!(messages[2].content, "it's been two days");
    }

    #[test]
    fn test_empty_memory_still_carries_instruction() {
        let messages = conversation_request("be brief", &[]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "system");
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = GeneratorConfig {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
        };
        assert!(matches!(
            ChatCompletionsClient::new(&config),
            Err(Error::Config(_))
        ));
    }
}
