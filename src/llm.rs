//! LLM chat completions for bot replies.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (DeepSeek,
//! Volcengine Ark, SiliconFlow, a local server). The role prompt is read from
//! the configured prompt file and every sender gets a rolling context of the
//! last `max_groups` rounds.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// One user message and the reply it got.
#[derive(Debug, Clone)]
struct Round {
    user: String,
    assistant: String,
}

pub struct ChatClient {
    config: LlmConfig,
    system_prompt: String,
    contexts: HashMap<String, VecDeque<Round>>,
    client: Client,
}

impl ChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let system_prompt = match std::fs::read_to_string(&config.prompt_path) {
            Ok(prompt) => {
                info!("Loaded prompt from {}", config.prompt_path.display());
                prompt
            }
            Err(e) => {
                warn!(
                    "Failed to read prompt {}: {e}, continuing without one",
                    config.prompt_path.display()
                );
                String::new()
            }
        };

        Ok(Self {
            config: config.clone(),
            system_prompt,
            contexts: HashMap::new(),
            client,
        })
    }

    /// Rounds currently remembered for `sender_id`.
    pub fn context_len(&self, sender_id: &str) -> usize {
        self.contexts.get(sender_id).map_or(0, VecDeque::len)
    }

    pub fn clear_context(&mut self, sender_id: &str) {
        self.contexts.remove(sender_id);
    }

    fn build_messages(&self, sender_id: &str, text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if !self.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        if let Some(rounds) = self.contexts.get(sender_id) {
            for round in rounds {
                messages.push(ChatMessage::user(round.user.clone()));
                messages.push(ChatMessage::assistant(round.assistant.clone()));
            }
        }
        messages.push(ChatMessage::user(text));
        messages
    }

    fn remember(&mut self, sender_id: &str, text: &str, reply: &str) {
        let max_groups = self.config.max_groups;
        let rounds = self.contexts.entry(sender_id.to_string()).or_default();
        rounds.push_back(Round {
            user: text.to_string(),
            assistant: reply.to_string(),
        });
        while rounds.len() > max_groups {
            rounds.pop_front();
        }
    }

    /// Ask the model for a reply to `text` from `sender_id`.
    /// The sender's context only grows when a reply comes back.
    pub async fn reply(&mut self, sender_id: &str, text: &str) -> Result<String, LlmError> {
        let messages = self.build_messages(sender_id, text);
        debug!(
            "Sending {} messages to model '{}' for {sender_id}",
            messages.len(),
            self.config.model
        );

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
        });

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = match self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_connect() {
                    warn!("Cannot connect to LLM at {}", self.config.base_url);
                } else if e.is_timeout() {
                    warn!("LLM request timed out");
                }
                return Err(e.into());
            }
        };

        if !resp.status().is_success() {
            return Err(LlmError::Status(resp.status()));
        }

        let data = resp.json::<serde_json::Value>().await?;
        let reply = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if reply.is_empty() {
            return Err(LlmError::EmptyReply);
        }

        debug!("LLM reply: '{reply}'");
        self.remember(sender_id, text, &reply);
        Ok(reply)
    }
}
