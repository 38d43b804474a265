use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::{TutorClient, TutorReply};
use crate::error::ExchangeError;
use crate::transcript::{Speaker, Turn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly English tutor having a spoken conversation. \
Keep replies short and conversational. Respond only with a JSON object of the form \
{\"reply\": string, \"correction\": null | {\"original\": string, \"corrected\": string, \"explanation\": string}}. \
Set correction only when the learner's last message contains a language error.";

/// Chat endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorSettings {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub model: String,

    /// Bearer token; empty for local endpoints without auth
    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound on prior turns sent with each request
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_history() -> usize {
    10
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    400
}

/// Tutor backed by an OpenAI-compatible chat completions API
///
/// Works with OpenAI, OpenRouter, Groq, Ollama and anything else speaking
/// the same protocol. The model is asked for JSON output which is parsed
/// into a [`TutorReply`].
pub struct HttpTutorClient {
    settings: TutorSettings,
    http: reqwest::Client,
}

impl HttpTutorClient {
    pub fn new(settings: TutorSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(&self, history: &[Turn], utterance: &str) -> Vec<serde_json::Value> {
        let start = history.len().saturating_sub(self.settings.max_history);
        let mut messages = Vec::with_capacity(history.len() - start + 2);

        messages.push(serde_json::json!({
            "role": "system",
            "content": self.settings.system_prompt,
        }));

        for turn in &history[start..] {
            messages.push(serde_json::json!({
                "role": match turn.speaker {
                    Speaker::User => "user",
                    Speaker::Tutor => "assistant",
                },
                "content": turn.text,
            }));
        }

        messages.push(serde_json::json!({
            "role": "user",
            "content": utterance,
        }));

        messages
    }
}

#[async_trait::async_trait]
impl TutorClient for HttpTutorClient {
    async fn exchange(&self, history: &[Turn], utterance: &str) -> Result<TutorReply, ExchangeError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let body = serde_json::json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": self.build_messages(history, utterance),
        });

        let mut request = self.http.post(&url).json(&body);
        if !self.settings.api_key.is_empty() {
            request = request.bearer_auth(&self.settings.api_key);
        }

        debug!("Tutor exchange with {} prior turns", history.len());

        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;

        let reply = parse_completion(&resp_body)?;
        info!(
            "Tutor replied ({} chars, correction={})",
            reply.reply.len(),
            reply.correction.is_some()
        );

        Ok(reply)
    }
}

/// Pull the tutor reply out of a chat completion body
pub fn parse_completion(body: &serde_json::Value) -> Result<TutorReply, ExchangeError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ExchangeError::Parse("completion has no message content".to_string()))?;

    parse_reply_content(content)
}

/// Parse the model's JSON answer, tolerating a surrounding code fence
pub fn parse_reply_content(content: &str) -> Result<TutorReply, ExchangeError> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let reply: TutorReply =
        serde_json::from_str(json).map_err(|e| ExchangeError::Parse(e.to_string()))?;

    if reply.reply.trim().is_empty() {
        return Err(ExchangeError::Parse("tutor reply is empty".to_string()));
    }

    Ok(reply)
}
