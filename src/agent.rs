//! Conversational-agent collaborator.
//!
//! The engine only ever sees [`AgentApi`]: hand in the transcript so far,
//! get back the next assistant reply. The production implementation talks
//! to an `OpenAI`-compatible chat-completions endpoint; tests substitute
//! in-process stand-ins.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::AgentConfig;
use crate::models::record::Utterance;
use crate::{AppError, Result};

/// Contract for the conversational agent backing the chat stage.
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Produce the next assistant reply for a transcript.
    ///
    /// May be slow; callers must not hold any per-participant lock across
    /// this call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` when the backend fails or times out.
    async fn get_response(&self, transcript: &[Utterance]) -> Result<String>;
}

/// HTTP client for an `OpenAI`-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiAgent {
    http: reqwest::Client,
    config: AgentConfig,
}

impl OpenAiAgent {
    /// Build the client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` if the HTTP client cannot be constructed.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::Agent(format!("failed to build http client: {err}")))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl AgentApi for OpenAiAgent {
    async fn get_response(&self, transcript: &[Utterance]) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));

        let mut messages: Vec<Utterance> = Vec::with_capacity(transcript.len() + 1);
        if let Some(system_prompt) = &self.config.system_prompt {
            messages.push(Utterance::system(system_prompt.clone()));
        }
        messages.extend_from_slice(transcript);

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        debug!(model = %self.config.model, turns = transcript.len(), "requesting agent reply");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Agent(format!("agent api returned {status}: {detail}")));
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AppError::Agent("missing choices[0].message.content in reply".into()))
    }
}
