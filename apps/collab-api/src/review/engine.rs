//! External analysis backend.
//!
//! The production engine calls an OpenAI-compatible chat-completions API.
//! The call carries its own timeout/retry policy on the provider side; any
//! rejection becomes a terminal `review:error` for the request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::EngineError;

use super::ReviewInput;

const SYSTEM_PROMPT: &str = "You are a senior code reviewer. Review the \
submitted code for correctness, clarity, and maintainability. Respond in \
markdown with concrete, actionable findings.";

#[async_trait]
pub trait ReviewEngine: Send + Sync {
    async fn review(&self, input: &ReviewInput) -> Result<String, EngineError>;
}

/// Engine backed by an OpenAI-style `/chat/completions` endpoint.
pub struct HttpReviewEngine {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl HttpReviewEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.llm_api_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl ReviewEngine for HttpReviewEngine {
    async fn review(&self, input: &ReviewInput) -> Result<String, EngineError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut prompt = String::new();
        if let Some(path) = &input.file_path {
            prompt.push_str(&format!("File: {path}\n"));
        }
        if let Some(context) = &input.context {
            prompt.push_str(&format!("Context: {context}\n"));
        }
        prompt.push_str(&format!(
            "\n```{}\n{}\n```\n",
            input.language, input.code
        ));

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(?e, "completion request failed");
                EngineError::new("Analysis backend unreachable")
            })?;

        if !resp.status().is_success() {
            tracing::error!(status = %resp.status(), "completion request rejected");
            return Err(EngineError::new(format!(
                "Analysis backend returned {}",
                resp.status()
            )));
        }

        let completion: CompletionResponse = resp.json().await.map_err(|e| {
            tracing::error!(?e, "completion response parse failed");
            EngineError::new("Malformed analysis response")
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::new("Analysis response contained no choices"))
    }
}
