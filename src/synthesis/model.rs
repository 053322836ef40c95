use super::{SynthesisOutcome, TransportFailure};
use crate::config::LlmConfig;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("API key not set")]
    MissingApiKey,

    #[error("Could not connect to model endpoint: {0}")]
    Connect(String),

    #[error("Model request timed out: {0}")]
    Timeout(String),

    #[error("Model endpoint returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Unreadable model response: {0}")]
    InvalidBody(String),
}

impl ModelError {
    pub fn failure(&self) -> TransportFailure {
        match self {
            Self::MissingApiKey => TransportFailure::MissingApiKey,
            Self::Connect(_) => TransportFailure::Connect,
            Self::Timeout(_) => TransportFailure::Timeout,
            Self::Status { code, .. } => TransportFailure::Status(*code),
            Self::Request(_) | Self::InvalidBody(_) => TransportFailure::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        SynthesisOutcome::Transport(self.failure()).is_retryable()
    }

    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

/// A text-in, text-out generative model
pub trait GenerativeModel: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            temperature,
        })
    }

    /// Build a client from config, reading the key from the configured env var
    ///
    /// A missing key is not an error here; every call then reports it.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set; answer generation will fail",
                config.api_key_env
            );
        }

        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            api_key,
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn send(&self, prompt: &str) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        debug!("POST {}", self.endpoint());
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(ModelError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ModelError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(e.to_string())
            } else {
                ModelError::InvalidBody(e.to_string())
            }
        })?;

        Ok(extract_candidate_text(&payload))
    }
}

impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.send(prompt).await
    }
}

/// Text of the first candidate's first part, or empty when there is none
///
/// An empty result is logged with the finish reason and prompt feedback when
/// the response carries them.
pub fn extract_candidate_text(payload: &Value) -> String {
    let candidate = payload.pointer("/candidates/0");
    let text = candidate
        .and_then(|c| c.pointer("/content/parts/0/text"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if text.is_empty() {
        warn!("Model response contained no text");
        if let Some(reason) = candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(Value::as_str)
        {
            if reason != "STOP" {
                warn!("Model finish reason: {}", reason);
            }
        }
        if let Some(feedback) = payload.get("promptFeedback") {
            warn!("Prompt feedback: {}", feedback);
        }
    }

    text.to_string()
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}
