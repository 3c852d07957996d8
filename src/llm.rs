//! Generative model abstraction and HTTP implementations.
//!
//! The pipeline only needs one operation from a model: turn a prompt into
//! text. [`GenerativeModel`] is used both for summarization at build time and
//! for answer synthesis at query time.
//!
//! | Config `model.provider` | Implementation | Credentials |
//! |-------------------------|----------------|-------------|
//! | `"gemini"` | [`GeminiModel`] | `GOOGLE_API_KEY` |
//! | `"openai"` | [`OpenAIChatModel`] | `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaModel`] | none |
//! | `"disabled"` | [`DisabledModel`] | none |
//!
//! Model calls are single round-trips: no retries and no streaming. The
//! request timeout comes from `model.timeout_secs`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ModelConfig;

/// Turns a prompt into generated text.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Always fails; used when `model.provider = "disabled"`.
pub struct DisabledModel;

#[async_trait]
impl GenerativeModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generative model is disabled")
    }
}

/// Send a request and return the JSON body, failing on non-2xx statuses.
async fn send_json(request: reqwest::RequestBuilder, label: &str) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{} request failed: {}", label, e))?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body_text);
    }
    Ok(response.json().await?)
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn required_model(config: &ModelConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("model.model required for {} provider", config.provider))
}

// ============ Gemini ============

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Gemini via the Generative Language API (`models/*:generateContent`).
pub struct GeminiModel {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        Ok(Self {
            model: required_model(config)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            temperature: config.temperature,
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn parse_gemini_response(json: serde_json::Value) -> Result<String> {
    let response: GeminiResponse = serde_json::from_value(json)?;
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        bail!("Gemini response contained no text");
    }
    Ok(text)
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );
        let json = send_json(self.client.post(&url).json(&body), "Gemini").await?;
        parse_gemini_response(json)
    }
}

// ============ OpenAI ============

/// OpenAI-compatible chat completions (`POST /v1/chat/completions`).
pub struct OpenAIChatModel {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: required_model(config)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            temperature: config.temperature,
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn parse_openai_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[async_trait]
impl GenerativeModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let json = send_json(
            self.client.post(&url).bearer_auth(&self.api_key).json(&body),
            "OpenAI",
        )
        .await?;
        parse_openai_chat_response(&json)
    }
}

// ============ Ollama ============

/// Local Ollama instance (`POST /api/generate`, non-streaming).
pub struct OllamaModel {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerativeModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = send_json(self.client.post(&url).json(&body), "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

/// Create the configured [`GenerativeModel`].
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn GenerativeModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "gemini" => Ok(Arc::new(GeminiModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_parts_are_concatenated() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hold " }, { "text": "the bonds." }] }
            }]
        });
        assert_eq!(parse_gemini_response(json).unwrap(), "Hold the bonds.");
    }

    #[test]
    fn gemini_without_text_is_error() {
        let json = serde_json::json!({ "candidates": [] });
        assert!(parse_gemini_response(json).is_err());
    }

    #[test]
    fn openai_chat_content_extracted() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Diversify." } }]
        });
        assert_eq!(parse_openai_chat_response(&json).unwrap(), "Diversify.");
        assert!(parse_openai_chat_response(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn disabled_model_fails() {
        let model = create_model(&ModelConfig {
            provider: "disabled".to_string(),
            ..ModelConfig::default()
        })
        .unwrap();
        assert!(model.generate("hi").await.is_err());
    }
}
