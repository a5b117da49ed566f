//! Gemini-style REST client implementing both provider contracts.
//!
//! Transient failures (network errors, timeouts, HTTP 429 and 5xx) are retried
//! with exponential backoff up to `max_retries` extra attempts. Any other
//! non-success status fails immediately. Each successful call is logged with
//! its request size and latency; oversized or slow calls are logged at `warn`.
use std::time::{Duration, Instant};

use agentdex_core::config::ProviderSettings;
use agentdex_core::error::{Error, Result};
use agentdex_core::traits::{Embedder, TextGenerator};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

const SLOW_CALL: Duration = Duration::from_secs(2);
const LARGE_REQUEST_BYTES: usize = 10 * 1024;

pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    generation_model: String,
    embedding_model: String,
    id: String,
    max_retries: u32,
    backoff: Duration,
}

impl GeminiClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("provider.api_key is not set".to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            generation_model: settings.generation_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            id: format!("gemini:{}", settings.embedding_model),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let request_bytes = body.to_string().len();
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            let failure = match self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let text = resp.text().await.map_err(|e| Error::Provider(format!("read body: {e}")))?;
                    log_call(url, request_bytes, text.len(), started.elapsed(), attempt + 1);
                    return serde_json::from_str(&text).map_err(|e| Error::Parse(format!("response body: {e}")));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    let message = format!("HTTP {status}: {}", snippet(&text));
                    if !is_transient(status) {
                        return Err(Error::Provider(message));
                    }
                    message
                }
                Err(e) if e.is_timeout() => format!("timed out: {e}"),
                Err(e) => format!("request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(Error::Provider(format!("{failure} (after {} attempts)", attempt + 1)));
            }
            let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
            let elapsed_ms = started.elapsed().as_millis() as u64;
            warn!(attempt = attempt + 1, elapsed_ms, ?delay, error = %failure, "provider call failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn log_call(url: &str, request_bytes: usize, response_bytes: usize, elapsed: Duration, attempts: u32) {
    let elapsed_ms = elapsed.as_millis() as u64;
    if exceeds_thresholds(request_bytes, elapsed) {
        warn!(url, request_bytes, response_bytes, elapsed_ms, attempts, "slow or oversized provider call");
    } else {
        debug!(url, request_bytes, response_bytes, elapsed_ms, attempts, "provider call");
    }
}

fn exceeds_thresholds(request_bytes: usize, elapsed: Duration) -> bool {
    request_bytes > LARGE_REQUEST_BYTES || elapsed > SLOW_CALL
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn generate_request(prompt: &str, schema: Option<&Value>) -> Value {
    let mut body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
    if let Some(schema) = schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

pub fn embed_request(model: &str, text: &str) -> Value {
    json!({
        "model": format!("models/{model}"),
        "content": { "parts": [{ "text": text }] },
        "taskType": "RETRIEVAL_DOCUMENT",
    })
}

/// Concatenated text parts of the first candidate.
pub fn parse_generated_text(body: &Value) -> Result<String> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("response has no candidate content".to_string()))?;
    let text: String = parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect();
    if text.is_empty() {
        return Err(Error::Parse("candidate content has no text".to_string()));
    }
    Ok(text)
}

pub fn parse_embedding(body: &Value) -> Result<Vec<f32>> {
    let values = body
        .pointer("/embedding/values")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("response has no embedding values".to_string()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| Error::Parse(format!("non-numeric embedding value {v}")))
        })
        .collect()
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, schema: Option<&Value>) -> Result<String> {
        let url = self.model_url(&self.generation_model, "generateContent");
        debug!(model = %self.generation_model, constrained = schema.is_some(), "generate");
        let body = self.post_json(&url, &generate_request(prompt, schema)).await?;
        parse_generated_text(&body)
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.model_url(&self.embedding_model, "embedContent");
        let body = self.post_json(&url, &embed_request(&self.embedding_model, text)).await?;
        parse_embedding(&body)
    }
}
