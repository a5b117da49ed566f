use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Maps text to a fixed-length vector. All vectors produced by one provider
/// for one `embedder_id` share a dimension, but callers discover it from the
/// first vector rather than assuming it.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `gemini:embedding-001`).
    fn embedder_id(&self) -> &str;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Maps a prompt, optionally constrained by a JSON schema, to generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, schema: Option<&Value>) -> Result<String>;

    /// Generate with a schema and decode the result. Schema conformance on the
    /// wire is not trusted: the outermost JSON object or array is cut out of the
    /// returned text and parsed.
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let text = self.generate(prompt, Some(schema)).await?;
        extract_json(&text)
    }
}

/// Cut the span from the first `{`/`[` to the last matching closer and parse it.
pub fn extract_json(text: &str) -> Result<Value> {
    let start = text
        .find(['{', '['])
        .ok_or_else(|| Error::Parse("no JSON value in response".to_string()))?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text
        .rfind(closer)
        .filter(|&end| end > start)
        .ok_or_else(|| Error::Parse("unterminated JSON value in response".to_string()))?;
    serde_json::from_str(&text[start..=end]).map_err(|e| Error::Parse(e.to_string()))
}
