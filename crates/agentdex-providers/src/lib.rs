//! Embedding and text-generation backends.
//!
//! `get_default_embedder` honours `APP_USE_FAKE_EMBEDDINGS=1` (or
//! `provider.embedder = "hash"`) to switch to the offline [`HashEmbedder`].
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod gemini;
pub mod hashing;

use agentdex_core::config::{EmbedderKind, ProviderSettings};
use agentdex_core::error::Result;
use agentdex_core::traits::{Embedder, TextGenerator};
use tracing::info;

pub use gemini::GeminiClient;
pub use hashing::HashEmbedder;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_embedder(settings: &ProviderSettings) -> Result<Box<dyn Embedder>> {
    if settings.embedder == EmbedderKind::Hash || use_fake_embeddings() {
        info!("using hash embedder");
        return Ok(Box::new(HashEmbedder::default()));
    }
    Ok(Box::new(GeminiClient::new(settings)?))
}

pub fn get_default_generator(settings: &ProviderSettings) -> Result<Box<dyn TextGenerator>> {
    Ok(Box::new(GeminiClient::new(settings)?))
}
