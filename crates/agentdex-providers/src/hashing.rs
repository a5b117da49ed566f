//! Deterministic offline embedder.
//!
//! Each lowercased alphanumeric token is hashed with xxHash64 into one of
//! `dim` buckets; the bucket sums are L2-normalized. Texts sharing words land
//! close together, which is enough for tests and air-gapped development.
use std::hash::Hasher;

use agentdex_core::error::Result;
use agentdex_core::traits::Embedder;
use async_trait::async_trait;
use twox_hash::XxHash64;

pub const DEFAULT_HASH_DIM: usize = 256;

pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let weight = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += weight;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect::<String>())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}
