//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `Settings::default()` + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_PROVIDER__API_KEY`). Provider credentials live here and are handed to
//! components at construction; nothing reads them from globals.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Wrap an already assembled figment; defaults are layered underneath it.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub index: IndexSettings,
    pub provider: ProviderSettings,
    pub enrich: EnrichSettings,
    pub search: SearchSettings,
    pub monitor: MonitorSettings,
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        let checks = [
            ("provider.timeout_secs", self.provider.timeout_secs as usize),
            ("index.concurrency", self.index.concurrency),
            ("enrich.concurrency", self.enrich.concurrency),
            ("search.concurrency", self.search.concurrency),
            ("search.top_k", self.search.top_k),
            ("monitor.page_size", self.monitor.page_size),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub db_path: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self { db_path: "agents.db".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dir: String,
    pub concurrency: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dir: "indexes/agents".to_string(), concurrency: 1 }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Gemini,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub embedder: EmbedderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub generation_model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            embedder: EmbedderKind::Gemini,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            generation_model: "gemini-2.0-flash".to_string(),
            embedding_model: "embedding-001".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

impl ProviderSettings {
    /// Upper bound for one provider call including every retry: each attempt
    /// may use `timeout_secs` and attempt `n` is followed by `backoff_ms * 2^n`.
    pub fn call_budget(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let backoff = (0..self.max_retries).fold(Duration::ZERO, |total, n| {
            total.saturating_add(Duration::from_millis(self.backoff_ms).saturating_mul(2u32.saturating_pow(n)))
        });
        Duration::from_secs(self.timeout_secs).saturating_mul(attempts).saturating_add(backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    pub concurrency: usize,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub top_k: usize,
    pub concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { top_k: 5, concurrency: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub news_base_url: String,
    pub news_api_key: Option<String>,
    pub page_size: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            news_base_url: "https://newsapi.org".to_string(),
            news_api_key: None,
            page_size: 5,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
