//! News-driven price-change flagging.
//!
//! For every agent in the catalog, recent articles mentioning it are pulled
//! from a news source and scanned for price-change phrasing. A hit rewrites
//! both price fields with a [`PriceChange`] annotation so a human can follow up.
use std::collections::HashSet;
use std::time::Duration;

use agentdex_core::config::MonitorSettings;
use agentdex_core::error::{Error, Result};
use agentdex_core::types::PriceChange;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::progress::progress_bar;
use crate::store::CatalogStore;

const INCREASE_KEYWORDS: &[&str] = &[
    "price increase",
    "cost rise",
    "pricing update",
    "price hike",
    "increase in price",
    "cost increase",
    "price change",
];

const DECREASE_KEYWORDS: &[&str] = &[
    "price decrease",
    "cost reduction",
    "discount",
    "price drop",
    "price cut",
    "reduced cost",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn articles(&self, query: &str) -> Result<Vec<Article>>;
}

pub struct NewsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: usize,
}

#[derive(Deserialize)]
struct EverythingResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<WireArticle>,
}

#[derive(Deserialize)]
struct WireArticle {
    title: Option<String>,
    description: Option<String>,
}

impl NewsApiClient {
    pub fn new(base_url: &str, api_key: &str, page_size: usize, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Provider(format!("news client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            page_size,
        })
    }

    pub fn from_settings(settings: &MonitorSettings, timeout: Duration) -> Result<Self> {
        let api_key = settings
            .news_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("monitor.news_api_key is not set".to_string()))?;
        Self::new(&settings.news_base_url, api_key, settings.page_size, timeout)
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    async fn articles(&self, query: &str) -> Result<Vec<Article>> {
        let url = format!("{}/v2/everything", self.base_url);
        let page_size = self.page_size.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", query),
                ("apiKey", self.api_key.as_str()),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("news request failed: {e}")))?;
        let status = response.status();
        let body: EverythingResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("news response (HTTP {status}): {e}")))?;
        if !status.is_success() || body.status.as_deref() != Some("ok") {
            return Err(Error::Provider(format!(
                "news API returned {status}: {}",
                body.message.unwrap_or_default()
            )));
        }
        Ok(body
            .articles
            .into_iter()
            .map(|a| Article {
                title: a.title.unwrap_or_default(),
                description: a.description.unwrap_or_default(),
            })
            .collect())
    }
}

pub fn news_query(name: &str) -> String {
    format!("{name} price OR cost OR pricing")
}

/// First article with price-change phrasing decides; increase wins over
/// decrease within one article.
pub fn classify(articles: &[Article]) -> Option<PriceChange> {
    articles.iter().find_map(|a| {
        let text = format!("{} {}", a.title, a.description).to_lowercase();
        if INCREASE_KEYWORDS.iter().any(|k| text.contains(k)) {
            Some(PriceChange::Increase)
        } else if DECREASE_KEYWORDS.iter().any(|k| text.contains(k)) {
            Some(PriceChange::Decrease)
        } else {
            None
        }
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: usize,
    pub flagged: usize,
    pub failed: usize,
}

pub struct PriceMonitor<'a> {
    store: &'a CatalogStore,
    news: &'a dyn NewsSource,
}

impl<'a> PriceMonitor<'a> {
    pub fn new(store: &'a CatalogStore, news: &'a dyn NewsSource) -> Self {
        Self { store, news }
    }

    pub async fn run(&self) -> anyhow::Result<MonitorReport> {
        let agents = self.store.scan_all()?;
        let mut report = MonitorReport::default();
        let mut seen = HashSet::new();
        let pb = progress_bar(agents.len(), "agents");

        for agent in agents {
            pb.inc(1);
            if !seen.insert(agent.name.clone()) {
                continue;
            }
            report.checked += 1;
            let articles = match self.news.articles(&news_query(&agent.name)).await {
                Ok(articles) => articles,
                Err(e) => {
                    warn!(name = %agent.name, error = %e, "news lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            let Some(change) = classify(&articles) else {
                debug!(name = %agent.name, "no price news");
                continue;
            };
            if agent.price_flag() == Some(change) {
                debug!(name = %agent.name, ?change, "already flagged");
                continue;
            }
            let note = change.annotation();
            match self.store.update_prices(&agent.name, note, note) {
                Ok(()) => {
                    info!(name = %agent.name, ?change, "price change flagged");
                    report.flagged += 1;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(name = %agent.name, error = %e, "could not flag price change");
                    report.failed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        pb.finish_and_clear();
        info!(checked = report.checked, flagged = report.flagged, failed = report.failed, "price monitor finished");
        Ok(report)
    }
}
