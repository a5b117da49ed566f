//! Query path: embed the query, take the nearest catalog entries from the
//! published snapshot, re-hydrate them from the catalog and ask the generator
//! why each one fits.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

use std::time::Duration;

use agentdex_catalog::CatalogStore;
use agentdex_core::error::Error;
use agentdex_core::traits::{Embedder, TextGenerator};
use agentdex_core::types::{AgentRecord, Field, SearchResult};
use agentdex_vector::IndexSnapshot;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const PROMPT_FIELDS: [Field; 6] = [
    Field::Name,
    Field::UseCase,
    Field::Category,
    Field::InputPrice,
    Field::OutputPrice,
    Field::Latency,
];

pub struct SearchAndJustify<'a> {
    store: &'a CatalogStore,
    snapshot: &'a IndexSnapshot,
    embedder: &'a dyn Embedder,
    generator: &'a dyn TextGenerator,
    concurrency: usize,
    call_timeout: Duration,
}

impl<'a> SearchAndJustify<'a> {
    pub fn new(
        store: &'a CatalogStore,
        snapshot: &'a IndexSnapshot,
        embedder: &'a dyn Embedder,
        generator: &'a dyn TextGenerator,
    ) -> Self {
        Self { store, snapshot, embedder, generator, concurrency: 1, call_timeout: Duration::from_secs(60) }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Ranked candidates, nearest first. A candidate whose justification
    /// fails is kept with an empty justification.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query_vec = timeout(self.call_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| Error::Provider(format!("query embedding timed out after {:?}", self.call_timeout)))??;
        let neighbors = self.snapshot.nearest(&query_vec, top_k).await?;

        let mut candidates = Vec::with_capacity(neighbors.len());
        for hit in neighbors {
            let Some(name) = self.snapshot.map().name(hit.ordinal) else {
                debug!(ordinal = hit.ordinal, "ordinal missing from index map");
                continue;
            };
            match self.store.lookup_by_name(name) {
                Ok(record) => candidates.push((record, hit.distance)),
                Err(Error::NotFound(_)) => debug!(%name, "indexed agent no longer in catalog"),
                Err(e) => return Err(e.into()),
            }
        }

        let results: Vec<SearchResult> = stream::iter(candidates)
            .map(|(record, distance)| async move {
                let justification = self.justify(query, &record).await;
                SearchResult { record, justification, distance }
            })
            .buffered(self.concurrency)
            .collect()
            .await;
        info!(query, top_k, returned = results.len(), "search finished");
        Ok(results)
    }

    async fn justify(&self, query: &str, record: &AgentRecord) -> String {
        let prompt = justification_prompt(query, record);
        match timeout(self.call_timeout, self.generator.generate(&prompt, None)).await {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(e)) => {
                warn!(name = %record.name, error = %e, "justification failed");
                String::new()
            }
            Err(_) => {
                warn!(name = %record.name, "justification timed out");
                String::new()
            }
        }
    }
}

pub fn justification_prompt(query: &str, record: &AgentRecord) -> String {
    let details: String = PROMPT_FIELDS
        .iter()
        .map(|&f| format!("{}: {}\n", f.key(), record.field(f)))
        .collect();
    format!(
        "A user is looking for a tool for this need:\n{query}\n\n\
         Candidate:\n{details}\n\
         In two or three sentences, explain why this candidate fits the need, \
         mentioning cost or latency where relevant."
    )
}
