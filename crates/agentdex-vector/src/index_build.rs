//! Full rebuild of the (vector table, index map) snapshot.
//!
//! Typical flow:
//! 1) Take the build lock, scan the catalog in storage order
//! 2) Embed `"{use_case}. Category: {category}"` per record; ordinals follow
//!    input order over the records that embedded successfully
//! 3) Write table, map and manifest into a staging directory and validate
//! 4) Rename the staging directory into place, flip `CURRENT`, prune
use std::fs;
use std::time::Duration;

use agentdex_catalog::CatalogStore;
use agentdex_core::error::{Error, Result as CoreResult};
use agentdex_core::traits::Embedder;
use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::schema::vectors_to_record_batch;
use crate::snapshot::{write_manifest, write_map, BuildLock, IndexMap, Manifest, SnapshotLayout};
use crate::table::{create_vector_table, open_db};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub dim: Option<usize>,
    pub snapshot_id: String,
}

pub struct IndexBuilder<'a> {
    store: &'a CatalogStore,
    embedder: &'a dyn Embedder,
    layout: SnapshotLayout,
    concurrency: usize,
    call_timeout: Duration,
}

struct Embedded {
    names: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dim: Option<usize>,
    skipped: usize,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(store: &'a CatalogStore, embedder: &'a dyn Embedder, layout: SnapshotLayout) -> Self {
        Self { store, embedder, layout, concurrency: 1, call_timeout: Duration::from_secs(60) }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub async fn build(&self) -> Result<BuildReport> {
        let _lock = BuildLock::acquire(&self.layout)?;
        let records = self.store.scan_all()?;
        let scanned = records.len();
        info!(scanned, embedder = self.embedder.embedder_id(), "building index");

        let pb = ProgressBar::new(scanned as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        let outcomes: Vec<(String, CoreResult<Vec<f32>>)> = stream::iter(records)
            .map(|rec| async move {
                let text = rec.embedding_text();
                let vector = match timeout(self.call_timeout, self.embedder.embed(&text)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Provider(format!("embedding timed out after {:?}", self.call_timeout))),
                };
                (rec.name, vector)
            })
            .buffered(self.concurrency)
            .inspect(|_| pb.inc(1))
            .collect()
            .await;
        pb.finish_and_clear();

        let embedded = collect_vectors(outcomes)?;
        if scanned > 0 && embedded.names.is_empty() {
            return Err(Error::Provider(format!("all {scanned} embedding calls failed")).into());
        }

        let snapshot_id = self.layout.new_snapshot_id();
        let staging = self.layout.staging_dir(&snapshot_id);
        if let Err(e) = self.write_staging(&snapshot_id, &embedded).await {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(dir = %staging.display(), error = %cleanup, "failed to remove staging directory");
            }
            return Err(e);
        }

        let previous = self.layout.read_current()?;
        let target = self.layout.snapshot_dir(&snapshot_id);
        fs::rename(&staging, &target)
            .map_err(|e| Error::Storage(format!("move snapshot into place: {e}")))?;
        self.layout.publish(&snapshot_id)?;

        let mut keep = vec![snapshot_id.as_str()];
        keep.extend(previous.as_deref());
        let pruned = self.layout.prune(&keep);

        let report = BuildReport {
            scanned,
            indexed: embedded.names.len(),
            skipped: embedded.skipped,
            dim: embedded.dim,
            snapshot_id,
        };
        info!(
            snapshot = %report.snapshot_id,
            indexed = report.indexed,
            skipped = report.skipped,
            dim = ?report.dim,
            pruned,
            "index published"
        );
        Ok(report)
    }

    async fn write_staging(&self, snapshot_id: &str, embedded: &Embedded) -> Result<()> {
        let staging = self.layout.staging_dir(snapshot_id);
        fs::create_dir_all(&staging).map_err(|e| Error::Storage(format!("{}: {e}", staging.display())))?;

        if let Some(dim) = embedded.dim {
            let conn = open_db(&staging).await?;
            let table = create_vector_table(&conn, vectors_to_record_batch(&embedded.vectors, dim)?).await?;
            let rows = table.count_rows(None).await?;
            if rows != embedded.names.len() {
                return Err(Error::Consistency(format!(
                    "vector table has {rows} rows but the map has {} entries",
                    embedded.names.len()
                ))
                .into());
            }
        }

        let map = IndexMap::from_names(embedded.names.iter().cloned());
        write_map(&staging, &map)?;
        write_manifest(
            &staging,
            &Manifest {
                snapshot_id: snapshot_id.to_string(),
                embedder_id: self.embedder.embedder_id().to_string(),
                dim: embedded.dim,
                count: map.len(),
                built_at: Utc::now().to_rfc3339(),
            },
        )?;
        Ok(())
    }
}

/// Pair names with vectors in input order. Failed embeddings are skipped;
/// an empty vector or a dimension change aborts the build.
fn collect_vectors(outcomes: Vec<(String, CoreResult<Vec<f32>>)>) -> CoreResult<Embedded> {
    let mut embedded = Embedded { names: Vec::new(), vectors: Vec::new(), dim: None, skipped: 0 };
    for (name, outcome) in outcomes {
        let vector = match outcome {
            Ok(vector) => vector,
            Err(e) => {
                warn!(%name, error = %e, "embedding failed; record left out of the index");
                embedded.skipped += 1;
                continue;
            }
        };
        if vector.is_empty() {
            return Err(Error::Consistency(format!("embedding for '{name}' is empty")));
        }
        match embedded.dim {
            None => embedded.dim = Some(vector.len()),
            Some(dim) if dim != vector.len() => {
                return Err(Error::Consistency(format!(
                    "embedding for '{name}' has dimension {} but the build started with {dim}",
                    vector.len()
                )));
            }
            Some(_) => {}
        }
        embedded.names.push(name);
        embedded.vectors.push(vector);
    }
    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_stay_contiguous_over_failures() {
        let outcomes = vec![
            ("A".to_string(), Ok(vec![1.0, 0.0])),
            ("B".to_string(), Err(Error::Provider("quota".into()))),
            ("C".to_string(), Ok(vec![0.0, 1.0])),
        ];
        let embedded = collect_vectors(outcomes).expect("collect");
        assert_eq!(embedded.names, ["A", "C"]);
        assert_eq!(embedded.skipped, 1);
        assert_eq!(embedded.dim, Some(2));
    }

    #[test]
    fn dimension_change_is_fatal() {
        let outcomes = vec![("A".to_string(), Ok(vec![1.0, 0.0])), ("B".to_string(), Ok(vec![1.0]))];
        assert!(matches!(collect_vectors(outcomes), Err(Error::Consistency(_))));
        let empty = vec![("A".to_string(), Ok(Vec::new()))];
        assert!(matches!(collect_vectors(empty), Err(Error::Consistency(_))));
    }
}
