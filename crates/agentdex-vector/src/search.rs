use anyhow::{anyhow, Result};
use arrow_array::{Float32Array, Int32Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;

use agentdex_core::error::Error;

use crate::snapshot::{read_manifest, read_map, IndexMap, Manifest, SnapshotLayout};
use crate::table::{open_db, open_vector_table};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: u32,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// A loaded (vector table, index map) pair from one build.
pub struct IndexSnapshot {
    manifest: Manifest,
    map: IndexMap,
    table: Option<Table>,
}

impl IndexSnapshot {
    pub async fn open_current(index_dir: &Path) -> Result<Self> {
        let layout = SnapshotLayout::new(index_dir);
        let id = layout.read_current()?.ok_or_else(|| {
            Error::NotFound(format!("no published index under {}", index_dir.display()))
        })?;
        Self::open(&layout.snapshot_dir(&id)).await
    }

    pub async fn open(dir: &Path) -> Result<Self> {
        let manifest = read_manifest(dir)?;
        let map = read_map(dir)?;
        if manifest.count != map.len() || !map.is_contiguous() {
            return Err(Error::Consistency(format!(
                "snapshot {} lists {} vectors but its map has {} entries",
                manifest.snapshot_id,
                manifest.count,
                map.len()
            ))
            .into());
        }
        let table = if !map.is_empty() {
            let conn = open_db(dir).await?;
            Some(open_vector_table(&conn).await?)
        } else {
            None
        };
        Ok(Self { manifest, map, table })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn map(&self) -> &IndexMap {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.manifest.count
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.count == 0
    }

    /// Exact top-`k` by squared Euclidean distance, ascending; equal
    /// distances are ordered by ordinal.
    pub async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(table) = &self.table else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.manifest.dim {
            if query.len() != dim {
                return Err(Error::Consistency(format!(
                    "query vector has dimension {} but the index has {dim}",
                    query.len()
                ))
                .into());
            }
        }

        // Fetch every row so ties at the k-th place are resolved by ordinal here.
        let mut stream = table
            .vector_search(query.to_vec())?
            .distance_type(DistanceType::L2)
            .limit(self.manifest.count)
            .execute()
            .await?;
        let mut hits = Vec::with_capacity(self.manifest.count);
        while let Some(batch) = stream.try_next().await? {
            let ordinals = batch
                .column_by_name("ordinal")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow!("vector table has no ordinal column"))?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("search result has no _distance column"))?;
            for i in 0..batch.num_rows() {
                hits.push(Neighbor { ordinal: u32::try_from(ordinals.value(i))?, distance: distances.value(i) });
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.ordinal.cmp(&b.ordinal)));
        hits.truncate(k);
        Ok(hits)
    }
}
