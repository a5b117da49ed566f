//! On-disk layout of index snapshots.
//!
//! ```text
//! <index_dir>/
//!   CURRENT                 id of the published snapshot
//!   .build.lock             present while a build runs
//!   snapshots/<id>/         vectors.lance, index_map.json, manifest.json
//!   snapshots/.staging-<id> build in progress
//! ```
//!
//! A snapshot directory is only ever renamed into place complete, and
//! `CURRENT` is replaced with write-then-rename, so readers see either the old
//! pair or the new pair, never a mix.
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use agentdex_core::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CURRENT_FILE: &str = "CURRENT";
pub const LOCK_FILE: &str = ".build.lock";
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const MAP_FILE: &str = "index_map.json";
pub const MANIFEST_FILE: &str = "manifest.json";
const STAGING_PREFIX: &str = ".staging-";

fn io_err(context: impl std::fmt::Display, e: std::io::Error) -> Error {
    Error::Storage(format!("{context}: {e}"))
}

/// Ordinal → agent name for one snapshot. Serialized as `{"0": "name", ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMap(BTreeMap<u32, String>);

impl IndexMap {
    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self((0u32..).zip(names).collect())
    }

    pub fn name(&self, ordinal: u32) -> Option<&str> {
        self.0.get(&ordinal).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys are exactly `0..len`.
    pub fn is_contiguous(&self) -> bool {
        self.0.keys().zip(0u32..).all(|(k, i)| *k == i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub snapshot_id: String,
    pub embedder_id: String,
    /// `None` for an empty snapshot.
    pub dim: Option<usize>,
    pub count: usize,
    pub built_at: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    root: PathBuf,
}

impl SnapshotLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.snapshots_dir().join(id)
    }

    pub fn staging_dir(&self, id: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{STAGING_PREFIX}{id}"))
    }

    /// A fresh id that sorts after earlier ones and does not collide on disk.
    pub fn new_snapshot_id(&self) -> String {
        let base = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut id = base.clone();
        let mut n = 1;
        while self.snapshot_dir(&id).exists() || self.staging_dir(&id).exists() {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }

    pub fn read_current(&self) -> Result<Option<String>> {
        let path = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path.display(), e)),
        }
    }

    pub fn current_manifest(&self) -> Result<Option<Manifest>> {
        match self.read_current()? {
            Some(id) => Ok(Some(read_manifest(&self.snapshot_dir(&id))?)),
            None => Ok(None),
        }
    }

    /// Atomically point `CURRENT` at `id`.
    pub fn publish(&self, id: &str) -> Result<()> {
        let tmp = self.root.join(format!("{CURRENT_FILE}.tmp"));
        let target = self.root.join(CURRENT_FILE);
        {
            let mut f = fs::File::create(&tmp).map_err(|e| io_err(tmp.display(), e))?;
            f.write_all(id.as_bytes()).map_err(|e| io_err(tmp.display(), e))?;
            f.sync_all().map_err(|e| io_err(tmp.display(), e))?;
        }
        fs::rename(&tmp, &target).map_err(|e| io_err(target.display(), e))?;
        debug!(snapshot = id, "published index snapshot");
        Ok(())
    }

    /// Remove every snapshot and leftover staging directory not in `keep`.
    /// Failures are logged, not returned.
    pub fn prune(&self, keep: &[&str]) -> usize {
        let entries = match fs::read_dir(self.snapshots_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "cannot list snapshots for pruning");
                return 0;
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(&name.as_str()) {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(snapshot = %name, error = %e, "failed to prune snapshot"),
            }
        }
        removed
    }
}

pub fn write_map(dir: &Path, map: &IndexMap) -> Result<()> {
    write_json(&dir.join(MAP_FILE), map)
}

pub fn read_map(dir: &Path) -> Result<IndexMap> {
    read_json(&dir.join(MAP_FILE))
}

pub fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    write_json(&dir.join(MANIFEST_FILE), manifest)
}

pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    read_json(&dir.join(MANIFEST_FILE))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Storage(e.to_string()))?;
    fs::write(path, text).map_err(|e| io_err(path.display(), e))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| Error::Consistency(format!("{}: {e}", path.display())))
}

/// Exclusive build lock, released on drop. The lock file is empty; its
/// existence is the lock. A stale lock left by a crashed build has to be
/// removed by hand.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    pub fn acquire(layout: &SnapshotLayout) -> Result<Self> {
        fs::create_dir_all(layout.snapshots_dir()).map_err(|e| io_err(layout.root.display(), e))?;
        let path = layout.root.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Storage(format!(
                "another index build holds {}",
                path.display()
            ))),
            Err(e) => Err(io_err(path.display(), e)),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_serializes_with_string_keys() {
        let map = IndexMap::from_names(["A".to_string(), "B".to_string()]);
        let json = serde_json::to_string(&map).expect("json");
        assert_eq!(json, r#"{"0":"A","1":"B"}"#);
        let back: IndexMap = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.name(1), Some("B"));
        assert!(back.is_contiguous());
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = SnapshotLayout::new(dir.path());
        let lock = BuildLock::acquire(&layout).expect("first lock");
        assert!(matches!(BuildLock::acquire(&layout), Err(Error::Storage(_))));
        let lock_path = dir.path().join(LOCK_FILE);
        assert_eq!(fs::metadata(&lock_path).expect("lock file").len(), 0);
        drop(lock);
        assert!(!lock_path.exists());
        assert!(BuildLock::acquire(&layout).is_ok());
    }

    #[test]
    fn publish_replaces_current_pointer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = SnapshotLayout::new(dir.path());
        assert_eq!(layout.read_current().expect("read"), None);
        layout.publish("one").expect("publish");
        layout.publish("two").expect("publish");
        assert_eq!(layout.read_current().expect("read").as_deref(), Some("two"));
    }

    #[test]
    fn prune_keeps_listed_snapshots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = SnapshotLayout::new(dir.path());
        for id in ["a", "b", "c"] {
            fs::create_dir_all(layout.snapshot_dir(id)).expect("mkdir");
        }
        fs::create_dir_all(layout.staging_dir("d")).expect("mkdir");
        assert_eq!(layout.prune(&["b", "c"]), 2);
        assert!(!layout.snapshot_dir("a").exists());
        assert!(layout.snapshot_dir("c").exists());
    }
}
