//! Flat vector index over the agent catalog, persisted as LanceDB snapshots.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod index_build;
pub mod schema;
pub mod search;
pub mod snapshot;
pub mod table;

pub use index_build::{BuildReport, IndexBuilder};
pub use search::{IndexSnapshot, Neighbor};
pub use snapshot::{IndexMap, Manifest, SnapshotLayout};
