//! LanceDB connection helpers for a snapshot's vector table.
use anyhow::Result;
use arrow_array::{RecordBatch, RecordBatchIterator};
use lancedb::{connect, Connection, Table};
use std::path::Path;

use crate::schema::VECTOR_TABLE;

pub async fn open_db(dir: &Path) -> Result<Connection> {
    Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
}

pub async fn create_vector_table(conn: &Connection, batch: RecordBatch) -> Result<Table> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    Ok(conn.create_table(VECTOR_TABLE, reader).execute().await?)
}

pub async fn open_vector_table(conn: &Connection) -> Result<Table> {
    Ok(conn.open_table(VECTOR_TABLE).execute().await?)
}
