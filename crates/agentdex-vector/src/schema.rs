use anyhow::Result;
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const VECTOR_TABLE: &str = "vectors";

pub fn build_vector_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("ordinal", DataType::Int32, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

/// One row per vector; row `i` carries ordinal `i`.
pub fn vectors_to_record_batch(vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
    let dim = i32::try_from(dim)?;
    let ordinals = (0..vectors.len()).map(i32::try_from).collect::<Result<Vec<_>, _>>()?;
    let values = vectors.iter().map(|v| Some(v.iter().copied().map(Some)));
    let record_batch = RecordBatch::try_new(
        build_vector_schema(dim),
        vec![
            Arc::new(Int32Array::from(ordinals)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, dim)),
        ],
    )?;
    Ok(record_batch)
}
