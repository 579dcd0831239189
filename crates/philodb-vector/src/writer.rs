use anyhow::{Result, anyhow};
use lancedb::Connection;
use arrow_array::{RecordBatch, RecordBatchIterator, Int64Array, FixedSizeListArray, StringArray};
use std::sync::Arc;
use tracing::debug;

use philodb_core::types::Passage;
use crate::schema::{build_passage_schema, build_vector_schema};
use crate::table::ensure_table;

const BATCH_ROWS: usize = 1000;

fn vector_array(vectors: &[&[f32]], dim: usize) -> FixedSizeListArray {
	let rows = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows, dim as i32)
}

fn check_dims(vectors: &[Vec<f32>], dim: usize) -> Result<()> {
	if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
		return Err(anyhow!("vector {} has dimension {}, expected {}", i, v.len(), dim));
	}
	Ok(())
}

async fn insert_batches(conn: &Connection, table: &str, schema: Arc<arrow_schema::Schema>, batches: Vec<RecordBatch>) -> Result<()> {
	if batches.is_empty() { return ensure_table(conn, table, schema).await; }
	let mut created = false;
	for batch in batches {
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema.clone()));
		if created {
			conn.open_table(table).execute().await?.add(reader).execute().await?;
		} else {
			conn.create_table(table, reader).execute().await?;
			created = true;
		}
	}
	Ok(())
}

/// Write passages with their vectors; row `i` gets `row_index = first_row + i`.
pub async fn write_passages(conn: &Connection, table: &str, dim: usize, first_row: usize, passages: &[Passage], embeddings: &[Vec<f32>]) -> Result<usize> {
	if passages.len() != embeddings.len() { return Err(anyhow!("{} passages but {} embeddings", passages.len(), embeddings.len())); }
	check_dims(embeddings, dim)?;
	let schema = build_passage_schema(dim);
	let mut batches = Vec::new();
	for (chunk_no, (ps, vs)) in passages.chunks(BATCH_ROWS).zip(embeddings.chunks(BATCH_ROWS)).enumerate() {
		let base = first_row + chunk_no * BATCH_ROWS;
		let row_index: Vec<i64> = (0..ps.len()).map(|i| (base + i) as i64).collect();
		let vecs: Vec<&[f32]> = vs.iter().map(Vec::as_slice).collect();
		let batch = RecordBatch::try_new(schema.clone(), vec![
			Arc::new(Int64Array::from(row_index)),
			Arc::new(StringArray::from(ps.iter().map(|p| p.title.clone()).collect::<Vec<_>>())),
			Arc::new(StringArray::from(ps.iter().map(|p| p.author.clone()).collect::<Vec<_>>())),
			Arc::new(StringArray::from(ps.iter().map(|p| p.school.clone()).collect::<Vec<_>>())),
			Arc::new(StringArray::from(ps.iter().map(|p| p.text.clone()).collect::<Vec<_>>())),
			Arc::new(vector_array(&vecs, dim)),
		])?;
		batches.push(batch);
	}
	debug!(table, rows = passages.len(), batches = batches.len(), "writing passages");
	insert_batches(conn, table, schema, batches).await?;
	Ok(passages.len())
}

/// Write index vectors; row `i` gets `row_index = i`.
pub async fn write_vectors(conn: &Connection, table: &str, dim: usize, vectors: &[Vec<f32>]) -> Result<usize> {
	check_dims(vectors, dim)?;
	let schema = build_vector_schema(dim);
	let mut batches = Vec::new();
	for (chunk_no, vs) in vectors.chunks(BATCH_ROWS).enumerate() {
		let base = chunk_no * BATCH_ROWS;
		let row_index: Vec<i64> = (0..vs.len()).map(|i| (base + i) as i64).collect();
		let vecs: Vec<&[f32]> = vs.iter().map(Vec::as_slice).collect();
		batches.push(RecordBatch::try_new(schema.clone(), vec![
			Arc::new(Int64Array::from(row_index)),
			Arc::new(vector_array(&vecs, dim)),
		])?);
	}
	debug!(table, rows = vectors.len(), "writing vectors");
	insert_batches(conn, table, schema, batches).await?;
	Ok(vectors.len())
}
