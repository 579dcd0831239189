//! Full-table scans back into Rust values, re-sorted by `row_index`.
use anyhow::{Result, anyhow};
use lancedb::Connection;
use lancedb::query::ExecutableQuery;
use arrow_array::{Array, RecordBatch, Int64Array, FixedSizeListArray, StringArray};
use arrow_array::cast::AsArray;

use philodb_core::error::Error;
use philodb_core::types::Passage;

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<T>()).ok_or_else(|| anyhow!("column '{}' missing or mistyped", name))
}

fn vector_at(col: &FixedSizeListArray, i: usize, dim: usize) -> Result<Vec<f32>> {
	if !col.is_valid(i) { return Err(anyhow!("null vector at row {}", i)); }
	let arr = col.value(i);
	let v = arr.as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
	if v.len() != dim { return Err(Error::IndexAlignment(format!("stored vector has dimension {}, expected {}", v.len(), dim)).into()); }
	Ok(v)
}

/// Rows must carry `row_index` values that are exactly `first..first + n` once each.
fn sort_and_check(mut rows: Vec<(i64, usize)>, first: usize) -> Result<Vec<usize>> {
	rows.sort_by_key(|(row, _)| *row);
	for (expected, (row, _)) in (first..).zip(rows.iter()) {
		if *row != expected as i64 {
			return Err(Error::IndexAlignment(format!("row_index {} found where {} was expected", row, expected)).into());
		}
	}
	Ok(rows.into_iter().map(|(_, pos)| pos).collect())
}

/// Read passages and vectors; `first_row` is the row index of the first stored row.
pub async fn read_passages(conn: &Connection, table: &str, dim: usize, first_row: usize) -> Result<(Vec<Passage>, Vec<Vec<f32>>)> {
	let t = conn.open_table(table).execute().await?;
	let mut keyed = Vec::new();
	let mut passages = Vec::new();
	let mut vectors = Vec::new();
	let mut stream = t.query().execute().await?;
	while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
		let rows = column::<Int64Array>(&batch, "row_index")?;
		let titles = column::<StringArray>(&batch, "title")?;
		let authors = column::<StringArray>(&batch, "author")?;
		let schools = column::<StringArray>(&batch, "school")?;
		let texts = column::<StringArray>(&batch, "text")?;
		let vecs = column::<FixedSizeListArray>(&batch, "vector")?;
		for i in 0..batch.num_rows() {
			keyed.push((rows.value(i), passages.len()));
			passages.push(Passage::new(texts.value(i), schools.value(i), titles.value(i), authors.value(i)));
			vectors.push(vector_at(vecs, i, dim)?);
		}
	}
	let order = sort_and_check(keyed, first_row)?;
	let mut slots: Vec<Option<(Passage, Vec<f32>)>> = passages.into_iter().zip(vectors).map(Some).collect();
	let mut out_p = Vec::with_capacity(order.len());
	let mut out_v = Vec::with_capacity(order.len());
	for pos in order {
		let (p, v) = slots[pos].take().ok_or_else(|| anyhow!("row {} read twice", pos))?;
		out_p.push(p);
		out_v.push(v);
	}
	Ok((out_p, out_v))
}

pub async fn read_vectors(conn: &Connection, table: &str, dim: usize) -> Result<Vec<Vec<f32>>> {
	let t = conn.open_table(table).execute().await?;
	let mut keyed = Vec::new();
	let mut vectors = Vec::new();
	let mut stream = t.query().execute().await?;
	while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
		let rows = column::<Int64Array>(&batch, "row_index")?;
		let vecs = column::<FixedSizeListArray>(&batch, "vector")?;
		for i in 0..batch.num_rows() {
			keyed.push((rows.value(i), vectors.len()));
			vectors.push(vector_at(vecs, i, dim)?);
		}
	}
	let order = sort_and_check(keyed, 0)?;
	let mut slots: Vec<Option<Vec<f32>>> = vectors.into_iter().map(Some).collect();
	order.into_iter().map(|pos| slots[pos].take().ok_or_else(|| anyhow!("row {} read twice", pos))).collect()
}
