use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const PART_TABLE: &str = "part";
pub const PASSAGES_TABLE: &str = "passages";
pub const VECTORS_TABLE: &str = "vectors";
pub const META_TABLE: &str = "meta";

fn vector_field(dim: usize) -> Field {
	Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true)
}

/// Worker parts and the merged corpus: one row per passage, keyed by its global index.
pub fn build_passage_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("row_index", DataType::Int64, false),
		Field::new("title", DataType::Utf8, false),
		Field::new("author", DataType::Utf8, false),
		Field::new("school", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		vector_field(dim),
	]))
}

/// Similarity index: normalized vectors only.
pub fn build_vector_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("row_index", DataType::Int64, false),
		vector_field(dim),
	]))
}

pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
