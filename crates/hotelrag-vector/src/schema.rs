use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub fn vector_field(dim: usize) -> Field {
	Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true)
}

/// Rows searched by the dense and reverse-query routes. For review rows
/// `comment_id == id`; synthetic questions point back at their source review.
pub fn build_entry_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("comment_id", DataType::Utf8, false),
		Field::new("room_type", DataType::Utf8, true),
		Field::new("fuzzy_room_type", DataType::Utf8, true),
		Field::new("text", DataType::Utf8, false),
		vector_field(dim),
	]))
}

pub fn build_summary_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("category", DataType::Utf8, false),
		Field::new("keywords", DataType::Utf8, false),
		Field::new("summary", DataType::Utf8, false),
		Field::new("comment_count", DataType::Int32, false),
		vector_field(dim),
	]))
}
