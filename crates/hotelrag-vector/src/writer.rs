use anyhow::{bail, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::sync::Arc;

use hotelrag_core::types::CategorySummary;

use crate::schema::{build_entry_schema, build_summary_schema};
use crate::table::{open_table, table_exists};

const WRITE_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
	pub id: String,
	pub comment_id: String,
	pub room_type: Option<String>,
	pub fuzzy_room_type: Option<String>,
	pub text: String,
	pub vector: Vec<f32>,
}

fn vectors_array<'a>(vectors: impl Iterator<Item = &'a Vec<f32>>, dim: usize) -> FixedSizeListArray {
	let rows: Vec<Option<Vec<Option<f32>>>> = vectors.map(|v| Some(v.iter().map(|&x| Some(x)).collect())).collect();
	FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows.into_iter(), dim as i32)
}

pub fn entries_to_record_batch(entries: &[VectorEntry], dim: usize) -> Result<RecordBatch> {
	if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
		bail!("entry '{}' has {} dims, expected {}", bad.id, bad.vector.len(), dim);
	}
	let batch = RecordBatch::try_new(build_entry_schema(dim), vec![
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.id.as_str()))),
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.comment_id.as_str()))),
		Arc::new(StringArray::from(entries.iter().map(|e| e.room_type.clone()).collect::<Vec<_>>())),
		Arc::new(StringArray::from(entries.iter().map(|e| e.fuzzy_room_type.clone()).collect::<Vec<_>>())),
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.text.as_str()))),
		Arc::new(vectors_array(entries.iter().map(|e| &e.vector), dim)),
	])?;
	Ok(batch)
}

async fn append(conn: &Connection, table: &str, batch: RecordBatch) -> Result<()> {
	let schema = batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	if table_exists(conn, table).await? {
		open_table(conn, table).await?.add(reader).execute().await?;
	} else {
		conn.create_table(table, reader).execute().await?;
	}
	Ok(())
}

/// Append entries to `table`, creating it on first write.
pub async fn write_entries(conn: &Connection, table: &str, entries: &[VectorEntry], dim: usize) -> Result<usize> {
	if entries.is_empty() { return Ok(0); }
	let pb = ProgressBar::new(entries.len() as u64);
	pb.set_style(
		ProgressStyle::default_bar()
			.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} vectors ({percent}%) {msg}")?
			.progress_chars("#>-"),
	);
	pb.set_message(table.to_string());
	for chunk in entries.chunks(WRITE_BATCH) {
		append(conn, table, entries_to_record_batch(chunk, dim)?).await?;
		pb.inc(chunk.len() as u64);
	}
	pb.finish_with_message(format!("{} written", table));
	tracing::info!(table, rows = entries.len(), "wrote vector entries");
	Ok(entries.len())
}

pub async fn write_summaries(conn: &Connection, table: &str, summaries: &[CategorySummary], dim: usize) -> Result<usize> {
	if summaries.is_empty() { return Ok(0); }
	if let Some(bad) = summaries.iter().find(|s| s.vector.len() != dim) {
		bail!("summary '{}' has {} dims, expected {}", bad.category, bad.vector.len(), dim);
	}
	let batch = RecordBatch::try_new(build_summary_schema(dim), vec![
		Arc::new(StringArray::from_iter_values(summaries.iter().map(|s| s.category.as_str()))),
		Arc::new(StringArray::from_iter_values(summaries.iter().map(|s| s.keywords.as_str()))),
		Arc::new(StringArray::from_iter_values(summaries.iter().map(|s| s.summary.as_str()))),
		Arc::new(Int32Array::from_iter_values(summaries.iter().map(|s| s.comment_count as i32))),
		Arc::new(vectors_array(summaries.iter().map(|s| &s.vector), dim)),
	])?;
	append(conn, table, batch).await?;
	tracing::info!(table, rows = summaries.len(), "wrote category summaries");
	Ok(summaries.len())
}
