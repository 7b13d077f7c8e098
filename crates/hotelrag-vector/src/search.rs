use anyhow::{anyhow, bail, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::VectorCollection;
use hotelrag_core::types::{CategorySummary, RoomTypeConstraint, VectorHit};

use crate::table::open_table;

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("column '{}' missing or not utf8", name))
}

fn distance_score(batch: &RecordBatch, row: usize) -> f32 {
	batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.map_or(0.0, |d| 1.0 - d.value(row))
}

/// SQL predicate for the room-type column a constraint applies to.
pub fn room_filter_sql(filter: &RoomTypeConstraint) -> String {
	let column = match filter {
		RoomTypeConstraint::Exact(_) => "room_type",
		RoomTypeConstraint::Fuzzy(_) => "fuzzy_room_type",
	};
	format!("{} = '{}'", column, filter.value().replace('\'', "''"))
}

/// A LanceDB table searched by cosine distance; score is `1 - distance`.
pub struct LanceCollection {
	table: Table,
	name: String,
}

impl LanceCollection {
	pub async fn open(conn: &Connection, name: &str) -> Result<Self> {
		Ok(Self { table: open_table(conn, name).await?, name: name.to_string() })
	}

	pub fn name(&self) -> &str { &self.name }

	async fn search(&self, vector: &[f32], k: usize, filter: Option<&RoomTypeConstraint>) -> Result<Vec<VectorHit>> {
		let mut query = self.table.vector_search(vector.to_vec())?.distance_type(DistanceType::Cosine).limit(k);
		if let Some(f) = filter {
			query = query.only_if(room_filter_sql(f));
		}
		let mut stream = query.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = string_column(&batch, "id")?;
			let comment_ids = string_column(&batch, "comment_id")?;
			for i in 0..batch.num_rows() {
				hits.push(VectorHit {
					id: ids.value(i).to_string(),
					comment_id: comment_ids.value(i).to_string(),
					score: distance_score(&batch, i),
				});
			}
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(k);
		Ok(hits)
	}
}

#[async_trait]
impl VectorCollection for LanceCollection {
	async fn nearest(
		&self,
		vector: &[f32],
		k: usize,
		filter: Option<&RoomTypeConstraint>,
		cancel: &CancellationToken,
	) -> Result<Vec<VectorHit>> {
		if k == 0 { return Ok(Vec::new()); }
		tokio::select! {
			biased;
			_ = cancel.cancelled() => bail!("vector search on '{}' cancelled", self.name),
			r = self.search(vector, k, filter) => r,
		}
	}
}

/// Read every category summary (with its vector) into memory.
pub async fn load_summaries(conn: &Connection, table: &str) -> Result<Vec<CategorySummary>> {
	let t = open_table(conn, table).await?;
	let mut stream = t.query().execute().await?;
	let mut out = Vec::new();
	while let Some(batch) = stream.try_next().await? {
		let categories = string_column(&batch, "category")?;
		let keywords = string_column(&batch, "keywords")?;
		let summaries = string_column(&batch, "summary")?;
		let counts = batch
			.column_by_name("comment_count")
			.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
			.ok_or_else(|| anyhow!("column 'comment_count' missing"))?;
		let vectors = batch
			.column_by_name("vector")
			.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
			.ok_or_else(|| anyhow!("column 'vector' missing"))?;
		for i in 0..batch.num_rows() {
			let values = vectors.value(i);
			let floats = values
				.as_any()
				.downcast_ref::<Float32Array>()
				.ok_or_else(|| anyhow!("summary vector is not float32"))?;
			out.push(CategorySummary {
				category: categories.value(i).to_string(),
				keywords: keywords.value(i).to_string(),
				summary: summaries.value(i).to_string(),
				comment_count: counts.value(i).max(0) as u32,
				vector: floats.values().to_vec(),
			});
		}
	}
	tracing::info!(table, summaries = out.len(), "loaded category summaries");
	Ok(out)
}
