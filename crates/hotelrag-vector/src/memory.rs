use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::VectorCollection;
use hotelrag_core::types::{RoomTypeConstraint, VectorHit};

use crate::writer::VectorEntry;

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// Brute-force cosine search over entries held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCollection {
	entries: Vec<VectorEntry>,
}

impl InMemoryCollection {
	pub fn new(entries: Vec<VectorEntry>) -> Self { Self { entries } }

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[async_trait]
impl VectorCollection for InMemoryCollection {
	async fn nearest(
		&self,
		vector: &[f32],
		k: usize,
		filter: Option<&RoomTypeConstraint>,
		cancel: &CancellationToken,
	) -> Result<Vec<VectorHit>> {
		if cancel.is_cancelled() { bail!("vector search cancelled"); }
		let mut hits: Vec<VectorHit> = self
			.entries
			.iter()
			.filter(|e| filter.map_or(true, |f| f.matches(e.room_type.as_deref(), e.fuzzy_room_type.as_deref())))
			.map(|e| VectorHit { id: e.id.clone(), comment_id: e.comment_id.clone(), score: cosine(vector, &e.vector) })
			.collect();
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(k);
		Ok(hits)
	}
}
