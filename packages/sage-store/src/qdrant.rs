use std::collections::{HashMap, HashSet};

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, Filter, PointStruct, Query, QueryPointsBuilder, Range, ScrollPointsBuilder,
		UpsertPointsBuilder, Value, Vector, value::Kind,
	},
};
use serde_json::Value as JsonValue;

use crate::Result;
use sage_domain::DocumentChunk;

pub const DENSE_VECTOR_NAME: &str = "dense";

/// One document fragment to index, before embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
	pub chunk_id: String,
	pub chunk_index: i64,
	pub content: String,
	pub page_numbers: Vec<i64>,
}

/// Session-scoped evidence chunk store backed by a single Qdrant collection.
///
/// Every point carries its `session_id` in the payload; all reads filter on
/// it so one collection serves all sessions.
pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &sage_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Nearest-neighbor search over one session's chunks, dropping hits below
	/// the similarity threshold.
	pub async fn search_chunks(
		&self,
		session_id: &str,
		vector: &[f32],
		k: u32,
		threshold: f32,
	) -> Result<Vec<DocumentChunk>> {
		let filter = Filter::must([Condition::matches("session_id", session_id.to_string())]);
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.filter(filter)
			.score_threshold(threshold)
			.with_payload(true)
			.limit(k as u64);
		let response = self.client.query(search).await?;
		let mut chunks = Vec::with_capacity(response.result.len());

		for point in &response.result {
			if let Some(chunk) = chunk_from_payload(&point.payload, point.score) {
				chunks.push(chunk);
			} else {
				tracing::warn!("Scored point is missing chunk payload fields.");
			}
		}

		Ok(chunks)
	}

	/// Fetches chunks adjacent (by `chunk_index`) to the given ones, within
	/// `radius` positions on each side. The requested chunks themselves are
	/// excluded.
	pub async fn adjacent_chunks(
		&self,
		session_id: &str,
		chunk_ids: &[String],
		radius: u32,
	) -> Result<Vec<DocumentChunk>> {
		if chunk_ids.is_empty() || radius == 0 {
			return Ok(Vec::new());
		}

		let mut anchor_indexes = Vec::new();

		for chunk_id in chunk_ids {
			let filter = Filter::must([
				Condition::matches("session_id", session_id.to_string()),
				Condition::matches("chunk_id", chunk_id.clone()),
			]);
			let scroll = ScrollPointsBuilder::new(self.collection.clone())
				.filter(filter)
				.with_payload(true)
				.limit(1);
			let response = self.client.scroll(scroll).await?;

			if let Some(point) = response.result.first()
				&& let Some(index) = payload_i64(&point.payload, "chunk_index")
			{
				anchor_indexes.push(index);
			}
		}

		let requested: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();
		let mut seen = HashSet::new();
		let mut expanded = Vec::new();

		for index in anchor_indexes {
			let low = index.saturating_sub(radius as i64);
			let high = index.saturating_add(radius as i64);
			let filter = Filter::must([
				Condition::matches("session_id", session_id.to_string()),
				Condition::range(
					"chunk_index",
					Range {
						gte: Some(low as f64),
						lte: Some(high as f64),
						..Default::default()
					},
				),
			]);
			let scroll = ScrollPointsBuilder::new(self.collection.clone())
				.filter(filter)
				.with_payload(true)
				.limit(2 * radius + 1);
			let response = self.client.scroll(scroll).await?;

			for point in &response.result {
				let Some(chunk) = chunk_from_payload(&point.payload, 0.0) else {
					continue;
				};

				if requested.contains(chunk.id.as_str()) || !seen.insert(chunk.id.clone()) {
					continue;
				}

				expanded.push(chunk);
			}
		}

		Ok(expanded)
	}

	pub async fn upsert_chunks(
		&self,
		session_id: &str,
		records: &[ChunkRecord],
		vectors: &[Vec<f32>],
	) -> Result<()> {
		if records.len() != vectors.len() {
			return Err(crate::Error::InvalidArgument(
				"Chunk records and vectors must have equal length.".to_string(),
			));
		}

		let mut points = Vec::with_capacity(records.len());

		for (record, vec) in records.iter().zip(vectors.iter()) {
			let mut payload_map = HashMap::new();

			payload_map.insert("session_id".to_string(), Value::from(session_id.to_string()));
			payload_map.insert("chunk_id".to_string(), Value::from(record.chunk_id.clone()));
			payload_map.insert("chunk_index".to_string(), Value::from(record.chunk_index));
			payload_map.insert("content".to_string(), Value::from(record.content.clone()));
			payload_map.insert(
				"page_numbers".to_string(),
				Value::from(JsonValue::from(record.page_numbers.clone())),
			);

			let payload = Payload::from(payload_map);
			let mut vector_map = HashMap::new();

			vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vec.to_vec()));

			points.push(PointStruct::new(record.chunk_id.clone(), vector_map, payload));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}
}

fn chunk_from_payload(payload: &HashMap<String, Value>, score: f32) -> Option<DocumentChunk> {
	let id = payload_str(payload, "chunk_id")?;
	let content = payload_str(payload, "content")?;
	let page_numbers = payload_i64_list(payload, "page_numbers");

	Some(DocumentChunk { id, content, page_numbers, similarity: score })
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::StringValue(value) => Some(value.clone()),
		_ => None,
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::IntegerValue(value) => Some(*value),
		Kind::DoubleValue(value) => Some(*value as i64),
		_ => None,
	}
}

fn payload_i64_list(payload: &HashMap<String, Value>, key: &str) -> Vec<i64> {
	let Some(value) = payload.get(key) else {
		return Vec::new();
	};
	let Some(Kind::ListValue(list)) = value.kind.as_ref() else {
		return Vec::new();
	};

	list.values
		.iter()
		.filter_map(|item| match item.kind.as_ref() {
			Some(Kind::IntegerValue(value)) => Some(*value),
			Some(Kind::DoubleValue(value)) => Some(*value as i64),
			_ => None,
		})
		.collect()
}
