use std::cmp::Ordering;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::SageEngine;
use sage_domain::{
	DocumentChunk, SearchRecord, Stage, StateUpdate, ThinkingKind, ThinkingStep, TurnState,
	query_gate,
};

const CHUNK_PREVIEW_CHARS: usize = 50;
const PREVIEW_ITEMS: usize = 3;

/// Executes the pending document search with multi-query fan-out and folds
/// the deduplicated, ranked hits into the accumulated evidence.
///
/// Adapter failures degrade to zero results; this step never fails the turn.
pub(crate) async fn vector_search(engine: &SageEngine, state: &TurnState) -> StateUpdate {
	let record = state.pending_search_query.clone().unwrap_or_else(|| SearchRecord {
		query: if state.rewritten_query.trim().is_empty() {
			state.raw_message.trim().to_string()
		} else {
			state.rewritten_query.clone()
		},
		reason: "default search".to_string(),
	});
	let hits = retrieve(engine, &state.session_id, &record.query).await;
	let new_hits: Vec<&DocumentChunk> =
		hits.iter().filter(|chunk| !state.contains_chunk(&chunk.id)).collect();
	let preview = new_hits
		.iter()
		.take(PREVIEW_ITEMS)
		.map(|chunk| {
			let pages =
				chunk.page_numbers.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
			let text: String = chunk.content.chars().take(CHUNK_PREVIEW_CHARS).collect();

			format!("p.{pages}: {text}...")
		})
		.collect::<Vec<_>>()
		.join("\n");
	let thinking = ThinkingStep::new(
		ThinkingKind::Action,
		format!(
			"Document search: \"{query}\"\n{count} new chunks found\n{preview}",
			query = record.query,
			count = new_hits.len(),
		),
	);

	StateUpdate {
		stage: Some(Stage::VectorSearch),
		new_chunks: hits,
		clear_pending_search: true,
		search_history: vec![record],
		thinking_steps: vec![thinking],
		..Default::default()
	}
}

/// Multi-query retrieval: paraphrase, embed the batch, run one similarity
/// search per variant concurrently, then merge.
async fn retrieve(engine: &SageEngine, session_id: &str, query: &str) -> Vec<DocumentChunk> {
	let retrieval = &engine.cfg.retrieval;
	let variants = if retrieval.multi_query {
		let raw = generate_variants(engine, query).await;

		normalize_variants(raw, query, retrieval.max_query_variants)
	} else {
		vec![query.trim().to_string()]
	};
	let vectors = match engine
		.adapters
		.embedding
		.embed(&engine.cfg.providers.embedding, &variants)
		.await
	{
		Ok(vectors) => vectors,
		Err(err) => {
			tracing::warn!(error = %err, "Embedding call failed; treating as zero results.");

			return Vec::new();
		},
	};
	let mut join_set = JoinSet::new();

	for vector in vectors {
		let evidence = engine.adapters.evidence.clone();
		let session = session_id.to_string();
		let k = retrieval.top_k;
		let threshold = retrieval.similarity_threshold;

		join_set.spawn(async move {
			evidence.similarity_search(&session, &vector, k, threshold).await
		});
	}

	let mut per_variant = Vec::new();

	while let Some(joined) = join_set.join_next().await {
		match joined {
			Ok(Ok(chunks)) => per_variant.push(chunks),
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Similarity search failed for one variant.");
			},
			Err(err) => {
				tracing::warn!(error = %err, "Similarity search task aborted.");
			},
		}
	}

	merge_ranked(per_variant, retrieval.top_k as usize)
}

/// Union of per-variant hits, deduplicated by chunk id (best score wins),
/// sorted by descending similarity with a stable id tie-break, truncated to
/// `k`.
fn merge_ranked(results: Vec<Vec<DocumentChunk>>, k: usize) -> Vec<DocumentChunk> {
	let mut merged: Vec<DocumentChunk> = Vec::new();

	for chunk in results.into_iter().flatten() {
		match merged.iter().position(|existing| existing.id == chunk.id) {
			Some(index) =>
				if chunk.similarity > merged[index].similarity {
					merged[index].similarity = chunk.similarity;
				},
			None => merged.push(chunk),
		}
	}

	merged.sort_by(|a, b| {
		b.similarity
			.partial_cmp(&a.similarity)
			.unwrap_or(Ordering::Equal)
			.then_with(|| a.id.cmp(&b.id))
	});
	merged.truncate(k);

	merged
}

async fn generate_variants(engine: &SageEngine, query: &str) -> Vec<String> {
	let messages = variant_messages(query);
	let value = match engine
		.adapters
		.generation
		.complete_structured(&engine.cfg.providers.classifier, &messages)
		.await
	{
		Ok(value) => value,
		Err(err) => {
			tracing::warn!(error = %err, "Query expansion failed; searching with the original only.");

			return Vec::new();
		},
	};

	value
		.get("queries")
		.and_then(Value::as_array)
		.map(|queries| {
			queries
				.iter()
				.filter_map(|item| item.as_str())
				.map(str::to_string)
				.collect::<Vec<_>>()
		})
		.unwrap_or_default()
}

/// Trims, drops variants that fail the English query gate, deduplicates
/// case-insensitively, keeps the original query first, and caps the count.
fn normalize_variants(variants: Vec<String>, original: &str, max_variants: u32) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = Vec::new();
	let original = original.trim();

	if !original.is_empty() {
		out.push(original.to_string());
		seen.push(original.to_lowercase());
	}

	for variant in variants {
		if out.len() >= max_variants as usize {
			break;
		}

		let trimmed = variant.trim();

		if trimmed.is_empty() || !query_gate::is_searchable_english(trimmed) {
			continue;
		}

		let key = trimmed.to_lowercase();

		if seen.contains(&key) {
			continue;
		}

		seen.push(key);
		out.push(trimmed.to_string());
	}

	out.truncate(max_variants as usize);

	out
}

fn variant_messages(query: &str) -> Vec<Value> {
	let system_prompt = "You are a query expansion engine for document retrieval. Output must be \
valid JSON only and must match the provided schema exactly. Generate short English-only \
rephrasings that preserve the original intent.";
	let user_prompt = format!(
		"Generate 4 different phrasings of this search query for vector similarity search.\n\
Each phrasing should use different keywords while preserving the intent.\n\n\
Original query: {query}\n\n\
Rules:\n\
- Generate ALL queries in ENGLISH regardless of the input language\n\
- Use varied vocabulary and phrasing\n\
- Include keyword-style queries (e.g. \"AI agent market trends 2024\")\n\
- Include natural question style (e.g. \"What are the benefits of AI agents?\")\n\n\
Return JSON matching this exact schema:\n{{ \"queries\": [\"string\"] }}"
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunk(id: &str, similarity: f32) -> DocumentChunk {
		DocumentChunk {
			id: id.to_string(),
			content: format!("content {id}"),
			page_numbers: vec![1],
			similarity,
		}
	}

	#[test]
	fn merge_dedups_and_sorts_descending() {
		let merged = merge_ranked(
			vec![
				vec![chunk("a", 0.70), chunk("b", 0.90)],
				vec![chunk("a", 0.95), chunk("c", 0.80)],
			],
			5,
		);
		let ids: Vec<&str> = merged.iter().map(|chunk| chunk.id.as_str()).collect();

		assert_eq!(ids, vec!["a", "b", "c"]);
		assert_eq!(merged[0].similarity, 0.95);
		assert!(merged.windows(2).all(|pair| pair[0].similarity >= pair[1].similarity));
	}

	#[test]
	fn merge_truncates_to_k() {
		let merged = merge_ranked(
			vec![vec![chunk("a", 0.9), chunk("b", 0.8), chunk("c", 0.7)]],
			2,
		);

		assert_eq!(merged.len(), 2);
	}

	#[test]
	fn equal_scores_tie_break_on_id() {
		let merged = merge_ranked(vec![vec![chunk("b", 0.5)], vec![chunk("a", 0.5)]], 5);
		let ids: Vec<&str> = merged.iter().map(|chunk| chunk.id.as_str()).collect();

		assert_eq!(ids, vec!["a", "b"]);
	}

	#[test]
	fn normalize_keeps_original_first_and_dedups() {
		let variants = vec![
			"AI agent definition".to_string(),
			"what is an ai agent".to_string(),
			"What is an AI agent".to_string(),
			"에이전트 정의".to_string(),
		];
		let normalized = normalize_variants(variants, "AI agent definition", 5);

		assert_eq!(
			normalized,
			vec!["AI agent definition".to_string(), "what is an ai agent".to_string()]
		);
	}

	#[test]
	fn normalize_caps_variant_count() {
		let variants =
			(0..10).map(|index| format!("variant number {index}")).collect::<Vec<_>>();
		let normalized = normalize_variants(variants, "original query", 3);

		assert_eq!(normalized.len(), 3);
		assert_eq!(normalized[0], "original query");
	}
}
