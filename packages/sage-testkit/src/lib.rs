//! In-memory stub adapters for exercising the engine without network access.
//!
//! Every stub counts its calls so tests can assert which adapters a turn did
//! (or did not) touch.

use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::{Map, Value};

use sage_config::{
	Compose, Config, EmbeddingProviderConfig, Enrich, LlmProviderConfig, Providers, Qdrant,
	Retrieval, Storage, Turn, Web, WebSearchProviderConfig,
};
use sage_domain::{DocumentChunk, DocumentContext};
use sage_engine::{
	BoxFuture, Checkpoint, CheckpointStore, DocumentContextProvider, EmbeddingProvider,
	EvidenceStore, GenerationProvider, WebSearchProvider,
};
use sage_providers::{Completion, WebSearchOutcome};

/// Deterministic embedding provider: the vector depends only on the text.
pub struct StubEmbedding {
	pub vector_dim: usize,
	pub calls: AtomicUsize,
}

impl StubEmbedding {
	pub fn new(vector_dim: usize) -> Self {
		Self { vector_dim, calls: AtomicUsize::new(0) }
	}

	/// The vector this stub produces for `text`; use it to seed the evidence
	/// store with chunks at a known similarity.
	pub fn vector_for(text: &str, vector_dim: usize) -> Vec<f32> {
		let mut seed = 1469598103934665603u64;

		for byte in text.bytes() {
			seed ^= byte as u64;
			seed = seed.wrapping_mul(1099511628211);
		}

		(0..vector_dim)
			.map(|index| {
				let mixed = seed.wrapping_add(index as u64).wrapping_mul(6364136223846793005);

				((mixed >> 33) % 1000) as f32 / 1000.0
			})
			.collect()
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(texts.iter().map(|text| Self::vector_for(text, self.vector_dim)).collect())
		})
	}
}

/// Scripted generation provider: structured payloads and completions are
/// popped from queues, falling back to a configured default when a queue
/// runs dry. Every prompt is logged for assertions.
#[derive(Default)]
pub struct ScriptedGeneration {
	structured_queue: Mutex<VecDeque<Value>>,
	structured_fallback: Option<Value>,
	completion_queue: Mutex<VecDeque<Completion>>,
	completion_fallback: Option<Completion>,
	log: Mutex<Vec<String>>,
}

impl ScriptedGeneration {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_structured(self, value: Value) -> Self {
		self.structured_queue.lock().unwrap_or_else(|err| err.into_inner()).push_back(value);

		self
	}

	pub fn with_structured_fallback(mut self, value: Value) -> Self {
		self.structured_fallback = Some(value);

		self
	}

	pub fn push_completion(self, completion: Completion) -> Self {
		self.completion_queue
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push_back(completion);

		self
	}

	pub fn push_completion_text(self, text: &str) -> Self {
		self.push_completion(Completion { text: text.to_string(), tool_calls: Vec::new() })
	}

	pub fn with_completion_fallback(mut self, text: &str) -> Self {
		self.completion_fallback =
			Some(Completion { text: text.to_string(), tool_calls: Vec::new() });

		self
	}

	/// Every prompt this stub has seen, in call order.
	pub fn prompts(&self) -> Vec<String> {
		self.log.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn call_count(&self) -> usize {
		self.log.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	fn record(&self, messages: &[Value]) {
		let transcript = messages
			.iter()
			.filter_map(|message| message.get("content").and_then(Value::as_str))
			.collect::<Vec<_>>()
			.join("\n");

		self.log.lock().unwrap_or_else(|err| err.into_inner()).push(transcript);
	}
}

impl GenerationProvider for ScriptedGeneration {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		_tools: Option<&'a [Value]>,
	) -> BoxFuture<'a, color_eyre::Result<Completion>> {
		Box::pin(async move {
			self.record(messages);

			let popped = self
				.completion_queue
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.pop_front();

			popped
				.or_else(|| self.completion_fallback.clone())
				.ok_or_else(|| color_eyre::eyre::eyre!("No scripted completion left."))
		})
	}

	fn complete_structured<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Value>> {
		Box::pin(async move {
			self.record(messages);

			let popped = self
				.structured_queue
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.pop_front();

			popped
				.or_else(|| self.structured_fallback.clone())
				.ok_or_else(|| color_eyre::eyre::eyre!("No scripted structured response left."))
		})
	}
}

/// Scripted web search: outcomes pop from a queue, then fall back to a
/// configured default (empty by default).
#[derive(Default)]
pub struct StubWebSearch {
	queue: Mutex<VecDeque<WebSearchOutcome>>,
	fallback: WebSearchOutcome,
	pub calls: AtomicUsize,
}

impl StubWebSearch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_outcome(self, outcome: WebSearchOutcome) -> Self {
		self.queue.lock().unwrap_or_else(|err| err.into_inner()).push_back(outcome);

		self
	}

	pub fn with_fallback(mut self, outcome: WebSearchOutcome) -> Self {
		self.fallback = outcome;

		self
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl WebSearchProvider for StubWebSearch {
	fn search<'a>(
		&'a self,
		_cfg: &'a WebSearchProviderConfig,
		_query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<WebSearchOutcome>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let popped = self.queue.lock().unwrap_or_else(|err| err.into_inner()).pop_front();

			Ok(popped.unwrap_or_else(|| self.fallback.clone()))
		})
	}
}

struct SeededChunk {
	chunk: DocumentChunk,
	chunk_index: i64,
	vector: Vec<f32>,
}

/// Cosine-similarity evidence store over seeded chunks.
#[derive(Default)]
pub struct MemoryEvidenceStore {
	chunks: Mutex<Vec<SeededChunk>>,
	pub search_calls: AtomicUsize,
	pub expand_calls: AtomicUsize,
}

impl MemoryEvidenceStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn seed_chunk(
		&self,
		id: &str,
		chunk_index: i64,
		content: &str,
		page_numbers: Vec<i64>,
		vector: Vec<f32>,
	) {
		let mut chunks = self.chunks.lock().unwrap_or_else(|err| err.into_inner());

		chunks.push(SeededChunk {
			chunk: DocumentChunk {
				id: id.to_string(),
				content: content.to_string(),
				page_numbers,
				similarity: 0.0,
			},
			chunk_index,
			vector,
		});
	}

	pub fn search_call_count(&self) -> usize {
		self.search_calls.load(Ordering::SeqCst)
	}

	pub fn expand_call_count(&self) -> usize {
		self.expand_calls.load(Ordering::SeqCst)
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return 0.0;
	}

	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}

impl EvidenceStore for MemoryEvidenceStore {
	fn similarity_search<'a>(
		&'a self,
		_session_id: &'a str,
		vector: &'a [f32],
		k: u32,
		threshold: f32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentChunk>>> {
		Box::pin(async move {
			self.search_calls.fetch_add(1, Ordering::SeqCst);

			let chunks = self.chunks.lock().unwrap_or_else(|err| err.into_inner());
			let mut scored: Vec<DocumentChunk> = chunks
				.iter()
				.filter_map(|seeded| {
					let similarity = cosine(vector, &seeded.vector);

					if similarity < threshold {
						return None;
					}

					let mut chunk = seeded.chunk.clone();

					chunk.similarity = similarity;

					Some(chunk)
				})
				.collect();

			scored.sort_by(|a, b| {
				b.similarity
					.partial_cmp(&a.similarity)
					.unwrap_or(std::cmp::Ordering::Equal)
					.then_with(|| a.id.cmp(&b.id))
			});
			scored.truncate(k as usize);

			Ok(scored)
		})
	}

	fn expand_adjacent<'a>(
		&'a self,
		_session_id: &'a str,
		chunk_ids: &'a [String],
		radius: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentChunk>>> {
		Box::pin(async move {
			self.expand_calls.fetch_add(1, Ordering::SeqCst);

			let chunks = self.chunks.lock().unwrap_or_else(|err| err.into_inner());
			let anchor_indexes: Vec<i64> = chunks
				.iter()
				.filter(|seeded| chunk_ids.contains(&seeded.chunk.id))
				.map(|seeded| seeded.chunk_index)
				.collect();
			let expanded = chunks
				.iter()
				.filter(|seeded| {
					!chunk_ids.contains(&seeded.chunk.id)
						&& anchor_indexes.iter().any(|anchor| {
							(seeded.chunk_index - anchor).unsigned_abs() <= radius as u64
						})
				})
				.map(|seeded| seeded.chunk.clone())
				.collect();

			Ok(expanded)
		})
	}
}

/// Fixed document context for tests.
pub struct StaticDocumentContext {
	pub context: Option<DocumentContext>,
}

impl StaticDocumentContext {
	pub fn new(topic: &str, scope: &str, suggested_questions: Vec<String>) -> Self {
		Self {
			context: Some(DocumentContext {
				topic: Some(topic.to_string()),
				scope: Some(scope.to_string()),
				suggested_questions,
			}),
		}
	}

	pub fn none() -> Self {
		Self { context: None }
	}
}

impl DocumentContextProvider for StaticDocumentContext {
	fn get_context<'a>(
		&'a self,
		_session_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<DocumentContext>>> {
		Box::pin(async move { Ok(self.context.clone()) })
	}
}

/// Checkpoint store that always fails; exercises the fatal error class.
pub struct FailingCheckpointStore;

impl CheckpointStore for FailingCheckpointStore {
	fn get<'a>(
		&'a self,
		_session_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<Checkpoint>>> {
		Box::pin(async { Err(color_eyre::eyre::eyre!("Checkpoint store unavailable.")) })
	}

	fn put<'a>(
		&'a self,
		_session_id: &'a str,
		_snapshot: Checkpoint,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async { Err(color_eyre::eyre::eyre!("Checkpoint store unavailable.")) })
	}
}

/// A full config with dummy provider endpoints and small bounds suited to
/// tests.
pub fn test_config(vector_dim: u32) -> Config {
	Config {
		turn: Turn {
			max_iterations: 3,
			timeout_ms: 5_000,
			history_window: 6,
			compose_history_window: 4,
		},
		retrieval: Retrieval {
			top_k: 5,
			similarity_threshold: 0.5,
			multi_query: false,
			max_query_variants: 5,
		},
		web: Web { target_sources: 5, max_attempts: 2, max_context_sources: 10 },
		compose: Compose { max_tool_rounds: 3, expand_radius: 1 },
		enrich: Enrich {
			enabled: false,
			min_response_chars: 50,
			max_terms: 3,
			max_definition_chars: 150,
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "stub".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/".to_string(),
				model: "stub-embedding".to_string(),
				dimensions: vector_dim,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			classifier: dummy_llm("stub-classifier", 0.0),
			responder: dummy_llm("stub-responder", 0.7),
			web_search: WebSearchProviderConfig {
				provider_id: "stub".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/".to_string(),
				model: "stub-search".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		storage: Storage {
			qdrant: Qdrant {
				url: "http://localhost:6334".to_string(),
				collection: "sage_test".to_string(),
				vector_dim,
			},
		},
	}
}

fn dummy_llm(model: &str, temperature: f32) -> LlmProviderConfig {
	LlmProviderConfig {
		provider_id: "stub".to_string(),
		api_base: "http://localhost".to_string(),
		api_key: "key".to_string(),
		path: "/".to_string(),
		model: model.to_string(),
		temperature,
		max_tokens: Some(2_000),
		timeout_ms: 1_000,
		default_headers: Map::new(),
	}
}
