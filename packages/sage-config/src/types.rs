use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub turn: Turn,
	pub retrieval: Retrieval,
	pub web: Web,
	pub compose: Compose,
	pub enrich: Enrich,
	pub providers: Providers,
	pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Turn {
	/// Upper bound on plan evaluations within one turn.
	pub max_iterations: u32,
	/// Whole-turn deadline. On expiry the turn degrades instead of hanging.
	pub timeout_ms: u64,
	/// How many trailing history messages the rewriter may see.
	pub history_window: u32,
	/// How many trailing history messages synthesis may see.
	pub compose_history_window: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	pub top_k: u32,
	pub similarity_threshold: f32,
	pub multi_query: bool,
	/// Cap on paraphrase variants, original query included.
	pub max_query_variants: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Web {
	/// Accumulated-source count that stops the retry loop early.
	pub target_sources: u32,
	pub max_attempts: u32,
	/// Cap on sources rendered into the synthesis context.
	pub max_context_sources: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Compose {
	pub max_tool_rounds: u32,
	/// Adjacent chunks fetched on each side when the model expands context.
	pub expand_radius: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Enrich {
	pub enabled: bool,
	pub min_response_chars: u32,
	pub max_terms: u32,
	pub max_definition_chars: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub classifier: LlmProviderConfig,
	pub responder: LlmProviderConfig,
	pub web_search: WebSearchProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: Option<u32>,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}
