pub mod checkpoint;
pub mod graph;

mod compose;
mod dialogue;
mod enrich;
mod planner;
mod retrieve;
mod web;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

pub use checkpoint::{Checkpoint, MemoryCheckpointStore};
pub use graph::TurnOutcome;

use sage_config::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, WebSearchProviderConfig,
};
use sage_domain::{DocumentChunk, DocumentContext, TurnMessage};
use sage_providers::{Completion, WebSearchOutcome, embedding, generation, web_search};

pub type EngineResult<T> = Result<T, EngineError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		tools: Option<&'a [Value]>,
	) -> BoxFuture<'a, color_eyre::Result<Completion>>;

	fn complete_structured<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Value>>;
}

pub trait WebSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<WebSearchOutcome>>;
}

pub trait EvidenceStore
where
	Self: Send + Sync,
{
	fn similarity_search<'a>(
		&'a self,
		session_id: &'a str,
		vector: &'a [f32],
		k: u32,
		threshold: f32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentChunk>>>;

	fn expand_adjacent<'a>(
		&'a self,
		session_id: &'a str,
		chunk_ids: &'a [String],
		radius: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentChunk>>>;
}

pub trait DocumentContextProvider
where
	Self: Send + Sync,
{
	fn get_context<'a>(
		&'a self,
		session_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<DocumentContext>>>;
}

pub trait CheckpointStore
where
	Self: Send + Sync,
{
	fn get<'a>(
		&'a self,
		session_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<Checkpoint>>>;

	fn put<'a>(
		&'a self,
		session_id: &'a str,
		snapshot: Checkpoint,
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

#[derive(Debug)]
pub enum EngineError {
	InvalidRequest { message: String },
	Provider { message: String },
	Checkpoint { message: String },
}

impl std::fmt::Display for EngineError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
			Self::Provider { message } => write!(f, "Provider error: {message}"),
			Self::Checkpoint { message } => write!(f, "Checkpoint store error: {message}"),
		}
	}
}

impl std::error::Error for EngineError {}

impl From<color_eyre::Report> for EngineError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

#[derive(Clone)]
pub struct Adapters {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
	pub web_search: Arc<dyn WebSearchProvider>,
	pub evidence: Arc<dyn EvidenceStore>,
	pub documents: Arc<dyn DocumentContextProvider>,
	pub checkpoints: Arc<dyn CheckpointStore>,
}

/// The conversation orchestration engine.
///
/// One instance serves many sessions; per-session turn history lives in
/// memory for the lifetime of the engine, and mid-turn resumable state goes
/// through the checkpoint store.
pub struct SageEngine {
	pub cfg: Config,
	pub adapters: Adapters,
	sessions: std::sync::Mutex<HashMap<String, Vec<TurnMessage>>>,
}

struct DefaultProviders;

/// Document-context provider for callers that wire no document store.
pub struct NullDocumentContext;

/// [`EvidenceStore`] backed by the Qdrant chunk store.
pub struct QdrantEvidenceStore {
	store: sage_store::QdrantStore,
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl GenerationProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		tools: Option<&'a [Value]>,
	) -> BoxFuture<'a, color_eyre::Result<Completion>> {
		Box::pin(generation::complete(cfg, messages, tools))
	}

	fn complete_structured<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Value>> {
		Box::pin(generation::complete_structured(cfg, messages))
	}
}

impl WebSearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<WebSearchOutcome>> {
		Box::pin(web_search::search(cfg, query))
	}
}

impl DocumentContextProvider for NullDocumentContext {
	fn get_context<'a>(
		&'a self,
		_session_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<DocumentContext>>> {
		Box::pin(async { Ok(None) })
	}
}

impl QdrantEvidenceStore {
	pub fn new(store: sage_store::QdrantStore) -> Self {
		Self { store }
	}
}

impl EvidenceStore for QdrantEvidenceStore {
	fn similarity_search<'a>(
		&'a self,
		session_id: &'a str,
		vector: &'a [f32],
		k: u32,
		threshold: f32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentChunk>>> {
		Box::pin(async move {
			self.store
				.search_chunks(session_id, vector, k, threshold)
				.await
				.map_err(color_eyre::Report::from)
		})
	}

	fn expand_adjacent<'a>(
		&'a self,
		session_id: &'a str,
		chunk_ids: &'a [String],
		radius: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentChunk>>> {
		Box::pin(async move {
			self.store
				.adjacent_chunks(session_id, chunk_ids, radius)
				.await
				.map_err(color_eyre::Report::from)
		})
	}
}

impl Adapters {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
		web_search: Arc<dyn WebSearchProvider>,
		evidence: Arc<dyn EvidenceStore>,
		documents: Arc<dyn DocumentContextProvider>,
		checkpoints: Arc<dyn CheckpointStore>,
	) -> Self {
		Self { embedding, generation, web_search, evidence, documents, checkpoints }
	}

	/// Default HTTP providers plus a Qdrant evidence store, an in-memory
	/// checkpoint store, and no document context.
	pub fn with_qdrant(store: sage_store::QdrantStore) -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			generation: provider.clone(),
			web_search: provider,
			evidence: Arc::new(QdrantEvidenceStore::new(store)),
			documents: Arc::new(NullDocumentContext),
			checkpoints: Arc::new(MemoryCheckpointStore::default()),
		}
	}
}

impl SageEngine {
	pub fn new(cfg: Config, adapters: Adapters) -> Self {
		Self { cfg, adapters, sessions: std::sync::Mutex::new(HashMap::new()) }
	}

	/// Session history accumulated across prior turns of this engine.
	pub fn history(&self, session_id: &str) -> Vec<TurnMessage> {
		let sessions = self.sessions.lock().unwrap_or_else(|err| err.into_inner());

		sessions.get(session_id).cloned().unwrap_or_default()
	}

	pub(crate) fn store_history(&self, session_id: &str, messages: Vec<TurnMessage>) {
		let mut sessions = self.sessions.lock().unwrap_or_else(|err| err.into_inner());

		sessions.insert(session_id.to_string(), messages);
	}
}
