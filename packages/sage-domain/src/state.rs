use serde::{Deserialize, Serialize};

use crate::evidence::{
	DocumentChunk, DocumentContext, DocumentReference, GlossaryTerm, SearchRecord, ThinkingStep,
	TurnMessage, WebSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Start,
	Rewritten,
	Invalid,
	Planning,
	VectorSearch,
	WebSearch,
	Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
	VectorSearch,
	WebSearch,
	Generate,
}

/// The single mutable record threaded through one turn.
///
/// Steps never mutate this directly; they return a [`StateUpdate`] and the
/// graph core merges it through [`TurnState::apply`], so the per-field merge
/// rules live in exactly one place.
#[derive(Debug, Clone)]
pub struct TurnState {
	pub session_id: String,
	pub raw_message: String,
	pub rewritten_query: String,
	pub stage: Stage,
	pub document_meta: Option<DocumentContext>,
	pub messages: Vec<TurnMessage>,
	pub needs_history: bool,
	pub style_hint: Option<String>,
	pub retrieved_chunks: Vec<DocumentChunk>,
	pub web_sources: Vec<WebSource>,
	pub web_answer: String,
	pub search_history: Vec<SearchRecord>,
	pub iteration_count: u32,
	pub search_attempt_count: u32,
	pub next_action: NextAction,
	pub pending_search_query: Option<SearchRecord>,
	pub final_response: String,
	pub suggestions: Vec<String>,
	pub document_references: Vec<DocumentReference>,
	pub glossary: Vec<GlossaryTerm>,
	pub thinking_steps: Vec<ThinkingStep>,
}

/// Partial state returned by a step.
///
/// Accumulator fields are appended with dedup-by-key semantics, scalar fields
/// are last-write, counters are max-write. Unset fields leave the state
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
	pub stage: Option<Stage>,
	pub rewritten_query: Option<String>,
	pub needs_history: Option<bool>,
	pub style_hint: Option<String>,
	pub next_action: Option<NextAction>,
	pub set_pending_search: Option<SearchRecord>,
	pub clear_pending_search: bool,
	pub iteration_count: Option<u32>,
	pub search_attempt_count: Option<u32>,
	pub new_chunks: Vec<DocumentChunk>,
	pub new_sources: Vec<WebSource>,
	pub web_answer_append: Option<String>,
	pub search_history: Vec<SearchRecord>,
	pub thinking_steps: Vec<ThinkingStep>,
	pub messages: Vec<TurnMessage>,
	pub final_response: Option<String>,
	pub suggestions: Option<Vec<String>>,
	pub document_references: Option<Vec<DocumentReference>>,
	pub glossary: Option<Vec<GlossaryTerm>>,
}

impl TurnState {
	pub fn new(
		session_id: impl Into<String>,
		raw_message: impl Into<String>,
		messages: Vec<TurnMessage>,
		document_meta: Option<DocumentContext>,
	) -> Self {
		Self {
			session_id: session_id.into(),
			raw_message: raw_message.into(),
			rewritten_query: String::new(),
			stage: Stage::Start,
			document_meta,
			messages,
			needs_history: false,
			style_hint: None,
			retrieved_chunks: Vec::new(),
			web_sources: Vec::new(),
			web_answer: String::new(),
			search_history: Vec::new(),
			iteration_count: 0,
			search_attempt_count: 0,
			next_action: NextAction::VectorSearch,
			pending_search_query: None,
			final_response: String::new(),
			suggestions: Vec::new(),
			document_references: Vec::new(),
			glossary: Vec::new(),
			thinking_steps: Vec::new(),
		}
	}

	pub fn contains_chunk(&self, id: &str) -> bool {
		self.retrieved_chunks.iter().any(|chunk| chunk.id == id)
	}

	pub fn contains_source(&self, url: &str) -> bool {
		self.web_sources.iter().any(|source| source.url == url)
	}

	/// Case-insensitive membership test against the issued-query log.
	pub fn has_searched(&self, query: &str) -> bool {
		let needle = query.trim().to_lowercase();

		self.search_history.iter().any(|record| record.query.trim().to_lowercase() == needle)
	}

	pub fn apply(&mut self, update: StateUpdate) {
		if let Some(stage) = update.stage {
			self.stage = stage;
		}
		if let Some(rewritten_query) = update.rewritten_query {
			self.rewritten_query = rewritten_query;
		}
		if let Some(needs_history) = update.needs_history {
			self.needs_history = needs_history;
		}
		if let Some(style_hint) = update.style_hint {
			self.style_hint = Some(style_hint);
		}
		if let Some(next_action) = update.next_action {
			self.next_action = next_action;
		}
		if update.clear_pending_search {
			self.pending_search_query = None;
		}
		if let Some(pending) = update.set_pending_search {
			self.pending_search_query = Some(pending);
		}
		// Counters only move forward.
		if let Some(iteration_count) = update.iteration_count {
			self.iteration_count = self.iteration_count.max(iteration_count);
		}
		if let Some(search_attempt_count) = update.search_attempt_count {
			self.search_attempt_count = self.search_attempt_count.max(search_attempt_count);
		}

		for chunk in update.new_chunks {
			if !self.contains_chunk(&chunk.id) {
				self.retrieved_chunks.push(chunk);
			}
		}
		for source in update.new_sources {
			if !self.contains_source(&source.url) {
				self.web_sources.push(source);
			}
		}
		if let Some(answer) = update.web_answer_append {
			let trimmed = answer.trim();

			if !trimmed.is_empty() {
				if !self.web_answer.is_empty() {
					self.web_answer.push_str("\n\n");
				}

				self.web_answer.push_str(trimmed);
			}
		}

		self.search_history.extend(update.search_history);
		self.thinking_steps.extend(update.thinking_steps);
		self.messages.extend(update.messages);

		if let Some(final_response) = update.final_response {
			self.final_response = final_response;
		}
		if let Some(suggestions) = update.suggestions {
			self.suggestions = suggestions;
		}
		if let Some(document_references) = update.document_references {
			self.document_references = document_references;
		}
		if let Some(glossary) = update.glossary {
			self.glossary = glossary;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::evidence::{DocumentChunk, WebSource};

	fn chunk(id: &str, similarity: f32) -> DocumentChunk {
		DocumentChunk {
			id: id.to_string(),
			content: format!("chunk {id}"),
			page_numbers: vec![1],
			similarity,
		}
	}

	fn source(url: &str) -> WebSource {
		WebSource { url: url.to_string(), title: url.to_string(), snippet: None }
	}

	#[test]
	fn accumulators_never_shrink() {
		let mut state = TurnState::new("s", "q", Vec::new(), None);

		state.apply(StateUpdate {
			new_chunks: vec![chunk("a", 0.9), chunk("b", 0.8)],
			new_sources: vec![source("https://a.example")],
			..Default::default()
		});

		let chunk_count = state.retrieved_chunks.len();
		let source_count = state.web_sources.len();

		state.apply(StateUpdate {
			new_chunks: vec![chunk("a", 0.7)],
			new_sources: vec![source("https://a.example"), source("https://b.example")],
			..Default::default()
		});

		assert!(state.retrieved_chunks.len() >= chunk_count);
		assert!(state.web_sources.len() >= source_count);
		assert_eq!(state.retrieved_chunks.len(), 2);
		assert_eq!(state.web_sources.len(), 2);
		// The first-seen chunk wins on duplicate ids.
		assert_eq!(state.retrieved_chunks[0].similarity, 0.9);
	}

	#[test]
	fn counters_are_monotonic() {
		let mut state = TurnState::new("s", "q", Vec::new(), None);

		state.apply(StateUpdate { iteration_count: Some(3), ..Default::default() });
		state.apply(StateUpdate { iteration_count: Some(1), ..Default::default() });

		assert_eq!(state.iteration_count, 3);
	}

	#[test]
	fn pending_search_is_cleared_before_set() {
		let mut state = TurnState::new("s", "q", Vec::new(), None);

		state.apply(StateUpdate {
			set_pending_search: Some(SearchRecord {
				query: "first".to_string(),
				reason: "r".to_string(),
			}),
			..Default::default()
		});
		state.apply(StateUpdate { clear_pending_search: true, ..Default::default() });

		assert!(state.pending_search_query.is_none());
	}

	#[test]
	fn has_searched_is_case_insensitive() {
		let mut state = TurnState::new("s", "q", Vec::new(), None);

		state.apply(StateUpdate {
			search_history: vec![SearchRecord {
				query: "AI agent definition".to_string(),
				reason: "r".to_string(),
			}],
			..Default::default()
		});

		assert!(state.has_searched("ai agent definition"));
		assert!(!state.has_searched("ai agent market"));
	}

	#[test]
	fn web_answer_appends_with_separator() {
		let mut state = TurnState::new("s", "q", Vec::new(), None);

		state.apply(StateUpdate {
			web_answer_append: Some("first pass".to_string()),
			..Default::default()
		});
		state.apply(StateUpdate {
			web_answer_append: Some("second pass".to_string()),
			..Default::default()
		});

		assert_eq!(state.web_answer, "first pass\n\nsecond pass");
	}
}
