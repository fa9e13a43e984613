use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{BoxFuture, CheckpointStore};
use sage_domain::{DocumentChunk, SearchRecord, Stage, TurnState, WebSource};

/// Minimal resumable snapshot of one turn: stage, accumulators, counters.
///
/// Intentionally excludes message history and thinking steps; resumption
/// replays the snapshot into a fresh state instead of replaying the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
	pub session_id: String,
	pub raw_message: String,
	pub stage: Stage,
	pub rewritten_query: String,
	pub retrieved_chunks: Vec<DocumentChunk>,
	pub web_sources: Vec<WebSource>,
	pub web_answer: String,
	pub search_history: Vec<SearchRecord>,
	pub iteration_count: u32,
	pub search_attempt_count: u32,
}

impl Checkpoint {
	pub fn capture(state: &TurnState) -> Self {
		Self {
			session_id: state.session_id.clone(),
			raw_message: state.raw_message.clone(),
			stage: state.stage,
			rewritten_query: state.rewritten_query.clone(),
			retrieved_chunks: state.retrieved_chunks.clone(),
			web_sources: state.web_sources.clone(),
			web_answer: state.web_answer.clone(),
			search_history: state.search_history.clone(),
			iteration_count: state.iteration_count,
			search_attempt_count: state.search_attempt_count,
		}
	}

	/// True when this snapshot belongs to an unfinished run of `message`.
	pub fn resumes(&self, session_id: &str, message: &str) -> bool {
		self.session_id == session_id
			&& self.raw_message == message
			&& !matches!(self.stage, Stage::Start | Stage::Done)
	}

	pub fn restore(self, state: &mut TurnState) {
		state.stage = self.stage;
		state.rewritten_query = self.rewritten_query;
		state.retrieved_chunks = self.retrieved_chunks;
		state.web_sources = self.web_sources;
		state.web_answer = self.web_answer;
		state.search_history = self.search_history;
		state.iteration_count = self.iteration_count;
		state.search_attempt_count = self.search_attempt_count;
	}
}

/// In-memory, last-write-wins checkpoint store keyed by session.
#[derive(Default)]
pub struct MemoryCheckpointStore {
	inner: std::sync::Mutex<HashMap<String, Checkpoint>>,
}

impl CheckpointStore for MemoryCheckpointStore {
	fn get<'a>(
		&'a self,
		session_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<Checkpoint>>> {
		Box::pin(async move {
			let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

			Ok(inner.get(session_id).cloned())
		})
	}

	fn put<'a>(
		&'a self,
		session_id: &'a str,
		snapshot: Checkpoint,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

			inner.insert(session_id.to_string(), snapshot);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn capture_restore_round_trip_preserves_accumulators() {
		let mut state = TurnState::new("session", "question", Vec::new(), None);

		state.apply(sage_domain::StateUpdate {
			stage: Some(Stage::WebSearch),
			new_sources: vec![WebSource {
				url: "https://a.example".to_string(),
				title: "A".to_string(),
				snippet: None,
			}],
			search_attempt_count: Some(1),
			..Default::default()
		});

		let snapshot = Checkpoint::capture(&state);
		let mut fresh = TurnState::new("session", "question", Vec::new(), None);

		snapshot.restore(&mut fresh);

		assert_eq!(fresh.stage, Stage::WebSearch);
		assert_eq!(fresh.web_sources.len(), 1);
		assert_eq!(fresh.search_attempt_count, 1);
	}

	#[test]
	fn only_mid_turn_snapshots_resume() {
		let state = TurnState::new("session", "question", Vec::new(), None);
		let mut snapshot = Checkpoint::capture(&state);

		assert!(!snapshot.resumes("session", "question"));

		snapshot.stage = Stage::Planning;

		assert!(snapshot.resumes("session", "question"));
		assert!(!snapshot.resumes("session", "another question"));
		assert!(!snapshot.resumes("other", "question"));

		snapshot.stage = Stage::Done;

		assert!(!snapshot.resumes("session", "question"));
	}
}
