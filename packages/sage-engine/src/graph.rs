use std::time::Duration;

use uuid::Uuid;

use crate::{
	Checkpoint, EngineError, EngineResult, SageEngine, compose, dialogue, enrich, planner,
	retrieve, web,
};
use sage_domain::{
	DocumentReference, GlossaryTerm, NextAction, Role, Stage, StateUpdate, ThinkingStep,
	TurnMessage, TurnState, WebSource,
};

/// Everything one turn hands back to the caller.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
	pub id: Uuid,
	pub role: Role,
	pub content: String,
	pub suggestions: Vec<String>,
	pub thinking_steps: Vec<ThinkingStep>,
	pub web_sources: Vec<WebSource>,
	pub document_references: Vec<DocumentReference>,
	pub glossary: Vec<GlossaryTerm>,
}

/// Named steps of the turn graph. Every step is dispatched through
/// [`SageEngine::run_node`] and followed by exactly one routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Node {
	AddUserMessage,
	RewriteQuery,
	AgentPlan,
	VectorSearch,
	WebSearch,
	Compose,
	Enrich,
	NoResult,
	AddAssistantMessage,
}

impl SageEngine {
	/// Runs one full turn: rewrite, the bounded plan/acquire loop, and
	/// response compilation.
	///
	/// Adapter failures degrade inside their steps; the only errors surfaced
	/// here are request validation, a rewrite-model failure (retryable), and
	/// an unavailable checkpoint store.
	pub async fn send_turn(&self, session_id: &str, message: &str) -> EngineResult<TurnOutcome> {
		if session_id.trim().is_empty() {
			return Err(EngineError::InvalidRequest {
				message: "session_id must be non-empty.".to_string(),
			});
		}

		let history = self.history(session_id);
		let document_meta = match self.adapters.documents.get_context(session_id).await {
			Ok(meta) => meta,
			Err(err) => {
				tracing::warn!(error = %err, "Document context lookup failed.");

				None
			},
		};
		let mut state = TurnState::new(session_id, message, history, document_meta);
		let entry = self.restore_checkpoint(&mut state).await?;
		let deadline = Duration::from_millis(self.cfg.turn.timeout_ms);

		match tokio::time::timeout(deadline, self.run_graph(&mut state, entry)).await {
			Ok(result) => result?,
			Err(_) => {
				tracing::warn!(session_id, "Turn deadline exceeded; degrading.");

				self.finish_degraded(&mut state).await?;
			},
		}

		self.store_history(session_id, state.messages.clone());

		Ok(TurnOutcome {
			id: Uuid::new_v4(),
			role: Role::Assistant,
			content: state.final_response,
			suggestions: state.suggestions,
			thinking_steps: state.thinking_steps,
			web_sources: state.web_sources,
			document_references: state.document_references,
			glossary: state.glossary,
		})
	}

	async fn run_graph(&self, state: &mut TurnState, entry: Node) -> EngineResult<()> {
		let mut node = entry;

		loop {
			let update = self.run_node(node, state).await?;

			state.apply(update);
			self.save_checkpoint(state).await?;

			match self.route(node, state) {
				Some(next) => node = next,
				None => break,
			}
		}

		Ok(())
	}

	async fn run_node(&self, node: Node, state: &TurnState) -> EngineResult<StateUpdate> {
		tracing::debug!(session_id = %state.session_id, ?node, "Running turn step.");

		match node {
			Node::AddUserMessage => Ok(StateUpdate {
				messages: vec![TurnMessage {
					role: Role::User,
					content: state.raw_message.clone(),
				}],
				..Default::default()
			}),
			Node::RewriteQuery => dialogue::rewrite_query(self, state).await,
			Node::AgentPlan => planner::plan(self, state).await,
			Node::VectorSearch => Ok(retrieve::vector_search(self, state).await),
			Node::WebSearch => Ok(web::web_search(self, state).await),
			Node::Compose => Ok(compose::compose_response(self, state).await),
			Node::Enrich => Ok(enrich::enrich_response(self, state).await),
			Node::NoResult => Ok(dialogue::no_result_response(state)),
			Node::AddAssistantMessage => Ok(StateUpdate {
				stage: Some(Stage::Done),
				messages: vec![TurnMessage {
					role: Role::Assistant,
					content: state.final_response.clone(),
				}],
				..Default::default()
			}),
		}
	}

	/// Conditional edges, evaluated on the state the step just updated.
	fn route(&self, node: Node, state: &TurnState) -> Option<Node> {
		match node {
			Node::AddUserMessage => Some(Node::RewriteQuery),
			Node::RewriteQuery =>
				if state.stage == Stage::Invalid {
					Some(Node::NoResult)
				} else {
					Some(Node::AgentPlan)
				},
			Node::AgentPlan => Some(match state.next_action {
				NextAction::VectorSearch => Node::VectorSearch,
				NextAction::WebSearch => Node::WebSearch,
				NextAction::Generate => Node::Compose,
			}),
			Node::VectorSearch => Some(Node::AgentPlan),
			Node::WebSearch => {
				let below_target = state.web_sources.len() < self.cfg.web.target_sources as usize;
				let attempts_left = state.search_attempt_count < self.cfg.web.max_attempts;

				if below_target && attempts_left {
					// Explicit retry edge.
					Some(Node::WebSearch)
				} else {
					Some(Node::Compose)
				}
			},
			Node::Compose => Some(Node::Enrich),
			Node::Enrich => Some(Node::AddAssistantMessage),
			Node::NoResult => Some(Node::AddAssistantMessage),
			Node::AddAssistantMessage => None,
		}
	}

	/// Loads a mid-turn checkpoint for this session, if one matches the
	/// incoming message, and returns the node to re-enter the graph at.
	async fn restore_checkpoint(&self, state: &mut TurnState) -> EngineResult<Node> {
		let snapshot = self
			.adapters
			.checkpoints
			.get(&state.session_id)
			.await
			.map_err(|err| EngineError::Checkpoint { message: err.to_string() })?;
		let Some(snapshot) = snapshot else {
			return Ok(Node::AddUserMessage);
		};

		if !snapshot.resumes(&state.session_id, &state.raw_message) {
			return Ok(Node::AddUserMessage);
		}

		tracing::debug!(session_id = %state.session_id, stage = ?snapshot.stage, "Resuming turn from checkpoint.");

		let stage = snapshot.stage;

		snapshot.restore(state);
		// AddUserMessage will not run again on this path.
		state.messages.push(TurnMessage { role: Role::User, content: state.raw_message.clone() });

		Ok(match stage {
			Stage::Start | Stage::Done => Node::AddUserMessage,
			Stage::Invalid => Node::NoResult,
			Stage::Rewritten | Stage::Planning | Stage::VectorSearch => Node::AgentPlan,
			// Re-evaluate the retry edge against the restored accumulators.
			Stage::WebSearch => self.route(Node::WebSearch, state).unwrap_or(Node::Compose),
		})
	}

	async fn save_checkpoint(&self, state: &TurnState) -> EngineResult<()> {
		self.adapters
			.checkpoints
			.put(&state.session_id, Checkpoint::capture(state))
			.await
			.map_err(|err| EngineError::Checkpoint { message: err.to_string() })
	}

	/// Deadline fallback: close the turn with whatever evidence accumulated
	/// instead of leaving it hanging.
	async fn finish_degraded(&self, state: &mut TurnState) -> EngineResult<()> {
		if state.final_response.is_empty() {
			let mut update = compose::no_evidence_update(state);

			if !state.web_answer.is_empty() {
				update.final_response = Some(state.web_answer.clone());
			}

			state.apply(update);
		}

		let closing = self.run_node(Node::AddAssistantMessage, state).await?;

		state.apply(closing);
		self.save_checkpoint(state).await
	}
}
