use serde_json::Value;

use crate::{EngineResult, SageEngine};
use sage_domain::{
	NextAction, SearchRecord, StateUpdate, ThinkingKind, ThinkingStep, TurnState,
};

const CHUNK_SUMMARY_CHARS: usize = 200;
const CONTEXT_ITEMS: usize = 5;

/// Decides the next acquisition action, or terminates the loop.
///
/// The iteration bound and the no-repeat-query rule are enforced here in
/// code; the prompt merely explains them to the model.
pub(crate) async fn plan(engine: &SageEngine, state: &TurnState) -> EngineResult<StateUpdate> {
	let max_iterations = engine.cfg.turn.max_iterations;
	let iteration = state.iteration_count + 1;

	if iteration > max_iterations {
		return Ok(StateUpdate {
			next_action: Some(NextAction::Generate),
			iteration_count: Some(max_iterations),
			thinking_steps: vec![ThinkingStep::new(
				ThinkingKind::Thought,
				"Iteration budget exhausted; switching to answer generation.",
			)],
			..Default::default()
		});
	}

	let messages = plan_messages(state, iteration, max_iterations);
	let value = match engine
		.adapters
		.generation
		.complete_structured(&engine.cfg.providers.classifier, &messages)
		.await
	{
		Ok(value) => value,
		Err(err) => {
			tracing::warn!(error = %err, "Planner call failed; falling back.");

			return Ok(fallback_plan(state, iteration));
		},
	};
	let reason = value.get("reason").and_then(Value::as_str).unwrap_or_default().to_string();
	let proposed_query = value
		.get("search_query")
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|query| !query.is_empty())
		.map(str::to_string);
	let mut action = match value.get("action").and_then(Value::as_str) {
		Some("vector_search") => NextAction::VectorSearch,
		Some("web_search") => NextAction::WebSearch,
		_ => NextAction::Generate,
	};
	let mut thinking = vec![ThinkingStep::new(
		ThinkingKind::Thought,
		format!("[{iteration}/{max_iterations}] {reason}"),
	)];
	let mut pending = None;

	if action == NextAction::VectorSearch {
		let query =
			proposed_query.unwrap_or_else(|| state.rewritten_query.clone()).trim().to_string();

		if query.is_empty() {
			action = NextAction::Generate;
		} else if state.has_searched(&query) {
			// Never re-issue a query already in the log; try the other data
			// source while its budget lasts.
			if state.search_attempt_count < engine.cfg.web.max_attempts {
				action = NextAction::WebSearch;
				thinking.push(ThinkingStep::new(
					ThinkingKind::Thought,
					format!("Query \"{query}\" was already searched; switching to web search."),
				));
			} else {
				action = NextAction::Generate;
				thinking.push(ThinkingStep::new(
					ThinkingKind::Thought,
					format!("Query \"{query}\" was already searched; generating with current evidence."),
				));
			}
		} else {
			pending = Some(SearchRecord { query, reason });
		}
	}

	if action == NextAction::WebSearch
		&& state.search_attempt_count >= engine.cfg.web.max_attempts
	{
		action = NextAction::Generate;
		thinking.push(ThinkingStep::new(
			ThinkingKind::Thought,
			"Web search budget exhausted; generating with current evidence.",
		));
	}

	Ok(StateUpdate {
		next_action: Some(action),
		iteration_count: Some(iteration),
		stage: planning_stage(state),
		set_pending_search: pending,
		thinking_steps: thinking,
		..Default::default()
	})
}

/// The stage only moves forward: re-planning after a search keeps the
/// search stage instead of stepping back to planning.
fn planning_stage(state: &TurnState) -> Option<sage_domain::Stage> {
	match state.stage {
		sage_domain::Stage::Start | sage_domain::Stage::Rewritten =>
			Some(sage_domain::Stage::Planning),
		_ => None,
	}
}

/// Planner-model failure: generate if anything was gathered, otherwise try
/// the document once with the rewritten query.
fn fallback_plan(state: &TurnState, iteration: u32) -> StateUpdate {
	let query = state.rewritten_query.trim().to_string();

	if state.retrieved_chunks.is_empty() && !query.is_empty() && !state.has_searched(&query) {
		StateUpdate {
			next_action: Some(NextAction::VectorSearch),
			iteration_count: Some(iteration),
			stage: planning_stage(state),
			set_pending_search: Some(SearchRecord {
				query,
				reason: "planner fallback".to_string(),
			}),
			..Default::default()
		}
	} else {
		StateUpdate {
			next_action: Some(NextAction::Generate),
			iteration_count: Some(iteration),
			stage: planning_stage(state),
			..Default::default()
		}
	}
}

fn evidence_summary(state: &TurnState) -> String {
	let mut parts = Vec::new();

	if !state.search_history.is_empty() {
		let history = state
			.search_history
			.iter()
			.enumerate()
			.map(|(index, record)| {
				format!("{}. \"{}\" - {}", index + 1, record.query, record.reason)
			})
			.collect::<Vec<_>>()
			.join("\n");

		parts.push(format!(
			"Search history ({count} searches):\n{history}",
			count = state.search_history.len()
		));
	}
	if state.retrieved_chunks.is_empty() {
		parts.push(
			"Evidence from the document: none (the document may not cover this).".to_string(),
		);
	} else {
		let chunks = state
			.retrieved_chunks
			.iter()
			.take(CONTEXT_ITEMS)
			.map(|chunk| {
				let pages = chunk
					.page_numbers
					.iter()
					.map(i64::to_string)
					.collect::<Vec<_>>()
					.join(",");
				let preview: String = chunk.content.chars().take(CHUNK_SUMMARY_CHARS).collect();

				format!("[p.{pages}] {preview}...")
			})
			.collect::<Vec<_>>()
			.join("\n\n");

		parts.push(format!(
			"Evidence from the document ({count} chunks):\n{chunks}",
			count = state.retrieved_chunks.len()
		));
	}
	if !state.web_sources.is_empty() {
		let sources = state
			.web_sources
			.iter()
			.take(CONTEXT_ITEMS)
			.map(|source| format!("- {}", source.title))
			.collect::<Vec<_>>()
			.join("\n");

		parts.push(format!(
			"Web sources ({count}):\n{sources}",
			count = state.web_sources.len()
		));
	}

	parts.join("\n\n---\n\n")
}

fn plan_messages(state: &TurnState, iteration: u32, max_iterations: u32) -> Vec<Value> {
	let document_meta = state
		.document_meta
		.as_ref()
		.and_then(|meta| meta.topic.as_deref())
		.unwrap_or("uploaded document");
	let system_prompt = "You are the planning step of an evidence-gathering agent that answers \
questions about an uploaded document. Output must be valid JSON only and must match the \
provided schema exactly.";
	let user_prompt = format!(
		"## User question\n{question}\n\n\
## Document\n{document_meta}\n\n\
## Evidence gathered so far\n{context}\n\n\
## Iteration\n{iteration}/{max_iterations}\n\n\
## Possible actions\n\
1. vector_search: look up specific content in the document (requires search_query)\n\
2. web_search: fetch external or current information the document cannot contain\n\
3. generate: enough evidence is gathered, produce the answer\n\n\
## Decision rules\n\
- If the document can plausibly answer it, choose vector_search first\n\
- Choose web_search for recent products, forecasts, and post-publication facts\n\
- Never repeat a query from the search history; pick a different action instead\n\
- After two document searches without useful results, switch to web_search\n\
- Choose generate once the gathered evidence answers the question\n\
- For mixed questions, search the document part first, then the web part\n\n\
## search_query rules\n\
- Write the actual content to find, in English\n\
- No meta-phrases such as \"previous answer\"\n\n\
Return JSON matching this exact schema:\n\
{{ \"action\": \"vector_search\" | \"web_search\" | \"generate\", \
\"search_query\": \"string, empty unless vector_search\", \
\"reason\": \"one short sentence\" }}",
		question = state.raw_message,
		context = evidence_summary(state),
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use sage_domain::DocumentChunk;

	#[test]
	fn summary_mentions_missing_evidence() {
		let state = TurnState::new("s", "q", Vec::new(), None);

		assert!(evidence_summary(&state).contains("none"));
	}

	#[test]
	fn summary_lists_history_and_chunks() {
		let mut state = TurnState::new("s", "q", Vec::new(), None);

		state.apply(StateUpdate {
			new_chunks: vec![DocumentChunk {
				id: "c1".to_string(),
				content: "AI agents automate workflows.".to_string(),
				page_numbers: vec![3],
				similarity: 0.9,
			}],
			search_history: vec![SearchRecord {
				query: "AI agent definition".to_string(),
				reason: "initial lookup".to_string(),
			}],
			..Default::default()
		});

		let summary = evidence_summary(&state);

		assert!(summary.contains("Search history (1 searches)"));
		assert!(summary.contains("[p.3]"));
		assert!(summary.contains("AI agents automate workflows."));
	}
}
