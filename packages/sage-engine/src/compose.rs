use serde_json::Value;

use crate::{SageEngine, dialogue};
use sage_domain::{
	DocumentReference, Role, StateUpdate, ThinkingKind, ThinkingStep, TurnState,
	citations::apply_citation_pass,
};
use sage_providers::ToolCall;

pub(crate) const NO_EVIDENCE_MESSAGE: &str =
	"I couldn't find relevant information in the document or on the web. Please try a \
different question.";
const GENERATION_FAILED_MESSAGE: &str =
	"I gathered evidence but couldn't finish writing the answer. Please try asking again.";

const EXPAND_CHUNKS_TOOL: &str = "expand_chunks";

/// Synthesizes the cited answer from accumulated evidence, then validates
/// and renumbers its citations.
///
/// Generation failures degrade to the accumulated web answer or a canned
/// message; this step never fails the turn.
pub(crate) async fn compose_response(engine: &SageEngine, state: &TurnState) -> StateUpdate {
	if state.retrieved_chunks.is_empty() && state.web_sources.is_empty() {
		let mut update = no_evidence_update(state);

		update.thinking_steps = vec![ThinkingStep::new(
			ThinkingKind::Observation,
			"No relevant information found in the document or on the web.",
		)];

		return update;
	}

	let references: Vec<DocumentReference> = state
		.retrieved_chunks
		.iter()
		.enumerate()
		.map(|(index, chunk)| DocumentReference {
			id: index as u32 + 1,
			page_numbers: chunk.page_numbers.clone(),
			content: chunk.content.clone(),
			relevance: chunk.similarity,
		})
		.collect();
	let text = match run_generation(engine, state).await {
		Some(text) => text,
		None =>
			return degraded_update(state),
	};
	let pass = apply_citation_pass(&text, references.len());
	let final_references: Vec<DocumentReference> = pass
		.cited
		.iter()
		.enumerate()
		.map(|(index, old)| {
			let mut reference = references[old - 1].clone();

			reference.id = index as u32 + 1;

			reference
		})
		.collect();
	let thinking = ThinkingStep::new(
		ThinkingKind::Thought,
		format!(
			"Final answer cites {cited} document references and draws on {web} web sources.",
			cited = final_references.len(),
			web = state.web_sources.len(),
		),
	);

	StateUpdate {
		final_response: Some(pass.text),
		document_references: Some(final_references),
		suggestions: Some(Vec::new()),
		thinking_steps: vec![thinking],
		..Default::default()
	}
}

/// Terminal update for a turn that ends with no evidence at all: the answer
/// explicitly says nothing was found, and suggestions stay non-empty.
pub(crate) fn no_evidence_update(state: &TurnState) -> StateUpdate {
	StateUpdate {
		final_response: Some(NO_EVIDENCE_MESSAGE.to_string()),
		document_references: Some(Vec::new()),
		suggestions: Some(dialogue::suggested_questions(state)),
		..Default::default()
	}
}

fn degraded_update(state: &TurnState) -> StateUpdate {
	let (message, note) = if state.web_answer.is_empty() {
		(GENERATION_FAILED_MESSAGE.to_string(), "Generation failed; returning a fallback message.")
	} else {
		(state.web_answer.clone(), "Generation failed; returning the web search summary.")
	};

	StateUpdate {
		final_response: Some(message),
		document_references: Some(Vec::new()),
		suggestions: Some(dialogue::suggested_questions(state)),
		thinking_steps: vec![ThinkingStep::new(ThinkingKind::Observation, note)],
		..Default::default()
	}
}

/// Bounded tool-use loop: generate, execute any `expand_chunks` calls, feed
/// the expanded context back, regenerate.
async fn run_generation(engine: &SageEngine, state: &TurnState) -> Option<String> {
	let tools = vec![expand_chunks_tool()];
	let mut messages =
		vec![serde_json::json!({ "role": "user", "content": synthesis_prompt(engine, state) })];

	for _ in 0..engine.cfg.compose.max_tool_rounds {
		let completion = match engine
			.adapters
			.generation
			.complete(&engine.cfg.providers.responder, &messages, Some(&tools))
			.await
		{
			Ok(completion) => completion,
			Err(err) => {
				tracing::error!(error = %err, "Response generation failed.");

				return None;
			},
		};

		if completion.tool_calls.is_empty() {
			if completion.text.trim().is_empty() {
				return None;
			}

			return Some(completion.text);
		}

		messages.push(assistant_tool_message(&completion.text, &completion.tool_calls));

		for call in &completion.tool_calls {
			let content = if call.name == EXPAND_CHUNKS_TOOL {
				execute_expand_chunks(engine, state, &call.arguments).await
			} else {
				format!("Unknown tool: {name}.", name = call.name)
			};

			messages.push(serde_json::json!({
				"role": "tool",
				"tool_call_id": call.id,
				"content": content,
			}));
		}
	}

	tracing::warn!("Tool loop budget exhausted without a final answer.");

	None
}

async fn execute_expand_chunks(engine: &SageEngine, state: &TurnState, arguments: &Value) -> String {
	let chunk_ids: Vec<String> = arguments
		.get("chunk_ids")
		.and_then(Value::as_array)
		.map(|ids| ids.iter().filter_map(|id| id.as_str()).map(str::to_string).collect())
		.unwrap_or_default();
	let radius = arguments
		.get("radius")
		.and_then(Value::as_u64)
		.map(|radius| radius as u32)
		.unwrap_or(engine.cfg.compose.expand_radius);

	if chunk_ids.is_empty() {
		return "No additional context found.".to_string();
	}

	let expanded = match engine
		.adapters
		.evidence
		.expand_adjacent(&state.session_id, &chunk_ids, radius)
		.await
	{
		Ok(expanded) => expanded,
		Err(err) => {
			tracing::warn!(error = %err, "Chunk expansion failed.");

			Vec::new()
		},
	};

	if expanded.is_empty() {
		return "No additional context found.".to_string();
	}

	let context = expanded
		.iter()
		.map(|chunk| {
			let pages =
				chunk.page_numbers.iter().map(i64::to_string).collect::<Vec<_>>().join(",");

			format!("[Chunk {id}, p.{pages}] {content}", id = chunk.id, content = chunk.content)
		})
		.collect::<Vec<_>>()
		.join("\n\n");

	format!("Expanded context ({count} chunks):\n\n{context}", count = expanded.len())
}

fn assistant_tool_message(text: &str, tool_calls: &[ToolCall]) -> Value {
	let calls: Vec<Value> = tool_calls
		.iter()
		.map(|call| {
			serde_json::json!({
				"id": call.id,
				"type": "function",
				"function": {
					"name": call.name,
					"arguments": call.arguments.to_string(),
				},
			})
		})
		.collect();

	serde_json::json!({
		"role": "assistant",
		"content": if text.is_empty() { Value::Null } else { Value::from(text) },
		"tool_calls": calls,
	})
}

fn expand_chunks_tool() -> Value {
	serde_json::json!({
		"type": "function",
		"function": {
			"name": EXPAND_CHUNKS_TOOL,
			"description": "Retrieves adjacent chunks for more context when the current chunks \
are incomplete or cut off mid-sentence.",
			"parameters": {
				"type": "object",
				"properties": {
					"chunk_ids": {
						"type": "array",
						"items": { "type": "string" },
						"description": "Ids of chunks that need expanded context",
					},
					"radius": {
						"type": "integer",
						"description": "Adjacent chunks to fetch on each side",
					},
				},
				"required": ["chunk_ids"],
			},
		},
	})
}

fn synthesis_prompt(engine: &SageEngine, state: &TurnState) -> String {
	let document_meta = state
		.document_meta
		.as_ref()
		.and_then(|meta| meta.topic.as_deref())
		.unwrap_or("uploaded document");
	let document_context = if state.retrieved_chunks.is_empty() {
		"No relevant content was found in the document.".to_string()
	} else {
		state
			.retrieved_chunks
			.iter()
			.enumerate()
			.map(|(index, chunk)| {
				let pages =
					chunk.page_numbers.iter().map(i64::to_string).collect::<Vec<_>>().join(",");

				format!(
					"[ref:{id}] (p.{pages}) {content}",
					id = index + 1,
					content = chunk.content
				)
			})
			.collect::<Vec<_>>()
			.join("\n\n")
	};
	let web_context = if state.web_sources.is_empty() {
		"No web search results.".to_string()
	} else {
		state
			.web_sources
			.iter()
			.take(engine.cfg.web.max_context_sources as usize)
			.map(|source| {
				let snippet = source
					.snippet
					.as_deref()
					.map(|snippet| format!("\n  Snippet: {snippet}"))
					.unwrap_or_default();

				format!("- [{title}]({url}){snippet}", title = source.title, url = source.url)
			})
			.collect::<Vec<_>>()
			.join("\n\n")
	};
	let web_answer = if state.web_answer.is_empty() {
		String::new()
	} else {
		format!("### Web answer summary\n{answer}\n\n", answer = state.web_answer)
	};
	let search_history = if state.search_history.is_empty() {
		"None.".to_string()
	} else {
		state
			.search_history
			.iter()
			.enumerate()
			.map(|(index, record)| {
				format!("{}. \"{}\" - {}", index + 1, record.query, record.reason)
			})
			.collect::<Vec<_>>()
			.join("\n")
	};
	let conversation = if state.needs_history {
		let window = state
			.messages
			.iter()
			.rev()
			.take(engine.cfg.turn.compose_history_window as usize)
			.collect::<Vec<_>>()
			.into_iter()
			.rev()
			.map(|message| {
				let role = match message.role {
					Role::User => "user",
					Role::Assistant => "assistant",
				};

				format!("{role}: {content}", content = message.content)
			})
			.collect::<Vec<_>>()
			.join("\n");

		format!("### Previous conversation\n{window}\n\n")
	} else {
		String::new()
	};
	let style_guide = state
		.style_hint
		.as_deref()
		.map(|hint| format!("\n## Style guide\n{hint}\n"))
		.unwrap_or_default();

	format!(
		"You are an assistant that synthesizes answers from document excerpts and web sources.\n\n\
## Document: {document_meta}\n\n\
### Content retrieved from the document\n{document_context}\n\n\
### Web search results\n{web_context}\n\n\
{web_answer}\
### Search history\n{search_history}\n\n\
{conversation}\
## User question\n{question}\n\n\
## Answer rules\n\
- Write a structured answer in markdown\n\
- If a chunk is cut off mid-sentence or lacks context, call the expand_chunks tool to fetch \
adjacent chunks\n\
- Cite document content inline as [ref:N]\n\
- Mention the site name when citing web sources\n\
- Do not append a separate reference list at the end\n\
- If neither the document nor the web answers the question, say so honestly\
{style_guide}\n\
Answer:",
		question = state.raw_message,
	)
}
