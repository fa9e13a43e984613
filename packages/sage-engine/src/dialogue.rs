use serde_json::Value;

use crate::{EngineError, EngineResult, SageEngine};
use sage_domain::{Stage, StateUpdate, TurnState, input_gate};

pub(crate) const INVALID_INPUT_MESSAGE: &str =
	"I couldn't understand that question. Please ask something specific about the document.";
const OFF_TOPIC_MESSAGE: &str =
	"That question isn't related to the uploaded document. Please ask about its contents.";
const UNCLEAR_MESSAGE: &str =
	"That question is ambiguous on its own. Could you ask it more specifically?";
const FALLBACK_INVALID_MESSAGE: &str = "I couldn't process that question. Please try again.";

const DEFAULT_SUGGESTIONS: [&str; 2] = [
	"Summarize the main points of the document.",
	"Explain the key concepts covered in the document.",
];

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
	FollowUp,
	NewQuestion,
	Invalid,
}

struct IntentDecision {
	needs_context: bool,
	intent: Intent,
}

/// Classifies intent and rewrites the raw message into a normalized English
/// search query. Non-valid input short-circuits the turn to a canned
/// response before any evidence acquisition.
pub(crate) async fn rewrite_query(
	engine: &SageEngine,
	state: &TurnState,
) -> EngineResult<StateUpdate> {
	// Local gate first: obvious filler never reaches an adapter.
	if input_gate::is_filler(&state.raw_message) {
		return Ok(invalid_update(INVALID_INPUT_MESSAGE));
	}

	let decision = analyze_intent(engine, state).await;

	if decision.intent == Intent::Invalid {
		return Ok(invalid_update(INVALID_INPUT_MESSAGE));
	}

	let messages = rewrite_messages(state, decision.needs_context, engine.cfg.turn.history_window);
	let value = engine
		.adapters
		.generation
		.complete_structured(&engine.cfg.providers.classifier, &messages)
		.await
		.map_err(|err| EngineError::Provider {
			message: format!("Query rewriting failed: {err}."),
		})?;
	let is_valid = value.get("is_valid").and_then(Value::as_bool).unwrap_or(false);
	let reason = value.get("reason").and_then(Value::as_str).unwrap_or("unclear");

	if !is_valid {
		return Ok(invalid_update(invalid_reason_message(reason)));
	}

	let rewritten =
		value.get("rewritten_query").and_then(Value::as_str).unwrap_or_default().trim().to_string();
	let style_hint = value
		.get("style_hint")
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|hint| !hint.is_empty())
		.map(str::to_string);
	// A meta-phrase means the rewriter talked about the conversation instead
	// of resolving it to a topic; the raw message is a safer query.
	let rewritten = if rewritten.is_empty() || input_gate::contains_meta_phrase(&rewritten) {
		tracing::warn!(query = %rewritten, "Rewriter produced an unusable query; using the raw message.");

		state.raw_message.trim().to_string()
	} else {
		rewritten
	};

	Ok(StateUpdate {
		stage: Some(Stage::Rewritten),
		rewritten_query: Some(rewritten),
		needs_history: Some(decision.needs_context),
		style_hint,
		..Default::default()
	})
}

/// Terminal branch for invalid input: canned message plus suggested
/// questions, no evidence acquisition.
pub(crate) fn no_result_response(state: &TurnState) -> StateUpdate {
	let Some(meta) = state.document_meta.as_ref() else {
		return StateUpdate {
			final_response:
				Some("No document is attached to this session yet. Upload a document to ask questions about it.".to_string()),
			suggestions: Some(Vec::new()),
			..Default::default()
		};
	};
	let topic = meta.topic.as_deref().unwrap_or("the uploaded document");

	StateUpdate {
		final_response: Some(format!(
			"Please ask a question about the document. The current document covers \"{topic}\"."
		)),
		suggestions: Some(suggested_questions(state)),
		..Default::default()
	}
}

/// Suggested follow-up questions from the document store, with a generic
/// fallback so the caller always has something to offer.
pub(crate) fn suggested_questions(state: &TurnState) -> Vec<String> {
	let from_meta: Vec<String> = state
		.document_meta
		.as_ref()
		.map(|meta| meta.suggested_questions.iter().take(MAX_SUGGESTIONS).cloned().collect())
		.unwrap_or_default();

	if from_meta.is_empty() {
		DEFAULT_SUGGESTIONS.iter().map(|suggestion| suggestion.to_string()).collect()
	} else {
		from_meta
	}
}

async fn analyze_intent(engine: &SageEngine, state: &TurnState) -> IntentDecision {
	let messages = intent_messages(&state.raw_message);
	let value = match engine
		.adapters
		.generation
		.complete_structured(&engine.cfg.providers.classifier, &messages)
		.await
	{
		Ok(value) => value,
		Err(err) => {
			tracing::warn!(error = %err, "Intent classification failed; assuming a new question.");

			return IntentDecision { needs_context: false, intent: Intent::NewQuestion };
		},
	};
	let intent = match value.get("intent").and_then(Value::as_str) {
		Some("follow_up") => Intent::FollowUp,
		Some("invalid") => Intent::Invalid,
		_ => Intent::NewQuestion,
	};
	let needs_context = value.get("needs_context").and_then(Value::as_bool).unwrap_or(false)
		|| intent == Intent::FollowUp;

	IntentDecision { needs_context, intent }
}

fn invalid_update(message: &str) -> StateUpdate {
	StateUpdate {
		stage: Some(Stage::Invalid),
		rewritten_query: Some(String::new()),
		final_response: Some(message.to_string()),
		..Default::default()
	}
}

fn invalid_reason_message(reason: &str) -> &'static str {
	match reason {
		"meaningless" => INVALID_INPUT_MESSAGE,
		"off_topic" => OFF_TOPIC_MESSAGE,
		"unclear" => UNCLEAR_MESSAGE,
		_ => FALLBACK_INVALID_MESSAGE,
	}
}

fn intent_messages(message: &str) -> Vec<Value> {
	let system_prompt = "You classify the intent of messages sent to a document Q&A assistant. \
Output must be valid JSON only and must match the provided schema exactly.";
	let user_prompt = format!(
		"Classify this message:\n\"{message}\"\n\n\
Categories:\n\
- follow_up: refers to the previous conversation (\"again\", \"that\", \"more detail\", \"summarize it\")\n\
- new_question: a standalone question, understandable without prior turns\n\
- invalid: meaningless input (greetings, keyboard mashing, filler)\n\n\
Return JSON matching this exact schema:\n\
{{ \"needs_context\": boolean, \"intent\": \"follow_up\" | \"new_question\" | \"invalid\", \"reason\": \"one short sentence\" }}"
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

fn rewrite_messages(state: &TurnState, needs_context: bool, history_window: u32) -> Vec<Value> {
	let mut sections = Vec::new();

	if let Some(meta) = state.document_meta.as_ref() {
		let topic = meta.topic.as_deref().unwrap_or("unknown");
		let scope = meta.scope.as_deref().unwrap_or("unknown");

		sections.push(format!("## Document\nTopic: {topic}\nScope: {scope}"));
	}
	if needs_context && !state.messages.is_empty() {
		let window = state
			.messages
			.iter()
			.rev()
			.take(history_window as usize)
			.collect::<Vec<_>>()
			.into_iter()
			.rev()
			.map(|message| {
				let role = match message.role {
					sage_domain::Role::User => "user",
					sage_domain::Role::Assistant => "assistant",
				};

				format!("{role}: {content}", content = message.content)
			})
			.collect::<Vec<_>>()
			.join("\n");

		sections.push(format!("## Conversation history\n{window}"));
	}

	sections.push(format!("## Current input\n{message}", message = state.raw_message));

	let follow_up_rules = if needs_context {
		"\n## Resolving references (mandatory)\n\
Find the concrete topic in the conversation history and rewrite to it.\n\
- \"again\", \"once more\" -> the topic of the previous user question\n\
- \"more detail\" -> previous topic plus \"detailed explanation\"\n\
- \"what is that\" -> the specific term mentioned in the previous answer\n\
Never use meta-phrases like \"previous answer\" or \"earlier response\" as the query; \
always rewrite to the actual document topic.\n"
	} else {
		""
	};
	let user_prompt = format!(
		"{sections}\n\n## Task\n\
Rewrite the current input as an English search query for document retrieval.\n\
{follow_up_rules}\n\
## Query rules\n\
- rewritten_query must be written in English, regardless of the input language\n\
- keep it search-oriented and specific\n\n\
## Validity\n\
- meaningless: input carries no question\n\
- off_topic: unrelated to the document topic\n\
- unclear: only pronouns without resolvable context\n\
- valid: a usable question\n\n\
Return JSON matching this exact schema:\n\
{{ \"is_valid\": boolean, \"reason\": \"valid\" | \"meaningless\" | \"off_topic\" | \"unclear\", \
\"rewritten_query\": \"string\", \"style_hint\": \"format/tone/depth hints, or empty\" }}",
		sections = sections.join("\n\n"),
	);
	let system_prompt = "You rewrite user questions into English search queries for a document \
Q&A assistant. Output must be valid JSON only and must match the provided schema exactly.";

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}
