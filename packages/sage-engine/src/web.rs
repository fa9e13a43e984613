use serde_json::Value;
use time::OffsetDateTime;

use crate::SageEngine;
use sage_domain::{
	SearchRecord, Stage, StateUpdate, ThinkingKind, ThinkingStep, TurnState, WebSource,
};
use sage_providers::WebSearchOutcome;

const SEARCH_STRATEGIES: [&str; 2] = [
	"Create a precise search query for finding authoritative sources like official \
documentation, research papers, or tech company blogs.",
	"Create a search query targeting academic papers, IEEE, ACM, or scholarly articles.",
];

const PREVIEW_SOURCES: usize = 5;

/// One attempt of the web reliability loop: reformulate, search, union
/// sources. The retry edge in the graph re-enters this step while the
/// accumulated source count is short of target and attempts remain.
///
/// A failed attempt counts toward the bound and never fails the turn.
pub(crate) async fn web_search(engine: &SageEngine, state: &TurnState) -> StateUpdate {
	let max_attempts = engine.cfg.web.max_attempts;
	let attempt = state.search_attempt_count + 1;
	let base_query = if state.rewritten_query.trim().is_empty() {
		state.raw_message.trim().to_string()
	} else {
		state.rewritten_query.clone()
	};
	let query = build_attempt_query(engine, &base_query, attempt).await;
	let mut thinking = vec![ThinkingStep::new(
		ThinkingKind::Action,
		format!("Web search attempt {attempt}/{max_attempts}: \"{query}\""),
	)];
	let record = SearchRecord {
		query: query.clone(),
		reason: format!("web search attempt {attempt}"),
	};
	let outcome = match engine
		.adapters
		.web_search
		.search(&engine.cfg.providers.web_search, &query)
		.await
	{
		Ok(outcome) => outcome,
		Err(err) => {
			tracing::warn!(error = %err, "Web search call failed; counting the attempt.");

			WebSearchOutcome::default()
		},
	};

	if outcome.sources.is_empty() {
		thinking.push(ThinkingStep::new(
			ThinkingKind::Observation,
			format!(
				"No sources returned (accumulated so far: {count}).",
				count = state.web_sources.len()
			),
		));

		return StateUpdate {
			stage: Some(Stage::WebSearch),
			search_attempt_count: Some(attempt),
			search_history: vec![record],
			thinking_steps: thinking,
			..Default::default()
		};
	}

	let new_sources: Vec<WebSource> = outcome
		.sources
		.iter()
		.filter(|source| !state.contains_source(&source.url))
		.cloned()
		.collect();
	let hosts = new_sources
		.iter()
		.take(PREVIEW_SOURCES)
		.map(|source| format!("- {}", host_of(&source.url)))
		.collect::<Vec<_>>()
		.join("\n");

	thinking.push(ThinkingStep::new(
		ThinkingKind::Observation,
		format!(
			"{found} sources found, {fresh} new\n{hosts}\n\nAccumulated sources: {total}",
			found = outcome.sources.len(),
			fresh = new_sources.len(),
			total = state.web_sources.len() + new_sources.len(),
		),
	));

	StateUpdate {
		stage: Some(Stage::WebSearch),
		search_attempt_count: Some(attempt),
		new_sources: outcome.sources,
		web_answer_append: Some(outcome.answer),
		search_history: vec![record],
		thinking_steps: thinking,
		..Default::default()
	}
}

/// Reformulates the query with an attempt-indexed strategy. On any failure
/// the base query is used as-is.
async fn build_attempt_query(engine: &SageEngine, base_query: &str, attempt: u32) -> String {
	let strategy_index = (attempt as usize).saturating_sub(1).min(SEARCH_STRATEGIES.len() - 1);
	let today = OffsetDateTime::now_utc().date();
	let user_prompt = format!(
		"You are a search query optimizer. Given a user question, generate the best English \
search query.\n\n\
Today: {today}\n\n\
User question: {base_query}\n\n\
Strategy: {strategy}\n\n\
Rules:\n\
- Output ONLY the search query, nothing else\n\
- Convert to English\n\
- Use English keywords that will find high-quality, authoritative sources\n\
- Be specific and use technical terms\n\
- For recent or latest information, use the current year from today's date\n\n\
Search query:",
		strategy = SEARCH_STRATEGIES[strategy_index],
	);
	let messages: Vec<Value> =
		vec![serde_json::json!({ "role": "user", "content": user_prompt })];

	match engine
		.adapters
		.generation
		.complete(&engine.cfg.providers.classifier, &messages, None)
		.await
	{
		Ok(completion) if !completion.text.trim().is_empty() =>
			completion.text.trim().to_string(),
		Ok(_) => base_query.to_string(),
		Err(err) => {
			tracing::warn!(error = %err, "Search query reformulation failed; using the base query.");

			base_query.to_string()
		},
	}
}

fn host_of(url: &str) -> &str {
	let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);

	without_scheme.split('/').next().unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn host_extraction_handles_paths_and_bare_hosts() {
		assert_eq!(host_of("https://a.example/path/to/page"), "a.example");
		assert_eq!(host_of("b.example"), "b.example");
	}
}
