use serde_json::Value;

use crate::SageEngine;
use sage_domain::{
	GlossaryTerm, StateUpdate, ThinkingKind, ThinkingStep, TurnState,
	citations::mark_first_unmarked,
};

/// Strictly additive glossary enrichment: extract unfamiliar terms, look up
/// one-sentence definitions, footnote their first occurrence.
///
/// Any failure or empty result leaves the response untouched.
pub(crate) async fn enrich_response(engine: &SageEngine, state: &TurnState) -> StateUpdate {
	let cfg = &engine.cfg.enrich;

	if !cfg.enabled || state.final_response.chars().count() < cfg.min_response_chars as usize {
		return StateUpdate::default();
	}

	let terms = extract_terms(engine, &state.final_response).await;

	if terms.is_empty() {
		return StateUpdate::default();
	}

	let mut thinking = vec![ThinkingStep::new(
		ThinkingKind::Action,
		format!(
			"Found {count} terms worth explaining: {list}",
			count = terms.len(),
			list = terms
				.iter()
				.map(|(term, _)| term.as_str())
				.collect::<Vec<_>>()
				.join(", "),
		),
	)];
	let mut glossary = Vec::new();

	for (term, reason) in terms.into_iter().take(cfg.max_terms as usize) {
		let Some(definition) = lookup_definition(engine, &term).await else {
			continue;
		};

		glossary.push(GlossaryTerm { term, definition, reason });
	}

	if glossary.is_empty() {
		return StateUpdate::default();
	}

	let mut enriched = state.final_response.clone();
	let mut kept: Vec<GlossaryTerm> = Vec::new();

	for entry in glossary {
		let marker = format!("[^{}]", kept.len() + 1);

		if let Some(marked) = mark_first_unmarked(&enriched, &entry.term, &marker) {
			enriched = marked;
			kept.push(entry);
		}
	}

	if kept.is_empty() {
		return StateUpdate::default();
	}

	thinking.push(ThinkingStep::new(
		ThinkingKind::Observation,
		format!("Looked up definitions for {count} terms.", count = kept.len()),
	));

	let footnotes = kept
		.iter()
		.enumerate()
		.map(|(index, entry)| {
			format!(
				"[^{number}]: **{term}** - {definition}",
				number = index + 1,
				term = entry.term,
				definition = entry.definition,
			)
		})
		.collect::<Vec<_>>()
		.join("\n");

	enriched.push_str("\n\n---\n**Glossary**\n");
	enriched.push_str(&footnotes);

	StateUpdate {
		final_response: Some(enriched),
		glossary: Some(kept),
		thinking_steps: thinking,
		..Default::default()
	}
}

async fn extract_terms(engine: &SageEngine, response: &str) -> Vec<(String, String)> {
	let messages = term_messages(response, engine.cfg.enrich.max_terms);
	let value = match engine
		.adapters
		.generation
		.complete_structured(&engine.cfg.providers.classifier, &messages)
		.await
	{
		Ok(value) => value,
		Err(err) => {
			tracing::warn!(error = %err, "Term extraction failed; skipping enrichment.");

			return Vec::new();
		},
	};

	value
		.get("terms")
		.and_then(Value::as_array)
		.map(|terms| {
			terms
				.iter()
				.filter_map(|item| {
					let term = item.get("term").and_then(Value::as_str)?.trim();
					let reason =
						item.get("reason").and_then(Value::as_str).unwrap_or_default().trim();

					if term.is_empty() {
						return None;
					}

					Some((term.to_string(), reason.to_string()))
				})
				.collect()
		})
		.unwrap_or_default()
}

/// One-sentence definition via the grounded search adapter; empty answers
/// and failures are skipped silently.
async fn lookup_definition(engine: &SageEngine, term: &str) -> Option<String> {
	let query = format!("Define \"{term}\" in one concise sentence.");
	let outcome = match engine
		.adapters
		.web_search
		.search(&engine.cfg.providers.web_search, &query)
		.await
	{
		Ok(outcome) => outcome,
		Err(err) => {
			tracing::warn!(error = %err, term, "Definition lookup failed.");

			return None;
		},
	};
	let answer = outcome.answer.trim();

	if answer.is_empty() {
		return None;
	}

	let max_chars = engine.cfg.enrich.max_definition_chars as usize;

	if answer.chars().count() > max_chars {
		let truncated: String = answer.chars().take(max_chars).collect();

		Some(format!("{truncated}..."))
	} else {
		Some(answer.to_string())
	}
}

fn term_messages(response: &str, max_terms: u32) -> Vec<Value> {
	let system_prompt = "You extract technical terms that a general reader would find \
unfamiliar. Output must be valid JSON only and must match the provided schema exactly.";
	let user_prompt = format!(
		"Extract terms from this text that may need explanation for a general reader.\n\n\
Text:\n{response}\n\n\
Extraction criteria:\n\
- Technical or academic jargon\n\
- Acronyms (API, SDK, and similar)\n\
- Industry-specific vocabulary\n\
- Concepts that need a definition to follow the text\n\n\
Exclusions:\n\
- Common words (document, search, data)\n\
- Terms the text already explains\n\
- At most {max_terms} terms; return an empty array when nothing qualifies\n\n\
Return JSON matching this exact schema:\n\
{{ \"terms\": [{{ \"term\": \"string\", \"reason\": \"why it needs explanation\" }}] }}"
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}
