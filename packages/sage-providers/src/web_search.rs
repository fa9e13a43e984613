use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use sage_domain::WebSource;

/// One grounded search round-trip: the synthesized answer text plus the
/// sources the grounding metadata attributed it to.
#[derive(Debug, Clone, Default)]
pub struct WebSearchOutcome {
	pub answer: String,
	pub sources: Vec<WebSource>,
}

/// Runs a search-grounded generation call and extracts the cited sources
/// from the grounding metadata.
pub async fn search(
	cfg: &sage_config::WebSearchProviderConfig,
	query: &str,
) -> Result<WebSearchOutcome> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"contents": [{ "parts": [{ "text": query }] }],
		"tools": [{ "google_search": {} }],
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_search_response(json)
}

fn parse_search_response(json: Value) -> Result<WebSearchOutcome> {
	let candidate = json
		.get("candidates")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.ok_or_else(|| eyre::eyre!("Search response is missing candidates."))?;
	let answer = candidate
		.get("content")
		.and_then(|content| content.get("parts"))
		.and_then(|parts| parts.as_array())
		.map(|parts| {
			parts
				.iter()
				.filter_map(|part| part.get("text").and_then(|text| text.as_str()))
				.collect::<Vec<_>>()
				.join("\n")
		})
		.unwrap_or_default();
	let metadata = candidate.get("groundingMetadata");
	let mut raw_sources: Vec<(String, String, Vec<String>)> = Vec::new();

	if let Some(chunks) = metadata
		.and_then(|meta| meta.get("groundingChunks"))
		.and_then(|chunks| chunks.as_array())
	{
		for chunk in chunks {
			let Some(uri) = chunk
				.get("web")
				.and_then(|web| web.get("uri"))
				.and_then(|uri| uri.as_str())
			else {
				continue;
			};
			let title = chunk
				.get("web")
				.and_then(|web| web.get("title"))
				.and_then(|title| title.as_str())
				.unwrap_or_default();

			raw_sources.push((uri.to_string(), title.to_string(), Vec::new()));
		}
	}

	// Grounding supports attribute answer segments back to chunk indices;
	// collect them as per-source snippets.
	if let Some(supports) = metadata
		.and_then(|meta| meta.get("groundingSupports"))
		.and_then(|supports| supports.as_array())
	{
		for support in supports {
			let Some(text) = support
				.get("segment")
				.and_then(|segment| segment.get("text"))
				.and_then(|text| text.as_str())
			else {
				continue;
			};
			let Some(indices) =
				support.get("groundingChunkIndices").and_then(|indices| indices.as_array())
			else {
				continue;
			};

			for index in indices.iter().filter_map(|index| index.as_u64()) {
				if let Some((_, _, snippets)) = raw_sources.get_mut(index as usize) {
					snippets.push(text.to_string());
				}
			}
		}
	}

	let sources = raw_sources
		.into_iter()
		.map(|(url, title, snippets)| {
			let title = if title.is_empty() { host_of(&url).to_string() } else { title };
			let snippet = if snippets.is_empty() { None } else { Some(snippets.join(" ")) };

			WebSource { url, title, snippet }
		})
		.collect();

	Ok(WebSearchOutcome { answer, sources })
}

fn host_of(url: &str) -> &str {
	let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);

	without_scheme.split('/').next().unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_answer_sources_and_snippets() {
		let json = serde_json::json!({
			"candidates": [{
				"content": { "parts": [{ "text": "Grounded answer." }] },
				"groundingMetadata": {
					"groundingChunks": [
						{ "web": { "uri": "https://a.example/page", "title": "A" } },
						{ "web": { "uri": "https://b.example/doc" } }
					],
					"groundingSupports": [
						{
							"segment": { "text": "supported claim" },
							"groundingChunkIndices": [0]
						}
					]
				}
			}]
		});
		let outcome = parse_search_response(json).expect("parse failed");

		assert_eq!(outcome.answer, "Grounded answer.");
		assert_eq!(outcome.sources.len(), 2);
		assert_eq!(outcome.sources[0].title, "A");
		assert_eq!(outcome.sources[0].snippet.as_deref(), Some("supported claim"));
		// Missing titles fall back to the host name.
		assert_eq!(outcome.sources[1].title, "b.example");
		assert!(outcome.sources[1].snippet.is_none());
	}

	#[test]
	fn missing_candidates_is_an_error() {
		let json = serde_json::json!({ "candidates": [] });

		assert!(parse_search_response(json).is_err());
	}
}
