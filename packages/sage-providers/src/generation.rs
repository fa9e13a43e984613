use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

/// One chat-completion result: assistant text plus any tool invocations the
/// model requested instead of (or alongside) answering.
#[derive(Debug, Clone, Default)]
pub struct Completion {
	pub text: String,
	pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	pub arguments: Value,
}

/// Plain chat completion against an OpenAI-compatible endpoint, optionally
/// advertising tool definitions.
pub async fn complete(
	cfg: &sage_config::LlmProviderConfig,
	messages: &[Value],
	tools: Option<&[Value]>,
) -> Result<Completion> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});

	if let Some(max_tokens) = cfg.max_tokens {
		body["max_tokens"] = Value::from(max_tokens);
	}
	if let Some(tools) = tools.filter(|tools| !tools.is_empty()) {
		body["tools"] = Value::from(tools.to_vec());
	}

	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion(json)
}

/// Structured completion: the prompt instructs the model to answer with JSON
/// only; the reply is parsed and re-requested up to three times before giving
/// up, mirroring how unreliable JSON mode is in practice.
pub async fn complete_structured(
	cfg: &sage_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);

	for _ in 0..3 {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		if let Ok(parsed) = parse_structured_json(json) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Structured completion is not valid JSON."))
}

fn parse_completion(json: Value) -> Result<Completion> {
	let message = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.ok_or_else(|| eyre::eyre!("Completion response is missing a message."))?;
	let text = message.get("content").and_then(|c| c.as_str()).unwrap_or_default().to_string();
	let mut tool_calls = Vec::new();

	if let Some(raw_calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
		for raw in raw_calls {
			let Some(function) = raw.get("function") else {
				continue;
			};
			let Some(name) = function.get("name").and_then(|v| v.as_str()) else {
				continue;
			};
			let id = raw.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
			let arguments = match function.get("arguments") {
				Some(Value::String(raw_args)) =>
					serde_json::from_str(raw_args).unwrap_or(Value::Null),
				Some(value) => value.clone(),
				None => Value::Null,
			};

			tool_calls.push(ToolCall { id, name: name.to_string(), arguments });
		}
	}

	Ok(Completion { text, tool_calls })
}

fn parse_structured_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let trimmed = strip_code_fence(content);
		let parsed: Value = serde_json::from_str(trimmed)
			.map_err(|_| eyre::eyre!("Structured content is not valid JSON."))?;

		return Ok(parsed);
	}

	if json.is_object() {
		return Ok(json);
	}

	Err(eyre::eyre!("Structured completion is missing JSON content."))
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(inner) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_text_and_tool_calls() {
		let json = serde_json::json!({
			"choices": [{
				"message": {
					"content": "partial answer",
					"tool_calls": [{
						"id": "call_1",
						"function": {
							"name": "expand_chunks",
							"arguments": "{\"chunk_ids\": [\"a\"], \"radius\": 1}"
						}
					}]
				}
			}]
		});
		let completion = parse_completion(json).expect("parse failed");

		assert_eq!(completion.text, "partial answer");
		assert_eq!(completion.tool_calls.len(), 1);
		assert_eq!(completion.tool_calls[0].name, "expand_chunks");
		assert_eq!(completion.tool_calls[0].arguments["radius"], 1);
	}

	#[test]
	fn parses_structured_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"action\": \"generate\"}" } }
			]
		});
		let parsed = parse_structured_json(json).expect("parse failed");
		assert_eq!(parsed["action"], "generate");
	}

	#[test]
	fn strips_markdown_code_fences() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "```json\n{\"queries\": []}\n```" } }
			]
		});
		let parsed = parse_structured_json(json).expect("parse failed");
		assert!(parsed.get("queries").is_some());
	}
}
