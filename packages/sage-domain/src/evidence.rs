use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
	pub role: Role,
	pub content: String,
}

/// A stored fragment of a source document, returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
	pub id: String,
	pub content: String,
	pub page_numbers: Vec<i64>,
	pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
	pub url: String,
	pub title: String,
	pub snippet: Option<String>,
}

/// One issued search query together with the planner's stated reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
	pub query: String,
	pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingKind {
	Thought,
	Action,
	Observation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStep {
	pub kind: ThinkingKind,
	pub content: String,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
}
impl ThinkingStep {
	pub fn new(kind: ThinkingKind, content: impl Into<String>) -> Self {
		Self { kind, content: content.into(), timestamp: OffsetDateTime::now_utc() }
	}
}

/// A visible, renumbered citation entry. Ids are contiguous and 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReference {
	pub id: u32,
	pub page_numbers: Vec<i64>,
	pub content: String,
	pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTerm {
	pub term: String,
	pub definition: String,
	pub reason: String,
}

/// Summary of the session's active documents, owned by the document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContext {
	pub topic: Option<String>,
	pub scope: Option<String>,
	pub suggested_questions: Vec<String>,
}
