/// Meta-phrases that must never be used as a search query; the rewriter is
/// told to resolve them to the concrete prior topic instead.
const META_PHRASES: [&str; 6] = [
	"previous answer",
	"previous response",
	"earlier response",
	"earlier answer",
	"last answer",
	"your answer",
];

/// Local pre-check for obviously meaningless input.
///
/// Runs before any adapter call so filler like "ㅋㅋ" or bare punctuation
/// short-circuits the turn without spending a model round-trip. Anything that
/// passes here still goes through model-side intent classification.
pub fn is_filler(message: &str) -> bool {
	let trimmed = message.trim();

	if trimmed.is_empty() {
		return true;
	}
	if !trimmed.chars().any(char::is_alphanumeric) {
		return true;
	}

	let mut distinct = None;

	for ch in trimmed.chars() {
		if ch.is_whitespace() {
			continue;
		}

		match distinct {
			None => distinct = Some(ch),
			Some(seen) if seen == ch => {},
			Some(_) => return false,
		}
	}

	// A single repeated character ("ㅋㅋㅋ", "zzz") carries no question.
	true
}

/// True when a rewritten query still talks about the conversation instead of
/// a searchable topic.
pub fn contains_meta_phrase(query: &str) -> bool {
	let lowered = query.to_lowercase();

	META_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

#[cfg(test)]
mod tests {
	use super::{contains_meta_phrase, is_filler};

	#[test]
	fn empty_and_whitespace_are_filler() {
		assert!(is_filler(""));
		assert!(is_filler("   "));
	}

	#[test]
	fn repeated_character_is_filler() {
		assert!(is_filler("ㅋㅋ"));
		assert!(is_filler("ㅎㅎㅎ"));
		assert!(is_filler("zzzz"));
	}

	#[test]
	fn punctuation_only_is_filler() {
		assert!(is_filler("?!"));
		assert!(is_filler("..."));
	}

	#[test]
	fn real_questions_are_not_filler() {
		assert!(!is_filler("What is an AI agent?"));
		assert!(!is_filler("ok"));
	}

	#[test]
	fn detects_meta_phrases_case_insensitively() {
		assert!(contains_meta_phrase("Summarize the Previous Answer"));
		assert!(!contains_meta_phrase("AI agent market trends"));
	}
}
