use unicode_normalization::UnicodeNormalization;
use unicode_script::{Script, UnicodeScript};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryGateReject {
	DisallowedControlChar,
	DisallowedZeroWidthChar,
	DisallowedScript,
	NonEnglishLanguage,
}

/// Gate for search-oriented query text.
///
/// Rewritten queries and paraphrase variants must be English: the vector
/// index and the web strategies are built for English phrasing, so anything
/// that fails here is dropped before it reaches an adapter.
pub fn query_gate(input: &str) -> Result<(), QueryGateReject> {
	let normalized: String = input.nfkc().collect();

	if contains_disallowed_controls(normalized.as_str()) {
		return Err(QueryGateReject::DisallowedControlChar);
	}
	if contains_disallowed_zero_width(normalized.as_str()) {
		return Err(QueryGateReject::DisallowedZeroWidthChar);
	}
	if contains_disallowed_scripts(normalized.as_str()) {
		return Err(QueryGateReject::DisallowedScript);
	}
	if should_apply_lid(normalized.as_str()) && is_confidently_non_english(normalized.as_str()) {
		return Err(QueryGateReject::NonEnglishLanguage);
	}

	Ok(())
}

pub fn is_searchable_english(input: &str) -> bool {
	query_gate(input).is_ok()
}

fn contains_disallowed_controls(input: &str) -> bool {
	input.chars().any(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
}

fn contains_disallowed_zero_width(input: &str) -> bool {
	for ch in input.chars() {
		if matches!(
			ch,
			'\u{00AD}' // soft hyphen
				| '\u{034F}' // combining grapheme joiner
				| '\u{061C}' // arabic letter mark
				| '\u{180E}' // mongolian vowel separator (deprecated)
				| '\u{200B}' // zero width space
				| '\u{200C}' // zero width non-joiner
				| '\u{200D}' // zero width joiner
				| '\u{2060}' // word joiner
				| '\u{FEFF}' // zero width no-break space
		) {
			return true;
		}
	}

	false
}

fn contains_disallowed_scripts(input: &str) -> bool {
	for ch in input.chars() {
		if ch.is_ascii() || ch.is_whitespace() {
			continue;
		}

		// Latin plus neutral scripts for punctuation and symbols.
		match ch.script() {
			Script::Latin | Script::Common | Script::Inherited => {},
			_ => return true,
		}
	}

	false
}

fn should_apply_lid(input: &str) -> bool {
	let mut letters = 0usize;
	let mut non_space = 0usize;
	let mut whitespace = 0usize;

	for ch in input.chars() {
		if ch.is_whitespace() {
			whitespace += 1;
			continue;
		}
		non_space += 1;
		if ch.is_alphabetic() {
			letters += 1;
		}
	}

	// Search queries are short; only letter-dense multi-word text gives the
	// detector enough signal.
	if letters < 24 || non_space < 48 || whitespace == 0 {
		return false;
	}

	let density = letters as f32 / non_space as f32;
	density >= 0.60
}

fn is_confidently_non_english(input: &str) -> bool {
	let Some(info) = whatlang::detect(input) else {
		return false;
	};

	if !info.is_reliable() {
		return false;
	}
	if info.confidence() < 0.85 {
		return false;
	}

	info.lang() != whatlang::Lang::Eng
}

#[cfg(test)]
mod tests {
	use super::{QueryGateReject, is_searchable_english, query_gate};

	#[test]
	fn accepts_english_question() {
		assert!(is_searchable_english("What is an AI agent definition?"));
	}

	#[test]
	fn rejects_korean_script() {
		assert_eq!(query_gate("에이전트 정의"), Err(QueryGateReject::DisallowedScript));
	}

	#[test]
	fn rejects_zero_width_chars() {
		assert!(!is_searchable_english("agent\u{200B}definition"));
	}

	#[test]
	fn short_non_english_latin_text_passes_without_lid() {
		assert!(is_searchable_english("Bonjour."));
	}

	#[test]
	fn long_non_english_latin_text_is_rejected() {
		let long_french = "Bonjour, je veux m'assurer que ce texte est suffisamment long et riche en lettres pour declencher la detection de langue. Merci beaucoup.";

		assert_eq!(query_gate(long_french), Err(QueryGateReject::NonEnglishLanguage));
	}

	#[test]
	fn keyword_style_queries_pass() {
		assert!(is_searchable_english("AI agent market trends 2024"));
	}
}
