use std::collections::BTreeSet;

use regex::Regex;

const TAG_PATTERN: &str = r"\[ref:(\d+)\]";
const RANGE_PATTERN: &str = r"\[ref:(\d+)-(\d+)\]";
/// Upper bound on tags produced from one `[ref:N-M]` range.
const MAX_RANGE_SPAN: usize = 64;

/// Result of one citation pass over generated text.
///
/// `cited` holds the surviving old indices in ascending order; position `i`
/// is the evidence entry that the new tag `[ref:i+1]` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationPass {
	pub text: String,
	pub cited: Vec<usize>,
}

/// Rewrites `[ref:N-M]` range tags into individual `[ref:N]` tags.
///
/// Reversed or oversized ranges are dropped entirely rather than left as
/// dangling bracket text.
pub fn expand_range_tags(text: &str) -> String {
	let Ok(re) = Regex::new(RANGE_PATTERN) else {
		return text.to_string();
	};

	re.replace_all(text, |caps: &regex::Captures<'_>| {
		let start: usize = caps[1].parse().unwrap_or(0);
		let end: usize = caps[2].parse().unwrap_or(0);

		if start == 0 || end < start || end - start >= MAX_RANGE_SPAN {
			return String::new();
		}

		(start..=end).map(|index| format!("[ref:{index}]")).collect::<String>()
	})
	.into_owned()
}

/// Validates and renumbers inline citations against `reference_count`
/// available evidence entries.
///
/// Distinct cited indices are collected in ascending order, invalid ones
/// (zero or beyond the reference count) are stripped, and valid ones are
/// renumbered to the contiguous range `1..=K`. Running the pass again on its
/// own output is a no-op.
pub fn apply_citation_pass(text: &str, reference_count: usize) -> CitationPass {
	let expanded = expand_range_tags(text);
	let Ok(re) = Regex::new(TAG_PATTERN) else {
		return CitationPass { text: expanded, cited: Vec::new() };
	};

	let mut seen = BTreeSet::new();

	for caps in re.captures_iter(&expanded) {
		if let Ok(index) = caps[1].parse::<usize>() {
			seen.insert(index);
		}
	}

	let valid: Vec<usize> =
		seen.iter().copied().filter(|index| (1..=reference_count).contains(index)).collect();
	let renumbered = re
		.replace_all(&expanded, |caps: &regex::Captures<'_>| {
			let index: usize = caps[1].parse().unwrap_or(0);

			match valid.iter().position(|old| *old == index) {
				Some(position) => format!("[ref:{}]", position + 1),
				None => String::new(),
			}
		})
		.into_owned();

	CitationPass { text: renumbered, cited: valid }
}

/// Inserts `marker` after the first occurrence of `term` that is not already
/// bracket-adjacent (inside a tag or immediately before a footnote).
///
/// Returns `None` when no unmarked occurrence exists.
pub fn mark_first_unmarked(text: &str, term: &str, marker: &str) -> Option<String> {
	if term.is_empty() {
		return None;
	}

	for (start, _) in text.match_indices(term) {
		let end = start + term.len();
		let preceded_by_bracket = text[..start].ends_with('[');
		let followed_by_bracket = text[end..].starts_with(']') || text[end..].starts_with("[^");

		if preceded_by_bracket || followed_by_bracket {
			continue;
		}

		let mut out = String::with_capacity(text.len() + marker.len());

		out.push_str(&text[..end]);
		out.push_str(marker);
		out.push_str(&text[end..]);

		return Some(out);
	}

	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expands_range_tags() {
		assert_eq!(expand_range_tags("see [ref:2-4]."), "see [ref:2][ref:3][ref:4].");
	}

	#[test]
	fn drops_reversed_ranges() {
		assert_eq!(expand_range_tags("see [ref:4-2]."), "see .");
	}

	#[test]
	fn renumbers_valid_and_strips_invalid() {
		// Only 5 references exist; [ref:7] is out of range.
		let pass = apply_citation_pass("a [ref:3] b [ref:7] c [ref:3]", 5);

		assert_eq!(pass.text, "a [ref:1] b  c [ref:1]");
		assert_eq!(pass.cited, vec![3]);
	}

	#[test]
	fn renumbering_is_idempotent() {
		let first = apply_citation_pass("x [ref:5] y [ref:2]", 5);
		let second = apply_citation_pass(&first.text, first.cited.len());

		assert_eq!(second.text, first.text);
		assert_eq!(second.cited, vec![1, 2]);
	}

	#[test]
	fn renumbered_tags_are_contiguous_from_one() {
		let pass = apply_citation_pass("[ref:9][ref:4][ref:9][ref:1]", 10);

		assert_eq!(pass.cited, vec![1, 4, 9]);
		assert_eq!(pass.text, "[ref:3][ref:2][ref:3][ref:1]");
	}

	#[test]
	fn zero_index_is_stripped() {
		let pass = apply_citation_pass("bad [ref:0] tag", 3);

		assert_eq!(pass.text, "bad  tag");
		assert!(pass.cited.is_empty());
	}

	#[test]
	fn marks_first_unmarked_occurrence_only() {
		let marked = mark_first_unmarked("RAG is RAG.", "RAG", "[^1]").expect("term must match");

		assert_eq!(marked, "RAG[^1] is RAG.");
	}

	#[test]
	fn skips_bracketed_occurrences() {
		let marked = mark_first_unmarked("[RAG] then RAG.", "RAG", "[^1]").expect("term must match");

		assert_eq!(marked, "[RAG] then RAG[^1].");
	}

	#[test]
	fn already_marked_text_yields_none() {
		assert!(mark_first_unmarked("RAG[^1] only", "RAG", "[^2]").is_none());
	}
}
