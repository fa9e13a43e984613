use sage_domain::{
	DocumentChunk, NextAction, SearchRecord, Stage, StateUpdate, TurnState, WebSource,
	citations::{apply_citation_pass, expand_range_tags},
	input_gate::is_filler,
	query_gate::is_searchable_english,
};

fn chunk(id: &str, similarity: f32) -> DocumentChunk {
	DocumentChunk {
		id: id.to_string(),
		content: format!("content of {id}"),
		page_numbers: vec![1, 2],
		similarity,
	}
}

#[test]
fn citation_pass_matches_reference_scenario() {
	// Response cites [ref:3], [ref:7], [ref:3]; 5 references exist, so 7 is
	// invalid. The two valid occurrences renumber to [ref:1] and exactly one
	// reference survives.
	let text = "First point [ref:3]. Second point [ref:7]. Third point [ref:3].";
	let pass = apply_citation_pass(text, 5);

	assert_eq!(pass.text, "First point [ref:1]. Second point . Third point [ref:1].");
	assert_eq!(pass.cited, vec![3]);
}

#[test]
fn citation_pass_survives_range_and_duplicate_forms() {
	let text = "Overview [ref:1-3], detail [ref:2].";
	let expanded = expand_range_tags(text);

	assert_eq!(expanded, "Overview [ref:1][ref:2][ref:3], detail [ref:2].");

	let pass = apply_citation_pass(text, 3);

	assert_eq!(pass.text, "Overview [ref:1][ref:2][ref:3], detail [ref:2].");
	assert_eq!(pass.cited, vec![1, 2, 3]);
}

#[test]
fn accumulators_grow_monotonically_across_iterations() {
	let mut state = TurnState::new("session", "question", Vec::new(), None);
	let mut chunk_sizes = Vec::new();
	let mut source_sizes = Vec::new();

	for round in 0..4 {
		state.apply(StateUpdate {
			iteration_count: Some(round + 1),
			new_chunks: vec![chunk(&format!("c{round}"), 0.9), chunk("c0", 0.5)],
			new_sources: vec![WebSource {
				url: format!("https://example.com/{}", round % 2),
				title: "t".to_string(),
				snippet: None,
			}],
			search_history: vec![SearchRecord {
				query: format!("query {round}"),
				reason: "test".to_string(),
			}],
			..Default::default()
		});
		chunk_sizes.push(state.retrieved_chunks.len());
		source_sizes.push(state.web_sources.len());
	}

	assert!(chunk_sizes.windows(2).all(|pair| pair[0] <= pair[1]));
	assert!(source_sizes.windows(2).all(|pair| pair[0] <= pair[1]));
	assert_eq!(state.retrieved_chunks.len(), 4);
	assert_eq!(state.web_sources.len(), 2);
	assert_eq!(state.iteration_count, 4);
}

#[test]
fn fresh_state_starts_clean() {
	let state = TurnState::new("session", "question", Vec::new(), None);

	assert_eq!(state.stage, Stage::Start);
	assert_eq!(state.next_action, NextAction::VectorSearch);
	assert!(state.retrieved_chunks.is_empty());
	assert!(state.search_history.is_empty());
	assert_eq!(state.iteration_count, 0);
	assert_eq!(state.search_attempt_count, 0);
}

#[test]
fn filler_and_query_gates_compose() {
	// The filler gate handles what never should reach a model; the query gate
	// handles what never should reach the vector index.
	assert!(is_filler("ㅋㅋ"));
	assert!(!is_filler("tell me more about that"));
	assert!(is_searchable_english("AI agent market trends detailed explanation"));
	assert!(!is_searchable_english("에이전트 시장 동향"));
}
