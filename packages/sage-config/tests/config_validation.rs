use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_with<F>(mutate: F) -> String
where
	F: FnOnce(&mut toml::Table),
{
	let mut value: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let root = value.as_table_mut().expect("Sample config must be a table.");

	mutate(root);

	toml::to_string(&value).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("sage_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_expecting_error(payload: String) -> String {
	let path = write_temp_config(payload);
	let result = sage_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result.expect_err("Expected validation error.").to_string()
}

#[test]
fn sample_config_is_valid() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let result = sage_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Sample config must load.");

	assert_eq!(cfg.turn.max_iterations, 5);
	assert_eq!(cfg.retrieval.top_k, 5);
	assert_eq!(cfg.web.max_attempts, 2);
}

#[test]
fn rejects_zero_max_iterations() {
	let payload = sample_with(|root| {
		let turn = root.get_mut("turn").and_then(Value::as_table_mut).expect("[turn] required.");

		turn.insert("max_iterations".to_string(), Value::Integer(0));
	});
	let message = load_expecting_error(payload);

	assert!(
		message.contains("turn.max_iterations must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn rejects_out_of_range_similarity_threshold() {
	let payload = sample_with(|root| {
		let retrieval = root
			.get_mut("retrieval")
			.and_then(Value::as_table_mut)
			.expect("[retrieval] required.");

		retrieval.insert("similarity_threshold".to_string(), Value::Float(1.5));
	});
	let message = load_expecting_error(payload);

	assert!(
		message.contains("retrieval.similarity_threshold must be in the range 0.0-1.0."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn rejects_dimension_mismatch() {
	let payload = sample_with(|root| {
		let storage =
			root.get_mut("storage").and_then(Value::as_table_mut).expect("[storage] required.");
		let qdrant = storage
			.get_mut("qdrant")
			.and_then(Value::as_table_mut)
			.expect("[storage.qdrant] required.");

		qdrant.insert("vector_dim".to_string(), Value::Integer(768));
	});
	let message = load_expecting_error(payload);

	assert!(
		message.contains("providers.embedding.dimensions must match storage.qdrant.vector_dim."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn rejects_empty_api_key() {
	let payload = sample_with(|root| {
		let providers = root
			.get_mut("providers")
			.and_then(Value::as_table_mut)
			.expect("[providers] required.");
		let responder = providers
			.get_mut("responder")
			.and_then(Value::as_table_mut)
			.expect("[providers.responder] required.");

		responder.insert("api_key".to_string(), Value::String("  ".to_string()));
	});
	let message = load_expecting_error(payload);

	assert!(
		message.contains("Provider responder api_key must be non-empty."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn normalizes_trailing_slash_in_api_base() {
	let payload = sample_with(|root| {
		let providers = root
			.get_mut("providers")
			.and_then(Value::as_table_mut)
			.expect("[providers] required.");
		let embedding = providers
			.get_mut("embedding")
			.and_then(Value::as_table_mut)
			.expect("[providers.embedding] required.");

		embedding
			.insert("api_base".to_string(), Value::String("https://api.openai.com/".to_string()));
	});
	let path = write_temp_config(payload);
	let result = sage_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Config with trailing slash must load.");

	assert_eq!(cfg.providers.embedding.api_base, "https://api.openai.com");
}

#[test]
fn zero_compose_history_window_falls_back_to_history_window() {
	let payload = sample_with(|root| {
		let turn = root.get_mut("turn").and_then(Value::as_table_mut).expect("[turn] required.");

		turn.insert("compose_history_window".to_string(), Value::Integer(0));
	});
	let path = write_temp_config(payload);
	let result = sage_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Config must load.");

	assert_eq!(cfg.turn.compose_history_window, cfg.turn.history_window);
}
