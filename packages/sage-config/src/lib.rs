mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Compose, Config, EmbeddingProviderConfig, Enrich, LlmProviderConfig, Providers, Qdrant,
	Retrieval, Storage, Turn, Web, WebSearchProviderConfig,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.turn.max_iterations == 0 {
		return Err(Error::Validation {
			message: "turn.max_iterations must be greater than zero.".to_string(),
		});
	}
	if cfg.turn.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "turn.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.turn.history_window == 0 {
		return Err(Error::Validation {
			message: "turn.history_window must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.retrieval.similarity_threshold.is_finite()
		|| !(0.0..=1.0).contains(&cfg.retrieval.similarity_threshold)
	{
		return Err(Error::Validation {
			message: "retrieval.similarity_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.retrieval.max_query_variants == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_query_variants must be greater than zero.".to_string(),
		});
	}
	if cfg.web.target_sources == 0 {
		return Err(Error::Validation {
			message: "web.target_sources must be greater than zero.".to_string(),
		});
	}
	if cfg.web.max_attempts == 0 {
		return Err(Error::Validation {
			message: "web.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.web.max_context_sources == 0 {
		return Err(Error::Validation {
			message: "web.max_context_sources must be greater than zero.".to_string(),
		});
	}
	if cfg.compose.max_tool_rounds == 0 {
		return Err(Error::Validation {
			message: "compose.max_tool_rounds must be greater than zero.".to_string(),
		});
	}
	if cfg.enrich.enabled {
		if cfg.enrich.max_terms == 0 {
			return Err(Error::Validation {
				message: "enrich.max_terms must be greater than zero when enrichment is enabled."
					.to_string(),
			});
		}
		if cfg.enrich.max_definition_chars == 0 {
			return Err(Error::Validation {
				message: "enrich.max_definition_chars must be greater than zero.".to_string(),
			});
		}
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}

	for (label, temperature) in [
		("classifier", cfg.providers.classifier.temperature),
		("responder", cfg.providers.responder.temperature),
	] {
		if !temperature.is_finite() || temperature < 0.0 {
			return Err(Error::Validation {
				message: format!("Provider {label} temperature must be zero or greater."),
			});
		}
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("classifier", &cfg.providers.classifier.api_key),
		("responder", &cfg.providers.responder.api_key),
		("web_search", &cfg.providers.web_search.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for api_base in [
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.classifier.api_base,
		&mut cfg.providers.responder.api_base,
		&mut cfg.providers.web_search.api_base,
	] {
		while api_base.ends_with('/') {
			api_base.pop();
		}
	}
	if cfg.turn.compose_history_window == 0 {
		cfg.turn.compose_history_window = cfg.turn.history_window;
	}
}
