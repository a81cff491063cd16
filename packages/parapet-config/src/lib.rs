mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Audit, Config, EmbeddingProviderConfig, Generation, GenerationProviderConfig, Guardrails,
	Limits, PiiGuardrail, PiiPattern, Postgres, ProviderConfig, Providers, Retrieval,
	ScopeGuardrail, Service, Storage,
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
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("ner", &cfg.providers.ner.api_key),
		("generation", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.retrieval.breadth_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.breadth_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.rerank_top_n == 0 || cfg.retrieval.rerank_top_n > cfg.retrieval.breadth_k {
		return Err(Error::Validation {
			message: "retrieval.rerank_top_n must be in the range 1..=retrieval.breadth_k."
				.to_string(),
		});
	}
	if cfg.retrieval.context_chunks == 0
		|| cfg.retrieval.context_chunks > cfg.retrieval.rerank_top_n
	{
		return Err(Error::Validation {
			message: "retrieval.context_chunks must be in the range 1..=retrieval.rerank_top_n."
				.to_string(),
		});
	}
	for (label, weight) in [
		("retrieval.lexical_weight", cfg.retrieval.lexical_weight),
		("retrieval.vector_weight", cfg.retrieval.vector_weight),
	] {
		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}
	if cfg.retrieval.lexical_weight + cfg.retrieval.vector_weight <= 0.0 {
		return Err(Error::Validation {
			message: "retrieval fusion weights must sum to a positive value.".to_string(),
		});
	}
	if cfg.retrieval.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "retrieval.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for pattern in &cfg.guardrails.pii.patterns {
		if pattern.entity_type.trim().is_empty() {
			return Err(Error::Validation {
				message: "guardrails.pii.patterns entries must name an entity_type.".to_string(),
			});
		}
		if let Err(err) = regex::Regex::new(&pattern.pattern) {
			return Err(Error::Validation {
				message: format!(
					"guardrails.pii pattern for {} does not compile: {err}",
					pattern.entity_type
				),
			});
		}
	}
	if !(0.0..=1.0).contains(&cfg.guardrails.scope.score_floor) {
		return Err(Error::Validation {
			message: "guardrails.scope.score_floor must be in the range 0.0-1.0.".to_string(),
		});
	}

	if cfg.limits.requests_per_window == 0 {
		return Err(Error::Validation {
			message: "limits.requests_per_window must be greater than zero.".to_string(),
		});
	}
	if cfg.limits.token_budget_per_window == 0 {
		return Err(Error::Validation {
			message: "limits.token_budget_per_window must be greater than zero.".to_string(),
		});
	}
	if cfg.limits.window_secs == 0 {
		return Err(Error::Validation {
			message: "limits.window_secs must be greater than zero.".to_string(),
		});
	}

	if cfg.generation.max_attempts == 0 {
		return Err(Error::Validation {
			message: "generation.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.generation.backoff_base_ms == 0
		|| cfg.generation.backoff_base_ms > cfg.generation.backoff_max_ms
	{
		return Err(Error::Validation {
			message: "generation backoff must satisfy 0 < backoff_base_ms <= backoff_max_ms."
				.to_string(),
		});
	}
	if cfg.generation.request_deadline_ms == 0 {
		return Err(Error::Validation {
			message: "generation.request_deadline_ms must be greater than zero.".to_string(),
		});
	}

	if cfg.audit.buffer_capacity == 0 {
		return Err(Error::Validation {
			message: "audit.buffer_capacity must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let sum = cfg.retrieval.lexical_weight + cfg.retrieval.vector_weight;

	if sum > 0.0 && sum.is_finite() {
		cfg.retrieval.lexical_weight /= sum;
		cfg.retrieval.vector_weight /= sum;
	}

	let topics = std::mem::take(&mut cfg.guardrails.scope.disallowed_topics);

	cfg.guardrails.scope.disallowed_topics = topics
		.into_iter()
		.map(|topic| topic.trim().to_lowercase())
		.filter(|topic| !topic.is_empty())
		.collect();

	let blocking = std::mem::take(&mut cfg.guardrails.pii.blocking_entity_types);

	cfg.guardrails.pii.blocking_entity_types = blocking
		.into_iter()
		.map(|entity| entity.trim().to_string())
		.filter(|entity| !entity.is_empty())
		.collect();
}
