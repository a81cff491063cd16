use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	pub guardrails: Guardrails,
	pub limits: Limits,
	pub generation: Generation,
	pub audit: Audit,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub ner: ProviderConfig,
	pub generation: GenerationProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_output_tokens: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

/// Retrieval breadth and fusion weighting. Weights are renormalized to sum
/// to 1 at load time; the configured values only need a positive sum.
#[derive(Debug, Deserialize)]
pub struct Retrieval {
	pub breadth_k: u32,
	pub rerank_top_n: u32,
	pub context_chunks: u32,
	pub lexical_weight: f32,
	pub vector_weight: f32,
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Guardrails {
	pub pii: PiiGuardrail,
	pub scope: ScopeGuardrail,
}

#[derive(Debug, Deserialize)]
pub struct PiiGuardrail {
	pub patterns: Vec<PiiPattern>,
	pub blocking_entity_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiiPattern {
	pub entity_type: String,
	pub pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct ScopeGuardrail {
	pub score_floor: f32,
	pub disallowed_topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Limits {
	pub requests_per_window: u32,
	pub token_budget_per_window: u32,
	pub window_secs: u64,
	pub expected_answer_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct Generation {
	pub max_attempts: u32,
	pub backoff_base_ms: u64,
	pub backoff_max_ms: u64,
	pub request_deadline_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Audit {
	pub buffer_capacity: usize,
}
