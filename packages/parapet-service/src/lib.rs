pub mod audit;
pub mod pipeline;
pub mod ratelimit;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use uuid::Uuid;

use parapet_config::{
	Config, EmbeddingProviderConfig, GenerationProviderConfig, ProviderConfig,
};
use parapet_domain::{ContextChunk, fusion::PartialCandidate, pii::PatternSet, scope::TopicFilter};
use parapet_providers::{
	embedding, generate,
	generate::GenerationOutput,
	ner,
	ner::NerSpan,
	rerank,
};
use parapet_storage::db::Db;

pub use audit::{AuditSink, AuditWriter, PgAuditSink, TracingAuditSink};
pub use pipeline::{QueryOutcome, QueryRequest};
pub use ratelimit::{AdmissionDecision, InMemoryRateLimiter, RateLimitStore};

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Rate limit exceeded; retry after {retry_after:?}.")]
	RateLimitExceeded { retry_after: std::time::Duration },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}

impl From<parapet_storage::Error> for ServiceError {
	fn from(err: parapet_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait NerProvider
where
	Self: Send + Sync,
{
	fn entities<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<NerSpan>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<GenerationOutput>>;
}

/// Read-only view of the corpus snapshot: the two retrieval signals plus
/// chunk-text lookup for the candidates that survive fusion.
pub trait CandidateStore
where
	Self: Send + Sync,
{
	fn search_lexical<'a>(
		&'a self,
		query: &'a str,
		k: u32,
	) -> BoxFuture<'a, Result<Vec<PartialCandidate>, parapet_storage::Error>>;

	fn search_vector<'a>(
		&'a self,
		embedding: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<PartialCandidate>, parapet_storage::Error>>;

	fn fetch_chunks<'a>(
		&'a self,
		chunk_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<ContextChunk>, parapet_storage::Error>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub ner: Arc<dyn NerProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(rerank::rerank(cfg, query, docs))
	}
}

impl NerProvider for DefaultProviders {
	fn entities<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<NerSpan>>> {
		Box::pin(ner::analyze(cfg, text))
	}
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<GenerationOutput>> {
		Box::pin(generate::generate(cfg, messages))
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		ner: Arc<dyn NerProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, rerank, ner, generation }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			rerank: provider.clone(),
			ner: provider.clone(),
			generation: provider,
		}
	}
}

/// Postgres-backed candidate store; the default collaborator behind the
/// `CandidateStore` seam.
pub struct PgCandidateStore {
	pub db: Arc<Db>,
}

impl CandidateStore for PgCandidateStore {
	fn search_lexical<'a>(
		&'a self,
		query: &'a str,
		k: u32,
	) -> BoxFuture<'a, Result<Vec<PartialCandidate>, parapet_storage::Error>> {
		Box::pin(async move {
			let rows = self.db.search_lexical(query, k).await?;

			Ok(rows
				.into_iter()
				.map(|row| PartialCandidate { chunk_id: row.chunk_id, score: row.score })
				.collect())
		})
	}

	fn search_vector<'a>(
		&'a self,
		embedding: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<PartialCandidate>, parapet_storage::Error>> {
		Box::pin(async move {
			let rows = self.db.search_vector(embedding, k).await?;

			Ok(rows
				.into_iter()
				.map(|row| PartialCandidate { chunk_id: row.chunk_id, score: row.score })
				.collect())
		})
	}

	fn fetch_chunks<'a>(
		&'a self,
		chunk_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<ContextChunk>, parapet_storage::Error>> {
		Box::pin(async move {
			let rows = self.db.fetch_chunks(chunk_ids).await?;

			Ok(rows
				.into_iter()
				.map(|row| ContextChunk {
					chunk_id: row.chunk_id,
					document_id: row.document_id,
					text: row.text,
				})
				.collect())
		})
	}
}

pub struct ParapetService {
	pub cfg: Config,
	pub store: Arc<dyn CandidateStore>,
	pub providers: Providers,
	pub limiter: Arc<dyn RateLimitStore>,
	pub audit: AuditWriter,
	pub(crate) pii_patterns: PatternSet,
	pub(crate) topic_filter: TopicFilter,
}

impl ParapetService {
	pub fn new(
		cfg: Config,
		store: Arc<dyn CandidateStore>,
		limiter: Arc<dyn RateLimitStore>,
		audit: AuditWriter,
	) -> ServiceResult<Self> {
		Self::with_providers(cfg, store, limiter, audit, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn CandidateStore>,
		limiter: Arc<dyn RateLimitStore>,
		audit: AuditWriter,
		providers: Providers,
	) -> ServiceResult<Self> {
		let pii_patterns = PatternSet::compile(&cfg.guardrails.pii.patterns).map_err(|err| {
			ServiceError::Internal { message: format!("PII pattern failed to compile: {err}") }
		})?;
		let topic_filter = TopicFilter::new(&cfg.guardrails.scope.disallowed_topics);

		Ok(Self { cfg, store, providers, limiter, audit, pii_patterns, topic_filter })
	}
}
