use std::sync::Arc;

use parapet_service::{
	AuditWriter, InMemoryRateLimiter, ParapetService, PgAuditSink, PgCandidateStore,
};
use parapet_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ParapetService>,
}

impl AppState {
	pub async fn new(config: parapet_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.providers.embedding.dimensions).await?;

		let db = Arc::new(db);
		let store = Arc::new(PgCandidateStore { db: db.clone() });
		let limiter = Arc::new(InMemoryRateLimiter::new(&config.limits));
		let sink = Arc::new(PgAuditSink { pool: db.pool.clone() });
		let audit = AuditWriter::spawn(sink, config.audit.buffer_capacity);
		let service = ParapetService::new(config, store, limiter, audit)?;

		Ok(Self { service: Arc::new(service) })
	}

	/// Wire an already-built service; used by tests to swap in hermetic
	/// collaborators.
	pub fn with_service(service: ParapetService) -> Self {
		Self { service: Arc::new(service) }
	}
}
