use time::OffsetDateTime;
use uuid::Uuid;

use crate::Result;

/// Insert one finalized audit record. Append-only; records are never
/// updated or deleted by the service.
pub async fn insert_record(
	pool: &sqlx::PgPool,
	request_id: Uuid,
	ts: OffsetDateTime,
	caller_id_hash: &str,
	stages_completed: serde_json::Value,
	tokens_used: i32,
	outcome: &str,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO audit_records (request_id, ts, caller_id_hash, stages_completed, tokens_used, outcome)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(request_id)
	.bind(ts)
	.bind(caller_id_hash)
	.bind(stages_completed)
	.bind(tokens_used)
	.bind(outcome)
	.execute(pool)
	.await?;

	Ok(())
}
