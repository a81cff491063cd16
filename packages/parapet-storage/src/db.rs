use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{
	Result,
	models::{CandidateRow, ChunkRow},
	schema,
};

pub struct Db {
	pub pool: PgPool,
}

impl Db {
	pub async fn connect(cfg: &parapet_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self, vector_dim: u32) -> Result<()> {
		let sql = schema::render_schema(vector_dim);
		let lock_id: i64 = 7_268_201;
		// Advisory locks are held per connection. Use a single transaction so
		// the lock is scoped to one connection and automatically released when
		// the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	/// Full-text search over the chunk index, scored with `ts_rank` on the
	/// lexical scale. Returns at most `k` rows, strongest first.
	pub async fn search_lexical(&self, query: &str, k: u32) -> Result<Vec<CandidateRow>> {
		let rows = sqlx::query_as::<_, CandidateRow>(
			"\
SELECT chunk_id, ts_rank(tsv, plainto_tsquery('english', $1))::real AS score
FROM chunks
WHERE tsv @@ plainto_tsquery('english', $1)
ORDER BY score DESC, chunk_id ASC
LIMIT $2",
		)
		.bind(query)
		.bind(i64::from(k))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	/// Nearest-neighbor search over the embedding column, scored as cosine
	/// similarity. Returns at most `k` rows, strongest first.
	pub async fn search_vector(&self, embedding: &[f32], k: u32) -> Result<Vec<CandidateRow>> {
		let vec_text = vector_literal(embedding);
		let rows = sqlx::query_as::<_, CandidateRow>(
			"\
SELECT chunk_id, (1 - (embedding <=> $1::text::vector))::real AS score
FROM chunks
WHERE embedding IS NOT NULL
ORDER BY embedding <=> $1::text::vector ASC, chunk_id ASC
LIMIT $2",
		)
		.bind(vec_text)
		.bind(i64::from(k))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	pub async fn fetch_chunks(&self, chunk_ids: &[Uuid]) -> Result<Vec<ChunkRow>> {
		if chunk_ids.is_empty() {
			return Ok(Vec::new());
		}

		let rows = sqlx::query_as::<_, ChunkRow>(
			"SELECT chunk_id, document_id, text FROM chunks WHERE chunk_id = ANY($1)",
		)
		.bind(chunk_ids)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}
}

pub fn vector_literal(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_literal_is_bracketed_and_comma_separated() {
		assert_eq!(vector_literal(&[0.5, 1.0, -2.25]), "[0.5,1,-2.25]");
		assert_eq!(vector_literal(&[]), "[]");
	}
}
