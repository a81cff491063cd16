use std::env;

use time::OffsetDateTime;
use uuid::Uuid;

use parapet_config::Postgres;
use parapet_storage::{audit, db::Db};

fn env_dsn() -> Option<String> {
	env::var("PARAPET_PG_DSN").ok()
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set PARAPET_PG_DSN to run."]
async fn schema_bootstraps_and_both_searches_answer() {
	let Some(dsn) = env_dsn() else {
		eprintln!("Skipping schema_bootstraps_and_both_searches_answer; set PARAPET_PG_DSN.");

		return;
	};
	let cfg = Postgres { dsn, pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(3).await.expect("Failed to ensure schema.");

	let document_id = Uuid::new_v4();
	let chunk_id = Uuid::new_v4();

	sqlx::query("INSERT INTO documents (document_id, title) VALUES ($1, $2)")
		.bind(document_id)
		.bind("security policy")
		.execute(&db.pool)
		.await
		.expect("Failed to insert document.");
	sqlx::query(
		"INSERT INTO chunks (chunk_id, document_id, chunk_index, text, embedding) \
		 VALUES ($1, $2, 0, $3, $4::text::vector)",
	)
	.bind(chunk_id)
	.bind(document_id)
	.bind("Passwords expire every 90 days.")
	.bind("[1,0,0]")
	.execute(&db.pool)
	.await
	.expect("Failed to insert chunk.");

	let lexical = db
		.search_lexical("password expiry", 8)
		.await
		.expect("Lexical search failed.");

	assert!(lexical.iter().any(|row| row.chunk_id == chunk_id));

	let vector = db.search_vector(&[1.0, 0.0, 0.0], 8).await.expect("Vector search failed.");

	assert!(vector.iter().any(|row| row.chunk_id == chunk_id));
	assert!(vector[0].score > 0.99);

	let chunks = db.fetch_chunks(&[chunk_id]).await.expect("Chunk fetch failed.");

	assert_eq!(chunks.len(), 1);
	assert_eq!(chunks[0].document_id, document_id);

	audit::insert_record(
		&db.pool,
		Uuid::new_v4(),
		OffsetDateTime::now_utc(),
		"test-caller-hash",
		serde_json::json!(["admitted", "input_scanned"]),
		42,
		"RESPONDED",
	)
	.await
	.expect("Audit insert failed.");
}
