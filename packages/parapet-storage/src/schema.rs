const SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS documents (
	document_id UUID PRIMARY KEY,
	title TEXT NOT NULL,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS chunks (
	chunk_id UUID PRIMARY KEY,
	document_id UUID NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
	chunk_index INTEGER NOT NULL,
	text TEXT NOT NULL,
	embedding vector(<VECTOR_DIM>),
	tsv tsvector GENERATED ALWAYS AS (to_tsvector('english', text)) STORED,
	UNIQUE (document_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS chunks_tsv_idx ON chunks USING GIN (tsv);

CREATE TABLE IF NOT EXISTS audit_records (
	request_id UUID PRIMARY KEY,
	ts TIMESTAMPTZ NOT NULL,
	caller_id_hash TEXT NOT NULL,
	stages_completed JSONB NOT NULL,
	tokens_used INTEGER NOT NULL,
	outcome TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_records_ts_idx ON audit_records (ts)
"#;

pub fn render_schema(vector_dim: u32) -> String {
	SCHEMA.replace("<VECTOR_DIM>", &vector_dim.to_string())
}
