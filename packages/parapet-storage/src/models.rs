use uuid::Uuid;

/// One hit from a single retrieval signal, scored on that signal's own scale.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct CandidateRow {
	pub chunk_id: Uuid,
	pub score: f32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkRow {
	pub chunk_id: Uuid,
	pub document_id: Uuid,
	pub text: String,
}
