pub mod audit;
pub mod citation;
pub mod fusion;
pub mod pii;
pub mod scope;

use uuid::Uuid;

/// A corpus chunk exactly as supplied to the generation call. The citation
/// validator treats this set as the only admissible citation targets.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContextChunk {
	pub chunk_id: Uuid,
	pub document_id: Uuid,
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Answer {
	pub text: String,
	pub citations: Vec<citation::Citation>,
	pub tokens_used: u32,
}
