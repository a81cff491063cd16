use uuid::Uuid;

use crate::ContextChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Citation {
	pub chunk_id: Uuid,
	pub start_offset: u32,
	pub end_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CitationViolation {
	#[error("Citation references chunk {chunk_id} outside the supplied context set.")]
	UnknownChunk { chunk_id: Uuid },
	#[error("Citation range {start}..{end} is invalid for chunk {chunk_id} of length {len}.")]
	InvalidRange { chunk_id: Uuid, start: u32, end: u32, len: u32 },
}

/// Validates every citation against the exact context set handed to the
/// generator. Membership of the corpus at large is not enough: a citation to
/// a chunk the model was never shown is a fabrication. One violation
/// invalidates the whole answer.
pub fn validate_citations(
	citations: &[Citation],
	context: &[ContextChunk],
) -> Result<(), CitationViolation> {
	for citation in citations {
		let Some(chunk) = context.iter().find(|chunk| chunk.chunk_id == citation.chunk_id) else {
			return Err(CitationViolation::UnknownChunk { chunk_id: citation.chunk_id });
		};
		let len = chunk.text.len() as u32;

		if citation.start_offset >= citation.end_offset || citation.end_offset > len {
			return Err(CitationViolation::InvalidRange {
				chunk_id: citation.chunk_id,
				start: citation.start_offset,
				end: citation.end_offset,
				len,
			});
		}
	}

	Ok(())
}
