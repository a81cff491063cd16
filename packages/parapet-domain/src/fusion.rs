use std::collections::HashMap;

use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct PartialCandidate {
	pub chunk_id: Uuid,
	pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedCandidate {
	pub chunk_id: Uuid,
	pub fused_score: f32,
	pub rank: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
	pub lexical: f32,
	pub vector: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FusionError {
	#[error("Both candidate lists are empty.")]
	EmptyCandidateSet,
}

/// Merges the lexical and vector candidate lists into a single ranking.
///
/// Scores are normalized by rank within each list (best member maps to 1.0,
/// the member at position `i` of `n` to `(n - i) / n`) so wildly different
/// score scales cannot dominate the blend. A chunk matched by only one signal
/// contributes 0.0 for the missing signal. Ties break by ascending chunk id,
/// which keeps the ordering reproducible across runs.
pub fn fuse(
	lexical: &[PartialCandidate],
	vector: &[PartialCandidate],
	weights: FusionWeights,
	k: usize,
) -> Result<Vec<FusedCandidate>, FusionError> {
	if lexical.is_empty() && vector.is_empty() {
		return Err(FusionError::EmptyCandidateSet);
	}

	let sum = weights.lexical + weights.vector;
	let (w_lex, w_vec) = if sum > 0.0 && sum.is_finite() {
		(weights.lexical / sum, weights.vector / sum)
	} else {
		(0.5, 0.5)
	};
	let lexical_norm = rank_normalize(lexical);
	let vector_norm = rank_normalize(vector);
	let mut fused: HashMap<Uuid, f32> = HashMap::with_capacity(lexical_norm.len());

	for (chunk_id, norm) in &lexical_norm {
		fused.insert(*chunk_id, w_lex * norm);
	}
	for (chunk_id, norm) in &vector_norm {
		*fused.entry(*chunk_id).or_insert(0.0) += w_vec * norm;
	}

	let mut out: Vec<(Uuid, f32)> = fused.into_iter().collect();

	out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
	out.truncate(k);

	Ok(out
		.into_iter()
		.enumerate()
		.map(|(idx, (chunk_id, fused_score))| FusedCandidate {
			chunk_id,
			fused_score,
			rank: idx as u32 + 1,
		})
		.collect())
}

/// Rank-based normalization of one candidate list. Duplicate ids keep their
/// strongest score before ranks are assigned.
fn rank_normalize(list: &[PartialCandidate]) -> Vec<(Uuid, f32)> {
	if list.is_empty() {
		return Vec::new();
	}

	let mut best: HashMap<Uuid, f32> = HashMap::with_capacity(list.len());

	for candidate in list {
		let entry = best.entry(candidate.chunk_id).or_insert(candidate.score);

		if candidate.score > *entry {
			*entry = candidate.score;
		}
	}

	let mut ordered: Vec<(Uuid, f32)> = best.into_iter().collect();

	ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

	let n = ordered.len() as f32;

	ordered
		.into_iter()
		.enumerate()
		.map(|(idx, (chunk_id, _))| (chunk_id, (n - idx as f32) / n))
		.collect()
}
