#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeDecision {
	pub in_scope: bool,
	pub confidence: f32,
}

/// Keyword filter for categories the service refuses to answer regardless of
/// corpus content. Topics are matched case-insensitively as substrings of
/// the query.
pub struct TopicFilter {
	topics: Vec<String>,
}

impl TopicFilter {
	pub fn new(topics: &[String]) -> Self {
		Self {
			topics: topics
				.iter()
				.map(|topic| topic.trim().to_lowercase())
				.filter(|topic| !topic.is_empty())
				.collect(),
		}
	}

	pub fn first_match(&self, query: &str) -> Option<&str> {
		let lowered = query.to_lowercase();

		self.topics.iter().find(|topic| lowered.contains(topic.as_str())).map(String::as_str)
	}
}

/// The pre-retrieval half of the scope guard: disallowed-category queries
/// are out of scope before any retrieval cost is paid.
pub fn check_topic(query: &str, filter: &TopicFilter) -> ScopeDecision {
	match filter.first_match(query) {
		Some(_) => ScopeDecision { in_scope: false, confidence: 1.0 },
		None => ScopeDecision { in_scope: true, confidence: 1.0 },
	}
}

/// The post-fusion half: when the best fused score sits below the configured
/// floor the corpus holds nothing relevant enough to answer from. Confidence
/// is the margin to the floor, scaled and clamped to [0, 1].
pub fn check_relevance(best_fused_score: Option<f32>, score_floor: f32) -> ScopeDecision {
	let Some(score) = best_fused_score else {
		return ScopeDecision { in_scope: false, confidence: 1.0 };
	};
	let in_scope = score >= score_floor;
	let denominator = score_floor.max(f32::EPSILON);
	let confidence = ((score - score_floor).abs() / denominator).clamp(0.0, 1.0);

	ScopeDecision { in_scope, confidence }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disallowed_topics_are_rejected() {
		let filter = TopicFilter::new(&["violence".to_string(), "politics".to_string()]);
		let decision = check_topic("Tell me about workplace violence policy", &filter);

		assert!(!decision.in_scope);
		assert_eq!(decision.confidence, 1.0);
	}

	#[test]
	fn topic_match_is_case_insensitive() {
		let filter = TopicFilter::new(&["politics".to_string()]);

		assert!(!check_topic("What about POLITICS?", &filter).in_scope);
	}

	#[test]
	fn benign_queries_pass_the_topic_filter() {
		let filter = TopicFilter::new(&["violence".to_string()]);

		assert!(check_topic("What is the password expiry policy?", &filter).in_scope);
	}

	#[test]
	fn scores_below_the_floor_are_out_of_scope() {
		let decision = check_relevance(Some(0.05), 0.2);

		assert!(!decision.in_scope);
		assert!(decision.confidence > 0.0);
	}

	#[test]
	fn scores_at_or_above_the_floor_are_in_scope() {
		assert!(check_relevance(Some(0.2), 0.2).in_scope);
		assert!(check_relevance(Some(0.9), 0.2).in_scope);
	}

	#[test]
	fn no_candidates_at_all_is_out_of_scope() {
		let decision = check_relevance(None, 0.2);

		assert!(!decision.in_scope);
		assert_eq!(decision.confidence, 1.0);
	}

	#[test]
	fn zero_floor_admits_everything() {
		assert!(check_relevance(Some(0.0), 0.0).in_scope);
	}
}
