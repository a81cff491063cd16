use time::OffsetDateTime;
use uuid::Uuid;

/// Pipeline stages in their mandatory order. A stage appears in
/// `stages_completed` only once it has finished and the pipeline moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	Admitted,
	InputScanned,
	ScopeChecked,
	Retrieved,
	Fused,
	Reranked,
	Generated,
	OutputScanned,
	CitationChecked,
}

impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Admitted => "admitted",
			Self::InputScanned => "input_scanned",
			Self::ScopeChecked => "scope_checked",
			Self::Retrieved => "retrieved",
			Self::Fused => "fused",
			Self::Reranked => "reranked",
			Self::Generated => "generated",
			Self::OutputScanned => "output_scanned",
			Self::CitationChecked => "citation_checked",
		}
	}
}

/// Stable refusal codes. These are part of the API contract; callers match
/// on them, so renaming one is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalReason {
	InputBlocked,
	OutOfScope,
	CitationInvalid,
	GenerationUnavailable,
	DeadlineExceeded,
}

impl RefusalReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::InputBlocked => "INPUT_BLOCKED",
			Self::OutOfScope => "OUT_OF_SCOPE",
			Self::CitationInvalid => "CITATION_INVALID",
			Self::GenerationUnavailable => "GENERATION_UNAVAILABLE",
			Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
	InFlight,
	Responded,
	Refused(RefusalReason),
	AdmissionDenied,
	Failed,
}

impl AuditOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::InFlight => "IN_FLIGHT",
			Self::Responded => "RESPONDED",
			Self::Refused(reason) => reason.as_str(),
			Self::AdmissionDenied => "ADMISSION_DENIED",
			Self::Failed => "FAILED",
		}
	}
}

/// One record per request, created before admission and handed to the audit
/// writer on entry to a terminal state, whatever the outcome. The only
/// mutation allowed is appending stages and the final `finalize` call.
#[derive(Debug, Clone)]
pub struct AuditRecord {
	pub request_id: Uuid,
	pub timestamp: OffsetDateTime,
	pub caller_id_hash: String,
	pub stages_completed: Vec<Stage>,
	pub tokens_used: u32,
	pub outcome: AuditOutcome,
}

impl AuditRecord {
	pub fn begin(caller_id_hash: String, timestamp: OffsetDateTime) -> Self {
		Self {
			request_id: Uuid::new_v4(),
			timestamp,
			caller_id_hash,
			stages_completed: Vec::new(),
			tokens_used: 0,
			outcome: AuditOutcome::InFlight,
		}
	}

	pub fn advance(&mut self, stage: Stage) {
		self.stages_completed.push(stage);
	}

	pub fn finalize(&mut self, outcome: AuditOutcome, tokens_used: u32) {
		self.outcome = outcome;
		self.tokens_used = tokens_used;
	}

	pub fn stage_labels(&self) -> Vec<&'static str> {
		self.stages_completed.iter().map(|stage| stage.as_str()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn records_accumulate_stages_in_order() {
		let mut record = AuditRecord::begin("hash".to_string(), OffsetDateTime::UNIX_EPOCH);

		record.advance(Stage::Admitted);
		record.advance(Stage::InputScanned);
		record.finalize(AuditOutcome::Refused(RefusalReason::OutOfScope), 12);

		assert_eq!(record.stage_labels(), vec!["admitted", "input_scanned"]);
		assert_eq!(record.outcome, AuditOutcome::Refused(RefusalReason::OutOfScope));
		assert_eq!(record.tokens_used, 12);
	}

	#[test]
	fn refusal_codes_are_stable() {
		assert_eq!(RefusalReason::InputBlocked.as_str(), "INPUT_BLOCKED");
		assert_eq!(RefusalReason::OutOfScope.as_str(), "OUT_OF_SCOPE");
		assert_eq!(RefusalReason::CitationInvalid.as_str(), "CITATION_INVALID");
		assert_eq!(RefusalReason::GenerationUnavailable.as_str(), "GENERATION_UNAVAILABLE");
		assert_eq!(RefusalReason::DeadlineExceeded.as_str(), "DEADLINE_EXCEEDED");
	}

	#[test]
	fn refusal_reason_serializes_to_its_code() {
		let encoded =
			serde_json::to_string(&RefusalReason::OutOfScope).expect("serialization failed");

		assert_eq!(encoded, "\"OUT_OF_SCOPE\"");
	}
}
