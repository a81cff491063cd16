use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use parapet_domain::{
	Answer, ContextChunk,
	audit::{AuditOutcome, AuditRecord, RefusalReason, Stage},
	citation::{self, Citation},
	fusion::{self, FusedCandidate, FusionWeights, PartialCandidate},
	pii::{self, DetectionMethod, PiiFinding},
	scope,
};
use parapet_providers::generate::{GeneratedCitation, GenerationOutput};

use crate::{AdmissionDecision, ParapetService, ServiceError, ServiceResult};

/// Per-chunk token allowance used in the admission-time cost estimate.
const CONTEXT_CHUNK_TOKEN_ESTIMATE: u32 = 256;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct QueryRequest {
	pub question: String,
	pub caller_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
	Answered(Answer),
	Refused { reason: RefusalReason },
}

impl ParapetService {
	/// Runs one query through the full pipeline:
	/// admission, input scan, topic scope, concurrent retrieval, fusion,
	/// relevance floor, rerank, generation, output redaction, citation
	/// check, response. Guardrail refusals are ordinary outcomes; only
	/// admission denial and unexpected failures surface as errors. An audit
	/// record is finalized and handed to the writer on every path.
	pub async fn answer(&self, req: QueryRequest) -> ServiceResult<QueryOutcome> {
		if req.question.trim().is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "question is required.".to_string(),
			});
		}
		if req.caller_id.trim().is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "caller_id is required.".to_string(),
			});
		}

		let caller_id_hash = blake3::hash(req.caller_id.as_bytes()).to_hex().to_string();
		let mut record = AuditRecord::begin(caller_id_hash, OffsetDateTime::now_utc());
		let estimated_tokens = self.estimate_request_tokens(&req.question);

		// Admission runs before every other stage, PII scanning included; a
		// denied request must not cost anything downstream.
		match self.limiter.admit(&record.caller_id_hash, estimated_tokens).await {
			AdmissionDecision::Denied { retry_after } => {
				info!(request_id = %record.request_id, "Request denied by the rate limiter.");
				record.finalize(AuditOutcome::AdmissionDenied, 0);
				self.audit.record(record);

				return Err(ServiceError::RateLimitExceeded { retry_after });
			},
			AdmissionDecision::Admitted => record.advance(Stage::Admitted),
		}

		let deadline = Duration::from_millis(self.cfg.generation.request_deadline_ms);
		let verdict = tokio::time::timeout(deadline, self.run_stages(&req, &mut record)).await;

		match verdict {
			Ok(Ok(outcome)) => {
				let (audit_outcome, tokens_used) = match &outcome {
					QueryOutcome::Answered(answer) =>
						(AuditOutcome::Responded, answer.tokens_used),
					QueryOutcome::Refused { reason } => (AuditOutcome::Refused(*reason), 0),
				};

				record.finalize(audit_outcome, tokens_used);
				self.audit.record(record);

				Ok(outcome)
			},
			Ok(Err(err)) => {
				record.finalize(AuditOutcome::Failed, 0);
				self.audit.record(record);

				Err(err)
			},
			Err(_) => {
				// Dropping the stage future cancels any in-flight sub-call.
				warn!(request_id = %record.request_id, "Request deadline expired.");
				record.finalize(AuditOutcome::Refused(RefusalReason::DeadlineExceeded), 0);
				self.audit.record(record);

				Ok(QueryOutcome::Refused { reason: RefusalReason::DeadlineExceeded })
			},
		}
	}

	async fn run_stages(
		&self,
		req: &QueryRequest,
		record: &mut AuditRecord,
	) -> ServiceResult<QueryOutcome> {
		let findings = self.scan_text(&req.question).await;

		if let Some(finding) =
			pii::first_blocking(&findings, &self.cfg.guardrails.pii.blocking_entity_types)
		{
			info!(
				request_id = %record.request_id,
				entity_type = finding.entity_type.as_str(),
				"Query blocked by the input PII guard."
			);

			return Ok(QueryOutcome::Refused { reason: RefusalReason::InputBlocked });
		}

		// Non-blocking findings are still masked before the question reaches
		// retrieval or the generator, so sensitive spans never leave the
		// guard layer.
		let question = pii::redact(&req.question, &findings);

		record.advance(Stage::InputScanned);

		if !scope::check_topic(&question, &self.topic_filter).in_scope {
			info!(request_id = %record.request_id, "Query topic is outside the served domain.");

			return Ok(QueryOutcome::Refused { reason: RefusalReason::OutOfScope });
		}

		record.advance(Stage::ScopeChecked);

		let k = self.cfg.retrieval.breadth_k;
		let per_call = Duration::from_millis(self.cfg.retrieval.timeout_ms);
		// The two signals are independent reads against the same snapshot;
		// issue them together and treat a timed-out or failed sub-call as an
		// empty contribution rather than a request failure.
		let query_vector = self.embed_query(&question, per_call).await;
		let lexical_call = tokio::time::timeout(per_call, self.store.search_lexical(&question, k));
		let vector_call = async {
			match query_vector.as_deref() {
				Some(vector) =>
					tokio::time::timeout(per_call, self.store.search_vector(vector, k)).await,
				None => Ok(Ok(Vec::new())),
			}
		};
		let (lexical_result, vector_result) = tokio::join!(lexical_call, vector_call);
		let lexical = flatten_retrieval(lexical_result, "lexical");
		let vector = flatten_retrieval(vector_result, "vector");

		record.advance(Stage::Retrieved);

		if lexical.is_empty() && vector.is_empty() {
			// Valid outcome, not an error: the corpus simply has nothing for
			// this query.
			info!(request_id = %record.request_id, "No relevant passages in either signal.");

			return Ok(QueryOutcome::Refused { reason: RefusalReason::OutOfScope });
		}

		let weights = FusionWeights {
			lexical: self.cfg.retrieval.lexical_weight,
			vector: self.cfg.retrieval.vector_weight,
		};
		let fused = fusion::fuse(&lexical, &vector, weights, k as usize)
			.map_err(|err| ServiceError::Internal { message: format!("Fusion failed: {err}") })?;

		record.advance(Stage::Fused);

		// The relevance floor sits between fusion and reranking on purpose:
		// an out-of-corpus query must not pay for reranking or generation.
		let best = fused.first().map(|candidate| candidate.fused_score);
		let relevance = scope::check_relevance(best, self.cfg.guardrails.scope.score_floor);

		if !relevance.in_scope {
			info!(
				request_id = %record.request_id,
				confidence = relevance.confidence,
				"Best fused score is below the relevance floor."
			);

			return Ok(QueryOutcome::Refused { reason: RefusalReason::OutOfScope });
		}

		let ordered = self.fetch_in_fused_order(&fused).await?;
		let reranked = self.rerank_or_degrade(&question, ordered).await;

		record.advance(Stage::Reranked);

		let context: Vec<ContextChunk> =
			reranked.into_iter().take(self.cfg.retrieval.context_chunks as usize).collect();
		let messages = build_answer_messages(&question, &context, false);
		let Some(output) = self.generate_with_retry(&messages).await else {
			return Ok(QueryOutcome::Refused { reason: RefusalReason::GenerationUnavailable });
		};

		record.advance(Stage::Generated);

		let redacted = self.redact_output(&output.text).await;

		record.advance(Stage::OutputScanned);

		let citations = map_citations(&output.citations);
		let (text, citations) = match citation::validate_citations(&citations, &context) {
			Ok(()) => (redacted, citations),
			Err(violation) => {
				// Retry budget is exactly one, over the same context set; the
				// retry never re-retrieves or re-ranks.
				warn!(
					request_id = %record.request_id,
					error = %violation,
					"Citation validation failed; retrying generation with a re-cite instruction."
				);

				let recite = build_answer_messages(&question, &context, true);
				let Some(second) = self.generate_with_retry(&recite).await else {
					return Ok(QueryOutcome::Refused {
						reason: RefusalReason::GenerationUnavailable,
					});
				};
				let second_citations = map_citations(&second.citations);

				if let Err(violation) =
					citation::validate_citations(&second_citations, &context)
				{
					warn!(
						request_id = %record.request_id,
						error = %violation,
						"Citation validation failed after the retry; refusing."
					);

					return Ok(QueryOutcome::Refused { reason: RefusalReason::CitationInvalid });
				}

				(self.redact_output(&second.text).await, second_citations)
			},
		};

		record.advance(Stage::CitationChecked);

		let tokens_used = estimate_tokens(&question)
			+ context.iter().map(|chunk| estimate_tokens(&chunk.text)).sum::<u32>()
			+ estimate_tokens(&text);

		Ok(QueryOutcome::Answered(Answer { text, citations, tokens_used }))
	}

	/// Both PII passes over one text: the deterministic pattern pass, then
	/// the named-entity capability. A failing NER call degrades the scan to
	/// pattern-only instead of failing the request.
	async fn scan_text(&self, text: &str) -> Vec<PiiFinding> {
		let pattern_findings = self.pii_patterns.scan(text);
		let entity_findings =
			match self.providers.ner.entities(&self.cfg.providers.ner, text).await {
				Ok(spans) => spans
					.into_iter()
					.map(|span| PiiFinding {
						entity_type: span.entity_type,
						start: span.start,
						end: span.end,
						method: DetectionMethod::NamedEntity,
					})
					.collect(),
				Err(err) => {
					warn!(error = %err, "NER provider unavailable; using pattern findings only.");

					Vec::new()
				},
			};

		pii::merge_findings(pattern_findings, entity_findings)
	}

	async fn redact_output(&self, text: &str) -> String {
		let findings = self.scan_text(text).await;

		pii::redact(text, &findings)
	}

	/// The query embedding comes from an external capability; losing it only
	/// loses the vector signal, never the request.
	async fn embed_query(&self, question: &str, per_call: Duration) -> Option<Vec<f32>> {
		let texts = [question.to_string()];
		let call = self.providers.embedding.embed(&self.cfg.providers.embedding, &texts);

		match tokio::time::timeout(per_call, call).await {
			Ok(Ok(vectors)) => {
				let Some(vector) = vectors.into_iter().next() else {
					warn!("Embedding provider returned no vectors; dropping the vector signal.");

					return None;
				};

				if vector.len() != self.cfg.providers.embedding.dimensions as usize {
					warn!("Embedding vector dimension mismatch; dropping the vector signal.");

					return None;
				}

				Some(vector)
			},
			Ok(Err(err)) => {
				warn!(error = %err, "Embedding provider failed; dropping the vector signal.");

				None
			},
			Err(_) => {
				warn!("Embedding call timed out; dropping the vector signal.");

				None
			},
		}
	}

	async fn fetch_in_fused_order(
		&self,
		fused: &[FusedCandidate],
	) -> ServiceResult<Vec<ContextChunk>> {
		let chunk_ids: Vec<Uuid> = fused.iter().map(|candidate| candidate.chunk_id).collect();
		let chunks = self.store.fetch_chunks(&chunk_ids).await?;
		let mut ordered = Vec::with_capacity(fused.len());

		for candidate in fused {
			match chunks.iter().find(|chunk| chunk.chunk_id == candidate.chunk_id) {
				Some(chunk) => ordered.push(chunk.clone()),
				None => {
					warn!(chunk_id = %candidate.chunk_id, "Chunk text missing for candidate.");
				},
			}
		}

		Ok(ordered)
	}

	/// Reranking refines quality but is not safety-critical: any provider
	/// failure falls back to fusion order.
	async fn rerank_or_degrade(
		&self,
		question: &str,
		ordered: Vec<ContextChunk>,
	) -> Vec<ContextChunk> {
		if ordered.is_empty() {
			return ordered;
		}

		let top_n = self.cfg.retrieval.rerank_top_n as usize;
		let docs: Vec<String> = ordered.iter().map(|chunk| chunk.text.clone()).collect();

		match self.providers.rerank.rerank(&self.cfg.providers.rerank, question, &docs).await {
			Ok(scores) if scores.len() == ordered.len() => {
				let mut scored: Vec<(ContextChunk, f32)> =
					ordered.into_iter().zip(scores).collect();

				scored.sort_by(|a, b| {
					b.1.total_cmp(&a.1).then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
				});

				scored.into_iter().take(top_n).map(|(chunk, _)| chunk).collect()
			},
			Ok(_) => {
				warn!("Rerank provider returned a mismatched score count; using fusion order.");

				ordered.into_iter().take(top_n).collect()
			},
			Err(err) => {
				warn!(error = %err, "Rerank provider unavailable; using fusion order.");

				ordered.into_iter().take(top_n).collect()
			},
		}
	}

	async fn generate_with_retry(&self, messages: &[Value]) -> Option<GenerationOutput> {
		let cfg = &self.cfg.generation;
		let mut backoff_ms = cfg.backoff_base_ms;

		for attempt in 1..=cfg.max_attempts {
			match self
				.providers
				.generation
				.generate(&self.cfg.providers.generation, messages)
				.await
			{
				Ok(output) => return Some(output),
				Err(err) => {
					warn!(error = %err, attempt, "Generation attempt failed.");

					if attempt == cfg.max_attempts {
						break;
					}

					tokio::time::sleep(Duration::from_millis(
						backoff_ms + backoff_jitter(backoff_ms),
					))
					.await;

					backoff_ms = (backoff_ms * 2).min(cfg.backoff_max_ms);
				},
			}
		}

		None
	}

	fn estimate_request_tokens(&self, question: &str) -> u32 {
		estimate_tokens(question)
			+ self.cfg.retrieval.context_chunks * CONTEXT_CHUNK_TOKEN_ESTIMATE
			+ self.cfg.limits.expected_answer_tokens
	}
}

fn flatten_retrieval(
	result: Result<
		Result<Vec<PartialCandidate>, parapet_storage::Error>,
		tokio::time::error::Elapsed,
	>,
	signal: &str,
) -> Vec<PartialCandidate> {
	match result {
		Ok(Ok(candidates)) => candidates,
		Ok(Err(err)) => {
			warn!(error = %err, signal, "Retrieval signal failed; continuing without it.");

			Vec::new()
		},
		Err(_) => {
			warn!(signal, "Retrieval signal timed out; continuing without it.");

			Vec::new()
		},
	}
}

fn map_citations(citations: &[GeneratedCitation]) -> Vec<Citation> {
	citations
		.iter()
		.map(|citation| Citation {
			chunk_id: citation.chunk_id,
			start_offset: citation.start_offset,
			end_offset: citation.end_offset,
		})
		.collect()
}

/// Rough chars-per-token heuristic; good enough for budgeting without
/// loading a model tokenizer.
fn estimate_tokens(text: &str) -> u32 {
	(text.len() / 4) as u32 + 1
}

/// Entropy from a v4 uuid avoids carrying a dedicated RNG dependency.
fn backoff_jitter(backoff_ms: u64) -> u64 {
	let span = (backoff_ms / 2).max(1);

	(Uuid::new_v4().as_u128() % u128::from(span)) as u64
}

fn build_answer_messages(question: &str, context: &[ContextChunk], recite: bool) -> Vec<Value> {
	let schema = serde_json::json!({
		"answer": "string",
		"citations": [{ "chunk_id": "uuid", "start_offset": 0, "end_offset": 0 }]
	});
	let schema_text = serde_json::to_string_pretty(&schema)
		.unwrap_or_else(|_| "{\"answer\": \"string\", \"citations\": []}".to_string());
	let system_prompt = "You answer strictly from the supplied context passages. \
Output must be valid JSON only and must match the provided schema exactly. \
Cite every claim with the chunk_id of the passage it comes from and the byte range \
inside that passage's text. If the context does not contain the answer, say so in \
the answer field and cite nothing.";
	let mut context_lines = String::new();

	for chunk in context {
		context_lines.push_str(&format!("[{}] {}\n", chunk.chunk_id, chunk.text.trim()));
	}

	let mut user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema_text}\nQuestion:\n{question}\n\nContext:\n{context_lines}"
	);

	if recite {
		user_prompt.push_str(
			"\nYour previous citations were invalid. Re-cite: every citation must use one of \
the chunk_id values above, with offsets inside that passage's text.",
		);
	}

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_estimate_scales_with_length() {
		assert_eq!(estimate_tokens(""), 1);
		assert_eq!(estimate_tokens("abcd"), 2);
		assert!(estimate_tokens(&"x".repeat(400)) > estimate_tokens(&"x".repeat(40)));
	}

	#[test]
	fn jitter_stays_within_half_the_backoff() {
		for _ in 0..100 {
			assert!(backoff_jitter(1_000) < 500);
		}

		assert_eq!(backoff_jitter(0), 0);
	}

	#[test]
	fn recite_instruction_only_appears_on_the_retry() {
		let context = vec![ContextChunk {
			chunk_id: Uuid::new_v4(),
			document_id: Uuid::new_v4(),
			text: "Passwords expire every 90 days.".to_string(),
		}];
		let first = build_answer_messages("expiry?", &context, false);
		let second = build_answer_messages("expiry?", &context, true);
		let content = |messages: &[Value]| {
			messages[1]["content"].as_str().unwrap_or_default().to_string()
		};

		assert!(!content(&first).contains("previous citations were invalid"));
		assert!(content(&second).contains("previous citations were invalid"));
		assert!(content(&first).contains(&context[0].chunk_id.to_string()));
	}
}
