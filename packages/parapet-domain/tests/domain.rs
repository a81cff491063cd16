use uuid::Uuid;

use parapet_domain::{
	ContextChunk,
	citation::{self, Citation},
	fusion::{self, FusionWeights, PartialCandidate},
	pii::{self, DetectionMethod, PatternSet, PiiFinding},
	scope::{self, TopicFilter},
};

fn id(byte: u8) -> Uuid {
	Uuid::from_bytes([byte; 16])
}

fn candidates(ids: &[u8], base: f32, step: f32) -> Vec<PartialCandidate> {
	ids.iter()
		.enumerate()
		.map(|(i, byte)| PartialCandidate { chunk_id: id(*byte), score: base - step * i as f32 })
		.collect()
}

#[test]
fn fusion_output_never_exceeds_k_for_disjoint_lists() {
	let lexical = candidates(&[1, 2, 3, 4, 5], 9.0, 1.0);
	let vector = candidates(&[6, 7, 8, 9, 10], 0.95, 0.1);

	for k in 1..=10usize {
		let fused = fusion::fuse(
			&lexical,
			&vector,
			FusionWeights { lexical: 0.5, vector: 0.5 },
			k,
		)
		.expect("fusion failed");

		assert!(fused.len() <= k);

		for pair in fused.windows(2) {
			let ordered = pair[0].fused_score > pair[1].fused_score
				|| (pair[0].fused_score == pair[1].fused_score
					&& pair[0].chunk_id < pair[1].chunk_id);

			assert!(ordered, "fused output must sort by score then ascending chunk id");
		}
	}
}

#[test]
fn fusion_repeats_identically_across_many_runs() {
	let lexical = candidates(&[3, 1, 4, 1, 5], 2.0, 0.0);
	let vector = candidates(&[9, 2, 6, 5, 3], 2.0, 0.0);
	let reference = fusion::fuse(
		&lexical,
		&vector,
		FusionWeights { lexical: 0.7, vector: 0.3 },
		8,
	)
	.expect("fusion failed");

	for _ in 0..50 {
		let again = fusion::fuse(
			&lexical,
			&vector,
			FusionWeights { lexical: 0.7, vector: 0.3 },
			8,
		)
		.expect("fusion failed");

		assert_eq!(again, reference);
	}
}

#[test]
fn a_chunk_in_both_lists_outranks_a_single_signal_peer() {
	// Same per-signal strength: id(1) appears in both lists, id(2) only in
	// the lexical list at the same rank position.
	let lexical = vec![
		PartialCandidate { chunk_id: id(1), score: 1.0 },
		PartialCandidate { chunk_id: id(2), score: 1.0 },
	];
	let vector = vec![PartialCandidate { chunk_id: id(1), score: 1.0 }];
	let fused = fusion::fuse(
		&lexical,
		&vector,
		FusionWeights { lexical: 0.5, vector: 0.5 },
		8,
	)
	.expect("fusion failed");

	assert_eq!(fused[0].chunk_id, id(1));
	assert!(fused[0].fused_score > fused[1].fused_score);
}

#[test]
fn citations_must_target_the_supplied_context_not_the_corpus() {
	// chunk_c exists "in the corpus" but was not part of the context set.
	let chunk_a = ContextChunk { chunk_id: id(1), document_id: id(100), text: "aaaa".to_string() };
	let chunk_b = ContextChunk { chunk_id: id(2), document_id: id(100), text: "bbbb".to_string() };
	let chunk_c_id = id(3);
	let citations = vec![Citation { chunk_id: chunk_c_id, start_offset: 0, end_offset: 2 }];

	assert!(citation::validate_citations(&citations, &[chunk_a, chunk_b]).is_err());
}

#[test]
fn citation_offsets_are_validated_against_chunk_length() {
	let chunk = ContextChunk { chunk_id: id(1), document_id: id(100), text: "x".repeat(100) };
	let citations = vec![Citation { chunk_id: id(1), start_offset: 95, end_offset: 150 }];

	assert!(citation::validate_citations(&citations, &[chunk]).is_err());
}

#[test]
fn blocking_entity_and_redaction_share_one_finding_model() {
	let patterns = PatternSet::compile(&[parapet_config::PiiPattern {
		entity_type: "NATIONAL_ID".to_string(),
		pattern: r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
	}])
	.expect("patterns must compile");
	let text = "My id is 123-45-6789, thanks.";
	let findings = patterns.scan(text);
	let blocking = vec!["NATIONAL_ID".to_string()];

	// On input the same finding blocks; on output it redacts.
	assert!(pii::first_blocking(&findings, &blocking).is_some());
	assert_eq!(pii::redact(text, &findings), "My id is [NATIONAL_ID], thanks.");
}

#[test]
fn merge_prefers_patterns_and_orders_by_offset() {
	let pattern = vec![PiiFinding {
		entity_type: "EMAIL_ADDRESS".to_string(),
		start: 10,
		end: 25,
		method: DetectionMethod::Pattern,
	}];
	let entity = vec![
		PiiFinding {
			entity_type: "PERSON".to_string(),
			start: 0,
			end: 6,
			method: DetectionMethod::NamedEntity,
		},
		PiiFinding {
			entity_type: "PERSON".to_string(),
			start: 12,
			end: 20,
			method: DetectionMethod::NamedEntity,
		},
	];
	let merged = pii::merge_findings(pattern, entity);

	assert_eq!(merged.len(), 2);
	assert_eq!(merged[0].start, 0);
	assert_eq!(merged[0].method, DetectionMethod::NamedEntity);
	assert_eq!(merged[1].method, DetectionMethod::Pattern);
}

#[test]
fn scope_guard_combines_topic_and_relevance_checks() {
	let filter = TopicFilter::new(&["weapon".to_string()]);

	assert!(!scope::check_topic("how to build a weapon", &filter).in_scope);
	assert!(scope::check_topic("password expiry policy", &filter).in_scope);
	assert!(!scope::check_relevance(Some(0.01), 0.12).in_scope);
	assert!(scope::check_relevance(Some(0.5), 0.12).in_scope);
}
